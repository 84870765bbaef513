//! Function table with chunk-based membership.
//!
//! A function owns one or more disjoint chunks. The table keeps a global
//! index keyed by chunk start so `owner_of` is a single ordered-map lookup,
//! and it refuses any mutation that would let two chunks overlap.

use std::collections::BTreeMap;

use crate::error::ChunkError;
use crate::model::{AddrRange, FunctionId};

/// A function: entry point, name and its chunk set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub entry: u64,
    chunks: BTreeMap<u64, u64>,
}

impl Function {
    /// Chunks in address order.
    pub fn chunks(&self) -> impl Iterator<Item = AddrRange> + '_ {
        self.chunks.iter().map(|(&start, &end)| AddrRange::new(start, end))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The chunk holding the entry point.
    pub fn main_chunk(&self) -> Option<AddrRange> {
        self.chunks().find(|c| c.contains(self.entry))
    }

    pub fn tail_chunks(&self) -> impl Iterator<Item = AddrRange> + '_ {
        let entry = self.entry;
        self.chunks().filter(move |c| !c.contains(entry))
    }

    pub fn contains(&self, address: u64) -> bool {
        self.chunks
            .range(..=address)
            .next_back()
            .is_some_and(|(_, &end)| address < end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkEntry {
    end: u64,
    owner: FunctionId,
}

/// All functions of an image plus the address -> owner index.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: Vec<Function>,
    by_entry: BTreeMap<u64, FunctionId>,
    index: BTreeMap<u64, ChunkEntry>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function with no chunks yet. Re-adding an entry returns
    /// the existing id.
    pub fn add_function(&mut self, name: impl Into<String>, entry: u64) -> FunctionId {
        if let Some(&id) = self.by_entry.get(&entry) {
            return id;
        }
        let id = FunctionId(self.functions.len());
        self.functions.push(Function { id, name: name.into(), entry, chunks: BTreeMap::new() });
        self.by_entry.insert(entry, id);
        id
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0)
    }

    pub fn by_entry(&self, entry: u64) -> Option<&Function> {
        self.by_entry.get(&entry).and_then(|id| self.function(*id))
    }

    pub fn by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Functions ordered by entry address.
    pub fn iter(&self) -> impl Iterator<Item = &Function> + '_ {
        self.by_entry.values().map(|id| &self.functions[id.0])
    }

    /// Functions whose entry lies in `range`, ordered by entry address.
    pub fn functions_in(&self, range: AddrRange) -> impl Iterator<Item = &Function> + '_ {
        self.by_entry.range(range.start..range.end).map(|(_, id)| &self.functions[id.0])
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// Every chunk in address order with its owner.
    pub fn chunks(&self) -> impl Iterator<Item = (AddrRange, FunctionId)> + '_ {
        self.index.iter().map(|(&start, entry)| (AddrRange::new(start, entry.end), entry.owner))
    }

    /// The chunk containing `address`, if any.
    pub fn chunk_at(&self, address: u64) -> Option<(AddrRange, FunctionId)> {
        self.index
            .range(..=address)
            .next_back()
            .filter(|(_, entry)| address < entry.end)
            .map(|(&start, entry)| (AddrRange::new(start, entry.end), entry.owner))
    }

    pub fn owner_of(&self, address: u64) -> Option<FunctionId> {
        self.chunk_at(address).map(|(_, owner)| owner)
    }

    /// Name of the function owning `address`, or an empty string.
    pub fn name_at(&self, address: u64) -> &str {
        self.owner_of(address).and_then(|id| self.function(id)).map_or("", |f| f.name.as_str())
    }

    fn check_free(&self, range: AddrRange) -> Result<(), ChunkError> {
        // Chunks never overlap, so only the last chunk starting before
        // `range.end` can reach into `range`.
        match self.index.range(..range.end).next_back() {
            Some((&start, entry)) if entry.end > range.start => Err(ChunkError::Overlap {
                range,
                existing: AddrRange::new(start, entry.end),
                owner: entry.owner,
            }),
            _ => Ok(()),
        }
    }

    /// Give `range` to `owner` as a new chunk. Adjacent chunks of the same
    /// function are coalesced; the resulting chunk is returned.
    pub fn append_chunk(
        &mut self,
        owner: FunctionId,
        range: AddrRange,
    ) -> Result<AddrRange, ChunkError> {
        if range.is_empty() {
            return Err(ChunkError::Empty(range));
        }
        if self.function(owner).is_none() {
            return Err(ChunkError::UnknownFunction(owner));
        }
        self.check_free(range)?;

        let mut merged = range;
        let before = self
            .index
            .range(..range.start)
            .next_back()
            .filter(|(_, e)| e.end == range.start && e.owner == owner)
            .map(|(&start, _)| start);
        if let Some(start) = before {
            self.detach(start);
            merged.start = start;
        }
        if let Some(after) = self.index.get(&range.end).copied() {
            if after.owner == owner {
                self.detach(range.end);
                merged.end = after.end;
            }
        }

        self.index.insert(merged.start, ChunkEntry { end: merged.end, owner });
        self.functions[owner.0].chunks.insert(merged.start, merged.end);
        Ok(merged)
    }

    fn detach(&mut self, start: u64) -> Option<(AddrRange, FunctionId)> {
        let entry = self.index.remove(&start)?;
        self.functions[entry.owner.0].chunks.remove(&start);
        Some((AddrRange::new(start, entry.end), entry.owner))
    }

    /// Remove the chunk containing `address`, returning it to the hanging set.
    pub fn remove_chunk(&mut self, address: u64) -> Result<(AddrRange, FunctionId), ChunkError> {
        let (chunk, _) = self.chunk_at(address).ok_or(ChunkError::NotOwned(address))?;
        self.detach(chunk.start).ok_or(ChunkError::NotOwned(address))
    }

    /// Detach `inner` from the chunk that contains it. Non-empty fragments
    /// before and after `inner` stay with the original owner, which is
    /// returned. `inner` is left unowned.
    pub fn dechunkize(&mut self, inner: AddrRange) -> Result<FunctionId, ChunkError> {
        if inner.is_empty() {
            return Err(ChunkError::Empty(inner));
        }
        let (outer, owner) = self.chunk_at(inner.start).ok_or(ChunkError::NotOwned(inner.start))?;
        if !outer.contains_range(inner) {
            return Err(ChunkError::NotContained { inner, outer });
        }
        if let Some(function) = self.function(owner) {
            if inner.contains(function.entry) {
                return Err(ChunkError::ContainsEntry { range: inner, owner });
            }
        }

        self.detach(outer.start);
        if outer.start < inner.start {
            self.append_chunk(owner, AddrRange::new(outer.start, inner.start))?;
        }
        if inner.end < outer.end {
            self.append_chunk(owner, AddrRange::new(inner.end, outer.end))?;
        }
        Ok(owner)
    }
}
