//! In-memory index of one analysed binary.
//!
//! An `Image` is built once from an [`InstructionSource`] and then mutated
//! only through its function table by the reconciliation and relocation
//! passes. Hanging-ness is never stored: it is derived from the chunk index
//! on every query.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::AnalysisResult;
use crate::model::{
    AddrRange, FunctionId, FunctionTable, InstructionRecord, Insn, Section, StringItem,
};
use crate::services::sources::InstructionSource;

/// Ordered heads of the image.
#[derive(Debug, Clone, Default)]
pub struct InstructionTable {
    records: BTreeMap<u64, InstructionRecord>,
}

impl InstructionTable {
    pub fn insert(&mut self, record: InstructionRecord) {
        self.records.insert(record.address, record);
    }

    pub fn get(&self, address: u64) -> Option<&InstructionRecord> {
        self.records.get(&address)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First head strictly after `address`.
    pub fn next_head(&self, address: u64) -> Option<u64> {
        self.records.range(address.saturating_add(1)..).next().map(|(&a, _)| a)
    }

    /// Last head strictly before `address`.
    pub fn prev_head(&self, address: u64) -> Option<u64> {
        self.records.range(..address).next_back().map(|(&a, _)| a)
    }

    pub fn heads(&self, range: AddrRange) -> impl Iterator<Item = u64> + '_ {
        self.records.range(range.start..range.end).map(|(&a, _)| a)
    }
}

/// Bidirectional code references.
///
/// Outgoing lists keep the source's order and duplicates: a conditional
/// branch whose taken target equals its fallthrough lists that address twice.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    outgoing: BTreeMap<u64, Vec<u64>>,
    incoming: BTreeMap<u64, Vec<u64>>,
}

impl XrefTable {
    pub fn add_outgoing(&mut self, from: u64, to: u64) {
        self.outgoing.entry(from).or_default().push(to);
        let preds = self.incoming.entry(to).or_default();
        if !preds.contains(&from) {
            preds.push(from);
        }
    }

    /// Record a reference learnt from the incoming side. The outgoing side is
    /// only extended when it does not already know the edge.
    pub fn add_incoming(&mut self, to: u64, from: u64) {
        let preds = self.incoming.entry(to).or_default();
        if preds.contains(&from) {
            return;
        }
        preds.push(from);
        let succs = self.outgoing.entry(from).or_default();
        if !succs.contains(&to) {
            succs.push(to);
        }
    }

    pub fn outgoing(&self, address: u64) -> &[u64] {
        self.outgoing.get(&address).map_or(&[], Vec::as_slice)
    }

    pub fn incoming(&self, address: u64) -> &[u64] {
        self.incoming.get(&address).map_or(&[], Vec::as_slice)
    }
}

/// One binary: sections, heads, references, switches, functions and strings.
#[derive(Debug, Clone, Default)]
pub struct Image {
    name: String,
    sections: Vec<Section>,
    instructions: InstructionTable,
    xrefs: XrefTable,
    switches: BTreeMap<u64, Vec<u64>>,
    functions: FunctionTable,
    strings: Vec<StringItem>,
}

impl Image {
    /// Pull everything the passes need out of `source`.
    ///
    /// Heads the source enumerates but cannot decode are skipped with a
    /// warning. Function blocks are merged into chunks; two functions
    /// claiming the same bytes is an invariant violation.
    pub fn from_source(source: &dyn InstructionSource) -> AnalysisResult<Self> {
        let mut image = Image { name: source.name().to_string(), ..Image::default() };
        image.sections = source.sections();

        for section in image.sections.clone() {
            for address in source.heads(section.range) {
                let Some(record) = source.instruction(address) else {
                    warn!("error, decoded instruction not available 0x{address:x}");
                    continue;
                };
                image.instructions.insert(record);
            }
        }

        let addresses: Vec<u64> = image.instructions.records.keys().copied().collect();
        for &address in &addresses {
            for to in source.outgoing(address) {
                image.xrefs.add_outgoing(address, to);
            }
        }
        for &address in &addresses {
            for from in source.incoming(address) {
                image.xrefs.add_incoming(address, from);
            }
            if let Some(targets) = source.switch_targets(address) {
                image.switches.insert(address, targets);
            }
        }

        for info in source.functions() {
            let id = image.functions.add_function(&info.name, info.entry);
            let mut blocks: Vec<AddrRange> = source
                .function_blocks(info.entry)
                .into_iter()
                .filter(|b| !b.is_empty())
                .collect();
            blocks.sort();
            for chunk in coalesce(blocks) {
                image.functions.append_chunk(id, chunk)?;
            }
        }

        image.strings = source.strings();
        debug!(
            heads = image.instructions.len(),
            functions = image.functions.len(),
            chunks = image.functions.chunk_count(),
            "image loaded from {}",
            image.name
        );
        Ok(image)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn section_of(&self, address: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.range.contains(address))
    }

    pub fn instructions(&self) -> &InstructionTable {
        &self.instructions
    }

    pub fn instruction(&self, address: u64) -> Option<&InstructionRecord> {
        self.instructions.get(address)
    }

    /// Flyweight view of the head at `address`.
    pub fn insn(&self, address: u64) -> Option<Insn<'_>> {
        self.instructions.get(address).map(|record| Insn::new(self, record))
    }

    pub fn next_head(&self, address: u64) -> Option<u64> {
        self.instructions.next_head(address)
    }

    pub fn prev_head(&self, address: u64) -> Option<u64> {
        self.instructions.prev_head(address)
    }

    pub fn heads(&self, range: AddrRange) -> impl Iterator<Item = u64> + '_ {
        self.instructions.heads(range)
    }

    pub fn outgoing(&self, address: u64) -> &[u64] {
        self.xrefs.outgoing(address)
    }

    pub fn incoming(&self, address: u64) -> &[u64] {
        self.xrefs.incoming(address)
    }

    pub fn switch_targets(&self, address: u64) -> Option<&[u64]> {
        self.switches.get(&address).map(Vec::as_slice)
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Chunk mutation is reserved for the reconciler and relocator.
    pub(crate) fn functions_mut(&mut self) -> &mut FunctionTable {
        &mut self.functions
    }

    pub fn owner_of(&self, address: u64) -> Option<FunctionId> {
        self.functions.owner_of(address)
    }

    pub fn is_hanging(&self, address: u64) -> bool {
        self.functions.owner_of(address).is_none()
    }

    /// Eligibility for block construction: a hanging code head.
    pub fn put_in_bbl(&self, address: u64) -> bool {
        self.instruction(address).is_some_and(|r| r.flags.is_code()) && self.is_hanging(address)
    }

    /// Hanging code heads in `range`.
    pub fn hanging(&self, range: AddrRange) -> impl Iterator<Item = u64> + '_ {
        self.heads(range).filter(move |&a| self.put_in_bbl(a))
    }

    pub fn hanging_count(&self, range: AddrRange) -> usize {
        self.hanging(range).count()
    }

    pub fn strings(&self) -> &[StringItem] {
        &self.strings
    }
}

/// Merge sorted, possibly touching or overlapping ranges.
fn coalesce(sorted: Vec<AddrRange>) -> Vec<AddrRange> {
    let mut out: Vec<AddrRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match out.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => out.push(range),
        }
    }
    out
}
