//! Core data model: address ranges, sections, decoded instructions and the
//! function/chunk ownership table.
//!
//! The `Image` type in [`image`] ties these together into one mutable index
//! per analysed binary. [`Insn`] is the flyweight view the passes use to ask
//! questions about a single head.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod chunks;
pub mod image;
pub mod insn;

pub use chunks::{Function, FunctionTable};
pub use image::Image;
pub use insn::Insn;

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddrRange {
    pub start: u64,
    pub end: u64,
}

impl AddrRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, address: u64) -> bool {
        self.start <= address && address < self.end
    }

    /// True when `other` lies entirely inside this range.
    pub fn contains_range(&self, other: AddrRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: AddrRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:x}, 0x{:x})", self.start, self.end)
    }
}

/// Index of a function inside a [`FunctionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub usize);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named segment of the image (e.g. `.text`, `.plt`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub range: AddrRange,
}

impl Section {
    pub fn new(name: impl Into<String>, start: u64, end: u64) -> Self {
        Self { name: name.into(), range: AddrRange::new(start, end) }
    }
}

/// Flow classification primitives reported by the disassembler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowFlags {
    pub call: bool,
    pub branch: bool,
    pub conditional: bool,
    pub defines_pc: bool,
    pub data: bool,
    pub unknown: bool,
    /// Disassembler merged several machine instructions into one item
    /// (e.g. MOVW/MOVT).
    #[serde(rename = "macro")]
    pub macro_insn: bool,
}

impl FlowFlags {
    /// Call, branch, or any other instruction writing the program counter.
    pub fn is_flow(&self) -> bool {
        self.call || self.branch || self.defines_pc
    }

    pub fn is_code(&self) -> bool {
        !self.data && !self.unknown
    }
}

/// One decoded head as delivered by an [`InstructionSource`](crate::services::sources::InstructionSource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub address: u64,
    pub size: u32,
    pub bytes: Vec<u8>,
    pub mnemonic: String,
    pub operands: Vec<String>,
    pub flags: FlowFlags,
}

impl InstructionRecord {
    pub fn next_address(&self) -> u64 {
        self.address + u64::from(self.size)
    }

    /// Lowercase hex rendering of the raw bytes.
    pub fn assembled_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// First four raw bytes as a little-endian word, if present.
    pub fn raw_word(&self) -> Option<u32> {
        let word: [u8; 4] = self.bytes.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(word))
    }
}

/// Function as enumerated by the source: name and entry address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub entry: u64,
}

/// A string literal found by the disassembler, with its data references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringItem {
    pub address: u64,
    pub length: u64,
    pub kind: u32,
    pub value: String,
    #[serde(default)]
    pub xrefs: Vec<u64>,
}
