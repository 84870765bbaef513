//! Output records and the sinks that receive them.
//!
//! The edge emitter produces plain row structs; a [`RecordSink`] decides
//! where they go. [`CsvSink`] writes the flat files consumed by graph
//! import, [`MemorySink`] keeps everything in vectors.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

mod csv;
mod layout;

pub use csv::{CsvRecord, CsvSink};
pub use layout::{OutputLayout, RecordKind};

/// Control-flow edge classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Fallthrough,
    Jump,
    Call,
    /// Reserved; not produced by the current classification.
    CallFallthrough,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Fallthrough => "FALLTHROUGH",
            EdgeKind::Jump => "JUMP",
            EdgeKind::Call => "CALL",
            EdgeKind::CallFallthrough => "CALL_FALLTHROUGH",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRow {
    pub id: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub id: usize,
    pub start: u64,
    pub end: u64,
    pub function_id: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRow {
    pub address: u64,
    pub block_id: usize,
    pub last: bool,
    /// Lowercase hex of the raw bytes, without prefix.
    pub assembly: String,
    pub mnemonic: String,
    pub operands: Vec<String>,
}

/// A call whose target is not its own fallthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRow {
    pub address: u64,
    pub function_name: String,
    pub destination: u64,
    pub destination_name: String,
    pub plt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub id: usize,
    pub block_id: usize,
    /// Source address, after macro attribution.
    pub address: u64,
    pub destination: u64,
    pub plt: bool,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringRow {
    pub address: u64,
    pub length: u64,
    pub kind: u32,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringXrefRow {
    pub string_address: u64,
    pub xref: u64,
}

/// Destination for emitted records.
pub trait RecordSink {
    fn function(&mut self, row: &FunctionRow) -> io::Result<()>;
    fn block(&mut self, row: &BlockRow) -> io::Result<()>;
    fn instruction(&mut self, row: &InstructionRow) -> io::Result<()>;
    fn call(&mut self, row: &CallRow) -> io::Result<()>;
    fn edge(&mut self, row: &EdgeRow) -> io::Result<()>;
    fn string(&mut self, row: &StringRow) -> io::Result<()>;
    fn string_xref(&mut self, row: &StringXrefRow) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Collects every record in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemorySink {
    pub functions: Vec<FunctionRow>,
    pub blocks: Vec<BlockRow>,
    pub instructions: Vec<InstructionRow>,
    pub calls: Vec<CallRow>,
    pub edges: Vec<EdgeRow>,
    pub strings: Vec<StringRow>,
    pub string_xrefs: Vec<StringXrefRow>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edges leaving the instruction at `address`, in emission order.
    pub fn edges_from(&self, address: u64) -> Vec<&EdgeRow> {
        self.edges.iter().filter(|e| e.address == address).collect()
    }

    pub fn function_named(&self, name: &str) -> Option<&FunctionRow> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl RecordSink for MemorySink {
    fn function(&mut self, row: &FunctionRow) -> io::Result<()> {
        self.functions.push(row.clone());
        Ok(())
    }

    fn block(&mut self, row: &BlockRow) -> io::Result<()> {
        self.blocks.push(row.clone());
        Ok(())
    }

    fn instruction(&mut self, row: &InstructionRow) -> io::Result<()> {
        self.instructions.push(row.clone());
        Ok(())
    }

    fn call(&mut self, row: &CallRow) -> io::Result<()> {
        self.calls.push(row.clone());
        Ok(())
    }

    fn edge(&mut self, row: &EdgeRow) -> io::Result<()> {
        self.edges.push(row.clone());
        Ok(())
    }

    fn string(&mut self, row: &StringRow) -> io::Result<()> {
        self.strings.push(row.clone());
        Ok(())
    }

    fn string_xref(&mut self, row: &StringXrefRow) -> io::Result<()> {
        self.string_xrefs.push(row.clone());
        Ok(())
    }
}
