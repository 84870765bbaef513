//! Disassembler exports the analysis can read from.
//!
//! An [`InstructionSource`] is the capability surface the [`Image`] loader
//! needs: sections, functions with their blocks, decoded heads, code
//! references and switch tables. Any concrete disassembler adapter
//! implements it; [`SnapshotSource`] reads a serialised export.
//!
//! [`Image`]: crate::model::Image

use std::path::Path;

use crate::error::SourceError;
use crate::model::{AddrRange, FunctionInfo, InstructionRecord, Section, StringItem};

pub mod snapshot;

pub use snapshot::{Snapshot, SnapshotSource};

/// Read-only view of a disassembler's analysis results.
pub trait InstructionSource: Send + Sync {
    /// Human-readable name of the analysed binary.
    fn name(&self) -> &str;

    fn sections(&self) -> Vec<Section>;

    /// Functions in enumeration order.
    fn functions(&self) -> Vec<FunctionInfo>;

    /// Blocks of the function entered at `entry`, as `[start, end)`.
    fn function_blocks(&self, entry: u64) -> Vec<AddrRange>;

    /// Head addresses inside `range`, ascending.
    fn heads(&self, range: AddrRange) -> Vec<u64>;

    /// Decoded form of the head at `address`, if it can be decoded.
    fn instruction(&self, address: u64) -> Option<InstructionRecord>;

    fn outgoing(&self, address: u64) -> Vec<u64>;

    fn incoming(&self, address: u64) -> Vec<u64>;

    /// Case targets when `address` is a switch instruction.
    fn switch_targets(&self, address: u64) -> Option<Vec<u64>>;

    fn strings(&self) -> Vec<StringItem> {
        Vec::new()
    }
}

/// Serialisation formats recognised by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Yaml,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        match ext.to_ascii_lowercase().as_str() {
            "json" => Ok(SourceFormat::Json),
            "yaml" | "yml" => Ok(SourceFormat::Yaml),
            other => Err(SourceError::Format(other.to_string())),
        }
    }
}
