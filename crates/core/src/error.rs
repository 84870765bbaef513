//! Error types shared across the core crate.
//!
//! Only structural problems surface as errors. Decode inconsistencies and
//! ambiguous relocation candidates are logged and counted by the passes
//! that meet them, and never abort a run.

use thiserror::Error;

use crate::model::{AddrRange, FunctionId};

/// Error type for analysis passes.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The upstream disassembler output breaks an assumption the algorithm
    /// cannot route around. Re-running on the same input reproduces it.
    #[error("invariant violated at 0x{address:x}: {detail}")]
    Invariant { address: u64, detail: String },

    /// Loading or validating the instruction source failed.
    #[error("instruction source error: {0}")]
    Source(#[from] SourceError),

    /// Writing output records failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An analysis configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    pub fn invariant(address: u64, detail: impl Into<String>) -> Self {
        AnalysisError::Invariant { address, detail: detail.into() }
    }

    /// True for errors that indicate malformed upstream structure.
    pub fn is_invariant(&self) -> bool {
        matches!(self, AnalysisError::Invariant { .. })
    }
}

/// Convenience result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Misuse of the function/chunk table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("refusing to create empty chunk {0}")]
    Empty(AddrRange),

    #[error("chunk {range} overlaps {existing} owned by function {owner}")]
    Overlap { range: AddrRange, existing: AddrRange, owner: FunctionId },

    #[error("no chunk contains 0x{0:x}")]
    NotOwned(u64),

    #[error("unknown function {0}")]
    UnknownFunction(FunctionId),

    #[error("range {inner} is not contained in chunk {outer}")]
    NotContained { inner: AddrRange, outer: AddrRange },

    #[error("range {range} contains the entry point of function {owner}")]
    ContainsEntry { range: AddrRange, owner: FunctionId },
}

impl ChunkError {
    /// Address the error is anchored at, for diagnostics.
    pub fn address(&self) -> u64 {
        match self {
            ChunkError::Empty(range) => range.start,
            ChunkError::Overlap { range, .. } => range.start,
            ChunkError::NotOwned(address) => *address,
            ChunkError::UnknownFunction(_) => 0,
            ChunkError::NotContained { inner, .. } => inner.start,
            ChunkError::ContainsEntry { range, .. } => range.start,
        }
    }
}

impl From<ChunkError> for AnalysisError {
    fn from(err: ChunkError) -> Self {
        AnalysisError::Invariant { address: err.address(), detail: err.to_string() }
    }
}

/// Errors raised while reading a disassembler export.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse snapshot: {0}")]
    Parse(String),

    #[error("invalid snapshot: {0}")]
    Invalid(String),

    #[error("unsupported snapshot format '{0}' (expected json, yaml or yml)")]
    Format(String),
}
