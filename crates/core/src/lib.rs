//! chunkwise-core
//!
//! Core library for repairing function boundaries in disassembler output
//! and exporting the resulting control-flow graph.
//!
//! This crate defines the image model, the reconciliation, relocation and
//! emission passes, input sources for disassembler exports, and the output
//! sinks for graph import.
//!
//! All substantive logic lives here so it is fully testable and reusable
//! from multiple frontends.

pub mod analysis;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod services;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, AnalysisResult, ChunkError, SourceError};
pub use model::{AddrRange, FunctionId, Image};
pub use services::{Pipeline, RunReport, SnapshotSource};

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
