//! Input adapters and the run orchestration built on the analysis passes.

pub mod pipeline;
pub mod sources;

pub use pipeline::{Pipeline, RunReport, SectionReport};
pub use sources::{InstructionSource, SnapshotSource};
