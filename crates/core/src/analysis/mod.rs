//! Graph-rewriting passes over an [`Image`](crate::model::Image).
//!
//! The passes run in a fixed order per section:
//! - [`reconcile`] absorbs hanging instructions into functions;
//! - [`relocate`] moves switch case blocks to the function they flow into;
//! - [`edges`] walks the final block structure and emits records.
//!
//! [`blocks`] derives basic blocks from the chunk table and is shared by all
//! three.

pub mod blocks;
pub mod edges;
pub mod reconcile;
pub mod relocate;

pub use blocks::{blocks_in_function, iter_blocks, BasicBlock};
pub use edges::{compute_plt_range, emit_range, emit_strings, EdgeKind, EmitContext, EmitStats};
pub use reconcile::{
    CancelToken, Direction, Propagation, ReconcileOptions, ReconcileReport, Reconciler, SeedOrder,
};
pub use relocate::{relocate_switch_targets, RelocationStats, SwitchMove};
