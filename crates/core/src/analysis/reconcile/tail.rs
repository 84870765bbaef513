//! Tail propagation: hanging instructions that lead into an owned block
//! join the block's function.

use std::collections::BTreeSet;

use tracing::warn;

use crate::analysis::blocks::iter_blocks;
use crate::analysis::reconcile::{Absorption, Direction};
use crate::model::{AddrRange, Image};

/// Starts of owned blocks with at least one eligible predecessor.
pub fn tail_seeds(image: &Image, range: AddrRange) -> BTreeSet<u64> {
    iter_blocks(image, range)
        .into_iter()
        .filter(|block| !image.is_hanging(block.start))
        .filter(|block| image.incoming(block.start).iter().any(|&src| image.put_in_bbl(src)))
        .map(|block| block.start)
        .collect()
}

/// Compute the run ending at `source`, a predecessor of the block at `seed`.
pub fn plan_tail_from(image: &Image, seed: u64, source: u64) -> Option<Absorption> {
    if !image.put_in_bbl(source) {
        return None;
    }
    let function = image.owner_of(seed)?;
    let range = grow_backward(image, source)?;
    Some(Absorption { function, range, frontier: range.start, direction: Direction::Tail })
}

/// Walk the single-predecessor chain backward from `last`.
///
/// The walk stops at a head with zero or several predecessors, or when the
/// predecessor is ineligible, a branch, PC-defining, or a call that does
/// not fall straight into the run.
pub fn grow_backward(image: &Image, last: u64) -> Option<AddrRange> {
    let Some(last_insn) = image.insn(last) else {
        warn!("error, decoded instruction not available 0x{last:x}");
        return None;
    };
    let end = last_insn.next_address();
    let mut start = last;

    loop {
        let &[pred] = image.incoming(start) else {
            break;
        };
        if !image.put_in_bbl(pred) {
            break;
        }
        let Some(pred_insn) = image.insn(pred) else {
            break;
        };
        if pred_insn.is_branch() || pred_insn.defines_pc() {
            break;
        }
        if pred_insn.is_call() && pred_insn.next_address() != start {
            break;
        }
        start = pred;
    }

    let range = AddrRange::new(start, end);
    (!range.is_empty()).then_some(range)
}
