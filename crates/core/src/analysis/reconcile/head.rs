//! Head propagation: hanging instructions that follow an owned block join
//! the block's function.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::analysis::blocks::iter_blocks;
use crate::analysis::reconcile::{Absorption, Direction};
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::{AddrRange, Image};

/// Last instructions of owned blocks with at least one eligible successor.
pub fn head_seeds(image: &Image, range: AddrRange) -> BTreeSet<u64> {
    iter_blocks(image, range)
        .into_iter()
        .filter(|block| !image.is_hanging(block.start))
        .filter(|block| image.outgoing(block.last).iter().any(|&dst| image.put_in_bbl(dst)))
        .map(|block| block.last)
        .collect()
}

/// Compute the run entered from `seed` through its successor `target`.
///
/// Without `follow_jumps` only the fallthrough successor is considered.
/// Returns `None` when nothing is absorbed.
pub fn plan_head_from(
    image: &Image,
    seed: u64,
    target: u64,
    follow_jumps: bool,
) -> AnalysisResult<Option<Absorption>> {
    let Some(seed_insn) = image.insn(seed) else {
        warn!("error, fallthrough decoded instruction not available 0x{seed:x}");
        return Ok(None);
    };
    if target != seed_insn.next_address() && !follow_jumps {
        return Ok(None);
    }
    if !image.put_in_bbl(target) {
        return Ok(None);
    }
    let Some(function) = seed_insn.owner() else {
        debug!("seed 0x{seed:x} is no longer owned");
        return Ok(None);
    };

    Ok(grow_forward(image, target)?.map(|(range, last)| Absorption {
        function,
        range,
        frontier: last,
        direction: Direction::Head,
    }))
}

/// Grow a straight-line run forward from the eligible head `start`.
///
/// Returns the absorbed range and its last instruction, or `None` for an
/// empty run. More than one successor on a non-flow instruction, or a
/// non-contiguous successor on anything but a fused macro, is fatal.
pub fn grow_forward(image: &Image, start: u64) -> AnalysisResult<Option<(AddrRange, u64)>> {
    let mut last = start;
    let mut end = start;

    loop {
        let Some(insn) = image.insn(last) else {
            warn!("error, decoded instruction not available 0x{last:x}");
            break;
        };
        end = insn.next_address();

        if insn.is_flow() {
            if !insn.is_dangerous_flow() {
                break;
            }
            debug!("dangerous instruction 0x{:x} {}", last, insn.text());
        }

        let outgoing = insn.outgoing();
        let mut dst = match outgoing {
            [] => break,
            [dst] => *dst,
            _ => {
                return Err(AnalysisError::invariant(
                    last,
                    format!("multiple outgoing from 0x{last:x} {outgoing:x?}"),
                ))
            }
        };

        if dst != insn.next_address() {
            if !insn.is_macro() {
                return Err(AnalysisError::invariant(
                    last,
                    format!(
                        "end 0x{last:x}, size {}, outgoing 0x{dst:x}",
                        insn.size()
                    ),
                ));
            }
            dst = insn.next_address();
        }

        if !image.put_in_bbl(dst) {
            break;
        }
        last = dst;
    }

    let range = AddrRange::new(start, end);
    if range.is_empty() {
        return Ok(None);
    }
    Ok(Some((range, last)))
}
