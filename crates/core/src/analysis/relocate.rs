//! Switch case relocation.
//!
//! A case block placed far from its switch may have been claimed by
//! whichever function happens to sit next to it. When every
//! interprocedural edge leaving the case block lands in one single other
//! function, the block is moved to that function.
//!
//! One pass only: a move that creates a new candidate for another switch
//! is not re-examined.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::blocks::{index_by_start, iter_blocks, BasicBlock};
use crate::error::AnalysisResult;
use crate::model::{AddrRange, FunctionId, Image};

/// Counters for one relocation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationStats {
    /// Case targets still hanging; left to the reconciler.
    pub targets_hanging: usize,
    /// Case blocks ending in a call.
    pub calls_skipped: usize,
    /// Case blocks with no interprocedural successor.
    pub case_ends_in_call: usize,
    pub case_to_multiple_functions: usize,
    /// Owned case targets that do not start a block.
    pub unknown_targets: usize,
    pub moves_recorded: usize,
    pub moves_applied: usize,
    pub moves_skipped: usize,
}

/// A case block scheduled to change owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwitchMove {
    pub switch: u64,
    pub range: AddrRange,
    pub destination: FunctionId,
}

/// Record then apply every unambiguous case-block move in `range`.
pub fn relocate_switch_targets(image: &mut Image, range: AddrRange) -> AnalysisResult<RelocationStats> {
    info!("moving switch destinations to tail function...");
    let (moves, mut stats) = plan_switch_moves(image, range);
    info!(
        case_to_multiple_functions = stats.case_to_multiple_functions,
        case_ends_in_call = stats.case_ends_in_call,
        "  move action results"
    );
    info!("executing {} move actions...", moves.len());
    apply_switch_moves(image, &moves, &mut stats)?;
    Ok(stats)
}

/// Compute the pending moves without touching the image.
pub fn plan_switch_moves(image: &Image, range: AddrRange) -> (Vec<SwitchMove>, RelocationStats) {
    let blocks = iter_blocks(image, range);
    let bbl_info = index_by_start(&blocks);
    let mut stats = RelocationStats::default();
    let mut moves: BTreeMap<u64, SwitchMove> = BTreeMap::new();

    let switches: BTreeSet<u64> = blocks
        .iter()
        .flat_map(|b| image.heads(b.range()))
        .filter(|&a| image.switch_targets(a).is_some())
        .collect();

    for switch in switches {
        let Some(switch_fun) = image.owner_of(switch) else { continue };
        let Some(targets) = image.switch_targets(switch) else { continue };

        for &target in targets {
            if image.is_hanging(target) {
                warn!("switch 0x{switch:x} target 0x{target:x} hangs");
                stats.targets_hanging += 1;
                continue;
            }
            let Some(block) = bbl_info.get(&target) else {
                debug!("switch 0x{switch:x} target 0x{target:x} does not start a block");
                stats.unknown_targets += 1;
                continue;
            };
            if image.insn(block.last).is_some_and(|i| i.is_call()) {
                debug!("switch 0x{switch:x}, target 0x{target:x} ends in call");
                stats.calls_skipped += 1;
                continue;
            }

            let mut outgoing_functions = BTreeSet::new();
            for &dst in image.outgoing(block.last) {
                match image.owner_of(dst) {
                    None => debug!("no outgoing function for 0x{dst:x}"),
                    Some(f) if f != switch_fun => {
                        outgoing_functions.insert(f);
                    }
                    Some(_) => {}
                }
            }

            let mut owners = outgoing_functions.into_iter();
            match (owners.next(), owners.next()) {
                (None, _) => stats.case_ends_in_call += 1,
                (Some(destination), None) => {
                    moves.entry(target).or_insert(SwitchMove {
                        switch,
                        range: move_range(image, block),
                        destination,
                    });
                }
                _ => stats.case_to_multiple_functions += 1,
            }
        }
    }

    stats.moves_recorded = moves.len();
    (moves.into_values().collect(), stats)
}

/// From the case block's start to the head after its last instruction, so
/// padding behind the block travels with it. Never past the owning chunk.
fn move_range(image: &Image, block: &BasicBlock) -> AddrRange {
    let chunk_end = image
        .functions()
        .chunk_at(block.start)
        .map_or(block.end, |(chunk, _)| chunk.end);
    let end = image.next_head(block.last).map_or(chunk_end, |next| next.min(chunk_end));
    AddrRange::new(block.start, end.max(block.end))
}

/// Detach each move's range from its owner and give it to the destination.
pub fn apply_switch_moves(
    image: &mut Image,
    moves: &[SwitchMove],
    stats: &mut RelocationStats,
) -> AnalysisResult<()> {
    for mv in moves {
        let Some(owner) = image.owner_of(mv.range.start) else {
            debug!("move {} no longer owned", mv.range);
            stats.moves_skipped += 1;
            continue;
        };
        if owner == mv.destination {
            stats.moves_skipped += 1;
            continue;
        }
        let protects_entry = image
            .functions()
            .function(owner)
            .is_some_and(|f| mv.range.contains(f.entry));
        if protects_entry {
            warn!("move {} would detach the entry of function {}", mv.range, owner);
            stats.moves_skipped += 1;
            continue;
        }

        let functions = image.functions_mut();
        functions.dechunkize(mv.range)?;
        functions.append_chunk(mv.destination, mv.range)?;
        debug!(
            "switch 0x{:x}: moved {} from {} to {}",
            mv.switch, mv.range, owner, mv.destination
        );
        stats.moves_applied += 1;
    }
    Ok(())
}
