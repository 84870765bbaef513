//! Hanging-instruction reconciliation.
//!
//! Instructions the disassembler left without an owning function are
//! absorbed into existing functions from two directions:
//!
//! - **head** propagation grows a hanging run forward from the end of an
//!   owned block and appends it to that block's function;
//! - **tail** propagation grows a hanging run backward from the start of an
//!   owned block and appends it to that block's function.
//!
//! Both are driven to a fixed point by [`Reconciler::run`]. Every successful
//! absorption strictly shrinks the hanging set, which bounds the number of
//! iterations; an explicit cap still guards against malformed input.
//!
//! Absorption is a two-step operation: `plan_*` computes an [`Absorption`]
//! without touching the image, [`commit`] applies it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AnalysisResult;
use crate::model::{AddrRange, FunctionId, Image};

mod head;
mod tail;

pub use head::{grow_forward, head_seeds, plan_head_from};
pub use tail::{grow_backward, plan_tail_from, tail_seeds};

/// Iteration cap used when the caller does not set one.
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Propagation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Head,
    Tail,
}

/// Ordered list of directions run in each fixed-point iteration.
///
/// Parsed from an action string of `h` and `t` characters; the empty string
/// disables reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Propagation(Vec<Direction>);

impl Propagation {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn head() -> Self {
        Self(vec![Direction::Head])
    }

    pub fn tail() -> Self {
        Self(vec![Direction::Tail])
    }

    pub fn both() -> Self {
        Self(vec![Direction::Head, Direction::Tail])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn directions(&self) -> &[Direction] {
        &self.0
    }
}

impl FromStr for Propagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .map(|c| match c {
                'h' => Ok(Direction::Head),
                't' => Ok(Direction::Tail),
                other => Err(format!("invalid propagation action '{other}' (expected 'h' or 't')")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Propagation)
    }
}

impl TryFrom<String> for Propagation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Propagation> for String {
    fn from(value: Propagation) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.0 {
            f.write_str(match d {
                Direction::Head => "h",
                Direction::Tail => "t",
            })?;
        }
        Ok(())
    }
}

/// Order in which pending seeds are taken off the worklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedOrder {
    #[default]
    Ascending,
    Descending,
}

/// Caller-selected reconciliation behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub propagation: Propagation,
    /// Head propagation also follows non-fallthrough successors.
    pub follow_jumps: bool,
    pub seed_order: SeedOrder,
    pub max_iterations: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            propagation: Propagation::none(),
            follow_jumps: false,
            seed_order: SeedOrder::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Shared flag used to stop a running reconciliation between seeds.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A computed, not yet applied, chunk append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Absorption {
    pub function: FunctionId,
    pub range: AddrRange,
    /// Address to re-seed the worklist with once committed: the last
    /// instruction for head growth, the first for tail growth.
    pub frontier: u64,
    pub direction: Direction,
}

/// Apply an absorption to the image, returning the resulting chunk.
pub fn commit(image: &mut Image, absorption: &Absorption) -> AnalysisResult<AddrRange> {
    let chunk = image.functions_mut().append_chunk(absorption.function, absorption.range)?;
    debug!(
        function = %absorption.function,
        direction = ?absorption.direction,
        "absorbed {} into chunk {}",
        absorption.range,
        chunk
    );
    Ok(chunk)
}

/// Summary of one [`Reconciler::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub iterations: usize,
    pub head_merges: usize,
    pub tail_merges: usize,
    pub absorbed_instructions: usize,
    pub hanging_before: usize,
    pub hanging_after: usize,
    pub cap_reached: bool,
    pub cancelled: bool,
}

/// Result of one directional pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub merges: usize,
    pub absorbed_instructions: usize,
    pub cancelled: bool,
}

pub(crate) struct Worklist {
    seeds: BTreeSet<u64>,
    order: SeedOrder,
}

impl Worklist {
    pub(crate) fn new(seeds: BTreeSet<u64>, order: SeedOrder) -> Self {
        Self { seeds, order }
    }

    pub(crate) fn len(&self) -> usize {
        self.seeds.len()
    }

    pub(crate) fn push(&mut self, seed: u64) {
        self.seeds.insert(seed);
    }

    pub(crate) fn pop(&mut self) -> Option<u64> {
        match self.order {
            SeedOrder::Ascending => self.seeds.pop_first(),
            SeedOrder::Descending => self.seeds.pop_last(),
        }
    }
}

/// Fixed-point driver over one address range of an image.
pub struct Reconciler<'a> {
    image: &'a mut Image,
    range: AddrRange,
    options: &'a ReconcileOptions,
    cancel: CancelToken,
}

impl<'a> Reconciler<'a> {
    pub fn new(image: &'a mut Image, range: AddrRange, options: &'a ReconcileOptions) -> Self {
        Self { image, range, options, cancel: CancelToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn image(&self) -> &Image {
        &*self.image
    }

    /// Run the configured directions until a full iteration makes no
    /// progress, the cap is hit, or the token is cancelled.
    pub fn run(&mut self) -> AnalysisResult<ReconcileReport> {
        let mut report = ReconcileReport {
            hanging_before: self.image.hanging_count(self.range),
            ..ReconcileReport::default()
        };

        if !self.options.propagation.is_empty() {
            info!("associate hanging instructions in {}...", self.range);
        }

        while !self.options.propagation.is_empty() {
            if report.iterations >= self.options.max_iterations {
                warn!(
                    cap = self.options.max_iterations,
                    "reconciliation did not converge within the iteration cap; stopping"
                );
                report.cap_reached = true;
                break;
            }

            info!("  iteration {}", report.iterations);
            let mut progress = false;
            for direction in self.options.propagation.directions().to_vec() {
                let outcome = match direction {
                    Direction::Head => self.head_pass()?,
                    Direction::Tail => self.tail_pass()?,
                };
                match direction {
                    Direction::Head => report.head_merges += outcome.merges,
                    Direction::Tail => report.tail_merges += outcome.merges,
                }
                report.absorbed_instructions += outcome.absorbed_instructions;
                progress |= outcome.merges > 0;
                if outcome.cancelled {
                    report.cancelled = true;
                    break;
                }
            }
            report.iterations += 1;

            if report.cancelled || !progress {
                break;
            }
        }

        report.hanging_after = self.image.hanging_count(self.range);
        Ok(report)
    }

    /// One head-propagation pass over the whole range.
    pub fn head_pass(&mut self) -> AnalysisResult<PassOutcome> {
        info!("    hanging TAIL instructions to HEAD function...");
        let mut worklist = Worklist::new(head_seeds(self.image, self.range), self.options.seed_order);
        info!("    initial {} blocks", worklist.len());

        let mut outcome = PassOutcome::default();
        while let Some(seed) = worklist.pop() {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let targets = self.image.outgoing(seed).to_vec();
            for target in targets {
                let Some(absorption) =
                    plan_head_from(self.image, seed, target, self.options.follow_jumps)?
                else {
                    continue;
                };
                commit(self.image, &absorption)?;
                outcome.merges += 1;
                outcome.absorbed_instructions += self.image.heads(absorption.range).count();
                worklist.push(absorption.frontier);
            }
        }
        Ok(outcome)
    }

    /// One tail-propagation pass over the whole range.
    pub fn tail_pass(&mut self) -> AnalysisResult<PassOutcome> {
        info!("    hanging HEAD instructions to TAIL function...");
        let mut worklist = Worklist::new(tail_seeds(self.image, self.range), self.options.seed_order);
        info!("    initial {} blocks", worklist.len());

        let mut outcome = PassOutcome::default();
        while let Some(seed) = worklist.pop() {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let sources = self.image.incoming(seed).to_vec();
            for source in sources {
                let Some(absorption) = plan_tail_from(self.image, seed, source) else {
                    continue;
                };
                commit(self.image, &absorption)?;
                outcome.merges += 1;
                outcome.absorbed_instructions += self.image.heads(absorption.range).count();
                worklist.push(absorption.frontier);
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagation_parses_action_strings() {
        assert_eq!("ht".parse::<Propagation>().unwrap(), Propagation::both());
        assert_eq!("".parse::<Propagation>().unwrap(), Propagation::none());
        assert_eq!("th".parse::<Propagation>().unwrap().to_string(), "th");
        assert!("hx".parse::<Propagation>().is_err());
    }

    #[test]
    fn worklist_respects_seed_order() {
        let seeds: BTreeSet<u64> = [3, 1, 2].into_iter().collect();
        let mut asc = Worklist::new(seeds.clone(), SeedOrder::Ascending);
        let mut desc = Worklist::new(seeds, SeedOrder::Descending);
        assert_eq!(asc.pop(), Some(1));
        assert_eq!(desc.pop(), Some(3));
    }
}
