//! End-to-end run over one image.
//!
//! For each configured code section that exists: reconcile hanging
//! instructions, relocate switch cases, count what is still hanging, then
//! emit records. Strings are emitted once at the end. Record ids are shared
//! by all sections of the run.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::edges::{compute_plt_range, emit_range, emit_strings, EmitContext, EmitStats};
use crate::analysis::reconcile::{CancelToken, ReconcileReport, Reconciler};
use crate::analysis::relocate::{relocate_switch_targets, RelocationStats};
use crate::config::AnalysisConfig;
use crate::error::AnalysisResult;
use crate::model::{AddrRange, Image};
use crate::output::RecordSink;

/// Outcome for one processed section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionReport {
    pub name: String,
    pub range: AddrRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relocation: Option<RelocationStats>,
    /// Hanging code heads left after reconciliation and relocation.
    pub hanging_remaining: usize,
    pub emit: EmitStats,
}

/// Summary of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub source: String,
    pub started_at: String,
    pub finished_at: String,
    pub plt: AddrRange,
    pub sections: Vec<SectionReport>,
    pub strings: EmitStats,
    pub cancelled: bool,
}

impl RunReport {
    /// Record counts summed over all sections and strings.
    pub fn totals(&self) -> EmitStats {
        let mut total = self.strings;
        for section in &self.sections {
            total.add(&section.emit);
        }
        total
    }

    pub fn hanging_remaining(&self) -> usize {
        self.sections.iter().map(|s| s.hanging_remaining).sum()
    }

    pub fn section(&self, name: &str) -> Option<&SectionReport> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// Configured runner; owns the cancel token handed to the reconciler.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: AnalysisConfig,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config, cancel: CancelToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run every stage and flush `sink`.
    ///
    /// A cancelled reconciliation stops the run after that section's
    /// reconcile step; nothing further is emitted.
    pub fn run(&self, image: &mut Image, sink: &mut dyn RecordSink) -> AnalysisResult<RunReport> {
        let started_at = Utc::now().to_rfc3339();
        let plt = compute_plt_range(image);
        let mut ctx = EmitContext::new(plt);
        let options = self.config.reconcile_options();
        let mut sections = Vec::new();
        let mut cancelled = false;

        for name in &self.config.sections {
            let Some(range) = image.section(name).map(|s| s.range) else {
                info!("section {name} not present, skipping");
                continue;
            };
            if range.is_empty() {
                continue;
            }
            info!("processing section {name} {range}");

            let reconcile = if options.propagation.is_empty() {
                None
            } else {
                let report = Reconciler::new(image, range, &options)
                    .with_cancel(self.cancel.clone())
                    .run()?;
                info!(
                    iterations = report.iterations,
                    head_merges = report.head_merges,
                    tail_merges = report.tail_merges,
                    "reconciled {} -> {} hanging",
                    report.hanging_before,
                    report.hanging_after
                );
                cancelled = report.cancelled;
                Some(report)
            };

            if cancelled {
                sections.push(SectionReport {
                    name: name.clone(),
                    range,
                    reconcile,
                    relocation: None,
                    hanging_remaining: image.hanging_count(range),
                    emit: EmitStats::default(),
                });
                break;
            }

            let relocation = if self.config.switch_dest_to_tail {
                Some(relocate_switch_targets(image, range)?)
            } else {
                None
            };

            info!("listing hanging instructions...");
            let hanging_remaining = image.hanging_count(range);

            let emit = emit_range(image, range, &mut ctx, sink)?;
            sections.push(SectionReport {
                name: name.clone(),
                range,
                reconcile,
                relocation,
                hanging_remaining,
                emit,
            });
        }

        let strings = if cancelled { EmitStats::default() } else { emit_strings(image, sink)? };
        sink.flush()?;

        Ok(RunReport {
            source: image.name().to_string(),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            plt,
            sections,
            strings,
            cancelled,
        })
    }
}
