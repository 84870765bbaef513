use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chunkwise_core::output::{CsvSink, OutputLayout, RecordKind};
use chunkwise_core::{AnalysisConfig, Pipeline, RunReport};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::commands::{load_image, output_dir, resolve_config, ConfigOverrides};
use crate::{input_stem, sha256_file};

/// Arguments of `chunkwise reconcile`.
#[derive(Debug, Clone, Default)]
pub struct ReconcileArgs {
    pub input: PathBuf,
    pub out_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub overrides: ConfigOverrides,
    pub json: bool,
}

/// Contents of `<stem>[.suffix].run.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunMetadata {
    pub input: String,
    pub input_sha256: String,
    pub config: AnalysisConfig,
    pub report: RunReport,
    pub outputs: Vec<String>,
}

/// Run the full pipeline on a snapshot and write the record files.
pub fn reconcile_command(args: &ReconcileArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref(), &args.overrides)?;
    let input_hash = sha256_file(&args.input)?;
    let mut image = load_image(&args.input)?;

    let layout = OutputLayout::new(
        output_dir(&args.input, args.out_dir.as_deref()),
        input_stem(&args.input),
        config.suffix.clone(),
    );
    let mut sink = CsvSink::create(&layout).with_context(|| {
        format!("Failed to create output files in {}", layout.dir().display())
    })?;

    let pipeline = Pipeline::new(config.clone());
    let report = pipeline
        .run(&mut image, &mut sink)
        .with_context(|| format!("Reconciliation failed for {}", args.input.display()))?;
    drop(sink);

    let metadata = RunMetadata {
        input: args.input.display().to_string(),
        input_sha256: input_hash,
        config,
        outputs: RecordKind::ALL.iter().map(|k| layout.path(*k).display().to_string()).collect(),
        report,
    };
    let report_path = layout.report_path();
    write_metadata(&report_path, &metadata)?;
    info!("run report written to {}", report_path.display());

    if args.json {
        let serialized = serde_json::to_string_pretty(&metadata)
            .context("Failed to serialize run report to JSON")?;
        println!("{}", serialized);
    } else {
        print_summary(&metadata, &report_path);
    }

    Ok(())
}

fn write_metadata(path: &Path, metadata: &RunMetadata) -> Result<()> {
    let json =
        serde_json::to_string_pretty(metadata).context("Failed to serialize run report to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write run report: {}", path.display()))
}

fn print_summary(metadata: &RunMetadata, report_path: &Path) {
    let report = &metadata.report;
    println!("Reconciled {}:", report.source);
    for section in &report.sections {
        let merges = section
            .reconcile
            .as_ref()
            .map(|r| {
                format!(
                    "hanging {} -> {}, {} head / {} tail merges",
                    r.hanging_before, r.hanging_after, r.head_merges, r.tail_merges
                )
            })
            .unwrap_or_else(|| format!("hanging {} (not reconciled)", section.hanging_remaining));
        match &section.relocation {
            Some(moves) => println!(
                "  {} {}: {}, {} case moves",
                section.name, section.range, merges, moves.moves_applied
            ),
            None => println!("  {} {}: {}", section.name, section.range, merges),
        }
    }

    let totals = report.totals();
    println!(
        "  Records: {} functions, {} blocks, {} instructions, {} calls, {} edges, {} strings",
        totals.functions,
        totals.blocks,
        totals.instructions,
        totals.calls,
        totals.edges,
        totals.strings
    );
    if report.cancelled {
        println!("  Cancelled before completion.");
    }
    println!("  Report: {}", report_path.display());
}
