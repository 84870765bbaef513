use std::path::PathBuf;

use anyhow::Result;
use chunkwise::commands::{
    hanging_command, reconcile_command, summary_command, ConfigOverrides, ReconcileArgs,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Reconcile hanging instructions into disassembler function chunks.
///
/// This CLI is a thin wrapper around `chunkwise-core` (exposed in code as
/// `chunkwise_core`). All substantive logic lives in the library so it can be
/// tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "chunkwise",
    version,
    about = "Repair function chunks and export control-flow records",
    long_about = None
)]
struct Cli {
    /// Log per-seed decisions (debug level). `RUST_LOG` takes precedence.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile, relocate switch cases and write the record files.
    ///
    /// Writes `<stem>[.<suffix>].{functions,bbls,instructions,calls,edges,strings,stringxrefs}`
    /// plus a `<stem>[.<suffix>].run.json` report.
    Reconcile {
        /// Disassembler snapshot (.json, .yaml or .yml).
        #[arg(long)]
        input: PathBuf,

        /// Output directory. Defaults to the directory of the input.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Analysis config file (JSON or YAML).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Propagation actions in order, e.g. `ht`, `h` or `t`.
        #[arg(long)]
        hanging: Option<String>,

        /// Let head propagation follow jump targets, not only fallthroughs.
        #[arg(long, default_value_t = false)]
        follow_jumps: bool,

        /// Move switch case blocks to the function they exit into.
        #[arg(long, default_value_t = false)]
        switch_dest_to_tail: bool,

        /// Inserted into output file names.
        #[arg(long)]
        suffix: Option<String>,

        /// Safety cap on fixed-point iterations per section.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Emit the run report as JSON instead of a text summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List instructions no function owns, before any repair.
    Hanging {
        /// Disassembler snapshot (.json, .yaml or .yml).
        #[arg(long)]
        input: PathBuf,

        /// Section to list.
        #[arg(long, default_value = ".text")]
        section: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show functions with their chunk and block counts.
    Summary {
        /// Disassembler snapshot (.json, .yaml or .yml).
        #[arg(long)]
        input: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "chunkwise=debug,chunkwise_core=debug"
    } else {
        "chunkwise=info,chunkwise_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Reconcile {
            input,
            out_dir,
            config,
            hanging,
            follow_jumps,
            switch_dest_to_tail,
            suffix,
            max_iterations,
            json,
        } => {
            let args = ReconcileArgs {
                input,
                out_dir,
                config,
                overrides: ConfigOverrides {
                    hanging,
                    follow_jumps,
                    switch_dest_to_tail,
                    suffix,
                    max_iterations,
                },
                json,
            };
            reconcile_command(&args)?
        }
        Command::Hanging { input, section, json } => hanging_command(&input, &section, json)?,
        Command::Summary { input, json } => summary_command(&input, json)?,
    }

    Ok(())
}
