use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chunkwise_core::analysis::Propagation;
use chunkwise_core::{AnalysisConfig, Image, SnapshotSource};

/// Load a snapshot (JSON or YAML by extension) and build its image.
pub fn load_image(input: &Path) -> Result<Image> {
    let source = SnapshotSource::from_path(input)
        .with_context(|| format!("Failed to load snapshot {}", input.display()))?;
    Image::from_source(&source)
        .with_context(|| format!("Failed to build image from {}", input.display()))
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub hanging: Option<String>,
    pub follow_jumps: bool,
    pub switch_dest_to_tail: bool,
    pub suffix: Option<String>,
    pub max_iterations: Option<usize>,
}

/// Resolve the run configuration: flags, then the config file, then defaults.
pub fn resolve_config(config: Option<&Path>, overrides: &ConfigOverrides) -> Result<AnalysisConfig> {
    let mut cfg = match config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    if let Some(actions) = &overrides.hanging {
        cfg.hanging = actions
            .parse::<Propagation>()
            .map_err(|e| anyhow!("Invalid --hanging value '{actions}': {e}"))?;
    }
    if overrides.follow_jumps {
        cfg.follow_jumps = true;
    }
    if overrides.switch_dest_to_tail {
        cfg.switch_dest_to_tail = true;
    }
    if overrides.suffix.is_some() {
        cfg.suffix = overrides.suffix.clone();
    }
    if let Some(n) = overrides.max_iterations {
        cfg.max_iterations = n;
    }
    Ok(cfg)
}

/// Directory the record files go to: `--out-dir`, else next to the input.
pub fn output_dir(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    }
}
