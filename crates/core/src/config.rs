use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::reconcile::{Propagation, ReconcileOptions, SeedOrder, DEFAULT_MAX_ITERATIONS};
use crate::error::{AnalysisError, AnalysisResult};

fn default_sections() -> Vec<String> {
    vec![".text".to_string(), ".init".to_string()]
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

/// Knobs for one analysis run.
///
/// Every field has a default so a config file only needs to name what it
/// changes. Command-line flags override values loaded from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Propagation actions, e.g. `"ht"`. Empty disables reconciliation.
    pub hanging: Propagation,
    pub follow_jumps: bool,
    pub switch_dest_to_tail: bool,
    /// Inserted into output file names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Code sections processed in order; missing ones are skipped.
    #[serde(default = "default_sections")]
    pub sections: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    pub seed_order: SeedOrder,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            hanging: Propagation::none(),
            follow_jumps: false,
            switch_dest_to_tail: false,
            suffix: None,
            sections: default_sections(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed_order: SeedOrder::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load a JSON or YAML config file, chosen by extension.
    pub fn load(path: &Path) -> AnalysisResult<Self> {
        let body = fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&body).map_err(|e| {
                AnalysisError::Config(format!("failed to parse {}: {e}", path.display()))
            })
        } else {
            serde_yaml::from_str(&body).map_err(|e| {
                AnalysisError::Config(format!("failed to parse {}: {e}", path.display()))
            })
        }
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            propagation: self.hanging.clone(),
            follow_jumps: self.follow_jumps,
            seed_order: self.seed_order,
            max_iterations: self.max_iterations,
        }
    }
}
