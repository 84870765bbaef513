use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The seven record files of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Functions,
    Blocks,
    Instructions,
    Calls,
    Edges,
    Strings,
    StringXrefs,
}

impl RecordKind {
    pub const ALL: [RecordKind; 7] = [
        RecordKind::Functions,
        RecordKind::Blocks,
        RecordKind::Instructions,
        RecordKind::Calls,
        RecordKind::Edges,
        RecordKind::Strings,
        RecordKind::StringXrefs,
    ];

    /// File extension used for this record kind.
    pub fn extension(&self) -> &'static str {
        match self {
            RecordKind::Functions => "functions",
            RecordKind::Blocks => "bbls",
            RecordKind::Instructions => "instructions",
            RecordKind::Calls => "calls",
            RecordKind::Edges => "edges",
            RecordKind::Strings => "strings",
            RecordKind::StringXrefs => "stringxrefs",
        }
    }
}

/// Where the files of one run are written.
///
/// Files are named `<stem>[.<suffix>].<kind>` inside `dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub dir: PathBuf,
    pub stem: String,
    pub suffix: Option<String>,
}

impl OutputLayout {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>, suffix: Option<String>) -> Self {
        Self { dir: dir.into(), stem: stem.into(), suffix: suffix.filter(|s| !s.is_empty()) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn base(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}.{}", self.stem, suffix),
            None => self.stem.clone(),
        }
    }

    pub fn path(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(format!("{}.{}", self.base(), kind.extension()))
    }

    /// Path of the JSON run report.
    pub fn report_path(&self) -> PathBuf {
        self.dir.join(format!("{}.run.json", self.base()))
    }

    pub fn all_paths(&self) -> Vec<PathBuf> {
        RecordKind::ALL.iter().map(|k| self.path(*k)).collect()
    }
}
