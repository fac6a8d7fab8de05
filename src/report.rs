use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of walking one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// No downstream scanner flagged anything.
    Clean,
    /// A downstream scanner flagged an extracted object; carries its signature.
    Detected(String),
}

impl Verdict {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Verdict::Clean)
    }
}

/// How an embedded object's payload was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectFlavour {
    /// Payload too short to classify before the group ended.
    Unknown,
    /// OLE2 compound document (leading bytes `D0 CF`).
    Ole2,
    /// OLE10Native stream; dumped with a 4-byte little-endian length prefix.
    Ole10Native,
}

/// One embedded object handed to a downstream scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub flavour: ObjectFlavour,
    /// Payload bytes written to the temp file, excluding the OLE10Native prefix.
    pub size: u64,
    /// Object description from the OLE1 header, when present.
    pub description: Option<String>,
    /// Path of the kept temp file (`keep_tmp` only).
    pub path: Option<PathBuf>,
    /// The group closed before the declared payload size was reached.
    pub truncated: bool,
}

/// Everything a document walk produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractReport {
    pub objects: Vec<ObjectRecord>,
    /// Objects skipped because an extraction limit was hit.
    pub discarded: usize,
    /// Total number of groups opened.
    pub groups: usize,
    /// Deepest group nesting observed.
    pub max_depth: usize,
    pub verdict: Verdict,
    /// The per-document temp directory (`keep_tmp` only).
    pub tmp_dir: Option<PathBuf>,
}

impl ExtractReport {
    pub(crate) fn new() -> Self {
        Self {
            objects: Vec::new(),
            discarded: 0,
            groups: 0,
            max_depth: 0,
            verdict: Verdict::Clean,
            tmp_dir: None,
        }
    }
}
