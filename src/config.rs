use crate::error::{Result, RtfError};
use std::path::PathBuf;

/// Default cap on the declared payload size of a single embedded object.
pub const MAX_OBJECT_SIZE: u64 = 100 * 1024 * 1024; // 100MB

/// Default cap on the number of objects extracted from one document.
pub const MAX_OBJECTS: usize = 50;

/// Configuration for a document walk.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Directory the per-document temp directory is created under.
    /// `None` uses the system temp directory.
    pub tmp_root: Option<PathBuf>,
    /// Keep extracted temp files and the temp directory after the walk.
    pub keep_tmp: bool,
    /// Maximum number of embedded objects to extract per document.
    pub max_objects: usize,
    /// Maximum declared payload size of a single embedded object.
    /// Larger objects are skipped, not failed.
    pub max_object_size: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            tmp_root: None,
            keep_tmp: false,
            max_objects: MAX_OBJECTS,
            max_object_size: MAX_OBJECT_SIZE,
        }
    }
}

impl ExtractConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return errors for invalid settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_objects == 0 {
            return Err(RtfError::Config("max_objects must be greater than 0".into()));
        }
        if self.max_object_size == 0 {
            return Err(RtfError::Config("max_object_size must be greater than 0".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_tmp_root(mut self, root: PathBuf) -> Self {
        self.tmp_root = Some(root);
        self
    }

    #[must_use]
    pub fn with_keep_tmp(mut self, keep: bool) -> Self {
        self.keep_tmp = keep;
        self
    }

    #[must_use]
    pub fn with_max_objects(mut self, max: usize) -> Self {
        self.max_objects = max;
        self
    }

    #[must_use]
    pub fn with_max_object_size(mut self, max: u64) -> Self {
        self.max_object_size = max;
        self
    }
}
