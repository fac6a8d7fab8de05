//! Command-line interface definitions.

use crate::config::ExtractConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rtfcarve")]
#[command(about = "Extract and scan embedded OLE objects from RTF documents")]
#[command(version)]
pub struct Args {
    /// RTF files to process
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Keep extracted temp files instead of removing them
    #[arg(long)]
    pub keep_tmp: bool,

    /// Directory to create the per-document temp directory under
    #[arg(long, value_name = "DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Maximum number of embedded objects to extract per document
    #[arg(long, value_name = "N")]
    pub max_objects: Option<usize>,

    /// Maximum payload size of a single embedded object, in bytes
    #[arg(long, value_name = "BYTES")]
    pub max_object_size: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the extractor configuration from the command line.
    pub fn config(&self) -> ExtractConfig {
        let mut config = ExtractConfig::default();
        config.keep_tmp = self.keep_tmp;
        config.tmp_root = self.tmp_dir.clone();
        if let Some(n) = self.max_objects {
            config.max_objects = n;
        }
        if let Some(n) = self.max_object_size {
            config.max_object_size = n;
        }
        config
    }
}
