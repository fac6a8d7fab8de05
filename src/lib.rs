//! RTFCARVE - streaming extractor for embedded objects in RTF documents.
//!
//! Walks the raw group/control-word syntax of an RTF byte stream, locates
//! `\object` groups carrying `\objdata` payloads, hex-decodes each embedded
//! object and hands it to a downstream scanner as a temp file. Built as the
//! RTF front line of a malware-scanning pipeline: tolerant of arbitrarily
//! malformed input, bounded in memory regardless of nesting depth, and
//! careful to leak no file descriptors or temp files on any exit path.
//!
//! The walker does not render RTF or interpret formatting; control words
//! other than `\object`/`\objdata` are recognised and skipped.
//!
//! # Example
//!
//! ```no_run
//! use rtfcarve::{CollectSink, RtfExtractor};
//!
//! let extractor = RtfExtractor::new();
//! let mut sink = CollectSink::new();
//! let report = extractor
//!     .extract_file("invoice.rtf".as_ref(), &mut sink)
//!     .unwrap();
//!
//! for (record, obj) in report.objects.iter().zip(&sink.objects) {
//!     println!("{:?}: {} bytes", record.flavour, obj.data.len());
//! }
//! ```

mod actions;
mod hex;
mod objdata;
mod state;

pub mod cli;
pub mod config;
pub mod error;
pub mod file_io;
pub mod parser;
pub mod report;
pub mod sink;

pub use config::ExtractConfig;
pub use error::{Result, RtfError};
pub use parser::RtfExtractor;
pub use report::{ExtractReport, ObjectFlavour, ObjectRecord, Verdict};
pub use sink::{CollectSink, CollectedObject, ObjectSink};

use std::path::Path;

/// Extract embedded objects from an in-memory RTF document.
pub fn extract_bytes(
    data: &[u8],
    config: &ExtractConfig,
    sink: &mut dyn ObjectSink,
) -> Result<ExtractReport> {
    RtfExtractor::with_config(config.clone())?.extract(data, sink)
}

/// Extract embedded objects from an RTF file on disk.
pub fn extract_file<P: AsRef<Path>>(
    path: P,
    config: &ExtractConfig,
    sink: &mut dyn ObjectSink,
) -> Result<ExtractReport> {
    RtfExtractor::with_config(config.clone())?.extract_file(path.as_ref(), sink)
}
