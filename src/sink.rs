//! Downstream scanner interface.
//!
//! Extracted objects are materialised as temp files and handed to an
//! [`ObjectSink`]: OLE10Native blobs go to the dedicated scanner, anything
//! else to the generic file scanner. The file is rewound before hand-off.

use crate::error::Result;
use crate::report::Verdict;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Scanners an extracted object is handed to.
pub trait ObjectSink {
    /// Scan an OLE10Native blob (4-byte little-endian length prefix followed
    /// by the payload).
    fn scan_ole10_native(&mut self, file: &mut File) -> Result<Verdict>;

    /// Scan an arbitrary extracted object; `path` names the temp file.
    fn scan_file(&mut self, file: &mut File, path: &Path) -> Result<Verdict>;
}

/// An object captured in memory by [`CollectSink`].
#[derive(Debug, Clone)]
pub struct CollectedObject {
    /// True when the object went through the OLE10Native scanner.
    pub ole10_native: bool,
    pub data: Vec<u8>,
}

/// Sink that buffers every extracted object in memory and reports clean.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub objects: Vec<CollectedObject>,
}

impl CollectSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectSink for CollectSink {
    fn scan_ole10_native(&mut self, file: &mut File) -> Result<Verdict> {
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        self.objects.push(CollectedObject {
            ole10_native: true,
            data,
        });
        Ok(Verdict::Clean)
    }

    fn scan_file(&mut self, file: &mut File, _path: &Path) -> Result<Verdict> {
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        self.objects.push(CollectedObject {
            ole10_native: false,
            data,
        });
        Ok(Verdict::Clean)
    }
}
