//! Document input with memory-mapping for large files.

use crate::error::Result;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Files larger than this are memory-mapped instead of read into memory.
const MMAP_THRESHOLD: u64 = 10 * 1024 * 1024; // 10 MB

/// Input bytes, memory-mapped or owned.
pub enum FileData {
    /// Memory-mapped file (zero-copy, for large documents)
    Mapped(Mmap),
    /// Owned data (for small documents)
    Owned(Vec<u8>),
}

impl FileData {
    /// Get the data as a byte slice
    pub fn as_slice(&self) -> &[u8] {
        match self {
            FileData::Mapped(mmap) => mmap,
            FileData::Owned(vec) => vec,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AsRef<[u8]> for FileData {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Read a file efficiently, memory-mapping anything above the threshold.
pub fn read_file_smart(path: &Path) -> Result<FileData> {
    let metadata = std::fs::metadata(path)?;
    let file_size = metadata.len();

    if file_size > MMAP_THRESHOLD {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(
            "memory-mapped large document ({:.2} MB): {}",
            file_size as f64 / 1024.0 / 1024.0,
            path.display()
        );
        Ok(FileData::Mapped(mmap))
    } else {
        let data = std::fs::read(path)?;
        Ok(FileData::Owned(data))
    }
}
