//! Opening column files in heap or memory-mapped mode

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use super::OwnedBytes;

/// How a column file is brought into memory.
///
/// - `Heap`: the whole file is read into an owned buffer at load time.
/// - `Mmap`: the file is memory-mapped; the OS pages data in on first touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    #[default]
    Heap,
    Mmap,
}

impl ReadMode {
    pub fn is_mmap(self) -> bool {
        self == ReadMode::Mmap
    }
}

/// Open `path` according to `mode`.
pub fn open_file(path: &Path, mode: ReadMode) -> io::Result<OwnedBytes> {
    match mode {
        ReadMode::Heap => Ok(OwnedBytes::new(std::fs::read(path)?)),
        ReadMode::Mmap => mmap_file(path),
    }
}

fn mmap_file(path: &Path) -> io::Result<OwnedBytes> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(OwnedBytes::empty());
    }
    // Segment files are immutable once written.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(OwnedBytes::from_owner(Arc::new(mmap)))
}
