use crate::error::{Result, TableError};
use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

const MMAP_MIN_BYTES: u64 = 256 * 1024 * 1024;

/// Raw file contents, either mapped or read into memory.
pub enum FileBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(mmap) => &mmap[..],
            FileBytes::Owned(bytes) => bytes,
        }
    }
}

pub fn open_mmap_if_large(path: &Path) -> Result<Option<Mmap>> {
    let metadata = std::fs::metadata(path).map_err(|err| TableError::io(path, err))?;
    if metadata.len() < MMAP_MIN_BYTES {
        return Ok(None);
    }

    let file = File::open(path).map_err(|err| TableError::io(path, err))?;
    // The file is only read; concurrent truncation by another process is not guarded against.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|err| TableError::io(path, err))?;
    Ok(Some(mmap))
}

pub fn read_source(path: &Path) -> Result<FileBytes> {
    if let Some(mmap) = open_mmap_if_large(path)? {
        tracing::debug!(path = %path.display(), len = mmap.len(), "mapped large file");
        return Ok(FileBytes::Mapped(mmap));
    }
    let bytes = std::fs::read(path).map_err(|err| TableError::io(path, err))?;
    Ok(FileBytes::Owned(bytes))
}
