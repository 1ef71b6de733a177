//! Read-only file mappings guarded by a shared file lock
//!
//! A block backed by a file mapping can SIGBUS if another process truncates
//! the file underneath it. Taking a shared lock before mapping keeps
//! cooperating processes from exclusively locking or truncating the file for
//! as long as the mapping lives.

use crate::error::{Error, Result};
use fs2::FileExt;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

/// A read-only memory map that holds a shared lock on its file.
///
/// The lock is released when the struct (and with it the `File`) is dropped.
pub struct LockedMmap {
    mmap: Mmap,
    #[allow(dead_code)]
    file: File,
}

impl LockedMmap {
    /// Open `path`, take a shared lock and map the whole file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io("opening file for mmap", e))?;
        Self::from_file(file)
    }

    /// Lock and map an already-open file.
    pub fn from_file(file: File) -> Result<Self> {
        FileExt::lock_shared(&file)
            .map_err(|e| Error::io("acquiring shared file lock", e))?;

        // Safety: cooperating writers respect the shared lock held for the
        // lifetime of the mapping.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io("memory mapping file", e))?;

        Ok(Self { mmap, file })
    }

    /// Lock and map `len` bytes of `file` starting at `offset`.
    ///
    /// The range must lie within the file: pages past EOF would fault on
    /// first access.
    pub fn map_range(file: File, offset: u64, len: usize) -> Result<Self> {
        FileExt::lock_shared(&file)
            .map_err(|e| Error::io("acquiring shared file lock", e))?;

        let file_len = file
            .metadata()
            .map_err(|e| Error::io("reading file metadata", e))?
            .len();
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > file_len) {
            return Err(Error::io(
                "mapping file range",
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "range {}+{} exceeds file length {}",
                        offset, len, file_len
                    ),
                ),
            ));
        }

        let mmap = unsafe { MmapOptions::new().offset(offset).len(len).map(&file) }
            .map_err(|e| Error::io("memory mapping file range", e))?;

        Ok(Self { mmap, file })
    }

    /// Like [`LockedMmap::open`] but returns `Ok(None)` instead of blocking
    /// when another process holds an exclusive lock.
    pub fn try_open(path: &Path) -> Result<Option<Self>> {
        let file = File::open(path).map_err(|e| Error::io("opening file for mmap", e))?;

        match FileExt::try_lock_shared(&file) {
            Ok(()) => {
                let mmap = unsafe { Mmap::map(&file) }
                    .map_err(|e| Error::io("memory mapping file", e))?;
                Ok(Some(Self { mmap, file }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::io("trying shared file lock", e)),
        }
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl Deref for LockedMmap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.mmap
    }
}

impl AsRef<[u8]> for LockedMmap {
    fn as_ref(&self) -> &[u8] {
        &self.mmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_maps_whole_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"hello world").unwrap();
        temp.flush().unwrap();

        let mmap = LockedMmap::open(temp.path()).unwrap();
        assert_eq!(&mmap[..], b"hello world");
        assert_eq!(mmap.len(), 11);
    }

    #[test]
    fn test_empty_file() {
        let temp = NamedTempFile::new().unwrap();
        let mmap = LockedMmap::open(temp.path()).unwrap();
        assert!(mmap.is_empty());
    }

    #[test]
    fn test_map_range() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"0123456789").unwrap();
        temp.flush().unwrap();

        let file = File::open(temp.path()).unwrap();
        let mmap = LockedMmap::map_range(file, 0, 4).unwrap();
        assert_eq!(&mmap[..], b"0123");
    }

    #[test]
    fn test_map_range_past_eof_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"01234").unwrap();
        temp.flush().unwrap();

        let file = File::open(temp.path()).unwrap();
        assert!(matches!(
            LockedMmap::map_range(file, 0, 1 << 20),
            Err(Error::Io { .. })
        ));

        let file = File::open(temp.path()).unwrap();
        assert!(LockedMmap::map_range(file, 3, 3).is_err());

        let file = File::open(temp.path()).unwrap();
        assert!(LockedMmap::map_range(file, u64::MAX, 2).is_err());

        let file = File::open(temp.path()).unwrap();
        assert_eq!(&LockedMmap::map_range(file, 3, 2).unwrap()[..], b"34");
    }

    #[test]
    fn test_try_open_unlocked_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"content").unwrap();
        temp.flush().unwrap();

        assert!(LockedMmap::try_open(temp.path()).unwrap().is_some());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LockedMmap::open(&dir.path().join("missing"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
