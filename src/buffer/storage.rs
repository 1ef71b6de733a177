//! Storage strategies backing a raw block
//!
//! A strategy owns (or borrows) the bytes and knows how to release them and
//! how to mint a fresh, same-sized region for `clone_empty`. Read-only
//! strategies cannot mint memory of their own kind and hand back a writable
//! one instead.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

use bytes::Bytes;
use memmap2::MmapMut;

use crate::error::{Error, Result};
use crate::mmap::LockedMmap;

/// Which strategy backs a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Zeroed boxed slice on the global allocator
    Heap,
    /// Global allocator with a caller-chosen alignment
    Aligned,
    /// Private anonymous mapping
    AnonMapped,
    /// Read-only, shared-locked file mapping
    FileMapped,
    /// Immutable `'static` bytes
    Static,
    /// Bytes owned elsewhere, kept alive by a `Bytes` handle
    Foreign,
}

impl StorageKind {
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            StorageKind::Heap | StorageKind::Aligned | StorageKind::AnonMapped
        )
    }
}

/// Backing memory of a raw block
pub trait Storage: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// The whole region; its length is the capacity
    fn as_slice(&self) -> &[u8];

    /// Writable view, `None` for read-only strategies
    fn as_mut_slice(&mut self) -> Option<&mut [u8]>;

    /// A new writable region of `len` bytes; nothing is copied into it
    fn clone_empty(&self, len: usize) -> Box<dyn Storage>;
}

impl fmt::Debug for dyn Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("kind", &self.kind())
            .field("capacity", &self.as_slice().len())
            .finish()
    }
}

// ============================================================================
// Heap
// ============================================================================

pub struct HeapStorage {
    buf: Box<[u8]>,
}

impl HeapStorage {
    pub fn new(len: usize) -> Self {
        Self {
            buf: vec![0u8; len].into_boxed_slice(),
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            buf: data.into_boxed_slice(),
        }
    }
}

impl Storage for HeapStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Heap
    }

    fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        Some(&mut self.buf)
    }

    fn clone_empty(&self, len: usize) -> Box<dyn Storage> {
        Box::new(HeapStorage::new(len))
    }
}

// ============================================================================
// Aligned heap
// ============================================================================

pub struct AlignedStorage {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// The allocation is uniquely owned; access goes through &self / &mut self.
unsafe impl Send for AlignedStorage {}
unsafe impl Sync for AlignedStorage {}

impl AlignedStorage {
    pub fn new(len: usize, align: usize) -> Result<Self> {
        // Zero-sized layouts cannot be allocated; reserve one byte instead
        let layout = Layout::from_size_align(len.max(1), align)
            .map_err(|_| Error::InvalidAlignment { align })?;
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };
        Ok(Self { ptr, len, layout })
    }

    pub fn align(&self) -> usize {
        self.layout.align()
    }
}

impl Drop for AlignedStorage {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl Storage for AlignedStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Aligned
    }

    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        Some(unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) })
    }

    fn clone_empty(&self, len: usize) -> Box<dyn Storage> {
        // The layout's alignment was already validated
        match AlignedStorage::new(len, self.align()) {
            Ok(storage) => Box::new(storage),
            Err(_) => Box::new(HeapStorage::new(len)),
        }
    }
}

// ============================================================================
// Anonymous mapping
// ============================================================================

pub struct AnonMappedStorage {
    map: MmapMut,
}

impl AnonMappedStorage {
    pub fn new(len: usize) -> Result<Self> {
        let map = MmapMut::map_anon(len).map_err(|e| Error::io("anonymous mapping", e))?;
        Ok(Self { map })
    }
}

impl Storage for AnonMappedStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::AnonMapped
    }

    fn as_slice(&self) -> &[u8] {
        &self.map
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        Some(&mut self.map)
    }

    fn clone_empty(&self, len: usize) -> Box<dyn Storage> {
        anon_or_heap(len)
    }
}

/// Anonymous mapping of `len` bytes, or a heap buffer if the mapping fails
pub(crate) fn anon_or_heap(len: usize) -> Box<dyn Storage> {
    match AnonMappedStorage::new(len) {
        Ok(storage) => Box::new(storage),
        Err(e) => {
            tracing::warn!(len, error = %e, "Anonymous mapping failed, falling back to heap");
            Box::new(HeapStorage::new(len))
        }
    }
}

// ============================================================================
// File mapping (read-only)
// ============================================================================

pub struct FileMappedStorage {
    map: LockedMmap,
}

impl FileMappedStorage {
    pub fn new(map: LockedMmap) -> Self {
        Self { map }
    }
}

impl Storage for FileMappedStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::FileMapped
    }

    fn as_slice(&self) -> &[u8] {
        &self.map
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn clone_empty(&self, len: usize) -> Box<dyn Storage> {
        anon_or_heap(len)
    }
}

// ============================================================================
// Static and foreign (read-only)
// ============================================================================

pub struct StaticStorage {
    data: &'static [u8],
}

impl StaticStorage {
    pub fn new(data: &'static [u8]) -> Self {
        Self { data }
    }
}

impl Storage for StaticStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Static
    }

    fn as_slice(&self) -> &[u8] {
        self.data
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn clone_empty(&self, len: usize) -> Box<dyn Storage> {
        Box::new(HeapStorage::new(len))
    }
}

pub struct ForeignStorage {
    data: Bytes,
}

impl ForeignStorage {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }
}

impl Storage for ForeignStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Foreign
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn clone_empty(&self, len: usize) -> Box<dyn Storage> {
        Box::new(HeapStorage::new(len))
    }
}
