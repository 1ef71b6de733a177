//! Reference-counted raw memory block

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use spin::mutex::SpinMutex;

use super::leakable::LeakableBox;
use super::storage::{
    anon_or_heap, AlignedStorage, AnonMappedStorage, FileMappedStorage, ForeignStorage,
    HeapStorage, StaticStorage, Storage, StorageKind,
};
use crate::error::Result;
use crate::mempool::{Mempools, PoolIndex};
use crate::mmap::LockedMmap;
use crate::page;

/// Range value that no real `(from, to)` pair can equal
const NO_CRC_RANGE: (usize, usize) = (usize::MAX, usize::MAX);

struct CrcCache {
    range: (usize, usize),
    value: (u32, u32),
}

/// A contiguous byte region with an atomic refcount, pool membership and a
/// one-entry CRC cache.
///
/// The block's length is charged to exactly one pool for its whole life:
/// added when it is built, moved on reassignment, removed when it is dropped.
/// The refcount is driven by whatever structure shares the block; dropping
/// the block is that owner's job once the count reaches zero.
pub struct RawBlock {
    storage: Box<dyn Storage>,
    len: usize,
    nref: AtomicU32,
    pool: AtomicU8,
    mempools: Arc<Mempools>,
    crc: SpinMutex<CrcCache>,
}

impl RawBlock {
    /// Wrap `storage`, exposing its first `len` bytes, and charge it to `pool`.
    ///
    /// # Panics
    ///
    /// If `len` exceeds the storage capacity.
    pub fn with_storage(
        mempools: Arc<Mempools>,
        pool: PoolIndex,
        storage: Box<dyn Storage>,
        len: usize,
    ) -> Self {
        assert!(
            len <= storage.as_slice().len(),
            "raw block length {} exceeds storage capacity {}",
            len,
            storage.as_slice().len()
        );
        mempools.adjust_count(pool, 1, len as isize);
        Self {
            storage,
            len,
            nref: AtomicU32::new(0),
            pool: AtomicU8::new(pool as u8),
            mempools,
            crc: SpinMutex::new(CrcCache {
                range: NO_CRC_RANGE,
                value: (0, 0),
            }),
        }
    }

    /// Zero-filled heap block
    pub fn heap(mempools: &Arc<Mempools>, pool: PoolIndex, len: usize) -> Self {
        Self::with_storage(mempools.clone(), pool, Box::new(HeapStorage::new(len)), len)
    }

    /// Take ownership of `data` as a heap block
    pub fn from_vec(mempools: &Arc<Mempools>, pool: PoolIndex, data: Vec<u8>) -> Self {
        let len = data.len();
        Self::with_storage(mempools.clone(), pool, Box::new(HeapStorage::from_vec(data)), len)
    }

    /// Heap block whose data starts on an `align`-byte boundary
    pub fn aligned(
        mempools: &Arc<Mempools>,
        pool: PoolIndex,
        len: usize,
        align: usize,
    ) -> Result<Self> {
        let storage = AlignedStorage::new(len, align)?;
        Ok(Self::with_storage(mempools.clone(), pool, Box::new(storage), len))
    }

    /// Heap block aligned to the system page size, capacity rounded up to
    /// whole pages
    pub fn page_aligned(mempools: &Arc<Mempools>, pool: PoolIndex, len: usize) -> Self {
        // Capacity covers whole pages; set_len may grow into the slack
        let capacity = page::align_up(len);
        let storage: Box<dyn Storage> = match AlignedStorage::new(capacity, page::page_size()) {
            Ok(storage) => Box::new(storage),
            // page_size() is always a power of two
            Err(_) => Box::new(HeapStorage::new(capacity)),
        };
        Self::with_storage(mempools.clone(), pool, storage, len)
    }

    /// Block backed by a private anonymous mapping
    pub fn anon_mapped(mempools: &Arc<Mempools>, pool: PoolIndex, len: usize) -> Result<Self> {
        let storage = AnonMappedStorage::new(len)?;
        Ok(Self::with_storage(mempools.clone(), pool, Box::new(storage), len))
    }

    /// Read-only block over the whole file at `path`
    pub fn file_mapped(mempools: &Arc<Mempools>, pool: PoolIndex, path: &Path) -> Result<Self> {
        let map = LockedMmap::open(path)?;
        let len = map.len();
        Ok(Self::with_storage(
            mempools.clone(),
            pool,
            Box::new(FileMappedStorage::new(map)),
            len,
        ))
    }

    /// Like [`RawBlock::file_mapped`], but `Ok(None)` instead of waiting when
    /// another process holds an exclusive lock on the file.
    pub fn try_file_mapped(
        mempools: &Arc<Mempools>,
        pool: PoolIndex,
        path: &Path,
    ) -> Result<Option<Self>> {
        let Some(map) = LockedMmap::try_open(path)? else {
            tracing::debug!(path = %path.display(), "File is exclusively locked, not mapping");
            return Ok(None);
        };
        let len = map.len();
        Ok(Some(Self::with_storage(
            mempools.clone(),
            pool,
            Box::new(FileMappedStorage::new(map)),
            len,
        )))
    }

    /// Read-only block over `len` bytes of `file` starting at `offset`.
    ///
    /// Fails if the range does not lie within the file.
    pub fn file_range_mapped(
        mempools: &Arc<Mempools>,
        pool: PoolIndex,
        file: File,
        offset: u64,
        len: usize,
    ) -> Result<Self> {
        let map = LockedMmap::map_range(file, offset, len)?;
        let len = map.len();
        Ok(Self::with_storage(
            mempools.clone(),
            pool,
            Box::new(FileMappedStorage::new(map)),
            len,
        ))
    }

    /// Read-only block over static bytes
    pub fn from_static(mempools: &Arc<Mempools>, pool: PoolIndex, data: &'static [u8]) -> Self {
        Self::with_storage(mempools.clone(), pool, Box::new(StaticStorage::new(data)), data.len())
    }

    /// Read-only block that claims bytes owned elsewhere
    pub fn from_bytes(mempools: &Arc<Mempools>, pool: PoolIndex, data: Bytes) -> Self {
        let len = data.len();
        Self::with_storage(mempools.clone(), pool, Box::new(ForeignStorage::new(data)), len)
    }

    /// Set the initial refcount
    pub fn with_nref(self, nref: u32) -> Self {
        self.nref.store(nref, Ordering::Relaxed);
        self
    }

    // ==================== Data ====================

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes available in the backing storage
    pub fn capacity(&self) -> usize {
        self.storage.as_slice().len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage.as_slice()[..self.len]
    }

    /// Writable view, `None` for read-only strategies
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        let len = self.len;
        self.storage.as_mut_slice().map(|buf| &mut buf[..len])
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.storage.as_slice().as_ptr()
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// Whether every byte of the block is zero
    pub fn is_zero(&self) -> bool {
        let data = self.as_slice();
        // Every bit pattern is a valid u64
        let (head, words, tail) = unsafe { data.align_to::<u64>() };
        head.iter().all(|&b| b == 0) && words.iter().all(|&w| w == 0) && tail.iter().all(|&b| b == 0)
    }

    // ==================== Refcount ====================

    pub fn nref(&self) -> u32 {
        self.nref.load(Ordering::Acquire)
    }

    /// Increment the refcount, returning the new value
    pub fn inc_ref(&self) -> u32 {
        self.nref.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the refcount, returning the new value.
    ///
    /// Zero means the caller held the last reference and should drop the block.
    pub fn dec_ref(&self) -> u32 {
        let prev = self.nref.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "raw block refcount underflow");
        prev.wrapping_sub(1)
    }

    // ==================== Pool accounting ====================

    pub fn pool(&self) -> PoolIndex {
        PoolIndex::from_u8(self.pool.load(Ordering::Acquire))
    }

    pub fn mempools(&self) -> &Arc<Mempools> {
        &self.mempools
    }

    /// Change the logical length within the storage capacity.
    ///
    /// The old length is removed from the pool and the new one added as two
    /// separate updates; a concurrent reader may briefly see either.
    ///
    /// # Panics
    ///
    /// If `len` exceeds the storage capacity.
    pub fn set_len(&mut self, len: usize) {
        assert!(
            len <= self.capacity(),
            "raw block length {} exceeds storage capacity {}",
            len,
            self.capacity()
        );
        let pool = self.pool();
        self.mempools.adjust_count(pool, -1, -(self.len as isize));
        self.len = len;
        self.mempools.adjust_count(pool, 1, len as isize);
    }

    /// Move this block's accounting to `pool`. No-op if already there.
    pub fn reassign_to_pool(&self, pool: PoolIndex) {
        let old = PoolIndex::from_u8(self.pool.swap(pool as u8, Ordering::AcqRel));
        if old == pool {
            return;
        }
        self.move_accounting(old, pool);
    }

    /// Move to `pool` only if the block is still in the anonymous pool.
    pub fn try_assign_to_pool(&self, pool: PoolIndex) {
        let anon = PoolIndex::BufferAnon;
        if pool == anon {
            return;
        }
        if self
            .pool
            .compare_exchange(anon as u8, pool as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.move_accounting(anon, pool);
        }
    }

    fn move_accounting(&self, from: PoolIndex, to: PoolIndex) {
        let len = self.len as isize;
        self.mempools.adjust_count(from, -1, -len);
        self.mempools.adjust_count(to, 1, len);
        tracing::trace!(from = %from, to = %to, len = self.len, "Reassigned raw block");
    }

    // ==================== CRC cache ====================

    /// Cached crc pair for exactly `range`, if that is what was last stored
    pub fn get_crc(&self, range: (usize, usize)) -> Option<(u32, u32)> {
        let cache = self.crc.lock();
        (cache.range == range).then_some(cache.value)
    }

    pub fn set_crc(&self, range: (usize, usize), value: (u32, u32)) {
        let mut cache = self.crc.lock();
        cache.range = range;
        cache.value = value;
    }

    /// Forget the cached crc; no range matches until the next `set_crc`
    pub fn invalidate_crc(&self) {
        self.crc.lock().range = NO_CRC_RANGE;
    }

    // ==================== Cloning ====================

    /// A new block of the same length in the same pool, contents not copied.
    ///
    /// Writable strategies produce the same strategy. Read-only ones produce
    /// a heap block (an anonymous mapping for file mappings).
    pub fn clone_empty(&self) -> RawBlock {
        let storage = match self.storage.kind() {
            StorageKind::FileMapped => anon_or_heap(self.len),
            _ => self.storage.clone_empty(self.len),
        };
        RawBlock::with_storage(self.mempools.clone(), self.pool(), storage, self.len)
    }

    /// Copy this block into a fresh one.
    ///
    /// The result is handed over as a [`LeakableBox`]: the caller must
    /// release it (or convert it with `into_box`) explicitly.
    pub fn clone_block(&self) -> LeakableBox<RawBlock> {
        let mut copy = self.clone_empty();
        if let Some(dst) = copy.as_mut_slice() {
            dst.copy_from_slice(self.as_slice());
        }
        LeakableBox::new(copy)
    }
}

impl Drop for RawBlock {
    fn drop(&mut self) {
        self.mempools
            .adjust_count(self.pool(), -1, -(self.len as isize));
    }
}

impl fmt::Debug for RawBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBlock")
            .field("kind", &self.storage_kind())
            .field("len", &self.len)
            .field("nref", &self.nref())
            .field("pool", &self.pool())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mempool::Stats;

    fn pools() -> Arc<Mempools> {
        Arc::new(Mempools::new())
    }

    #[test]
    fn test_construction_and_drop_balance() {
        let pools = pools();
        let block = RawBlock::heap(&pools, PoolIndex::CacheData, 1024);
        assert_eq!(pools.totals(PoolIndex::CacheData), Stats::new(1, 1024));
        drop(block);
        assert_eq!(pools.totals(PoolIndex::CacheData), Stats::default());
    }

    #[test]
    fn test_refcount() {
        let pools = pools();
        let block = RawBlock::heap(&pools, PoolIndex::BufferAnon, 8).with_nref(1);
        assert_eq!(block.inc_ref(), 2);
        assert_eq!(block.dec_ref(), 1);
        assert_eq!(block.dec_ref(), 0);
        assert_eq!(block.nref(), 0);
    }

    #[test]
    fn test_set_len_moves_bytes() {
        let pools = pools();
        let mut block = RawBlock::heap(&pools, PoolIndex::Journal, 4096);
        block.set_len(100);
        assert_eq!(block.len(), 100);
        assert_eq!(block.capacity(), 4096);
        assert_eq!(pools.totals(PoolIndex::Journal), Stats::new(1, 100));
        block.set_len(4096);
        assert_eq!(pools.totals(PoolIndex::Journal), Stats::new(1, 4096));
    }

    #[test]
    #[should_panic(expected = "exceeds storage capacity")]
    fn test_set_len_past_capacity_panics() {
        let pools = pools();
        let mut block = RawBlock::heap(&pools, PoolIndex::Journal, 16);
        block.set_len(17);
    }

    #[test]
    fn test_crc_cache() {
        let pools = pools();
        let block = RawBlock::heap(&pools, PoolIndex::BufferAnon, 64);
        assert_eq!(block.get_crc((0, 64)), None);

        block.set_crc((0, 64), (1, 2));
        assert_eq!(block.get_crc((0, 64)), Some((1, 2)));
        assert_eq!(block.get_crc((0, 32)), None);

        block.set_crc((0, 32), (3, 4));
        assert_eq!(block.get_crc((0, 64)), None);
        assert_eq!(block.get_crc((0, 32)), Some((3, 4)));

        block.invalidate_crc();
        assert_eq!(block.get_crc((0, 32)), None);
    }

    #[test]
    fn test_is_zero() {
        let pools = pools();
        let mut block = RawBlock::heap(&pools, PoolIndex::BufferAnon, 100);
        assert!(block.is_zero());
        block.as_mut_slice().unwrap()[99] = 1;
        assert!(!block.is_zero());
    }

    #[test]
    fn test_read_only_block_has_no_mut_slice() {
        let pools = pools();
        let mut block = RawBlock::from_static(&pools, PoolIndex::BufferMeta, b"fixed");
        assert!(block.as_mut_slice().is_none());
        assert_eq!(block.as_slice(), b"fixed");
    }

    #[test]
    fn test_clone_of_read_only_is_writable_copy() {
        let pools = pools();
        let block = RawBlock::from_bytes(&pools, PoolIndex::BufferMeta, Bytes::from_static(b"abc"));
        let mut copy = block.clone_block();
        assert_eq!(copy.storage_kind(), StorageKind::Heap);
        assert_eq!(copy.as_slice(), b"abc");
        copy.as_mut_slice().unwrap()[0] = b'x';
        assert_eq!(block.as_slice(), b"abc");
        assert_eq!(pools.totals(PoolIndex::BufferMeta), Stats::new(2, 6));
        copy.release();
        assert_eq!(pools.totals(PoolIndex::BufferMeta), Stats::new(1, 3));
    }
}
