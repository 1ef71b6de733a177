//! Memory pool accounting
//!
//! Every raw block is charged to one of a fixed set of pools. Each pool
//! keeps sharded item/byte counters so that allocation-heavy threads do not
//! fight over a single cache line. The counters are advisory: they feed
//! diagnostic dumps, never limits.
//!
//! With debug mode on, typed allocations are also broken down per Rust
//! type name. That path takes a mutex and is meant for diagnostics only.

mod pool;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::format::Formatter;

pub use pool::{Pool, Stats, NUM_SHARDS};

/// Accounting category of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PoolIndex {
    /// Blocks nobody has claimed yet
    #[default]
    BufferAnon,
    BufferMeta,
    CacheData,
    CacheMeta,
    Journal,
    Messenger,
    #[serde(rename = "unittest_1")]
    Unittest1,
    #[serde(rename = "unittest_2")]
    Unittest2,
}

/// Number of pools
pub const NUM_POOLS: usize = PoolIndex::ALL.len();

impl PoolIndex {
    pub const ALL: [PoolIndex; 8] = [
        PoolIndex::BufferAnon,
        PoolIndex::BufferMeta,
        PoolIndex::CacheData,
        PoolIndex::CacheMeta,
        PoolIndex::Journal,
        PoolIndex::Messenger,
        PoolIndex::Unittest1,
        PoolIndex::Unittest2,
    ];

    /// Name used in dumps and configuration
    pub fn name(self) -> &'static str {
        match self {
            PoolIndex::BufferAnon => "buffer_anon",
            PoolIndex::BufferMeta => "buffer_meta",
            PoolIndex::CacheData => "cache_data",
            PoolIndex::CacheMeta => "cache_meta",
            PoolIndex::Journal => "journal",
            PoolIndex::Messenger => "messenger",
            PoolIndex::Unittest1 => "unittest_1",
            PoolIndex::Unittest2 => "unittest_2",
        }
    }

    fn as_usize(self) -> usize {
        self as usize
    }

    /// Inverse of `ix as u8`; only ever fed values produced by that cast
    pub(crate) fn from_u8(raw: u8) -> PoolIndex {
        PoolIndex::ALL
            .get(raw as usize)
            .copied()
            .unwrap_or_default()
    }
}

impl fmt::Display for PoolIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PoolIndex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PoolIndex::ALL
            .into_iter()
            .find(|ix| ix.name() == s)
            .ok_or_else(|| Error::UnknownPool { name: s.to_string() })
    }
}

/// The table of all pools plus the debug-mode switch
pub struct Mempools {
    pools: [Pool; NUM_POOLS],
    debug_mode: AtomicBool,
}

impl fmt::Debug for Mempools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mempools")
            .field("debug_mode", &self.debug_mode())
            .field("total", &self.total())
            .finish()
    }
}

impl Default for Mempools {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempools {
    pub fn new() -> Self {
        Self {
            pools: std::array::from_fn(|_| Pool::new()),
            debug_mode: AtomicBool::new(false),
        }
    }

    pub fn with_debug_mode(debug_mode: bool) -> Self {
        let pools = Self::new();
        pools.debug_mode.store(debug_mode, Ordering::Relaxed);
        pools
    }

    #[inline]
    pub fn pool(&self, ix: PoolIndex) -> &Pool {
        &self.pools[ix.as_usize()]
    }

    #[inline]
    pub fn adjust_count(&self, ix: PoolIndex, items: isize, bytes: isize) {
        self.pool(ix).adjust_count(items, bytes);
    }

    /// Advisory totals for one pool (negative partial sums clamp to zero)
    pub fn totals(&self, ix: PoolIndex) -> Stats {
        self.pool(ix).totals()
    }

    /// Sum of every pool's totals
    pub fn total(&self) -> Stats {
        let mut total = Stats::default();
        for pool in &self.pools {
            total += pool.totals();
        }
        total
    }

    pub fn set_debug_mode(&self, debug_mode: bool) {
        self.debug_mode.store(debug_mode, Ordering::Relaxed);
        tracing::info!(debug_mode, "Mempool debug mode changed");
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    /// Charge `count` values of `T` to a pool
    pub fn track_alloc<T>(&self, ix: PoolIndex, count: usize) {
        self.track::<T>(ix, count as isize);
    }

    /// Release `count` values of `T` from a pool
    pub fn track_free<T>(&self, ix: PoolIndex, count: usize) {
        self.track::<T>(ix, -(count as isize));
    }

    fn track<T>(&self, ix: PoolIndex, items: isize) {
        let item_size = std::mem::size_of::<T>();
        let pool = self.pool(ix);
        pool.adjust_count(items, items * item_size as isize);
        if self.debug_mode() {
            pool.note_type(std::any::type_name::<T>(), item_size, items);
        }
    }

    /// Dump per-pool totals and a grand total.
    ///
    /// Shape: `mempool { by_pool { <pool> { items, bytes, [by_type] } ... }, total { items, bytes } }`
    pub fn dump(&self, f: &mut dyn Formatter) {
        let debug_mode = self.debug_mode();
        let mut total = Stats::default();

        f.open_object_section("mempool");
        f.open_object_section("by_pool");
        for ix in PoolIndex::ALL {
            f.open_object_section(ix.name());
            self.pool(ix).dump(f, debug_mode, &mut total);
            f.close_section();
        }
        f.close_section();
        f.open_object_section("total");
        total.dump(f);
        f.close_section();
        f.close_section();
    }
}
