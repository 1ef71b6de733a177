//! A single accounting pool: sharded counters plus the debug per-type map

use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::format::Formatter;

/// Number of counter shards per pool (power of two)
pub const NUM_SHARDS: usize = 32;

/// Round-robin source of per-thread shard slots
static NEXT_SLOT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_SLOT: usize = NEXT_SLOT.fetch_add(1, Ordering::Relaxed) & (NUM_SHARDS - 1);
}

/// Item and byte counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub items: usize,
    pub bytes: usize,
}

impl Stats {
    pub fn new(items: usize, bytes: usize) -> Self {
        Self { items, bytes }
    }

    pub fn dump(&self, f: &mut dyn Formatter) {
        f.dump_unsigned("items", self.items as u64);
        f.dump_unsigned("bytes", self.bytes as u64);
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.items += other.items;
        self.bytes += other.bytes;
    }
}

/// One counter pair, alone on its cache line
#[repr(align(128))]
#[derive(Default)]
struct Shard {
    items: AtomicIsize,
    bytes: AtomicIsize,
}

#[derive(Debug, Clone, Copy)]
struct TypeEntry {
    items: isize,
    item_size: usize,
}

/// Aggregate memory usage for one category of blocks.
///
/// Updates go to the calling thread's shard with relaxed atomic adds, so
/// writers never contend on a lock. Reads sum every shard without any
/// ordering against writers: a racing add/subtract pair can leave a
/// transient negative sum, which is reported as zero.
pub struct Pool {
    shards: [Shard; NUM_SHARDS],
    type_map: Mutex<BTreeMap<&'static str, TypeEntry>>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    pub fn new() -> Self {
        Self {
            shards: std::array::from_fn(|_| Shard::default()),
            type_map: Mutex::new(BTreeMap::new()),
        }
    }

    #[inline]
    fn pick_a_shard(&self) -> &Shard {
        let slot = SHARD_SLOT.with(|slot| *slot);
        &self.shards[slot]
    }

    /// Add `items` and `bytes` (either may be negative) to this pool
    #[inline]
    pub fn adjust_count(&self, items: isize, bytes: isize) {
        let shard = self.pick_a_shard();
        shard.items.fetch_add(items, Ordering::Relaxed);
        shard.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn sum(&self, field: impl Fn(&Shard) -> &AtomicIsize) -> usize {
        let total: isize = self
            .shards
            .iter()
            .map(|shard| field(shard).load(Ordering::Relaxed))
            .fold(0isize, isize::wrapping_add);
        // we raced with unbalanced allocations/deallocations
        total.max(0) as usize
    }

    pub fn allocated_items(&self) -> usize {
        self.sum(|shard| &shard.items)
    }

    pub fn allocated_bytes(&self) -> usize {
        self.sum(|shard| &shard.bytes)
    }

    /// Advisory snapshot of this pool's totals
    pub fn totals(&self) -> Stats {
        Stats {
            items: self.allocated_items(),
            bytes: self.allocated_bytes(),
        }
    }

    pub(super) fn note_type(&self, type_name: &'static str, item_size: usize, items: isize) {
        let mut map = self.type_map.lock();
        let entry = map.entry(type_name).or_insert(TypeEntry { items: 0, item_size });
        entry.items += items;
    }

    /// Per-type breakdown recorded while debug mode was on
    pub fn by_type(&self) -> BTreeMap<String, Stats> {
        self.type_map
            .lock()
            .iter()
            .map(|(name, entry)| {
                let items = entry.items.max(0) as usize;
                (name.to_string(), Stats::new(items, items * entry.item_size))
            })
            .collect()
    }

    /// Write this pool's section body and fold its totals into `total`
    pub(super) fn dump(&self, f: &mut dyn Formatter, debug_mode: bool, total: &mut Stats) {
        let stats = self.totals();
        *total += stats;
        stats.dump(f);

        if !debug_mode {
            return;
        }
        let by_type = self.by_type();
        if by_type.is_empty() {
            return;
        }
        f.open_object_section("by_type");
        for (name, stats) in &by_type {
            f.open_object_section(name);
            stats.dump(f);
            f.close_section();
        }
        f.close_section();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_and_totals() {
        let pool = Pool::new();
        pool.adjust_count(2, 128);
        assert_eq!(pool.totals(), Stats::new(2, 128));
        pool.adjust_count(-1, -64);
        assert_eq!(pool.totals(), Stats::new(1, 64));
    }

    #[test]
    fn test_negative_sum_is_clamped() {
        let pool = Pool::new();
        pool.adjust_count(-1, -4096);
        assert_eq!(pool.totals(), Stats::default());
    }

    #[test]
    fn test_balance_across_threads() {
        let pool = std::sync::Arc::new(Pool::new());

        // Allocate on one set of threads, free on another: the shards
        // individually go negative but the sum balances.
        let allocs: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        pool.adjust_count(1, 64);
                    }
                })
            })
            .collect();
        for h in allocs {
            h.join().unwrap();
        }
        let frees: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        pool.adjust_count(-1, -64);
                    }
                })
            })
            .collect();
        for h in frees {
            h.join().unwrap();
        }

        assert_eq!(pool.totals(), Stats::default());
    }

    #[test]
    fn test_shard_alignment() {
        assert_eq!(std::mem::align_of::<Shard>(), 128);
    }

    #[test]
    fn test_type_map_bytes_are_items_times_size() {
        let pool = Pool::new();
        pool.note_type("u64", 8, 3);
        pool.note_type("u64", 8, -1);
        let by_type = pool.by_type();
        assert_eq!(by_type["u64"], Stats::new(2, 16));
    }
}
