//! Raw memory blocks and the strategies that back them

mod leakable;
mod raw;
mod storage;

pub use leakable::LeakableBox;
pub use raw::RawBlock;
pub use storage::{
    AlignedStorage, AnonMappedStorage, FileMappedStorage, ForeignStorage, HeapStorage,
    StaticStorage, Storage, StorageKind,
};
