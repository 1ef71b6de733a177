//! rawbuf - reference-counted raw memory blocks
//!
//! The building blocks underneath a buffer-list style I/O stack:
//!
//! - [`arch`]: one-time CPU capability probe
//! - [`crc`]: CRC32C with the fastest kernel the CPU supports
//! - [`mempool`]: sharded, advisory per-pool memory accounting
//! - [`buffer`]: [`RawBlock`], the refcounted region charged to a pool
//!
//! Process-wide state lives in [`Context`].

pub mod arch;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod context;
pub mod crc;
pub mod error;
pub mod format;
pub mod logging;
pub mod mempool;
pub mod mmap;
pub mod page;

pub use buffer::{LeakableBox, RawBlock, StorageKind};
pub use config::Config;
pub use context::Context;
pub use crc::{crc32c, Crc32c, Kernel};
pub use error::{Error, Result};
pub use mempool::{Mempools, PoolIndex, Stats};
