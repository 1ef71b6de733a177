//! Process-wide state: probed CPU features, the selected CRC32C dispatcher
//! and the pool table.
//!
//! Library code that is not handed an explicit [`Mempools`] falls back to
//! [`Context::global`]. The first call initializes it from
//! [`Config::default`] unless [`Context::install`] ran earlier.

use std::sync::{Arc, OnceLock};

use crate::arch::{self, FeatureFlags};
use crate::config::Config;
use crate::crc::Crc32c;
use crate::error::{Error, Result};
use crate::mempool::Mempools;

static GLOBAL: OnceLock<Context> = OnceLock::new();

#[derive(Debug)]
pub struct Context {
    features: FeatureFlags,
    crc: Crc32c,
    mempools: Arc<Mempools>,
}

impl Context {
    /// Build a standalone context (tests, embedders with their own pools)
    pub fn new(config: &Config) -> Self {
        let features = *arch::probe();
        let crc = match config.crc_kernel {
            Some(kernel) => Crc32c::with_kernel(kernel, &features),
            None => Crc32c::select(&features),
        };
        Self {
            features,
            crc,
            mempools: Arc::new(Mempools::with_debug_mode(config.debug_mode)),
        }
    }

    /// The process-wide context, created on first use
    pub fn global() -> &'static Context {
        GLOBAL.get_or_init(|| Context::new(&Config::default()))
    }

    /// Initialize the process-wide context from `config`.
    ///
    /// Fails if it was already initialized, explicitly or by a prior
    /// [`Context::global`] call.
    pub fn install(config: &Config) -> Result<&'static Context> {
        let mut installed = false;
        let ctx = GLOBAL.get_or_init(|| {
            installed = true;
            Context::new(config)
        });
        if installed {
            Ok(ctx)
        } else {
            Err(Error::config("process context already initialized"))
        }
    }

    pub fn features(&self) -> &FeatureFlags {
        &self.features
    }

    pub fn crc(&self) -> &Crc32c {
        &self.crc
    }

    pub fn mempools(&self) -> &Arc<Mempools> {
        &self.mempools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::Kernel;

    #[test]
    fn test_forced_portable_kernel() {
        let config = Config {
            crc_kernel: Some(Kernel::Portable),
            ..Config::default()
        };
        let ctx = Context::new(&config);
        assert_eq!(ctx.crc().kernel(), Kernel::Portable);
    }

    #[test]
    fn test_debug_mode_from_config() {
        let config = Config {
            debug_mode: true,
            ..Config::default()
        };
        assert!(Context::new(&config).mempools().debug_mode());
    }

    #[test]
    fn test_global_is_initialized_once() {
        let first = Context::global();
        assert!(std::ptr::eq(first, Context::global()));
        assert!(Context::install(&Config::default()).is_err());
        assert_eq!(first.features(), arch::probe());
    }
}
