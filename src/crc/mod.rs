//! CRC32C (Castagnoli) with runtime kernel selection
//!
//! The checksum works on the raw CRC register: no initial or final
//! inversion is applied, so results can be chained across buffers. The
//! conventional CRC-32C of a message is `!compute(!0, msg)`.
//!
//! Kernel priority per architecture:
//! - x86 / x86_64: PCLMUL > SSE 4.2 > portable
//! - aarch64: CRC32 + PMULL > portable
//! - powerpc64le: portable, even with vector crypto present (`vpmsumd` has
//!   no stable intrinsic); the zero-fill shift still applies
//! - everything else: portable
//!
//! All kernels produce bit-identical results to [`crc32c_portable`].

mod portable;
mod zeros;

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
mod x86;

#[cfg(target_arch = "aarch64")]
mod aarch64;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::arch::FeatureFlags;
use crate::error::Error;

pub use portable::{crc32c_portable, POLY};
pub use zeros::crc32c_zeros;

/// Above this many bytes, a missing data buffer is hashed with the zero
/// shift instead of a synthesized zero buffer.
pub const ZERO_FAST_PATH_THRESHOLD: usize = 16;

const ZERO_BUF: [u8; ZERO_FAST_PATH_THRESHOLD] = [0; ZERO_FAST_PATH_THRESHOLD];

type CrcFn = fn(u32, &[u8]) -> u32;

/// A concrete CRC32C implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    /// Slice-by-8 lookup tables, available everywhere
    Portable,
    /// x86 SSE 4.2 `crc32` instruction
    Sse42,
    /// x86_64 SSE 4.2 streams folded with PCLMULQDQ
    Pclmul,
    /// ARMv8 CRC32 instructions folded with PMULL
    Aarch64,
}

impl Kernel {
    pub const ALL: [Kernel; 4] = [Kernel::Portable, Kernel::Sse42, Kernel::Pclmul, Kernel::Aarch64];

    pub fn name(self) -> &'static str {
        match self {
            Kernel::Portable => "portable",
            Kernel::Sse42 => "sse42",
            Kernel::Pclmul => "pclmul",
            Kernel::Aarch64 => "aarch64",
        }
    }

    /// Whether this kernel was compiled in and the CPU can run it
    pub fn is_supported(self, features: &FeatureFlags) -> bool {
        match self {
            Kernel::Portable => true,
            Kernel::Sse42 => {
                cfg!(any(target_arch = "x86_64", target_arch = "x86")) && features.intel_sse42
            }
            Kernel::Pclmul => {
                cfg!(target_arch = "x86_64") && features.intel_sse42 && features.intel_pclmul
            }
            Kernel::Aarch64 => {
                cfg!(target_arch = "aarch64") && features.aarch64_crc32 && features.aarch64_pmull
            }
        }
    }

    /// Best kernel for the given capabilities
    pub fn best(features: &FeatureFlags) -> Kernel {
        [Kernel::Pclmul, Kernel::Sse42, Kernel::Aarch64]
            .into_iter()
            .find(|k| k.is_supported(features))
            .unwrap_or(Kernel::Portable)
    }

    /// Entry point for this kernel. Only valid once `is_supported` holds.
    fn entry(self) -> CrcFn {
        match self {
            #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
            Kernel::Sse42 => sse42_entry,
            #[cfg(target_arch = "x86_64")]
            Kernel::Pclmul => pclmul_entry,
            #[cfg(target_arch = "aarch64")]
            Kernel::Aarch64 => aarch64_entry,
            #[allow(unreachable_patterns)]
            _ => crc32c_portable,
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Kernel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Kernel::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| Error::UnknownKernel { name: s.to_string() })
    }
}

// Safe wrappers: they are only reachable through `Crc32c`, which checks
// `Kernel::is_supported` before handing them out.

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
fn sse42_entry(crc: u32, data: &[u8]) -> u32 {
    unsafe { x86::crc32c_sse42(crc, data) }
}

#[cfg(target_arch = "x86_64")]
fn pclmul_entry(crc: u32, data: &[u8]) -> u32 {
    unsafe { x86::crc32c_pclmul(crc, data) }
}

#[cfg(target_arch = "aarch64")]
fn aarch64_entry(crc: u32, data: &[u8]) -> u32 {
    unsafe { aarch64::crc32c_aarch64(crc, data) }
}

/// The resolved CRC32C dispatch target.
///
/// Stateless and `Copy`; calls from any number of threads never touch
/// shared mutable state.
#[derive(Clone, Copy)]
pub struct Crc32c {
    kernel: Kernel,
    func: CrcFn,
}

impl Crc32c {
    /// Pick the fastest kernel the CPU supports
    pub fn select(features: &FeatureFlags) -> Self {
        let kernel = Kernel::best(features);
        tracing::info!(kernel = %kernel, "Selected crc32c implementation");
        Self::resolved(kernel)
    }

    /// Force a kernel; falls back to the portable one if it cannot run here
    pub fn with_kernel(kernel: Kernel, features: &FeatureFlags) -> Self {
        if kernel.is_supported(features) {
            tracing::info!(kernel = %kernel, "Using forced crc32c implementation");
            Self::resolved(kernel)
        } else {
            tracing::warn!(
                requested = %kernel,
                "crc32c implementation not supported on this CPU, using portable"
            );
            Self::resolved(Kernel::Portable)
        }
    }

    /// The table-driven reference implementation
    pub const fn portable() -> Self {
        Self {
            kernel: Kernel::Portable,
            func: crc32c_portable,
        }
    }

    fn resolved(kernel: Kernel) -> Self {
        Self {
            kernel,
            func: kernel.entry(),
        }
    }

    /// The kernel this dispatcher calls
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Update `crc` with the first `length` bytes of `data`.
    ///
    /// With `data == None` the result is the checksum of `length` zero bytes.
    ///
    /// # Panics
    ///
    /// If `data` is present but shorter than `length`.
    #[inline]
    pub fn compute(&self, crc: u32, data: Option<&[u8]>, length: usize) -> u32 {
        match data {
            Some(data) => (self.func)(crc, &data[..length]),
            None if length > ZERO_FAST_PATH_THRESHOLD => crc32c_zeros(crc, length),
            None => (self.func)(crc, &ZERO_BUF[..length]),
        }
    }

    /// Update `crc` with all of `data`
    #[inline]
    pub fn checksum(&self, crc: u32, data: &[u8]) -> u32 {
        (self.func)(crc, data)
    }
}

impl fmt::Debug for Crc32c {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc32c").field("kernel", &self.kernel).finish()
    }
}

/// CRC32C through the process-wide context's dispatcher
#[inline]
pub fn crc32c(crc: u32, data: &[u8]) -> u32 {
    crate::context::Context::global().crc().checksum(crc, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::probe;

    fn pattern(len: usize) -> Vec<u8> {
        let mut seed: u64 = 0xDEAD_BEEF;
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
                (seed >> 32) as u8
            })
            .collect()
    }

    #[test]
    fn test_every_supported_kernel_matches_portable() {
        let features = probe();
        for kernel in Kernel::ALL {
            if !kernel.is_supported(features) {
                continue;
            }
            let crc = Crc32c::with_kernel(kernel, features);
            assert_eq!(crc.kernel(), kernel);
            for size in [0, 1, 7, 8, 15, 16, 17, 64, 1000, 3071, 3072, 3073, 10_000, 70_001] {
                let data = pattern(size);
                for seed in [0, !0, 0x1234_5678] {
                    assert_eq!(
                        crc.checksum(seed, &data),
                        crc32c_portable(seed, &data),
                        "kernel {} size {}",
                        kernel,
                        size
                    );
                }
            }
        }
    }

    #[test]
    fn test_check_value_through_selected_kernel() {
        let crc = Crc32c::select(probe());
        assert_eq!(!crc.checksum(!0, b"123456789"), 0xE306_9283);
    }

    #[test]
    fn test_none_data_equals_zero_buffer() {
        let crc = Crc32c::select(probe());
        for length in [0, 1, 15, 16, 17, 100, 4096, 100_000] {
            let zeros = vec![0u8; length];
            assert_eq!(
                crc.compute(0x55AA_55AA, None, length),
                crc.compute(0x55AA_55AA, Some(&zeros), length),
                "length {}",
                length
            );
        }
    }

    #[test]
    fn test_compute_honours_length() {
        let crc = Crc32c::portable();
        let data = b"123456789abcdef";
        assert_eq!(crc.compute(0, Some(data), 9), crc.checksum(0, b"123456789"));
    }

    #[test]
    fn test_unsupported_kernel_degrades_to_portable() {
        let crc = Crc32c::with_kernel(Kernel::Pclmul, &FeatureFlags::none());
        assert_eq!(crc.kernel(), Kernel::Portable);
        let crc = Crc32c::with_kernel(Kernel::Aarch64, &FeatureFlags::none());
        assert_eq!(crc.kernel(), Kernel::Portable);
    }

    #[test]
    fn test_best_kernel_without_features_is_portable() {
        assert_eq!(Kernel::best(&FeatureFlags::none()), Kernel::Portable);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_x86_priority() {
        let sse_only = FeatureFlags {
            intel_sse42: true,
            ..FeatureFlags::none()
        };
        assert_eq!(Kernel::best(&sse_only), Kernel::Sse42);

        let both = FeatureFlags {
            intel_sse42: true,
            intel_pclmul: true,
            ..FeatureFlags::none()
        };
        assert_eq!(Kernel::best(&both), Kernel::Pclmul);
    }

    #[test]
    fn test_kernel_names_round_trip() {
        for kernel in Kernel::ALL {
            assert_eq!(kernel.name().parse::<Kernel>().unwrap(), kernel);
        }
        assert!(matches!(
            "vpmsum".parse::<Kernel>(),
            Err(Error::UnknownKernel { .. })
        ));
    }
}
