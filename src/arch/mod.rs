//! CPU capability probing
//!
//! Detects the instruction-set extensions the checksum kernels can use:
//! - x86 / x86_64: CPUID via `is_x86_feature_detected!`
//! - ARM / AArch64 on Linux: `AT_HWCAP` auxiliary vector bits
//! - PowerPC64 on Linux: `AT_HWCAP2` auxiliary vector bits
//! - anything else: every flag stays false
//!
//! The probe runs once per process; afterwards the flags are immutable and
//! can be read from any thread without synchronization.

use std::sync::OnceLock;

use serde::Serialize;

static FEATURES: OnceLock<FeatureFlags> = OnceLock::new();

/// Instruction-set extensions available on this CPU.
///
/// A flag that could not be determined is reported as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeatureFlags {
    /// ARM NEON (32-bit) or ASIMD (AArch64)
    pub neon: bool,
    /// AArch64 CRC32/CRC32C instructions
    pub aarch64_crc32: bool,
    /// AArch64 64-bit polynomial multiply (PMULL)
    pub aarch64_pmull: bool,
    /// x86 carry-less multiply (PCLMULQDQ)
    pub intel_pclmul: bool,
    /// x86 SSE 4.2 (includes the `crc32` instruction)
    pub intel_sse42: bool,
    pub intel_sse41: bool,
    pub intel_ssse3: bool,
    pub intel_sse3: bool,
    pub intel_sse2: bool,
    /// x86 AES-NI
    pub intel_aesni: bool,
    /// POWER8 vector crypto (vpmsum)
    pub ppc_crc32: bool,
}

impl FeatureFlags {
    /// All flags cleared
    pub const fn none() -> Self {
        Self {
            neon: false,
            aarch64_crc32: false,
            aarch64_pmull: false,
            intel_pclmul: false,
            intel_sse42: false,
            intel_sse41: false,
            intel_ssse3: false,
            intel_sse3: false,
            intel_sse2: false,
            intel_aesni: false,
            ppc_crc32: false,
        }
    }
}

/// Probe the CPU once and return the cached flags.
///
/// Safe to call concurrently; only the first caller performs detection.
pub fn probe() -> &'static FeatureFlags {
    FEATURES.get_or_init(|| {
        let flags = detect();
        tracing::debug!(?flags, "Probed CPU capabilities");
        flags
    })
}

/// Whether `probe()` has already run in this process
pub fn probed() -> bool {
    FEATURES.get().is_some()
}

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
fn detect() -> FeatureFlags {
    FeatureFlags {
        intel_pclmul: is_x86_feature_detected!("pclmulqdq"),
        intel_sse42: is_x86_feature_detected!("sse4.2"),
        intel_sse41: is_x86_feature_detected!("sse4.1"),
        intel_ssse3: is_x86_feature_detected!("ssse3"),
        intel_sse3: is_x86_feature_detected!("sse3"),
        intel_sse2: is_x86_feature_detected!("sse2"),
        intel_aesni: is_x86_feature_detected!("aes"),
        ..FeatureFlags::none()
    }
}

// ============================================================================
// ARM / AArch64
// ============================================================================

#[cfg(all(target_os = "linux", target_arch = "arm"))]
fn detect() -> FeatureFlags {
    const HWCAP_NEON: libc::c_ulong = 1 << 12;

    let hwcap = unsafe { libc::getauxval(libc::AT_HWCAP) };
    FeatureFlags {
        neon: hwcap & HWCAP_NEON == HWCAP_NEON,
        ..FeatureFlags::none()
    }
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
fn detect() -> FeatureFlags {
    const HWCAP_ASIMD: libc::c_ulong = 1 << 1;
    const HWCAP_PMULL: libc::c_ulong = 1 << 4;
    const HWCAP_CRC32: libc::c_ulong = 1 << 7;

    let hwcap = unsafe { libc::getauxval(libc::AT_HWCAP) };
    FeatureFlags {
        neon: hwcap & HWCAP_ASIMD == HWCAP_ASIMD,
        aarch64_crc32: hwcap & HWCAP_CRC32 == HWCAP_CRC32,
        aarch64_pmull: hwcap & HWCAP_PMULL == HWCAP_PMULL,
        ..FeatureFlags::none()
    }
}

// No auxv outside Linux; std knows how to ask the OS (sysctl on macOS, etc).
#[cfg(all(not(target_os = "linux"), target_arch = "aarch64"))]
fn detect() -> FeatureFlags {
    FeatureFlags {
        neon: std::arch::is_aarch64_feature_detected!("neon"),
        aarch64_crc32: std::arch::is_aarch64_feature_detected!("crc"),
        aarch64_pmull: std::arch::is_aarch64_feature_detected!("pmull"),
        ..FeatureFlags::none()
    }
}

// ============================================================================
// PowerPC64
// ============================================================================

#[cfg(all(target_os = "linux", target_arch = "powerpc64", target_endian = "little"))]
fn detect() -> FeatureFlags {
    const AT_HWCAP2: libc::c_ulong = 26;
    const PPC_FEATURE2_VEC_CRYPTO: libc::c_ulong = 0x0200_0000;

    let hwcap2 = unsafe { libc::getauxval(AT_HWCAP2) };
    FeatureFlags {
        ppc_crc32: hwcap2 & PPC_FEATURE2_VEC_CRYPTO != 0,
        ..FeatureFlags::none()
    }
}

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    all(target_os = "linux", target_arch = "arm"),
    all(target_os = "linux", target_arch = "powerpc64", target_endian = "little"),
)))]
fn detect() -> FeatureFlags {
    FeatureFlags::none()
}
