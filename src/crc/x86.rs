//! x86 / x86_64 CRC32C kernels
//!
//! - SSE 4.2: the `crc32` instruction, one word at a time
//! - PCLMUL (x86_64): three independent `crc32` streams per fold block so the
//!   instruction latency overlaps, recombined with a carry-less multiply

#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "x86_64")]
use super::zeros::clmul_shift_constant;

/// Bytes per stream in one fold round
#[cfg(target_arch = "x86_64")]
const FOLD_BLOCK: usize = 1024;

#[cfg(target_arch = "x86_64")]
const K_TWO_BLOCKS: u32 = clmul_shift_constant(2 * FOLD_BLOCK);
#[cfg(target_arch = "x86_64")]
const K_ONE_BLOCK: u32 = clmul_shift_constant(FOLD_BLOCK);

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn read_u64(chunk: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(chunk);
    u64::from_le_bytes(word)
}

#[cfg(target_arch = "x86")]
#[inline(always)]
fn read_u32(chunk: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(chunk);
    u32::from_le_bytes(word)
}

/// SSE 4.2 baseline kernel.
///
/// # Safety
///
/// The CPU must support SSE 4.2.
#[target_feature(enable = "sse4.2")]
pub(super) unsafe fn crc32c_sse42(crc: u32, data: &[u8]) -> u32 {
    #[cfg(target_arch = "x86_64")]
    let (mut crc, rest) = {
        let mut crc64 = crc as u64;
        let mut chunks = data.chunks_exact(8);
        for chunk in &mut chunks {
            crc64 = _mm_crc32_u64(crc64, read_u64(chunk));
        }
        (crc64 as u32, chunks.remainder())
    };

    #[cfg(target_arch = "x86")]
    let (mut crc, rest) = {
        let mut crc = crc;
        let mut chunks = data.chunks_exact(4);
        for chunk in &mut chunks {
            crc = _mm_crc32_u32(crc, read_u32(chunk));
        }
        (crc, chunks.remainder())
    };

    for &byte in rest {
        crc = _mm_crc32_u8(crc, byte);
    }
    crc
}

/// PCLMUL-assisted kernel.
///
/// # Safety
///
/// The CPU must support SSE 4.2 and PCLMULQDQ.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse4.2,pclmulqdq")]
pub(super) unsafe fn crc32c_pclmul(crc: u32, data: &[u8]) -> u32 {
    let mut crc = crc;
    let mut rest = data;

    while rest.len() >= 3 * FOLD_BLOCK {
        let (a, tail) = rest.split_at(FOLD_BLOCK);
        let (b, tail) = tail.split_at(FOLD_BLOCK);
        let (c, tail) = tail.split_at(FOLD_BLOCK);

        let (mut s0, mut s1, mut s2) = (crc as u64, 0u64, 0u64);
        for ((wa, wb), wc) in a
            .chunks_exact(8)
            .zip(b.chunks_exact(8))
            .zip(c.chunks_exact(8))
        {
            s0 = _mm_crc32_u64(s0, read_u64(wa));
            s1 = _mm_crc32_u64(s1, read_u64(wb));
            s2 = _mm_crc32_u64(s2, read_u64(wc));
        }

        // crc(A|B|C) = crc(A)·x^(16·FOLD) ^ crc(B)·x^(8·FOLD) ^ crc(C)
        crc = clmul_shift(s0 as u32, K_TWO_BLOCKS)
            ^ clmul_shift(s1 as u32, K_ONE_BLOCK)
            ^ s2 as u32;
        rest = tail;
    }

    crc32c_sse42(crc, rest)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse4.2,pclmulqdq")]
unsafe fn clmul_shift(crc: u32, k: u32) -> u32 {
    let product = _mm_clmulepi64_si128(
        _mm_cvtsi32_si128(crc as i32),
        _mm_cvtsi32_si128(k as i32),
        0x00,
    );
    _mm_crc32_u64(0, _mm_cvtsi128_si64(product) as u64) as u32
}
