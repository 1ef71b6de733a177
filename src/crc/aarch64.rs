//! AArch64 CRC32C kernel
//!
//! ARMv8 `crc32cx` on three interleaved streams, recombined with PMULL.

use std::arch::aarch64::*;

use super::zeros::clmul_shift_constant;

const FOLD_BLOCK: usize = 1024;
const K_TWO_BLOCKS: u32 = clmul_shift_constant(2 * FOLD_BLOCK);
const K_ONE_BLOCK: u32 = clmul_shift_constant(FOLD_BLOCK);

#[inline(always)]
fn read_u64(chunk: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(chunk);
    u64::from_le_bytes(word)
}

/// # Safety
///
/// The CPU must support the CRC32 and PMULL extensions.
#[target_feature(enable = "crc,neon,aes")]
pub(super) unsafe fn crc32c_aarch64(crc: u32, data: &[u8]) -> u32 {
    let mut crc = crc;
    let mut rest = data;

    while rest.len() >= 3 * FOLD_BLOCK {
        let (a, tail) = rest.split_at(FOLD_BLOCK);
        let (b, tail) = tail.split_at(FOLD_BLOCK);
        let (c, tail) = tail.split_at(FOLD_BLOCK);

        let (mut s0, mut s1, mut s2) = (crc, 0u32, 0u32);
        for ((wa, wb), wc) in a
            .chunks_exact(8)
            .zip(b.chunks_exact(8))
            .zip(c.chunks_exact(8))
        {
            s0 = __crc32cd(s0, read_u64(wa));
            s1 = __crc32cd(s1, read_u64(wb));
            s2 = __crc32cd(s2, read_u64(wc));
        }

        crc = pmull_shift(s0, K_TWO_BLOCKS) ^ pmull_shift(s1, K_ONE_BLOCK) ^ s2;
        rest = tail;
    }

    let mut chunks = rest.chunks_exact(8);
    for chunk in &mut chunks {
        crc = __crc32cd(crc, read_u64(chunk));
    }
    for &byte in chunks.remainder() {
        crc = __crc32cb(crc, byte);
    }
    crc
}

#[target_feature(enable = "crc,neon,aes")]
unsafe fn pmull_shift(crc: u32, k: u32) -> u32 {
    let product = vmull_p64(crc as u64, k as u64);
    __crc32cd(0, product as u64)
}
