//! Advancing a CRC32C register over runs of zero bytes
//!
//! Feeding `n` zero bytes into a raw CRC register multiplies it by
//! `x^(8n) mod P`. Instead of touching `n` bytes we build that power by
//! repeated squaring, which costs O(log n) polynomial multiplies.
//!
//! The same machinery supplies the fold constants for the carry-less
//! multiply kernels.

use super::portable::POLY;

/// Enough squarings for any byte length that fits in a `u64` (64 bits + the `x^8` offset).
const X2N_LEN: usize = 72;

/// Multiply `a` by `b` modulo P, both in reflected representation.
const fn multmodp(a: u32, mut b: u32) -> u32 {
    let mut m: u32 = 1 << 31;
    let mut p: u32 = 0;
    while m != 0 {
        if a & m != 0 {
            p ^= b;
        }
        m >>= 1;
        b = if b & 1 != 0 { (b >> 1) ^ POLY } else { b >> 1 };
    }
    p
}

/// `X2N_TABLE[k] = x^(2^k) mod P`
const X2N_TABLE: [u32; X2N_LEN] = {
    let mut table = [0u32; X2N_LEN];
    let mut p: u32 = 1 << 30; // x^1
    let mut k = 0;
    while k < X2N_LEN {
        table[k] = p;
        p = multmodp(p, p);
        k += 1;
    }
    table
};

/// `x^(n * 2^k) mod P`
pub(crate) const fn x2nmodp(mut n: u64, mut k: usize) -> u32 {
    let mut p: u32 = 1 << 31; // x^0
    while n != 0 {
        if n & 1 != 0 {
            p = multmodp(X2N_TABLE[k], p);
        }
        n >>= 1;
        k += 1;
    }
    p
}

/// Constant `K` such that a carry-less multiply of a crc by `K`, reduced
/// through a zero-seeded `crc32` over 64 bits, shifts the crc forward by
/// `bytes` zero bytes.
///
/// The multiply contributes one extra `x` and the 64-bit reduction `x^32`,
/// hence the `- 33`.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub(crate) const fn clmul_shift_constant(bytes: usize) -> u32 {
    x2nmodp(8 * bytes as u64 - 33, 0)
}

/// CRC32C of `length` zero bytes, continuing from `crc`.
///
/// Identical to running any kernel over a zero-filled buffer of that length.
pub fn crc32c_zeros(crc: u32, length: usize) -> u32 {
    if crc == 0 || length == 0 {
        return crc;
    }
    multmodp(x2nmodp(length as u64, 3), crc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::portable::crc32c_portable;

    #[test]
    fn test_zeros_matches_portable() {
        for length in [1, 15, 16, 17, 100, 1024, 4096, 65_537] {
            let zeros = vec![0u8; length];
            for crc in [0, 1, 0xFFFF_FFFF, 0xDEAD_BEEF] {
                assert_eq!(
                    crc32c_zeros(crc, length),
                    crc32c_portable(crc, &zeros),
                    "length {} crc {:#x}",
                    length,
                    crc
                );
            }
        }
    }

    #[test]
    fn test_zero_length_is_identity() {
        assert_eq!(crc32c_zeros(0xABCD_EF01, 0), 0xABCD_EF01);
    }

    #[test]
    fn test_zero_register_stays_zero() {
        assert_eq!(crc32c_zeros(0, 1 << 30), 0);
    }

    #[test]
    fn test_multmodp_identity() {
        let one = 1u32 << 31;
        assert_eq!(multmodp(one, 0x1234_5678), 0x1234_5678);
        assert_eq!(multmodp(0x1234_5678, one), 0x1234_5678);
    }
}
