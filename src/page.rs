//! System page geometry, read once per process

use std::sync::OnceLock;

const FALLBACK_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

#[cfg(unix)]
fn query_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 && (size as usize).is_power_of_two() {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(not(unix))]
fn query_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

/// Page size in bytes (always a power of two)
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(query_page_size)
}

/// Mask that clears the in-page offset bits
fn page_mask() -> usize {
    !(page_size() - 1)
}

/// Round `n` up to a whole number of pages
pub fn align_up(n: usize) -> usize {
    (n + page_size() - 1) & page_mask()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_is_consistent() {
        let size = page_size();
        assert!(size.is_power_of_two());
        assert_eq!(page_mask() & size, size);
        assert_eq!(page_mask() & (size - 1), 0);
    }

    #[test]
    fn test_align_up() {
        let size = page_size();
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), size);
        assert_eq!(align_up(size), size);
        assert_eq!(align_up(size + 1), 2 * size);
    }
}
