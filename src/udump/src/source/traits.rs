//! Memory Source Trait
//!
//! Core abstraction for reading memory from various sources.

use byteorder::{ByteOrder, LE};

/// Errors that can occur while accessing foreign memory
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Unreadable memory: {size} bytes at {address:#x}")]
    Unreadable { address: usize, size: usize },

    #[error("Pattern not found ({0} pattern bytes)")]
    PatternNotFound(usize),

    #[error("Failed to open memory source: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for reading memory from various sources (dump file, mock, etc.)
///
/// Every read returns a `Result` - the core never assumes foreign memory is
/// readable, and a failed read aborts only the entity being decoded.
pub trait MemorySource: Send + Sync {
    /// Read bytes from a virtual address
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>, MemoryError>;

    /// Base virtual address of the mapped image
    fn base_address(&self) -> usize;

    /// Scan for a masked byte pattern, returning the first match address.
    ///
    /// `mask` has the same length as `pattern`; a zero mask byte is a
    /// wildcard.
    fn find_pattern(&self, pattern: &[u8], mask: &[u8]) -> Result<usize, MemoryError>;

    /// Read a u64 from memory
    fn read_u64(&self, address: usize) -> Result<u64, MemoryError> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(LE::read_u64(&bytes))
    }

    /// Read a u32 from memory
    fn read_u32(&self, address: usize) -> Result<u32, MemoryError> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(LE::read_u32(&bytes))
    }

    /// Read a u16 from memory
    fn read_u16(&self, address: usize) -> Result<u16, MemoryError> {
        let bytes = self.read_bytes(address, 2)?;
        Ok(LE::read_u16(&bytes))
    }

    /// Read an i32 from memory
    fn read_i32(&self, address: usize) -> Result<i32, MemoryError> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(LE::read_i32(&bytes))
    }

    /// Read a pointer (usize) from memory
    fn read_ptr(&self, address: usize) -> Result<usize, MemoryError> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(LE::read_u64(&bytes) as usize)
    }
}

/// Verify a full pattern (with wildcards) at a given position in data.
#[inline]
pub(crate) fn verify_pattern(data: &[u8], pattern: &[u8], mask: &[u8]) -> bool {
    if data.len() < pattern.len() {
        return false;
    }
    for i in 0..pattern.len() {
        if mask[i] != 0 && data[i] != pattern[i] {
            return false;
        }
    }
    true
}

/// Find the longest contiguous run of non-wildcard bytes in a pattern.
/// Returns (start_offset, bytes) of the best anchor substring.
pub(crate) fn find_best_anchor<'a>(pattern: &'a [u8], mask: &[u8]) -> (usize, &'a [u8]) {
    let mut best_start = 0;
    let mut best_len = 0;
    let mut current_start = 0;
    let mut current_len = 0;

    for (i, &m) in mask.iter().enumerate() {
        if m != 0 {
            if current_len == 0 {
                current_start = i;
            }
            current_len += 1;
        } else {
            if current_len > best_len {
                best_start = current_start;
                best_len = current_len;
            }
            current_len = 0;
        }
    }

    if current_len > best_len {
        best_start = current_start;
        best_len = current_len;
    }

    if best_len == 0 {
        (0, &[])
    } else {
        (best_start, &pattern[best_start..best_start + best_len])
    }
}

/// Scan a contiguous buffer for a masked pattern using memchr's
/// SIMD-accelerated memmem finder on the longest non-wildcard anchor.
pub(crate) fn scan_pattern(data: &[u8], pattern: &[u8], mask: &[u8]) -> Option<usize> {
    if pattern.is_empty() || pattern.len() != mask.len() {
        return None;
    }

    let (anchor_offset, anchor_bytes) = find_best_anchor(pattern, mask);

    if anchor_bytes.is_empty() {
        // Pattern is all wildcards - any position of sufficient length matches
        return if data.len() >= pattern.len() { Some(0) } else { None };
    }

    let finder = memchr::memmem::Finder::new(anchor_bytes);
    for anchor_pos in finder.find_iter(data) {
        if anchor_pos < anchor_offset {
            continue;
        }
        let pattern_start = anchor_pos - anchor_offset;
        if verify_pattern(&data[pattern_start..], pattern, mask) {
            return Some(pattern_start);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_best_anchor() {
        let pattern = [0x48, 0x8B, 0x05, 0x00, 0x00, 0xC3];
        let mask = [1, 1, 1, 0, 0, 1];
        let (offset, anchor) = find_best_anchor(&pattern, &mask);
        assert_eq!(offset, 0);
        assert_eq!(anchor, &[0x48, 0x8B, 0x05]);
    }

    #[test]
    fn test_scan_pattern_with_wildcards() {
        let data = [0x00, 0x48, 0x8B, 0x05, 0xAA, 0xBB, 0xC3, 0x00];
        let pattern = [0x48, 0x8B, 0x05, 0x00, 0x00, 0xC3];
        let mask = [1, 1, 1, 0, 0, 1];
        assert_eq!(scan_pattern(&data, &pattern, &mask), Some(1));
    }

    #[test]
    fn test_scan_pattern_no_match() {
        let data = [0u8; 16];
        let pattern = [0x48, 0x8B];
        let mask = [1, 1];
        assert_eq!(scan_pattern(&data, &pattern, &mask), None);
    }
}
