//! Raw Dump File Source
//!
//! Reads from a flat memory dump captured at a known base address. The whole
//! file is loaded up front; addresses below the base or past the end of the
//! capture are unreadable.

use std::path::Path;

use super::traits::{scan_pattern, MemoryError, MemorySource};

/// A flat memory dump mapped at a fixed base address
pub struct DumpSource {
    data: Vec<u8>,
    base_address: usize,
}

impl DumpSource {
    /// Load a raw dump file captured at `base_address`
    pub fn open(path: impl AsRef<Path>, base_address: usize) -> Result<Self, MemoryError> {
        let data = std::fs::read(path)?;
        Ok(Self { data, base_address })
    }

    /// Wrap an in-memory buffer (used by tests and embedding callers)
    pub fn from_bytes(data: Vec<u8>, base_address: usize) -> Self {
        Self { data, base_address }
    }

    /// Size of the captured region in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl MemorySource for DumpSource {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>, MemoryError> {
        let offset = address
            .checked_sub(self.base_address)
            .ok_or(MemoryError::Unreadable { address, size })?;

        let end = offset
            .checked_add(size)
            .filter(|&end| end <= self.data.len())
            .ok_or(MemoryError::Unreadable { address, size })?;

        Ok(self.data[offset..end].to_vec())
    }

    fn base_address(&self) -> usize {
        self.base_address
    }

    fn find_pattern(&self, pattern: &[u8], mask: &[u8]) -> Result<usize, MemoryError> {
        scan_pattern(&self.data, pattern, mask)
            .map(|offset| self.base_address + offset)
            .ok_or(MemoryError::PatternNotFound(pattern.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_source_read_bytes() {
        let source = DumpSource::from_bytes(vec![0x41, 0x42, 0x43, 0x44], 0x1000);

        let result = source.read_bytes(0x1000, 4).unwrap();
        assert_eq!(result, vec![0x41, 0x42, 0x43, 0x44]);

        let partial = source.read_bytes(0x1001, 2).unwrap();
        assert_eq!(partial, vec![0x42, 0x43]);
    }

    #[test]
    fn test_dump_source_rejects_out_of_range() {
        let source = DumpSource::from_bytes(vec![0u8; 16], 0x1000);

        assert!(source.read_bytes(0xF00, 4).is_err());
        assert!(source.read_bytes(0x100C, 8).is_err());
        assert!(source.read_bytes(usize::MAX, 1).is_err());
    }

    #[test]
    fn test_dump_source_find_pattern() {
        let mut data = vec![0u8; 64];
        data[20..24].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let source = DumpSource::from_bytes(data, 0x4000);

        let addr = source
            .find_pattern(&[0xDE, 0xAD, 0xBE, 0xEF], &[1, 1, 1, 1])
            .unwrap();
        assert_eq!(addr, 0x4014);

        assert!(source.find_pattern(&[0xCA, 0xFE], &[1, 1]).is_err());
    }
}
