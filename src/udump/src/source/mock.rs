//! Mock Memory Source
//!
//! A mock memory source for laying out little-endian records at chosen
//! addresses in tests.

use byteorder::{ByteOrder, LE};

use super::traits::{scan_pattern, MemoryError, MemorySource};

/// A mock memory source backed by a contiguous buffer
pub struct MockMemorySource {
    /// Raw memory data (contiguous, starting at base_address)
    pub data: Vec<u8>,
    /// Base virtual address for the data
    pub base_address: usize,
}

impl MockMemorySource {
    /// Create a new mock with data at given base address
    pub fn new(data: Vec<u8>, base_address: usize) -> Self {
        Self { data, base_address }
    }

    /// Create an empty mock of `size` zero bytes at `base_address`
    pub fn zeroed(size: usize, base_address: usize) -> Self {
        Self::new(vec![0u8; size], base_address)
    }

    /// Write raw bytes at a virtual address
    pub fn put_bytes(&mut self, address: usize, bytes: &[u8]) {
        let offset = address - self.base_address;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Write a little-endian u16 at a virtual address
    pub fn put_u16(&mut self, address: usize, value: u16) {
        let offset = address - self.base_address;
        LE::write_u16(&mut self.data[offset..offset + 2], value);
    }

    /// Write a little-endian u32 at a virtual address
    pub fn put_u32(&mut self, address: usize, value: u32) {
        let offset = address - self.base_address;
        LE::write_u32(&mut self.data[offset..offset + 4], value);
    }

    /// Write a little-endian u64 at a virtual address
    pub fn put_u64(&mut self, address: usize, value: u64) {
        let offset = address - self.base_address;
        LE::write_u64(&mut self.data[offset..offset + 8], value);
    }
}

impl MemorySource for MockMemorySource {
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
