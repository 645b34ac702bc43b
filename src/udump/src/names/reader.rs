//! Cached name record decoding
//!
//! Decodes pool records into strings with a grow-only cache. Record headers
//! come from foreign memory and are untrusted: the packed length is clamped
//! to `NAME_MAX` before it is ever used to size a read.

use std::collections::HashMap;

use byteorder::{ByteOrder, LE};
use tracing::warn;

use super::pool::{NameEncoding, NamePoolConfig, LEGACY_CHUNK_CAPACITY};
use crate::source::{MemoryError, MemorySource};

/// Hard upper bound on a decoded name, in characters
pub const NAME_MAX: usize = 1024;

/// What an empty or blank record decodes to. The empty string is reserved to
/// mean "not yet computed", so it never appears as a decoded value.
pub const PLACEHOLDER_NAME: &str = "null";

/// Cached reader over the interned-name pool
///
/// The cache only grows; an id resolved once stays resolved for the lifetime
/// of the run and is handed to the project file on save.
pub struct NameReader {
    config: NamePoolConfig,
    cache: HashMap<u64, String>,
}

impl NameReader {
    pub fn new(config: NamePoolConfig) -> Self {
        Self {
            config,
            cache: HashMap::new(),
        }
    }

    pub fn config(&self) -> &NamePoolConfig {
        &self.config
    }

    /// The resolved id -> string cache (serialized into project files)
    pub fn cache(&self) -> &HashMap<u64, String> {
        &self.cache
    }

    /// Seed the cache from a loaded project file
    pub fn preload(&mut self, entries: HashMap<u64, String>) {
        self.cache.extend(entries);
    }

    /// Resolve a name id to its decoded string.
    ///
    /// Memoized forever per id. A read failure aborts only this resolution;
    /// nothing is cached for the id so a later attempt may still succeed.
    pub fn resolve(
        &mut self,
        source: &dyn MemorySource,
        id: u64,
    ) -> Result<String, MemoryError> {
        if let Some(name) = self.cache.get(&id) {
            return Ok(name.clone());
        }

        let name = self.decode(source, id)?;
        self.cache.insert(id, name.clone());
        Ok(name)
    }

    fn decode(&self, source: &dyn MemorySource, id: u64) -> Result<String, MemoryError> {
        let raw = match self.config.encoding {
            NameEncoding::Legacy {
                pool_offset,
                string_offset,
            } => self.decode_legacy(source, id, pool_offset, string_offset)?,
            NameEncoding::Chunked { header_offset } => {
                self.decode_chunked(source, id, header_offset)?
            }
        };

        if raw.is_empty() {
            return Ok(PLACEHOLDER_NAME.to_string());
        }
        Ok(raw)
    }

    /// Legacy pools hold an array of chunk pointers; each chunk is an array
    /// of record pointers. Records are NUL-terminated 8-bit strings at a
    /// version-dependent offset.
    fn decode_legacy(
        &self,
        source: &dyn MemorySource,
        id: u64,
        pool_offset: usize,
        string_offset: usize,
    ) -> Result<String, MemoryError> {
        let chunk = (id / LEGACY_CHUNK_CAPACITY) as usize;
        let within = (id % LEGACY_CHUNK_CAPACITY) as usize;

        let chunk_ptr = source.read_ptr(self.config.pool_address + pool_offset + 8 * chunk)?;
        let record_ptr = source.read_ptr(chunk_ptr + 8 * within)?;

        let mut bytes = source.read_bytes(record_ptr + string_offset, NAME_MAX)?;
        self.deobfuscate(&mut bytes);

        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).to_string())
    }

    /// Block-based pools split the id into high (block) and low (offset)
    /// bits. The record starts with a packed length header; the length is
    /// clamped before the character read so a corrupted header can never
    /// size a read past `NAME_MAX`.
    fn decode_chunked(
        &self,
        source: &dyn MemorySource,
        id: u64,
        header_offset: usize,
    ) -> Result<String, MemoryError> {
        let block = (id >> 16) as usize;
        let within = (id & 0xFFFF) as usize;

        let block_ptr =
            source.read_ptr(self.config.pool_address + header_offset + 8 * block)?;

        if self.config.case_preserving {
            // 4-byte record stride, length packed at +4, 16-bit characters
            let record = block_ptr + 4 * within;
            let raw_len = (source.read_u16(record + 4)? >> 1) as usize;
            let len = self.clamp_len(id, raw_len);

            let mut bytes = source.read_bytes(record + 6, len * 2)?;
            self.deobfuscate(&mut bytes);

            let units: Vec<u16> = bytes.chunks_exact(2).map(LE::read_u16).collect();
            Ok(String::from_utf16_lossy(&units))
        } else {
            // 2-byte record stride, length packed at +0, 8-bit characters
            let record = block_ptr + 2 * within;
            let raw_len = (source.read_u16(record)? >> 6) as usize;
            let len = self.clamp_len(id, raw_len);

            let mut bytes = source.read_bytes(record + 2, len)?;
            self.deobfuscate(&mut bytes);

            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
    }

    fn clamp_len(&self, id: u64, raw_len: usize) -> usize {
        if raw_len > NAME_MAX {
            warn!(
                id,
                raw_len,
                "name record length exceeds NAME_MAX, clamping; the pool \
                 configuration may not match this target"
            );
            return NAME_MAX;
        }
        raw_len
    }

    fn deobfuscate(&self, bytes: &mut [u8]) {
        if let Some(key) = &self.config.obfuscation_key {
            if key.is_empty() {
                return;
            }
            for (i, b) in bytes.iter_mut().enumerate() {
                *b ^= key[i % key.len()];
            }
        }
    }
}

/// Replace every byte that is not ASCII-alphanumeric with `_`, so decoded
/// names are usable as identifiers.
pub fn sanitize_ident(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockMemorySource;

    const POOL: usize = 0x10_0000;
    const BLOCK0: usize = 0x20_0000;

    /// Mock with a chunked pool header at POOL and one block at BLOCK0
    fn chunked_source() -> MockMemorySource {
        let mut source = MockMemorySource::zeroed(0x20_0000, 0x10_0000);
        // Block pointer array starts at header_offset 0x10
        source.put_u64(POOL + 0x10, BLOCK0 as u64);

        // Record at offset 0 (id 0): "None", packed length 4 << 6
        source.put_u16(BLOCK0, 4 << 6);
        source.put_bytes(BLOCK0 + 2, b"None");

        // Record at byte offset 8 (id 4, stride 2): "Actor"
        source.put_u16(BLOCK0 + 8, 5 << 6);
        source.put_bytes(BLOCK0 + 10, b"Actor");

        source
    }

    #[test]
    fn test_chunked_decode() {
        let source = chunked_source();
        let mut reader = NameReader::new(NamePoolConfig::chunked(POOL));

        assert_eq!(reader.resolve(&source, 0).unwrap(), "None");
        assert_eq!(reader.resolve(&source, 4).unwrap(), "Actor");
    }

    #[test]
    fn test_cache_is_sticky() {
        let mut source = chunked_source();
        let mut reader = NameReader::new(NamePoolConfig::chunked(POOL));

        assert_eq!(reader.resolve(&source, 4).unwrap(), "Actor");

        // Overwrite the record; the cached value must survive
        source.put_bytes(BLOCK0 + 10, b"Zzzzz");
        assert_eq!(reader.resolve(&source, 4).unwrap(), "Actor");
    }

    #[test]
    fn test_corrupted_length_is_clamped() {
        let mut source = chunked_source();
        // Case-preserving records pack the length at +4 with a one-bit
        // shift, so a corrupted header can claim far more than NAME_MAX
        // characters. Record for id 16 lives at stride 4.
        source.put_u16(BLOCK0 + 4 * 16 + 4, u16::MAX);

        let mut config = NamePoolConfig::chunked(POOL);
        config.case_preserving = true;
        let mut reader = NameReader::new(config);

        let name = reader.resolve(&source, 16).unwrap();
        assert_eq!(name.chars().count(), NAME_MAX);
    }

    #[test]
    fn test_empty_record_decodes_to_placeholder() {
        let source = chunked_source();
        let mut reader = NameReader::new(NamePoolConfig::chunked(POOL));

        // Record for id 200 lies past every written record, so its packed
        // length header is zero
        let name = reader.resolve(&source, 200).unwrap();
        assert_eq!(name, PLACEHOLDER_NAME);
        assert!(!name.is_empty());
    }

    #[test]
    fn test_unreadable_record_is_an_error() {
        let source = chunked_source();
        let mut reader = NameReader::new(NamePoolConfig::chunked(POOL));

        // Block 2 pointer slot is zero, so the record read lands nowhere
        assert!(reader.resolve(&source, 2 << 16).is_err());
        // And nothing was cached for it
        assert!(!reader.cache().contains_key(&(2 << 16)));
    }

    #[test]
    fn test_obfuscated_chars() {
        let mut source = chunked_source();
        // Record at offset 16 (id 8): "Pawn" XORed with 0x5A
        source.put_u16(BLOCK0 + 16, 4 << 6);
        let obfuscated: Vec<u8> = b"Pawn".iter().map(|b| b ^ 0x5A).collect();
        source.put_bytes(BLOCK0 + 18, &obfuscated);

        let mut config = NamePoolConfig::chunked(POOL);
        config.obfuscation_key = Some(vec![0x5A]);

        let mut reader = NameReader::new(config);
        assert_eq!(reader.resolve(&source, 8).unwrap(), "Pawn");
    }

    #[test]
    fn test_legacy_decode() {
        let mut source = MockMemorySource::zeroed(0x20_0000, 0x10_0000);
        const CHUNK0: usize = 0x18_0000;
        const RECORD: usize = 0x19_0000;

        source.put_u64(POOL, CHUNK0 as u64);
        // Record pointer for id 3
        source.put_u64(CHUNK0 + 8 * 3, RECORD as u64);
        source.put_bytes(RECORD + 0x10, b"Vector\0");

        let mut reader = NameReader::new(NamePoolConfig::legacy(POOL));
        assert_eq!(reader.resolve(&source, 3).unwrap(), "Vector");
    }

    #[test]
    fn test_sanitize_ident() {
        assert_eq!(sanitize_ident("Scene::Component"), "Scene__Component");
        assert_eq!(sanitize_ident("plain0"), "plain0");
        assert_eq!(sanitize_ident("a b-c"), "a_b_c");
    }
}
