//! Name pool configuration
//!
//! Describes where the pool lives and how record ids map to records for a
//! given target build.

use serde::{Deserialize, Serialize};

/// How many records a legacy pool chunk holds
pub const LEGACY_CHUNK_CAPACITY: u64 = 0x4000;

/// How a name id locates its record in the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameEncoding {
    /// Flat array of pointers to records, `LEGACY_CHUNK_CAPACITY` records
    /// per chunk. `string_offset` is where the character data starts inside
    /// a record (it moved between target versions).
    Legacy {
        /// Byte offset of the chunk pointer array inside the pool object
        pool_offset: usize,
        /// Byte offset of the character data inside a record
        string_offset: usize,
    },

    /// Block-based pool: the id splits into `(block, offset)` via its high
    /// and low 16 bits. `header_offset` is where the block pointer array
    /// starts inside the pool object.
    Chunked { header_offset: usize },
}

/// Per-target name pool description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePoolConfig {
    /// Virtual address of the pool object
    pub pool_address: usize,
    /// Record addressing scheme
    pub encoding: NameEncoding,
    /// Case-preserving targets pack the record length differently and store
    /// 16-bit characters
    pub case_preserving: bool,
    /// Optional symmetric byte transform applied to the stored characters
    /// (repeating XOR key). `None` for unobfuscated targets.
    pub obfuscation_key: Option<Vec<u8>>,
}

impl NamePoolConfig {
    /// A plain block-based pool at `pool_address` with no obfuscation,
    /// matching the most common modern target layout.
    pub fn chunked(pool_address: usize) -> Self {
        Self {
            pool_address,
            encoding: NameEncoding::Chunked { header_offset: 0x10 },
            case_preserving: false,
            obfuscation_key: None,
        }
    }

    /// A legacy flat-array pool at `pool_address`
    pub fn legacy(pool_address: usize) -> Self {
        Self {
            pool_address,
            encoding: NameEncoding::Legacy {
                pool_offset: 0,
                string_offset: 0x10,
            },
            case_preserving: false,
            obfuscation_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_roundtrip() {
        let config = NamePoolConfig {
            pool_address: 0x1453_2000,
            encoding: NameEncoding::Chunked { header_offset: 0x10 },
            case_preserving: true,
            obfuscation_key: Some(vec![0x5A, 0xC3]),
        };

        let json = serde_json::to_string(&config).unwrap();
        let back: NamePoolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
