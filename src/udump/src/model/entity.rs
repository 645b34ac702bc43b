//! Struct, enum and function entities

use serde::{Deserialize, Serialize};

use super::package::EntityRef;
use super::types::{CookedField, Field, TypeDescriptor};

/// A struct or class reconstructed from the foreign type system.
///
/// `size` is what the foreign runtime reports for the type, padding
/// included. `max_size` starts equal to it and is only ever shrunk by the
/// resolver when subclass members prove that trailing bytes are padding
/// rather than ancestor state (or raised back to the primary super's
/// `max_size`, which a subclass can never undercut).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructDef {
    /// Globally unique source identity
    pub full_name: String,
    /// Display identity, unique after resolution
    pub short_name: String,
    /// Where the type object lived in the foreign process
    pub memory_address: u64,
    pub size: u32,
    pub max_size: u32,
    pub min_alignment: u32,
    pub is_class: bool,
    /// Whether the type declares any supers
    pub inherited: bool,
    /// Super short names, immediate super first
    pub super_names: Vec<String>,
    /// Types whose size is not portably knowable; layout cooking skips the
    /// effective-size substitution for fields of such a type
    #[serde(default)]
    pub no_fixed_size: bool,
    /// Members observed from the foreign type system, sorted by
    /// `(offset, bit_position)`
    pub defined_fields: Vec<Field>,
    pub functions: Vec<FunctionDef>,

    // Derived state, rebuilt by the resolver passes after load
    #[serde(skip)]
    pub supers: Vec<EntityRef>,
    #[serde(skip)]
    pub subclasses: Vec<EntityRef>,
    #[serde(skip)]
    pub synthetic_fields: Vec<Field>,
    #[serde(skip)]
    pub cooked: Vec<CookedField>,
    /// Bytes occupied by ancestors (the immediate super's `max_size`)
    #[serde(skip)]
    pub inherited_size: u32,
    #[serde(skip)]
    pub package_index: usize,
    #[serde(skip)]
    pub index_in_package: usize,
}

impl StructDef {
    /// Bytes unique to this type (not occupied by ancestors)
    pub fn unique_size(&self) -> u32 {
        self.max_size.saturating_sub(self.inherited_size)
    }
}

/// Storage width of an enum's underlying integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnumWidth {
    U8,
    U16,
    U32,
    U64,
}

impl EnumWidth {
    pub fn bytes(self) -> u32 {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    /// Initial guess from the largest declared member value
    pub fn for_max_value(value: u64) -> Self {
        if value > u64::from(u32::MAX) {
            Self::U64
        } else if value > u64::from(u16::MAX) {
            Self::U32
        } else if value > u64::from(u8::MAX) {
            Self::U16
        } else {
            Self::U8
        }
    }

    /// Smallest width that covers an observed storage size in bytes -
    /// the authoritative correction once real field usage is seen
    pub fn for_storage_size(bytes: u32) -> Self {
        if bytes > 4 {
            Self::U64
        } else if bytes > 2 {
            Self::U32
        } else if bytes > 1 {
            Self::U16
        } else {
            Self::U8
        }
    }
}

impl Default for EnumWidth {
    fn default() -> Self {
        Self::U8
    }
}

/// An enum reconstructed from the foreign type system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnumDef {
    pub full_name: String,
    pub short_name: String,
    pub memory_address: u64,
    pub storage: EnumWidth,
    /// `(name, value)` in declaration order
    pub members: Vec<(String, i64)>,
    #[serde(skip)]
    pub package_index: usize,
    #[serde(skip)]
    pub index_in_package: usize,
}

/// One function parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub ty: TypeDescriptor,
    pub name: String,
    pub flags: u64,
    pub array_count: i32,
}

/// A function owned by a struct or class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub full_name: String,
    pub short_name: String,
    /// Human-readable function flags string
    pub flags: String,
    /// Entry point relative to the foreign image base
    pub binary_offset: u64,
    pub return_type: TypeDescriptor,
    pub params: Vec<Param>,
    #[serde(skip)]
    pub index_in_owner: usize,
}
