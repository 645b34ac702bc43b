//! Type descriptors, fields and cooked layout slots

use serde::{Deserialize, Serialize};

use super::kind::PropertyKind;
use super::package::EntityRef;

/// Type name used for synthetic filler and downgraded opaque fields
pub const TYPE_UINT8: &str = "uint8";

/// A field's declared type.
///
/// `resolvable` marks descriptors that name another entity in the registry
/// (as opposed to a primitive); `subtypes` carries the element types of
/// generic containers. `resolved` is filled in by the resolver once the
/// registry exists - before that it is `None`, and it is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub resolvable: bool,
    pub kind: PropertyKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtypes: Vec<TypeDescriptor>,
    #[serde(skip)]
    pub resolved: Option<EntityRef>,
}

impl TypeDescriptor {
    /// A primitive (non-resolvable) descriptor
    pub fn primitive(kind: PropertyKind, name: &str) -> Self {
        Self {
            resolvable: false,
            kind,
            name: name.to_string(),
            subtypes: Vec::new(),
            resolved: None,
        }
    }

    /// A descriptor that names another entity
    pub fn resolvable(kind: PropertyKind, name: &str) -> Self {
        Self {
            resolvable: true,
            kind,
            name: name.to_string(),
            subtypes: Vec::new(),
            resolved: None,
        }
    }
}

/// A struct member.
///
/// Defined members come from the foreign type system; synthetic members are
/// generated filler (`missing = true`) covering bytes or bits no defined
/// member accounts for. Bitfields occupy one storage byte (`size == 1`) at a
/// bit position below 8.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub array_count: i32,
    pub ty: TypeDescriptor,
    #[serde(default)]
    pub is_bitfield: bool,
    #[serde(default)]
    pub bit_position: u8,
    #[serde(default)]
    pub user_edited: bool,
    #[serde(default)]
    pub missing: bool,
}

impl Field {
    /// Sort key for the defined-field ordering invariant
    pub fn sort_key(&self) -> (u32, u8) {
        (self.offset, if self.is_bitfield { self.bit_position } else { 0 })
    }
}

/// One slot of a cooked layout: a tagged reference into the owning struct's
/// defined or synthetic field vector.
///
/// Defined slots carry the field's effective size - the size after the
/// resolver substituted the real size of a nested struct type - without
/// mutating the defined field itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookedField {
    Defined { index: usize, effective_size: u32 },
    Synthetic { index: usize },
}
