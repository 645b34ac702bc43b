//! Entity data model
//!
//! Data types for the reconstructed symbol database:
//! - `PropertyKind` / `TypeDescriptor` - declared field types
//! - `Field` / `CookedField` - defined members and layout slots
//! - `StructDef` / `EnumDef` / `FunctionDef` - entities
//! - `Package` / `EntityRef` - grouping and arena-handle back-references
//!
//! All cross-entity links are `(package, index)` handles into package-owned
//! vectors, never owning pointers, so the super/subclass graph can be cyclic
//! without any entity owning a cycle. Derived state (handles, supers,
//! synthetic fields, cooked layouts) is skipped during serialization and
//! rebuilt by re-running the resolver passes after load.

mod entity;
mod kind;
mod package;
mod types;

pub use entity::{EnumDef, EnumWidth, FunctionDef, Param, StructDef};
pub use kind::PropertyKind;
pub use package::{
    lookup_enum, lookup_enum_mut, lookup_struct, lookup_struct_mut, EntityKind, EntityRef, Package,
};
pub use types::{CookedField, Field, TypeDescriptor, TYPE_UINT8};
