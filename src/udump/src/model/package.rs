//! Packages and entity handles

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::entity::{EnumDef, StructDef};

/// What kind of entity a registry entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Struct,
    Class,
    Enum,
    Function,
}

/// Arena-handle back-reference to an entity owned by some package.
///
/// Handles stay valid for the lifetime of a generation run: packages and
/// their entity vectors are append-only once the resolver has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Struct { package: usize, index: usize },
    Class { package: usize, index: usize },
    Enum { package: usize, index: usize },
    Function {
        package: usize,
        owner: usize,
        owner_is_class: bool,
        index: usize,
    },
}

impl EntityRef {
    pub fn kind(self) -> EntityKind {
        match self {
            Self::Struct { .. } => EntityKind::Struct,
            Self::Class { .. } => EntityKind::Class,
            Self::Enum { .. } => EntityKind::Enum,
            Self::Function { .. } => EntityKind::Function,
        }
    }

    /// Index of the package that owns the referenced entity
    pub fn package(self) -> usize {
        match self {
            Self::Struct { package, .. }
            | Self::Class { package, .. }
            | Self::Enum { package, .. }
            | Self::Function { package, .. } => package,
        }
    }

    pub fn is_struct_or_class(self) -> bool {
        matches!(self, Self::Struct { .. } | Self::Class { .. })
    }
}

/// A named bucket of related entities - the unit of dependency tracking.
///
/// A package owns its structs, classes and enums; `functions` and
/// `dependencies` are handle-based bookkeeping rebuilt by the resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub structs: Vec<StructDef>,
    pub classes: Vec<StructDef>,
    pub enums: Vec<EnumDef>,
    /// Packages (by index) whose entities this package's entities refer to
    #[serde(default)]
    pub dependencies: BTreeSet<usize>,
    #[serde(skip)]
    pub index: usize,
    /// Handles to every function owned by this package's structs
    #[serde(skip)]
    pub functions: Vec<EntityRef>,
}

impl Package {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Resolve a struct/class handle against the package arena
pub fn lookup_struct(packages: &[Package], entity: EntityRef) -> Option<&StructDef> {
    match entity {
        EntityRef::Struct { package, index } => packages.get(package)?.structs.get(index),
        EntityRef::Class { package, index } => packages.get(package)?.classes.get(index),
        _ => None,
    }
}

/// Mutable variant of [`lookup_struct`]
pub fn lookup_struct_mut(packages: &mut [Package], entity: EntityRef) -> Option<&mut StructDef> {
    match entity {
        EntityRef::Struct { package, index } => packages.get_mut(package)?.structs.get_mut(index),
        EntityRef::Class { package, index } => packages.get_mut(package)?.classes.get_mut(index),
        _ => None,
    }
}

/// Resolve an enum handle against the package arena
pub fn lookup_enum(packages: &[Package], entity: EntityRef) -> Option<&EnumDef> {
    match entity {
        EntityRef::Enum { package, index } => packages.get(package)?.enums.get(index),
        _ => None,
    }
}

/// Mutable variant of [`lookup_enum`]
pub fn lookup_enum_mut(packages: &mut [Package], entity: EntityRef) -> Option<&mut EnumDef> {
    match entity {
        EntityRef::Enum { package, index } => packages.get_mut(package)?.enums.get_mut(index),
        _ => None,
    }
}
