//! Property kind enumeration

use serde::{Deserialize, Serialize};

/// Property type enumeration for field type descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    ByteProperty,
    BoolProperty,
    IntProperty,
    FloatProperty,
    ObjectProperty,
    NameProperty,
    DelegateProperty,
    DoubleProperty,
    ArrayProperty,
    StructProperty,
    StrProperty,
    TextProperty,
    InterfaceProperty,
    MulticastDelegateProperty,
    WeakObjectProperty,
    LazyObjectProperty,
    SoftObjectProperty,
    UInt64Property,
    UInt32Property,
    UInt16Property,
    Int64Property,
    Int16Property,
    Int8Property,
    MapProperty,
    SetProperty,
    EnumProperty,
    FieldPathProperty,
    OptionalProperty,
    ClassProperty,
    Unknown,
}

impl PropertyKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "ByteProperty" => Self::ByteProperty,
            "BoolProperty" => Self::BoolProperty,
            "IntProperty" => Self::IntProperty,
            "FloatProperty" => Self::FloatProperty,
            "ObjectProperty" => Self::ObjectProperty,
            "NameProperty" => Self::NameProperty,
            "DelegateProperty" => Self::DelegateProperty,
            "DoubleProperty" => Self::DoubleProperty,
            "ArrayProperty" => Self::ArrayProperty,
            "StructProperty" => Self::StructProperty,
            "StrProperty" => Self::StrProperty,
            "TextProperty" => Self::TextProperty,
            "InterfaceProperty" => Self::InterfaceProperty,
            "MulticastDelegateProperty"
            | "MulticastInlineDelegateProperty"
            | "MulticastSparseDelegateProperty" => Self::MulticastDelegateProperty,
            "WeakObjectProperty" => Self::WeakObjectProperty,
            "LazyObjectProperty" => Self::LazyObjectProperty,
            "SoftObjectProperty" | "SoftClassProperty" => Self::SoftObjectProperty,
            "UInt64Property" => Self::UInt64Property,
            "UInt32Property" => Self::UInt32Property,
            "UInt16Property" => Self::UInt16Property,
            "Int64Property" => Self::Int64Property,
            "Int16Property" => Self::Int16Property,
            "Int8Property" => Self::Int8Property,
            "MapProperty" => Self::MapProperty,
            "SetProperty" => Self::SetProperty,
            "EnumProperty" => Self::EnumProperty,
            "FieldPathProperty" => Self::FieldPathProperty,
            "OptionalProperty" => Self::OptionalProperty,
            "ClassProperty" => Self::ClassProperty,
            _ => Self::Unknown,
        }
    }

    /// Object and class properties hold a pointer to their target, so their
    /// storage size never depends on the target type's own layout.
    pub fn is_pointer(self) -> bool {
        matches!(self, Self::ObjectProperty | Self::ClassProperty)
    }
}
