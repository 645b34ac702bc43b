//! Generation run
//!
//! One run walks the foreign object array and turns it into packages of raw
//! entities, then hands the result to the resolver passes. Two phases:
//!
//! - **Phase A** decodes and caches every object's name, validating that the
//!   first valid object is the configured root object - a mismatch means the
//!   configured offsets do not fit this target and the run fails instead of
//!   guessing.
//! - **Phase B** groups reflection objects by their outermost package,
//!   builds `StructDef`/`EnumDef`/`FunctionDef` entities from property
//!   chains, injects the reserved seed package at index 0 and runs
//!   [`finish_packages`](crate::resolve::finish_packages).
//!
//! A read failure while building one entity skips just that entity; only a
//! missing root object, an unreadable object array or cancellation abort
//! the run.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::edit::Overrides;
use crate::model::{
    EnumDef, EnumWidth, Field, FunctionDef, Package, Param, PropertyKind, StructDef,
    TypeDescriptor,
};
use crate::names::{sanitize_ident, NamePoolConfig, NameReader};
use crate::progress::{Cancelled, Progress, RunStatus};
use crate::registry::Registry;
use crate::resolve::finish_packages;
use crate::source::{MemoryError, MemorySource};

/// Name of the reserved package at index 0 holding user-supplied types
pub const SEED_PACKAGE: &str = "BasicType";

/// Containers stop nesting subtypes past this depth
const MAX_SUBTYPE_DEPTH: u32 = 4;

const FLAG_PARAM: u64 = 0x80;
const FLAG_RETURN_PARAM: u64 = 0x400;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("first object is {found:?}, expected root object {expected:?}; offsets likely do not match this target")]
    NoRootObject { expected: String, found: String },

    #[error("object array is empty or unreadable")]
    NoObjects,

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("memory access failed: {0}")]
    Memory(#[from] MemoryError),
}

/// Where the foreign object array lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectArrayConfig {
    /// Address of the item array; each item starts with an object pointer
    pub objects_address: usize,
    /// Address of the element count (u32)
    pub count_address: usize,
    /// Bytes per item
    pub stride: usize,
}

/// Field offsets inside a foreign object record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectOffsets {
    pub class_ptr: usize,
    pub name_id: usize,
    pub outer_ptr: usize,
    /// Next pointer of the legacy child chain (functions)
    pub field_next: usize,
    pub super_ptr: usize,
    pub children: usize,
    pub child_properties: usize,
    pub properties_size: usize,
    pub min_alignment: usize,
}

impl Default for ObjectOffsets {
    fn default() -> Self {
        Self {
            class_ptr: 0x10,
            name_id: 0x18,
            outer_ptr: 0x20,
            field_next: 0x28,
            super_ptr: 0x40,
            children: 0x48,
            child_properties: 0x50,
            properties_size: 0x58,
            min_alignment: 0x60,
        }
    }
}

/// Field offsets inside a foreign property record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyOffsets {
    pub class_ptr: usize,
    /// Name id offset inside the property's class record
    pub class_name: usize,
    pub name_id: usize,
    pub next: usize,
    pub offset: usize,
    pub element_size: usize,
    pub array_dim: usize,
    pub prop_flags: usize,
    /// Byte mask of a bool property; a non-0xFF mask marks a bitfield
    pub byte_mask: usize,
    /// Pointer to the property's target entity or inner property
    pub value: usize,
}

impl Default for PropertyOffsets {
    fn default() -> Self {
        Self {
            class_ptr: 0x8,
            class_name: 0x0,
            name_id: 0x20,
            next: 0x18,
            offset: 0x4C,
            element_size: 0x3C,
            array_dim: 0x38,
            prop_flags: 0x40,
            byte_mask: 0x72,
            value: 0x78,
        }
    }
}

/// Field offsets inside a foreign enum record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumOffsets {
    /// Offset of the `{data, count}` member-pair array header
    pub names_array: usize,
    pub pair_stride: usize,
    /// Offset of the i64 value inside one pair
    pub pair_value: usize,
}

impl Default for EnumOffsets {
    fn default() -> Self {
        Self {
            names_array: 0x40,
            pair_stride: 0x10,
            pair_value: 0x8,
        }
    }
}

/// Field offsets inside a foreign function record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionOffsets {
    pub flags: usize,
    /// Entry-point pointer; stored relative to the image base
    pub exec: usize,
}

impl Default for FunctionOffsets {
    fn default() -> Self {
        Self {
            flags: 0xB0,
            exec: 0xD8,
        }
    }
}

/// Everything version-dependent about one target, loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    /// Short name the first valid object must decode to
    #[serde(default = "default_root_object")]
    pub root_object: String,
    pub names: NamePoolConfig,
    pub objects: ObjectArrayConfig,
    #[serde(default)]
    pub object_offsets: ObjectOffsets,
    #[serde(default)]
    pub property_offsets: PropertyOffsets,
    #[serde(default)]
    pub enum_offsets: EnumOffsets,
    #[serde(default)]
    pub function_offsets: FunctionOffsets,
}

fn default_root_object() -> String {
    "Object".to_string()
}

/// The product of a successful run
#[derive(Debug)]
pub struct GeneratedDump {
    pub packages: Vec<Package>,
    pub registry: Registry,
    pub name_cache: HashMap<u64, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Class,
    Struct,
    Enum,
}

/// One generation run over a memory source
pub struct Generator<'a> {
    source: &'a dyn MemorySource,
    config: &'a TargetConfig,
    names: NameReader,
    overrides: Overrides,
}

impl<'a> Generator<'a> {
    pub fn new(source: &'a dyn MemorySource, config: &'a TargetConfig) -> Self {
        Self {
            source,
            config,
            names: NameReader::new(config.names.clone()),
            overrides: Overrides::new(),
        }
    }

    /// Seed known-correct definitions; applied while entities are built,
    /// before any resolver pass runs
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn run(&mut self, progress: &Progress) -> Result<GeneratedDump, GenerateError> {
        let result = self.run_inner(progress);
        progress.finish(if result.is_ok() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        });
        result
    }

    fn run_inner(&mut self, progress: &Progress) -> Result<GeneratedDump, GenerateError> {
        let count = self
            .source
            .read_u32(self.config.objects.count_address)? as usize;
        if count == 0 {
            return Err(GenerateError::NoObjects);
        }
        progress.begin(count as u64);
        info!(count, target = %self.config.name, "caching object names");

        // Phase A: decode every object name once, front-loading the cache
        let mut root_checked = false;
        for i in 0..count {
            if i % 256 == 0 {
                progress.check_cancelled()?;
            }
            let object = match self.object_at(i) {
                Ok(addr) if addr != 0 => addr,
                _ => {
                    progress.advance(1);
                    continue;
                }
            };
            match self.object_name(object) {
                Ok(name) => {
                    if !root_checked {
                        root_checked = true;
                        if name != self.config.root_object {
                            return Err(GenerateError::NoRootObject {
                                expected: self.config.root_object.clone(),
                                found: name,
                            });
                        }
                    }
                }
                Err(err) => debug!(index = i, %err, "failed to decode object name"),
            }
            progress.advance(1);
        }
        if !root_checked {
            return Err(GenerateError::NoObjects);
        }

        // Phase B: group reflection objects by their outermost package.
        // The sorted map keeps package order independent of object order.
        let mut groups: BTreeMap<String, Vec<(usize, RawKind)>> = BTreeMap::new();
        let mut structs_found = 0usize;
        for i in 0..count {
            if i % 256 == 0 {
                progress.check_cancelled()?;
            }
            let object = match self.object_at(i) {
                Ok(addr) if addr != 0 => addr,
                _ => continue,
            };
            let kind = match self.object_kind(object) {
                Ok(Some(kind)) => kind,
                _ => continue,
            };
            if kind != RawKind::Enum {
                structs_found += 1;
            }
            let package = match self.outermost_name(object) {
                Ok(name) => name,
                Err(err) => {
                    debug!(index = i, %err, "failed to resolve owning package");
                    continue;
                }
            };
            groups.entry(package).or_default().push((object, kind));
        }
        if structs_found == 0 {
            warn!("no struct or class objects found");
        }

        // Revised total: build plus cook, per package, seed included
        progress.begin(2 * (groups.len() as u64 + 1));
        info!(packages = groups.len(), "building packages");

        let mut packages = Vec::with_capacity(groups.len() + 1);
        let mut seed = Package::named(SEED_PACKAGE);
        for custom in self.overrides.custom() {
            let bucket = if custom.is_class {
                &mut seed.classes
            } else {
                &mut seed.structs
            };
            bucket.push(custom.clone());
        }
        seed.enums.extend(self.overrides.custom_enums().iter().cloned());
        packages.push(seed);
        progress.advance(1);

        for (name, objects) in groups {
            progress.check_cancelled()?;
            let mut package = Package::named(&name);
            for (object, kind) in objects {
                match kind {
                    RawKind::Class | RawKind::Struct => {
                        let is_class = kind == RawKind::Class;
                        match self.build_struct(object, is_class) {
                            Ok(Some(s)) => {
                                let bucket = if is_class {
                                    &mut package.classes
                                } else {
                                    &mut package.structs
                                };
                                bucket.push(s);
                            }
                            Ok(None) => {}
                            Err(err) => {
                                warn!(address = format_args!("{object:#x}"), %err,
                                    "skipping unreadable struct");
                            }
                        }
                    }
                    RawKind::Enum => match self.build_enum(object) {
                        Ok(Some(e)) => package.enums.push(e),
                        Ok(None) => {}
                        Err(err) => {
                            warn!(address = format_args!("{object:#x}"), %err,
                                "skipping unreadable enum");
                        }
                    },
                }
            }
            progress.advance(1);
            packages.push(package);
        }

        let registry = finish_packages(&mut packages, progress)?;
        Ok(GeneratedDump {
            packages,
            registry,
            name_cache: self.names.cache().clone(),
        })
    }

    fn object_at(&self, index: usize) -> Result<usize, MemoryError> {
        let item = self.config.objects.objects_address + index * self.config.objects.stride;
        self.source.read_ptr(item)
    }

    fn object_name(&mut self, object: usize) -> Result<String, MemoryError> {
        let id = self
            .source
            .read_u32(object + self.config.object_offsets.name_id)?;
        self.names.resolve(self.source, u64::from(id))
    }

    /// The object's class name decides how it is materialized
    fn object_kind(&mut self, object: usize) -> Result<Option<RawKind>, MemoryError> {
        let class = self
            .source
            .read_ptr(object + self.config.object_offsets.class_ptr)?;
        if class == 0 {
            return Ok(None);
        }
        let class_name = self.object_name(class)?;
        Ok(match class_name.as_str() {
            "Class" | "BlueprintGeneratedClass" | "AnimBlueprintGeneratedClass"
            | "WidgetBlueprintGeneratedClass" => Some(RawKind::Class),
            "ScriptStruct" | "UserDefinedStruct" => Some(RawKind::Struct),
            "Enum" | "UserDefinedEnum" => Some(RawKind::Enum),
            _ => None,
        })
    }

    /// Short name of the outermost object in the outer chain
    fn outermost_name(&mut self, object: usize) -> Result<String, MemoryError> {
        let mut current = object;
        loop {
            let outer = self
                .source
                .read_ptr(current + self.config.object_offsets.outer_ptr)?;
            if outer == 0 {
                break;
            }
            current = outer;
        }
        Ok(sanitize_ident(&self.object_name(current)?))
    }

    /// Dotted outer-chain path, outermost first
    fn full_name(&mut self, object: usize) -> Result<String, MemoryError> {
        let mut parts = vec![self.object_name(object)?];
        let mut current = object;
        loop {
            let outer = self
                .source
                .read_ptr(current + self.config.object_offsets.outer_ptr)?;
            if outer == 0 {
                break;
            }
            parts.push(self.object_name(outer)?);
            current = outer;
        }
        parts.reverse();
        Ok(parts.join("."))
    }

    fn build_struct(
        &mut self,
        object: usize,
        is_class: bool,
    ) -> Result<Option<StructDef>, MemoryError> {
        let offsets = self.config.object_offsets.clone();
        let size = self.source.read_u32(object + offsets.properties_size)?;
        // A reflection type with no storage describes nothing worth keeping
        if size == 0 {
            return Ok(None);
        }

        let full_name = self.full_name(object)?;
        let short_name = sanitize_ident(&self.object_name(object)?);

        if let Some(seeded) = self.overrides.get(&full_name) {
            if seeded.short_name == short_name {
                debug!(name = %short_name, "using seeded definition");
                let mut s = seeded.clone();
                s.memory_address = object as u64;
                s.is_class = is_class;
                s.functions = self.build_functions(object)?;
                return Ok(Some(s));
            }
        }

        let mut s = StructDef {
            full_name,
            short_name,
            memory_address: object as u64,
            size,
            max_size: size,
            min_alignment: self.source.read_u32(object + offsets.min_alignment)?,
            is_class,
            ..StructDef::default()
        };

        let mut sup = self.source.read_ptr(object + offsets.super_ptr)?;
        while sup != 0 {
            s.super_names
                .push(sanitize_ident(&self.object_name(sup)?));
            sup = self.source.read_ptr(sup + offsets.super_ptr)?;
        }
        s.inherited = !s.super_names.is_empty();

        let mut prop = self.source.read_ptr(object + offsets.child_properties)?;
        while prop != 0 {
            match self.build_field(prop) {
                Ok(Some(field)) => s.defined_fields.push(field),
                Ok(None) => {}
                Err(err) => {
                    debug!(owner = %s.short_name, %err, "property chain ended early");
                    break;
                }
            }
            prop = self.source.read_ptr(prop + self.config.property_offsets.next)?;
        }
        // Reflection order is ascending in practice; the cook requires it
        s.defined_fields.sort_by_key(Field::sort_key);

        if let Some(patches) = self.overrides.member_patches(&s.full_name) {
            for patch in patches {
                if let Err(err) = crate::edit::insert_field(&mut s, patch.clone()) {
                    warn!(owner = %s.short_name, field = %patch.name, %err,
                        "member patch dropped");
                }
            }
        }

        s.functions = self.build_functions(object)?;
        Ok(Some(s))
    }

    fn build_field(&mut self, prop: usize) -> Result<Option<Field>, MemoryError> {
        let offsets = self.config.property_offsets.clone();
        let name_id = self.source.read_u32(prop + offsets.name_id)?;
        let name = sanitize_ident(&self.names.resolve(self.source, u64::from(name_id))?);

        let element_size = self.source.read_u32(prop + offsets.element_size)?;
        let array_dim = self.source.read_i32(prop + offsets.array_dim)?;
        let size = element_size.saturating_mul(array_dim.max(0) as u32);
        if size == 0 {
            debug!(field = %name, "zero-size property skipped");
            return Ok(None);
        }

        let ty = self.property_type(prop, 0)?;
        if ty.kind == PropertyKind::Unknown {
            debug!(field = %name, ty = %ty.name, "unsupported property kind skipped");
            return Ok(None);
        }

        let mut field = Field {
            name,
            offset: self.source.read_u32(prop + offsets.offset)?,
            size,
            array_count: array_dim,
            ty,
            is_bitfield: false,
            bit_position: 0,
            user_edited: false,
            missing: false,
        };

        if field.ty.kind == PropertyKind::BoolProperty {
            let mask = self.source.read_bytes(prop + offsets.byte_mask, 1)?[0];
            if mask != 0 && mask != 0xFF {
                field.is_bitfield = true;
                field.bit_position = mask.trailing_zeros() as u8;
                field.size = 1;
            }
        }
        Ok(Some(field))
    }

    /// Decode a property's declared type, following target pointers for
    /// entity-typed properties and inner properties for containers
    fn property_type(&mut self, prop: usize, depth: u32) -> Result<TypeDescriptor, MemoryError> {
        let offsets = self.config.property_offsets.clone();
        let class_ptr = self.source.read_ptr(prop + offsets.class_ptr)?;
        let class_name_id = self.source.read_u32(class_ptr + offsets.class_name)?;
        let class_name = self
            .names
            .resolve(self.source, u64::from(class_name_id))?;
        let kind = PropertyKind::from_name(&class_name);

        match kind {
            PropertyKind::ObjectProperty
            | PropertyKind::ClassProperty
            | PropertyKind::StructProperty
            | PropertyKind::EnumProperty
            | PropertyKind::WeakObjectProperty
            | PropertyKind::LazyObjectProperty
            | PropertyKind::SoftObjectProperty
            | PropertyKind::InterfaceProperty => {
                let target = self.source.read_ptr(prop + offsets.value)?;
                if target == 0 {
                    return Ok(TypeDescriptor::primitive(PropertyKind::Unknown, &class_name));
                }
                let name = sanitize_ident(&self.object_name(target)?);
                Ok(TypeDescriptor::resolvable(kind, &name))
            }

            PropertyKind::ArrayProperty
            | PropertyKind::SetProperty
            | PropertyKind::OptionalProperty
                if depth < MAX_SUBTYPE_DEPTH =>
            {
                let inner = self.source.read_ptr(prop + offsets.value)?;
                let mut ty = TypeDescriptor::primitive(kind, container_name(kind));
                if inner != 0 {
                    ty.subtypes.push(self.property_type(inner, depth + 1)?);
                }
                Ok(ty)
            }

            PropertyKind::MapProperty if depth < MAX_SUBTYPE_DEPTH => {
                let key = self.source.read_ptr(prop + offsets.value)?;
                let value = self.source.read_ptr(prop + offsets.value + 8)?;
                let mut ty = TypeDescriptor::primitive(kind, container_name(kind));
                if key != 0 {
                    ty.subtypes.push(self.property_type(key, depth + 1)?);
                }
                if value != 0 {
                    ty.subtypes.push(self.property_type(value, depth + 1)?);
                }
                Ok(ty)
            }

            _ => Ok(TypeDescriptor::primitive(kind, primitive_name(kind, &class_name))),
        }
    }

    fn build_enum(&mut self, object: usize) -> Result<Option<EnumDef>, MemoryError> {
        let offsets = self.config.enum_offsets.clone();
        let header = object + offsets.names_array;
        let data = self.source.read_ptr(header)?;
        let count = self.source.read_i32(header + 8)?;
        if data == 0 || count <= 0 {
            return Ok(None);
        }

        let mut members = Vec::new();
        let mut max_value: i64 = 0;
        for i in 0..count as usize {
            let pair = data + i * offsets.pair_stride;
            let name_id = self.source.read_u32(pair)?;
            let value = self.source.read_u64(pair + offsets.pair_value)? as i64;

            // The synthesized trailing _MAX member is not part of the enum
            // and must not widen the storage guess
            if i + 1 < count as usize && value > max_value {
                max_value = value;
            }
            let name = sanitize_ident(&self.names.resolve(self.source, u64::from(name_id))?);
            if !name.ends_with("_MAX") {
                members.push((name, value));
            }
        }

        Ok(Some(EnumDef {
            full_name: self.full_name(object)?,
            short_name: sanitize_ident(&self.object_name(object)?),
            memory_address: object as u64,
            storage: EnumWidth::for_max_value(max_value.max(0) as u64),
            members,
            ..EnumDef::default()
        }))
    }

    fn build_functions(&mut self, object: usize) -> Result<Vec<FunctionDef>, MemoryError> {
        let offsets = self.config.object_offsets.clone();
        let mut functions = Vec::new();

        let mut child = self.source.read_ptr(object + offsets.children)?;
        while child != 0 {
            if self.object_kind_is_function(child)? {
                match self.build_function(child) {
                    Ok(func) => functions.push(func),
                    Err(err) => debug!(%err, "skipping unreadable function"),
                }
            }
            child = self.source.read_ptr(child + offsets.field_next)?;
        }
        Ok(functions)
    }

    fn object_kind_is_function(&mut self, object: usize) -> Result<bool, MemoryError> {
        let class = self
            .source
            .read_ptr(object + self.config.object_offsets.class_ptr)?;
        if class == 0 {
            return Ok(false);
        }
        Ok(self.object_name(class)? == "Function")
    }

    fn build_function(&mut self, object: usize) -> Result<FunctionDef, MemoryError> {
        let offsets = self.config.function_offsets.clone();
        let flags = self.source.read_u64(object + offsets.flags)?;
        let exec = self.source.read_ptr(object + offsets.exec)?;

        let mut func = FunctionDef {
            full_name: self.full_name(object)?,
            short_name: sanitize_ident(&self.object_name(object)?),
            flags: format!("{flags:#x}"),
            binary_offset: exec.saturating_sub(self.source.base_address()) as u64,
            return_type: TypeDescriptor::primitive(PropertyKind::Unknown, "void"),
            params: Vec::new(),
            index_in_owner: 0,
        };

        let mut prop = self
            .source
            .read_ptr(object + self.config.object_offsets.child_properties)?;
        while prop != 0 {
            let prop_flags = self
                .source
                .read_u64(prop + self.config.property_offsets.prop_flags)?;
            if prop_flags & FLAG_PARAM != 0 {
                let name_id = self
                    .source
                    .read_u32(prop + self.config.property_offsets.name_id)?;
                let name =
                    sanitize_ident(&self.names.resolve(self.source, u64::from(name_id))?);
                let array_dim = self
                    .source
                    .read_i32(prop + self.config.property_offsets.array_dim)?;
                let ty = self.property_type(prop, 0)?;

                if prop_flags & FLAG_RETURN_PARAM != 0 {
                    func.return_type = ty;
                } else {
                    func.params.push(Param {
                        ty,
                        name,
                        flags: prop_flags,
                        array_count: array_dim,
                    });
                }
            }
            prop = self
                .source
                .read_ptr(prop + self.config.property_offsets.next)?;
        }
        Ok(func)
    }
}

fn container_name(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::ArrayProperty => "TArray",
        PropertyKind::SetProperty => "TSet",
        PropertyKind::MapProperty => "TMap",
        PropertyKind::OptionalProperty => "TOptional",
        _ => "unknown",
    }
}

fn primitive_name(kind: PropertyKind, class_name: &str) -> &str {
    match kind {
        PropertyKind::ByteProperty => "uint8",
        PropertyKind::BoolProperty => "bool",
        PropertyKind::IntProperty => "int32",
        PropertyKind::FloatProperty => "float",
        PropertyKind::DoubleProperty => "double",
        PropertyKind::UInt64Property => "uint64",
        PropertyKind::UInt32Property => "uint32",
        PropertyKind::UInt16Property => "uint16",
        PropertyKind::Int64Property => "int64",
        PropertyKind::Int16Property => "int16",
        PropertyKind::Int8Property => "int8",
        PropertyKind::NameProperty => "FName",
        PropertyKind::StrProperty => "FString",
        PropertyKind::TextProperty => "FText",
        PropertyKind::DelegateProperty => "FScriptDelegate",
        PropertyKind::MulticastDelegateProperty => "FMulticastScriptDelegate",
        PropertyKind::FieldPathProperty => "FFieldPath",
        _ => class_name,
    }
}
