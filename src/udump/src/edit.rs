//! Field insertion and struct definition overrides
//!
//! The editing surface for user- or tool-driven corrections after a
//! generation run. Insertion validates a candidate against the owning
//! struct's bounds and existing fields, keeps `defined_fields` sorted by
//! `(offset, bit_position)`, and never cooks implicitly - callers re-run
//! layout cooking after a successful insert.

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

use crate::model::{EnumDef, Field, StructDef};

/// Why a candidate field was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InsertError {
    #[error("offset {offset:#x} is below the inherited base {base:#x}")]
    BelowInheritedBase { offset: u32, base: u32 },
    #[error("offset {offset:#x} is beyond the struct size {max_size:#x}")]
    OffsetBeyondStruct { offset: u32, max_size: u32 },
    #[error("field ends at {end:#x}, beyond the struct size {max_size:#x}")]
    EndBeyondStruct { end: u32, max_size: u32 },
    #[error("field size {size:#x} exceeds the unique region {unique:#x}")]
    LargerThanUniqueRegion { size: u32, unique: u32 },
    #[error("field {offset:#x}..{end:#x} overlaps the field at {existing:#x}")]
    Overlap { offset: u32, end: u32, existing: u32 },
    #[error("overwrite attempt at offset {offset:#x}")]
    Overwrite { offset: u32 },
}

/// Insert a candidate field into a struct's defined fields.
///
/// An exact offset collision is accepted only when both the candidate and
/// the existing field are bitfields with different bit positions; ordering
/// within the shared byte is by ascending bit position.
pub fn insert_field(s: &mut StructDef, field: Field) -> Result<(), InsertError> {
    let base = s.inherited_size;
    if field.offset < base {
        return Err(InsertError::BelowInheritedBase {
            offset: field.offset,
            base,
        });
    }
    if field.offset > s.max_size {
        return Err(InsertError::OffsetBeyondStruct {
            offset: field.offset,
            max_size: s.max_size,
        });
    }
    let end = field.offset + field.size;
    if end > s.max_size {
        return Err(InsertError::EndBeyondStruct {
            end,
            max_size: s.max_size,
        });
    }
    if field.size > s.unique_size() {
        return Err(InsertError::LargerThanUniqueRegion {
            size: field.size,
            unique: s.unique_size(),
        });
    }

    let mut insert_at = s.defined_fields.len();
    for (i, existing) in s.defined_fields.iter().enumerate() {
        if field.offset < existing.offset {
            if end > existing.offset {
                return Err(InsertError::Overlap {
                    offset: field.offset,
                    end,
                    existing: existing.offset,
                });
            }
            insert_at = i;
            break;
        }
        if field.offset == existing.offset {
            if !field.is_bitfield || !existing.is_bitfield {
                return Err(InsertError::Overwrite {
                    offset: field.offset,
                });
            }
            if field.bit_position == existing.bit_position {
                return Err(InsertError::Overwrite {
                    offset: field.offset,
                });
            }
            if field.bit_position < existing.bit_position {
                insert_at = i;
                break;
            }
            // A higher bit position sorts after; keep scanning.
        }
    }

    s.defined_fields.insert(insert_at, field);
    Ok(())
}

/// Known-correct struct definitions applied before generation begins.
///
/// Keyed by full name; the first definition registered for a name wins.
/// During generation, an entity whose full name has an override takes the
/// override's fields and sizes instead of whatever the foreign type system
/// reports.
#[derive(Debug, Default)]
pub struct Overrides {
    structs: HashMap<String, StructDef>,
    custom: Vec<StructDef>,
    custom_enums: Vec<EnumDef>,
    member_patches: HashMap<String, Vec<Field>>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an override. Returns `false` (and keeps the original) when
    /// the full name already has one.
    pub fn add(&mut self, s: StructDef) -> bool {
        if self.structs.contains_key(&s.full_name) {
            warn!(name = %s.full_name, "duplicate struct override ignored");
            return false;
        }
        self.structs.insert(s.full_name.clone(), s);
        true
    }

    pub fn get(&self, full_name: &str) -> Option<&StructDef> {
        self.structs.get(full_name)
    }

    /// Add a hand-written type with no counterpart in the foreign type
    /// system; these land in the reserved seed package.
    pub fn add_custom(&mut self, s: StructDef) {
        self.custom.push(s);
    }

    pub fn custom(&self) -> &[StructDef] {
        &self.custom
    }

    /// Add a hand-written enum; lands in the reserved seed package
    pub fn add_custom_enum(&mut self, e: EnumDef) {
        self.custom_enums.push(e);
    }

    pub fn custom_enums(&self) -> &[EnumDef] {
        &self.custom_enums
    }

    /// Register known-correct members for a generated struct. Patches are
    /// applied through [`insert_field`] right after the struct is built,
    /// before the resolver passes; a patch the struct cannot hold is
    /// dropped with a warning rather than failing the run.
    pub fn override_members(&mut self, full_name: &str, fields: Vec<Field>) {
        self.member_patches
            .entry(full_name.to_string())
            .or_default()
            .extend(fields);
    }

    pub fn member_patches(&self, full_name: &str) -> Option<&[Field]> {
        self.member_patches.get(full_name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bitfield, field, plain_struct};

    #[test]
    fn test_rejects_offset_below_inherited_base() {
        let mut s = plain_struct("FChild", 0x40);
        s.inherited = true;
        s.inherited_size = 0x20;

        let err = insert_field(&mut s, field("bad", 0x10, 4)).unwrap_err();
        assert_eq!(
            err,
            InsertError::BelowInheritedBase {
                offset: 0x10,
                base: 0x20
            }
        );
        assert!(s.defined_fields.is_empty());
    }

    #[test]
    fn test_rejects_out_of_bounds() {
        let mut s = plain_struct("FSmall", 0x10);

        assert_eq!(
            insert_field(&mut s, field("past", 0x20, 4)).unwrap_err(),
            InsertError::OffsetBeyondStruct {
                offset: 0x20,
                max_size: 0x10
            }
        );
        assert_eq!(
            insert_field(&mut s, field("tail", 0xC, 8)).unwrap_err(),
            InsertError::EndBeyondStruct {
                end: 0x14,
                max_size: 0x10
            }
        );
        assert!(s.defined_fields.is_empty());
    }

    #[test]
    fn test_bounds_checks_run_in_order() {
        let mut s = plain_struct("FChild", 0x40);
        s.inherited = true;
        s.inherited_size = 0x38;

        // Both below-base and too-wide; the base check wins
        assert_eq!(
            insert_field(&mut s, field("wide", 0x10, 0x40)).unwrap_err(),
            InsertError::BelowInheritedBase {
                offset: 0x10,
                base: 0x38
            }
        );
        // In bounds from the base, but spills past the end
        assert_eq!(
            insert_field(&mut s, field("tail", 0x38, 0x10)).unwrap_err(),
            InsertError::EndBeyondStruct {
                end: 0x48,
                max_size: 0x40
            }
        );
        assert!(s.defined_fields.is_empty());
    }

    #[test]
    fn test_insert_keeps_sorted_order() {
        let mut s = plain_struct("FThing", 0x20);
        insert_field(&mut s, field("b", 0x10, 4)).unwrap();
        insert_field(&mut s, field("a", 0x0, 4)).unwrap();
        insert_field(&mut s, field("c", 0x18, 4)).unwrap();

        let names: Vec<&str> = s.defined_fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rejects_overlap_with_following_field() {
        let mut s = plain_struct("FThing", 0x20);
        insert_field(&mut s, field("b", 0x8, 4)).unwrap();

        let err = insert_field(&mut s, field("a", 0x6, 4)).unwrap_err();
        assert_eq!(
            err,
            InsertError::Overlap {
                offset: 0x6,
                end: 0xA,
                existing: 0x8
            }
        );
        assert_eq!(s.defined_fields.len(), 1);
    }

    #[test]
    fn test_same_offset_requires_distinct_bitfields() {
        let mut s = plain_struct("FFlags", 0x10);
        insert_field(&mut s, field("plain", 0x0, 4)).unwrap();

        assert_eq!(
            insert_field(&mut s, field("again", 0x0, 4)).unwrap_err(),
            InsertError::Overwrite { offset: 0 }
        );

        insert_field(&mut s, bitfield("b3", 0x8, 3)).unwrap();
        assert_eq!(
            insert_field(&mut s, field("byte", 0x8, 1)).unwrap_err(),
            InsertError::Overwrite { offset: 0x8 }
        );
        assert_eq!(
            insert_field(&mut s, bitfield("b3_again", 0x8, 3)).unwrap_err(),
            InsertError::Overwrite { offset: 0x8 }
        );
    }

    #[test]
    fn test_bitfields_order_by_bit_position() {
        let mut s = plain_struct("FFlags", 0x10);
        insert_field(&mut s, bitfield("b5", 0x4, 5)).unwrap();
        insert_field(&mut s, bitfield("b1", 0x4, 1)).unwrap();
        insert_field(&mut s, bitfield("b3", 0x4, 3)).unwrap();

        let bits: Vec<u8> = s.defined_fields.iter().map(|f| f.bit_position).collect();
        assert_eq!(bits, vec![1, 3, 5]);
    }

    #[test]
    fn test_member_patches_accumulate_per_struct() {
        let mut overrides = Overrides::new();
        overrides.override_members("Game.APlayer", vec![field("Mana", 0x40, 4)]);
        overrides.override_members("Game.APlayer", vec![field("Stamina", 0x44, 4)]);

        let patches = overrides.member_patches("Game.APlayer").unwrap();
        assert_eq!(patches.len(), 2);
        assert!(overrides.member_patches("Game.AOther").is_none());
    }

    #[test]
    fn test_overrides_first_definition_wins() {
        let mut overrides = Overrides::new();
        let mut a = plain_struct("FPlayer", 0x80);
        a.full_name = "/Game/FPlayer".into();
        let mut b = plain_struct("FPlayer", 0x100);
        b.full_name = "/Game/FPlayer".into();

        assert!(overrides.add(a));
        assert!(!overrides.add(b));
        let kept = overrides.get("/Game/FPlayer").unwrap();
        assert_eq!(kept.max_size, 0x80);
    }
}
