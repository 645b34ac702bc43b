//! Struct layout reconstruction
//!
//! Turns a struct's partial list of defined fields into a complete, gap-free
//! layout by generating synthetic filler for every byte or bit no defined
//! field accounts for. The cooked layout tiles `[inherited_size, max_size)`
//! at byte granularity; a storage byte shared by bitfields counts as covered
//! by the first field that claims it.
//!
//! Cooking is deterministic and idempotent: the synthetic-name counter
//! resets on every run and `defined_fields` is never touched - only
//! `synthetic_fields` and `cooked` are recomputed.

use std::collections::HashMap;

use tracing::warn;

use crate::model::{
    lookup_struct, CookedField, Field, Package, PropertyKind, StructDef, TypeDescriptor,
    TYPE_UINT8,
};
use crate::registry::Registry;

/// Immutable size snapshot used during cooking.
///
/// A field typed as another struct stores the size the foreign runtime
/// reported, which may include padding the resolver has since stripped from
/// the nested type. Cooking substitutes the nested type's final `max_size`
/// ("effective size") through this snapshot, taken after every `max_size`
/// is fixed - cooking itself never looks at another struct directly.
#[derive(Debug, Default)]
pub struct LayoutContext {
    sizes: HashMap<String, u32>,
}

impl LayoutContext {
    /// An empty context: every field keeps its reported size
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot the final sizes of every registered fixed-size struct/class
    pub fn snapshot(packages: &[Package], registry: &Registry) -> Self {
        let mut sizes = HashMap::new();
        for (name, &entity) in registry.entries() {
            if let Some(s) = lookup_struct(packages, entity) {
                if !s.no_fixed_size {
                    sizes.insert(name.clone(), s.max_size);
                }
            }
        }
        Self { sizes }
    }

    /// Size hint for tests and callers that know specific type sizes
    pub fn with_size(mut self, name: &str, size: u32) -> Self {
        self.sizes.insert(name.to_string(), size);
        self
    }

    /// A field's storage footprint after nested-type size substitution
    pub fn effective_size(&self, field: &Field) -> u32 {
        if field.is_bitfield {
            return field.size;
        }
        if field.ty.resolvable && !field.ty.kind.is_pointer() {
            if let Some(&size) = self.sizes.get(&field.ty.name) {
                return size * field.array_count.max(1) as u32;
            }
        }
        field.size
    }
}

/// Running state for one cook: the owner's synthetic fields and cooked
/// slots being rebuilt, plus the per-owner filler name counter.
struct Cooker<'a> {
    synthetic: &'a mut Vec<Field>,
    cooked: &'a mut Vec<CookedField>,
    counter: u32,
}

impl Cooker<'_> {
    /// Emit one synthetic field covering the byte range `[from, to)`
    fn unknown_bytes(&mut self, from: u32, to: u32) {
        let size = to - from;
        let field = Field {
            name: format!("UnknownData{:02}[0x{:X}]", self.counter, size),
            offset: from,
            size,
            array_count: 1,
            ty: TypeDescriptor::primitive(PropertyKind::ByteProperty, TYPE_UINT8),
            is_bitfield: false,
            bit_position: 0,
            user_edited: false,
            missing: true,
        };
        self.counter += 1;
        self.synthetic.push(field);
        self.cooked.push(CookedField::Synthetic {
            index: self.synthetic.len() - 1,
        });
    }

    /// Emit bit fillers from `(start_offset, start_bit)` up to (exclusive)
    /// `(end_offset, end_bit)`.
    ///
    /// A fully-skipped byte region is filled with one byte filler first,
    /// then the remaining leading bits of the end byte individually - never
    /// the reverse, because the first unknown byte of a multi-byte gap is
    /// claimed by the previous bitfield's storage byte unless the gap
    /// started at bit position zero.
    fn unknown_bits(&mut self, start: (u32, u8), end: (u32, u8)) {
        let (mut start_offset, mut start_bit) = start;
        let (end_offset, end_bit) = end;

        if end_offset < start_offset {
            return;
        }
        if end_offset == start_offset && start_bit >= end_bit {
            return;
        }

        if end_offset - start_offset > 1 {
            // A start bit of zero means the previous defined bit was the
            // eighth of its byte, so the whole start byte is unknown.
            let from = if start_bit == 0 {
                start_offset
            } else {
                start_offset + 1
            };
            self.unknown_bytes(from, end_offset);
            if end_bit == 0 {
                return;
            }
            start_offset = end_offset;
            start_bit = 0;
        }

        while (start_offset, start_bit) != (end_offset, end_bit) {
            let field = Field {
                name: format!("UnknownBit{:02}", self.counter),
                offset: start_offset,
                size: 1,
                array_count: 1,
                ty: TypeDescriptor::primitive(PropertyKind::ByteProperty, TYPE_UINT8),
                is_bitfield: true,
                bit_position: start_bit,
                user_edited: false,
                missing: true,
            };
            self.counter += 1;
            self.synthetic.push(field);
            self.cooked.push(CookedField::Synthetic {
                index: self.synthetic.len() - 1,
            });

            start_bit += 1;
            if start_bit >= 8 {
                start_bit = 0;
                start_offset += 1;
            }
        }
    }
}

/// Rebuild a struct's synthetic fields and cooked layout.
///
/// Preconditions (enforced at insertion time, not re-checked here):
/// `defined_fields` is sorted by `(offset, bit_position)` and free of
/// overlaps, and `inherited_size`/`max_size` are final.
pub fn cook_struct(s: &mut StructDef, ctx: &LayoutContext) {
    let synthetic = &mut s.synthetic_fields;
    let cooked = &mut s.cooked;
    synthetic.clear();
    cooked.clear();

    let base = s.inherited_size;
    if s.max_size <= base {
        return;
    }

    let mut cooker = Cooker {
        synthetic,
        cooked,
        counter: 0,
    };

    if s.defined_fields.is_empty() {
        cooker.unknown_bytes(base, s.max_size);
        return;
    }

    let first_offset = s.defined_fields[0].offset;
    if s.inherited {
        if base < first_offset {
            if base == 0 {
                // The immediate super cooked down to nothing even though
                // members start past offset zero; its field data was most
                // likely unreadable, and this layout inherits the damage.
                warn!(
                    name = %s.full_name,
                    "ancestor max size is zero; reconstructed layout may be shifted"
                );
            }
            cooker.unknown_bytes(base, first_offset);
        }
    } else if first_offset != 0 {
        cooker.unknown_bytes(0, first_offset);
    }

    for i in 0..s.defined_fields.len() - 1 {
        let current = &s.defined_fields[i];
        let next = &s.defined_fields[i + 1];

        if current.is_bitfield {
            cooker.cooked.push(CookedField::Defined {
                index: i,
                effective_size: current.size,
            });

            if next.is_bitfield {
                if next.offset == current.offset
                    && next.bit_position - current.bit_position > 1
                {
                    cooker.unknown_bits(
                        (current.offset, current.bit_position + 1),
                        (next.offset, next.bit_position),
                    );
                    continue;
                }
                if next.offset > current.offset {
                    // Bit position 8 is not a valid start state; roll over
                    // to the next byte instead.
                    let start = if current.bit_position == 7 {
                        (current.offset + 1, 0)
                    } else {
                        (current.offset, current.bit_position + 1)
                    };
                    cooker.unknown_bits(start, (next.offset, next.bit_position));
                    continue;
                }
            }
            // Next field is not adjacent to this bitfield's storage byte
            if next.offset - current.offset > 1 {
                cooker.unknown_bytes(current.offset + 1, next.offset);
            }
            continue;
        }

        let effective = ctx.effective_size(current);
        cooker.cooked.push(CookedField::Defined {
            index: i,
            effective_size: effective,
        });

        if next.offset > current.offset + effective {
            cooker.unknown_bytes(current.offset + effective, next.offset);
        }

        // A bitfield that starts above bit zero leaves leading unknown bits
        // in its storage byte
        if next.is_bitfield && next.bit_position > 0 {
            cooker.unknown_bits((next.offset, 0), (next.offset, next.bit_position));
        }
    }

    let last_index = s.defined_fields.len() - 1;
    let last = &s.defined_fields[last_index];
    let effective = ctx.effective_size(last);
    cooker.cooked.push(CookedField::Defined {
        index: last_index,
        effective_size: effective,
    });

    if last.offset + effective < s.max_size {
        cooker.unknown_bytes(last.offset + effective, s.max_size);
    }
}
