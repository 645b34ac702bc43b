//! Cross-reference resolution
//!
//! Three ordered passes over all packages, run only once every package's
//! raw entities exist (handles taken earlier would dangle as the vectors
//! grow):
//!
//! 1. **Registration** - assign handles, register every struct, class,
//!    enum and function by short name with first-writer-wins collision
//!    renaming, and normalize zero-size non-class structs to one byte.
//! 2. **Linking** - resolve super names, record super/subclass edges and
//!    package dependencies, strip trailing ancestor padding, resolve field
//!    and function type descriptors, downgrade fields typed with an
//!    ambiguous duplicated name, and accumulate enum width evidence.
//! 3. **Finalization** - correct enum storage widths from the accumulated
//!    evidence, then cook every struct and class layout.
//!
//! Results do not depend on package iteration order beyond the documented
//! first-writer-wins rule: super shrinking takes the minimum first-member
//! offset over all subclasses before any size is raised, the raise to the
//! primary super repeats until sizes stop changing, and enum width
//! evidence is the maximum observed element size.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::layout::{cook_struct, LayoutContext};
use crate::model::{
    lookup_enum_mut, lookup_struct, lookup_struct_mut, EntityRef, EnumWidth, Package,
    PropertyKind, StructDef, TypeDescriptor, TYPE_UINT8,
};
use crate::progress::{Cancelled, Progress};
use crate::registry::{RegisterOutcome, Registry};

/// Run all three passes and hand back the registry built in pass 1.
///
/// Cancellation unwinds between packages; already registered entities stay
/// valid, and the caller discards the partial run.
pub fn finish_packages(
    packages: &mut [Package],
    progress: &Progress,
) -> Result<Registry, Cancelled> {
    let mut registry = Registry::new();
    register_all(packages, &mut registry, progress)?;

    let mut enum_widths = HashMap::new();
    link_all(packages, &registry, &mut enum_widths, progress)?;

    finalize(packages, &registry, &enum_widths, progress)?;
    Ok(registry)
}

/// Handles to a package's structs and classes, classes first
fn package_struct_handles(package: &Package, index: usize) -> Vec<EntityRef> {
    let mut handles = Vec::with_capacity(package.classes.len() + package.structs.len());
    for j in 0..package.classes.len() {
        handles.push(EntityRef::Class {
            package: index,
            index: j,
        });
    }
    for j in 0..package.structs.len() {
        handles.push(EntityRef::Struct {
            package: index,
            index: j,
        });
    }
    handles
}

fn register_all(
    packages: &mut [Package],
    registry: &mut Registry,
    progress: &Progress,
) -> Result<(), Cancelled> {
    for (i, package) in packages.iter_mut().enumerate() {
        progress.check_cancelled()?;
        package.index = i;
        package.functions.clear();
        package.dependencies.clear();

        let Package {
            classes,
            structs,
            enums,
            functions,
            ..
        } = package;
        register_structs(classes, true, i, functions, registry);
        register_structs(structs, false, i, functions, registry);

        for (j, enu) in enums.iter_mut().enumerate() {
            enu.package_index = i;
            enu.index_in_package = j;
            let handle = EntityRef::Enum {
                package: i,
                index: j,
            };
            if let RegisterOutcome::Renamed(renamed) = registry.register(&enu.short_name, handle)
            {
                warn!(name = %enu.short_name, %renamed, "duplicate enum name");
                enu.short_name = renamed;
            }
        }
    }
    Ok(())
}

fn register_structs(
    structs: &mut [StructDef],
    is_class: bool,
    package: usize,
    functions: &mut Vec<EntityRef>,
    registry: &mut Registry,
) {
    for (j, s) in structs.iter_mut().enumerate() {
        s.package_index = package;
        s.index_in_package = j;
        s.supers.clear();
        s.subclasses.clear();
        s.inherited_size = 0;

        let handle = if is_class {
            EntityRef::Class { package, index: j }
        } else {
            EntityRef::Struct { package, index: j }
        };
        if let RegisterOutcome::Renamed(renamed) = registry.register(&s.short_name, handle) {
            warn!(name = %s.short_name, %renamed, "duplicate struct name");
            s.short_name = renamed;
        }

        for (k, func) in s.functions.iter_mut().enumerate() {
            func.index_in_owner = k;
            let handle = EntityRef::Function {
                package,
                owner: j,
                owner_is_class: is_class,
                index: k,
            };
            functions.push(handle);
            if let RegisterOutcome::Renamed(renamed) =
                registry.register(&func.short_name, handle)
            {
                func.short_name = renamed;
            }
        }

        // Empty non-class types still occupy one addressable byte
        if !s.is_class && s.max_size == 0 {
            s.size = 1;
            s.max_size = 1;
        }
    }
}

fn link_all(
    packages: &mut [Package],
    registry: &Registry,
    enum_widths: &mut HashMap<String, u32>,
    progress: &Progress,
) -> Result<(), Cancelled> {
    // Collect super edges and shrink evidence before mutating anything, so
    // no result depends on which package is visited first.
    let mut edges: Vec<(EntityRef, EntityRef)> = Vec::new();
    let mut first_member_offsets: HashMap<EntityRef, u32> = HashMap::new();
    for i in 0..packages.len() {
        progress.check_cancelled()?;
        for child in package_struct_handles(&packages[i], i) {
            let Some(s) = lookup_struct(packages, child) else {
                continue;
            };
            for name in &s.super_names {
                let Some(&sup) = registry.get(name) else {
                    continue;
                };
                if !sup.is_struct_or_class() {
                    continue;
                }
                edges.push((child, sup));
                if let Some(first) = s.defined_fields.first() {
                    first_member_offsets
                        .entry(sup)
                        .and_modify(|min| *min = (*min).min(first.offset))
                        .or_insert(first.offset);
                }
            }
        }
    }

    for &(child, sup) in &edges {
        if let Some(s) = lookup_struct_mut(packages, child) {
            s.supers.push(sup);
        }
        if let Some(s) = lookup_struct_mut(packages, sup) {
            s.subclasses.push(child);
        }
        if sup.package() != child.package() {
            packages[child.package()].dependencies.insert(sup.package());
        }
    }

    // The reported size of a base type frequently includes trailing padding
    // that is not real ancestor state; the smallest first-member offset over
    // all subclasses bounds the true ancestor footprint. The shrink never
    // undercuts the ancestor's own defined fields, so the cooked layout
    // stays within `max_size` even when the evidence conflicts.
    for (&sup, &min_offset) in &first_member_offsets {
        if let Some(s) = lookup_struct_mut(packages, sup) {
            let own_extent = s
                .defined_fields
                .iter()
                .map(|f| f.offset + f.size)
                .max()
                .unwrap_or(0);
            if min_offset < own_extent {
                warn!(name = %s.short_name, min_offset, own_extent,
                    "subclass member starts inside ancestor fields; keeping ancestor extent");
            }
            let target = min_offset.max(own_extent);
            if target < s.max_size {
                debug!(name = %s.short_name, from = s.max_size, to = target,
                    "shrinking ancestor to first subclass member");
                s.max_size = target;
            }
        }
    }

    // A struct can never be smaller than its primary super. Chains can be
    // arbitrarily deep and arrive in any package order, so the raise
    // repeats until sizes stop changing; sizes only grow, so the sweep
    // terminates.
    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..packages.len() {
            for child in package_struct_handles(&packages[i], i) {
                let primary = match lookup_struct(packages, child) {
                    Some(s) => match s.supers.first() {
                        Some(&p) => p,
                        None => continue,
                    },
                    None => continue,
                };
                let Some(primary_max) = lookup_struct(packages, primary).map(|p| p.max_size)
                else {
                    continue;
                };
                if let Some(s) = lookup_struct_mut(packages, child) {
                    if primary_max > s.max_size {
                        s.max_size = primary_max;
                        s.size = primary_max;
                        changed = true;
                    }
                    if s.inherited_size != primary_max {
                        s.inherited_size = primary_max;
                        changed = true;
                    }
                }
            }
        }
    }

    // Field and function type resolution
    for i in 0..packages.len() {
        progress.check_cancelled()?;
        let mut deps: BTreeSet<usize> = BTreeSet::new();
        for handle in package_struct_handles(&packages[i], i) {
            let Some(s) = lookup_struct_mut(packages, handle) else {
                continue;
            };

            for var in &mut s.defined_fields {
                if var.ty.kind == PropertyKind::EnumProperty {
                    let element = if var.array_count > 0 {
                        var.size / var.array_count as u32
                    } else {
                        var.size
                    };
                    enum_widths
                        .entry(var.ty.name.clone())
                        .and_modify(|max| *max = (*max).max(element))
                        .or_insert(element);
                }

                if !var.ty.resolvable {
                    continue;
                }
                if registry.is_duplicated(&var.ty.name) {
                    // Which duplicate the field meant cannot be recovered;
                    // keep the bytes, drop the type.
                    warn!(field = %var.name, ty = %var.ty.name,
                        "field references a duplicated name, downgrading to bytes");
                    var.name = format!("{}_unk_{}", var.name, var.ty.name);
                    var.array_count = var.size as i32;
                    var.ty = TypeDescriptor::primitive(PropertyKind::ByteProperty, TYPE_UINT8);
                    continue;
                }
                resolve_descriptor(&mut var.ty, registry, i, &mut deps);
            }

            for func in &mut s.functions {
                resolve_descriptor(&mut func.return_type, registry, i, &mut deps);
                for param in &mut func.params {
                    resolve_descriptor(&mut param.ty, registry, i, &mut deps);
                }
            }
        }
        packages[i].dependencies.extend(deps);
    }

    Ok(())
}

/// Attach registry entries to a descriptor and its subtypes, recording a
/// package dependency for every resolution that crosses packages. Pointer
/// subtypes do not force the target package to be materialized first, so
/// they add no edge.
fn resolve_descriptor(
    ty: &mut TypeDescriptor,
    registry: &Registry,
    package: usize,
    deps: &mut BTreeSet<usize>,
) {
    if !ty.resolvable {
        return;
    }
    let Some(&info) = registry.get(&ty.name) else {
        return;
    };
    ty.resolved = Some(info);
    if info.package() != package {
        deps.insert(info.package());
    }

    for subtype in &mut ty.subtypes {
        if !subtype.resolvable {
            continue;
        }
        let Some(&sub_info) = registry.get(&subtype.name) else {
            continue;
        };
        subtype.resolved = Some(sub_info);
        if !subtype.kind.is_pointer() && sub_info.package() != package {
            deps.insert(sub_info.package());
        }
    }
}

fn finalize(
    packages: &mut [Package],
    registry: &Registry,
    enum_widths: &HashMap<String, u32>,
    progress: &Progress,
) -> Result<(), Cancelled> {
    // Field usage is authoritative for enum storage width; the declared
    // maximum value is only a guess.
    for (name, &bytes) in enum_widths {
        let Some(&handle) = registry.get(name) else {
            continue;
        };
        if let Some(enu) = lookup_enum_mut(packages, handle) {
            let corrected = EnumWidth::for_storage_size(bytes);
            if corrected != enu.storage {
                debug!(name = %enu.short_name, ?corrected, "correcting enum width from field usage");
            }
            enu.storage = corrected;
        }
    }

    // Every max_size is now fixed; cook with a consistent size snapshot
    let ctx = LayoutContext::snapshot(packages, registry);
    for package in packages.iter_mut() {
        progress.check_cancelled()?;
        for s in &mut package.structs {
            cook_struct(s, &ctx);
        }
        for c in &mut package.classes {
            cook_struct(c, &ctx);
        }
        progress.advance(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnumDef, Field};
    use crate::testutil::{field, plain_struct};

    fn resolvable_field(name: &str, offset: u32, size: u32, ty: &str) -> Field {
        let mut f = field(name, offset, size);
        f.ty = TypeDescriptor::resolvable(PropertyKind::StructProperty, ty);
        f
    }

    #[test]
    fn test_collision_renames_and_downgrades_referencing_fields() {
        let mut first = Package::named("PackA");
        first.structs.push(plain_struct("FShared", 0x10));

        let mut second = Package::named("PackB");
        second.structs.push(plain_struct("FShared", 0x20));

        let mut third = Package::named("PackC");
        let mut user = plain_struct("FUser", 0x20);
        user.defined_fields
            .push(resolvable_field("shared", 0, 0x10, "FShared"));
        third.structs.push(user);

        let mut packages = vec![first, second, third];
        let progress = Progress::new();
        let registry = finish_packages(&mut packages, &progress).unwrap();

        assert!(registry.get("FShared").is_some());
        assert!(registry.get("FShareddup_0").is_some());
        assert!(registry.is_duplicated("FShared"));
        assert_eq!(packages[1].structs[0].short_name, "FShareddup_0");

        let downgraded = &packages[2].structs[0].defined_fields[0];
        assert!(!downgraded.ty.resolvable);
        assert_eq!(downgraded.ty.name, TYPE_UINT8);
        assert_eq!(downgraded.array_count, 0x10);
        assert_eq!(downgraded.size, 0x10);
        assert!(downgraded.name.contains("FShared"));
    }

    #[test]
    fn test_enum_width_corrected_from_field_usage() {
        let mut package = Package::named("Game");
        package.enums.push(EnumDef {
            full_name: "/Game/ETeam".into(),
            short_name: "ETeam".into(),
            storage: EnumWidth::for_max_value(200),
            members: vec![("Red".into(), 0), ("Max".into(), 200)],
            ..EnumDef::default()
        });

        let mut user = plain_struct("FMatch", 0x10);
        let mut f = field("team", 0, 4);
        f.ty = TypeDescriptor::resolvable(PropertyKind::EnumProperty, "ETeam");
        user.defined_fields.push(f);
        package.structs.push(user);

        let mut packages = vec![package];
        let progress = Progress::new();
        finish_packages(&mut packages, &progress).unwrap();

        assert_eq!(packages[0].enums[0].storage, EnumWidth::U32);
    }

    #[test]
    fn test_super_resolution_shrinks_and_links() {
        let mut core = Package::named("Core");
        core.classes.push({
            let mut base = plain_struct("UBase", 0x30);
            base.is_class = true;
            base
        });

        let mut game = Package::named("Game");
        let mut child = plain_struct("UChild", 0x40);
        child.is_class = true;
        child.inherited = true;
        child.super_names = vec!["UBase".into()];
        child.defined_fields.push(field("health", 0x28, 4));
        game.classes.push(child);

        let mut packages = vec![core, game];
        let progress = Progress::new();
        finish_packages(&mut packages, &progress).unwrap();

        // Trailing padding stripped down to the subclass's first member
        assert_eq!(packages[0].classes[0].max_size, 0x28);
        assert_eq!(packages[1].classes[0].inherited_size, 0x28);
        assert_eq!(packages[0].classes[0].subclasses.len(), 1);
        assert_eq!(
            packages[1].classes[0].supers,
            vec![EntityRef::Class {
                package: 0,
                index: 0
            }]
        );
        // The subclass depends on the package owning its super
        assert!(packages[1].dependencies.contains(&0));
    }

    #[test]
    fn test_shrink_takes_minimum_over_all_subclasses() {
        let mut pack = Package::named("Game");
        let mut base = plain_struct("UBase", 0x50);
        base.is_class = true;
        pack.classes.push(base);

        for (name, first_offset) in [("UChildA", 0x40), ("UChildB", 0x30)] {
            let mut child = plain_struct(name, 0x60);
            child.is_class = true;
            child.inherited = true;
            child.super_names = vec!["UBase".into()];
            child.defined_fields.push(field("f", first_offset, 4));
            pack.classes.push(child);
        }

        let mut packages = vec![pack];
        finish_packages(&mut packages, &Progress::new()).unwrap();

        assert_eq!(packages[0].classes[0].max_size, 0x30);
        assert_eq!(packages[0].classes[1].inherited_size, 0x30);
        assert_eq!(packages[0].classes[2].inherited_size, 0x30);
    }

    #[test]
    fn test_raise_propagates_through_undersized_chain() {
        // ULeaf (0x8) inherits UMid (0x10) inherits UBase (0x30), with the
        // base in a package visited after its descendants; every link must
        // still end at the base's size
        let mut game = Package::named("Game");
        for (name, size, sup) in [("ULeaf", 0x8, "UMid"), ("UMid", 0x10, "UBase")] {
            let mut c = plain_struct(name, size);
            c.is_class = true;
            c.inherited = true;
            c.super_names = vec![sup.into()];
            game.classes.push(c);
        }

        let mut core = Package::named("Core");
        let mut base = plain_struct("UBase", 0x30);
        base.is_class = true;
        core.classes.push(base);

        let mut packages = vec![game, core];
        finish_packages(&mut packages, &Progress::new()).unwrap();

        let mid = &packages[0].classes[1];
        assert_eq!(mid.max_size, 0x30);
        let leaf = &packages[0].classes[0];
        assert_eq!(leaf.max_size, 0x30);
        assert_eq!(leaf.inherited_size, 0x30);
    }

    #[test]
    fn test_shrink_floors_at_ancestor_field_extent() {
        let mut pack = Package::named("Game");
        let mut base = plain_struct("UBase", 0x20);
        base.is_class = true;
        base.defined_fields.push(field("head", 0x0, 0x18));
        pack.classes.push(base);

        let mut child = plain_struct("UChild", 0x40);
        child.is_class = true;
        child.inherited = true;
        child.super_names = vec!["UBase".into()];
        child.defined_fields.push(field("f", 0x10, 4));
        pack.classes.push(child);

        let mut packages = vec![pack];
        finish_packages(&mut packages, &Progress::new()).unwrap();

        // The subclass member at 0x10 starts inside the ancestor's own
        // field (0x0..0x18); the field extent wins, and the cooked layout
        // stays inside max_size
        let base = &packages[0].classes[0];
        assert_eq!(base.max_size, 0x18);
        assert!(base.synthetic_fields.is_empty());
        assert_eq!(base.cooked.len(), 1);
    }

    #[test]
    fn test_struct_raised_to_primary_super_size() {
        let mut pack = Package::named("Game");
        let mut base = plain_struct("UBase", 0x20);
        base.is_class = true;
        pack.classes.push(base);

        let mut broken = plain_struct("UBroken", 0x8);
        broken.is_class = true;
        broken.inherited = true;
        broken.super_names = vec!["UBase".into()];
        pack.classes.push(broken);

        let mut packages = vec![pack];
        finish_packages(&mut packages, &Progress::new()).unwrap();

        assert_eq!(packages[0].classes[1].max_size, 0x20);
        assert_eq!(packages[0].classes[1].size, 0x20);
    }

    #[test]
    fn test_zero_size_struct_normalized() {
        let mut pack = Package::named("Game");
        pack.structs.push(plain_struct("FEmpty", 0));

        let mut packages = vec![pack];
        finish_packages(&mut packages, &Progress::new()).unwrap();

        assert_eq!(packages[0].structs[0].max_size, 1);
        assert_eq!(packages[0].structs[0].size, 1);
    }

    #[test]
    fn test_cancellation_unwinds() {
        let mut pack = Package::named("Game");
        pack.structs.push(plain_struct("FThing", 0x10));
        let mut packages = vec![pack];

        let progress = Progress::new();
        progress.cancel();
        let err = finish_packages(&mut packages, &progress).unwrap_err();
        assert_eq!(err, Cancelled);
    }

    #[test]
    fn test_all_layouts_cooked_after_passes() {
        let mut pack = Package::named("Game");
        let mut s = plain_struct("FGapped", 0x20);
        s.defined_fields.push(field("a", 0x8, 4));
        pack.structs.push(s);

        let mut packages = vec![pack];
        finish_packages(&mut packages, &Progress::new()).unwrap();

        let cooked = &packages[0].structs[0];
        assert!(!cooked.cooked.is_empty());
        assert_eq!(cooked.synthetic_fields.len(), 2);
    }
}
