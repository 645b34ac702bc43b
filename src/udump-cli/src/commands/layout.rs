//! Layout command - print one struct's cooked layout

use std::path::Path;

use anyhow::{bail, Context, Result};
use udump::model::{lookup_struct, CookedField, Field, StructDef};
use udump::{finish_packages, load_project, Progress};

pub fn handle(project_path: &Path, name: &str) -> Result<()> {
    let mut project = load_project(project_path)
        .with_context(|| format!("Failed to open project: {}", project_path.display()))?;

    let registry = finish_packages(&mut project.packages, &Progress::new())
        .context("Failed to resolve project")?;

    let Some(&entity) = registry.get(name) else {
        bail!("No entity named '{}' in this project", name);
    };
    let Some(def) = lookup_struct(&project.packages, entity) else {
        bail!("'{}' is not a struct or class", name);
    };

    print_struct(def, &project.packages[entity.package()].name);
    Ok(())
}

fn print_struct(def: &StructDef, package: &str) {
    let kind = if def.is_class { "class" } else { "struct" };
    println!("{} {} ({}.{})", kind, def.short_name, package, def.full_name);
    if !def.super_names.is_empty() {
        println!("  supers: {}", def.super_names.join(", "));
    }
    println!(
        "  size {:#x}, max size {:#x}, inherited {:#x}, alignment {:#x}",
        def.size, def.max_size, def.inherited_size, def.min_alignment
    );
    println!();

    for slot in &def.cooked {
        match *slot {
            CookedField::Defined {
                index,
                effective_size,
            } => print_field(&def.defined_fields[index], effective_size),
            CookedField::Synthetic { index } => {
                let f = &def.synthetic_fields[index];
                print_field(f, f.size);
            }
        }
    }

    if !def.functions.is_empty() {
        println!();
        println!("  {} functions:", def.functions.len());
        for func in &def.functions {
            let params: Vec<String> = func
                .params
                .iter()
                .map(|p| format!("{} {}", p.ty.name, p.name))
                .collect();
            println!(
                "    {} {}({})  // {} at +{:#x}",
                func.return_type.name,
                func.short_name,
                params.join(", "),
                func.flags,
                func.binary_offset
            );
        }
    }
}

fn print_field(field: &Field, effective_size: u32) {
    let mut ty = field.ty.name.clone();
    if field.array_count > 1 {
        ty = format!("{}[{}]", ty, field.array_count);
    }

    if field.is_bitfield {
        println!(
            "  {:#06x}.{} {:<40} {} : 1",
            field.offset, field.bit_position, field.name, ty
        );
    } else {
        println!(
            "  {:#06x}   {:<40} {} ({:#x} bytes)",
            field.offset, field.name, ty, effective_size
        );
    }
}
