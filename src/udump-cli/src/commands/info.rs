//! Info command - package and entity statistics of a project file

use std::path::Path;

use anyhow::{Context, Result};
use udump::{finish_packages, load_project, Progress};

pub fn handle(project_path: &Path) -> Result<()> {
    let mut project = load_project(project_path)
        .with_context(|| format!("Failed to open project: {}", project_path.display()))?;

    let registry = finish_packages(&mut project.packages, &Progress::new())
        .context("Failed to resolve project")?;

    println!("Target:           {}", project.settings.name);
    println!("Packages:         {}", project.packages.len());
    println!("Registry entries: {}", registry.len());
    println!("Cached names:     {}", project.name_cache.len());

    let duplicated: Vec<&String> = registry.duplicated_names().collect();
    if !duplicated.is_empty() {
        println!("Duplicated names: {}", duplicated.len());
    }

    println!();
    println!(
        "{:<32} {:>8} {:>8} {:>8} {:>8}",
        "Package", "Classes", "Structs", "Enums", "Deps"
    );
    for package in &project.packages {
        println!(
            "{:<32} {:>8} {:>8} {:>8} {:>8}",
            package.name,
            package.classes.len(),
            package.structs.len(),
            package.enums.len(),
            package.dependencies.len()
        );
    }

    Ok(())
}
