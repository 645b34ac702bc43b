//! Names command - dump the decoded name cache

use std::path::Path;

use anyhow::{Context, Result};
use udump::load_project;

pub fn handle(project_path: &Path, filter: Option<&str>) -> Result<()> {
    let project = load_project(project_path)
        .with_context(|| format!("Failed to open project: {}", project_path.display()))?;

    let mut entries: Vec<(&u64, &String)> = project
        .name_cache
        .iter()
        .filter(|(_, name)| filter.map_or(true, |f| name.contains(f)))
        .collect();
    entries.sort_by_key(|(id, _)| **id);

    for (id, name) in &entries {
        println!("{:>#12x}  {}", id, name);
    }
    println!("{} names", entries.len());

    Ok(())
}
