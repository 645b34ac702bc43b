//! Generate command - run a full generation against a memory dump

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use udump::{save_project, DumpSource, Generator, Progress, ProjectFile, RunStatus, TargetConfig};

pub fn handle(dump: &Path, base: usize, config_path: &Path, output: &Path) -> Result<()> {
    let config_text = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read target config: {}", config_path.display()))?;
    let config: TargetConfig = serde_json::from_str(&config_text)
        .with_context(|| format!("Failed to parse target config: {}", config_path.display()))?;

    let source = DumpSource::open(dump, base)
        .with_context(|| format!("Failed to open dump: {}", dump.display()))?;
    info!(dump = %dump.display(), bytes = source.len(), base = format_args!("{base:#x}"), "opened dump");

    println!(
        "Generating '{}' from {} ({} bytes at {:#x})",
        config.name,
        dump.display(),
        source.len(),
        base
    );

    let progress = Arc::new(Progress::new());
    let watcher = {
        let progress = Arc::clone(&progress);
        std::thread::spawn(move || loop {
            match progress.status() {
                RunStatus::NotStarted => {}
                RunStatus::Running => {
                    println!("  {} / {}", progress.completed(), progress.total());
                }
                RunStatus::Succeeded | RunStatus::Failed => break,
            }
            std::thread::sleep(Duration::from_millis(500));
        })
    };

    let result = Generator::new(&source, &config).run(&progress);
    let _ = watcher.join();
    let generated = result.context("Generation failed")?;

    println!(
        "Generated {} packages, {} registry entries, {} cached names",
        generated.packages.len(),
        generated.registry.len(),
        generated.name_cache.len()
    );

    let project = ProjectFile {
        settings: config,
        name_cache: generated.name_cache,
        packages: generated.packages,
        view_state: serde_json::Value::Null,
    };
    save_project(output, &project)
        .with_context(|| format!("Failed to write project: {}", output.display()))?;
    println!("Saved project to {}", output.display());

    Ok(())
}
