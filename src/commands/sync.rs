use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use crate::batch::run_batch;
use crate::config::{DEFAULT_CONFIG_FILE, load_contexts};
use crate::install::Installer;
use crate::runtime::Runtime;

use super::config::Config;
use super::report::print_reports;

/// Run every entry of a `pkglink.config.yaml` (or the named subset).
#[tracing::instrument(skip(runtime, config))]
pub fn sync<R: Runtime>(
    runtime: R,
    config_file: Option<PathBuf>,
    entries: &[String],
    dry_run: bool,
    config: Config,
) -> Result<()> {
    let path = match config_file {
        Some(path) if path.is_absolute() => path,
        Some(path) => config.base_dir.join(path),
        None => config.base_dir.join(DEFAULT_CONFIG_FILE),
    };

    let contexts = load_contexts(&runtime, &path, dry_run, entries)?;
    info!("Syncing {} link(s) from {:?}", contexts.len(), path);

    let installer = Installer::new(&runtime, config.cache_root.clone());
    let reports = run_batch(&runtime, &installer, &config.base_dir, contexts)
        .with_context(|| format!("Failed to sync {}", path.display()))?;

    print_reports(&reports);
    println!("Synced {} link(s).", reports.len());
    Ok(())
}
