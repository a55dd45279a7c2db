//! Post-install setup driven by a `pkglink.yaml` shipped in the linked directory.
//!
//! ```yaml
//! symlinks:
//!   - source: configs/.editorconfig
//!     target: .editorconfig
//! ```

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PkglinkError, Result};
use crate::link::{LinkManager, LinkOutcome, SymlinkStyle};
use crate::runtime::{Runtime, is_path_under, resolve_relative_path};

pub const MANIFEST_FILE: &str = "pkglink.yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SetupManifest {
    #[serde(default)]
    pub symlinks: Vec<SymlinkSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SymlinkSpec {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupLink {
    pub source: PathBuf,
    pub target: PathBuf,
    pub outcome: LinkOutcome,
}

pub fn manifest_path(linked_dir: &Path) -> PathBuf {
    linked_dir.join(MANIFEST_FILE)
}

/// Read the manifest. `None` when the linked directory has none.
pub fn load_manifest<R: Runtime + ?Sized>(
    runtime: &R,
    linked_dir: &Path,
) -> Result<Option<SetupManifest>> {
    let path = manifest_path(linked_dir);
    if !runtime.exists(&path) {
        return Ok(None);
    }

    let content = runtime
        .read_to_string(&path)
        .map_err(|e| PkglinkError::SetupFailed(format!("cannot read {:?}: {:#}", path, e)))?;
    if content.trim().is_empty() {
        return Ok(Some(SetupManifest::default()));
    }

    let manifest: SetupManifest = serde_yaml::from_str(&content)
        .map_err(|e| PkglinkError::SetupFailed(format!("invalid {:?}: {}", path, e)))?;
    Ok(Some(manifest))
}

/// Create the links listed in `linked_dir/pkglink.yaml`.
///
/// Sources resolve against `linked_dir`, targets against `base_dir`. Links are
/// written relative so the project tree can be moved.
#[tracing::instrument(skip(runtime))]
pub fn run_post_install_setup<R: Runtime + ?Sized>(
    runtime: &R,
    linked_dir: &Path,
    base_dir: &Path,
    force: bool,
) -> Result<Vec<SetupLink>> {
    let Some(manifest) = load_manifest(runtime, linked_dir)? else {
        debug!("No {} in {:?}", MANIFEST_FILE, linked_dir);
        return Ok(Vec::new());
    };

    let manager = LinkManager::new(runtime).with_style(SymlinkStyle::Relative);
    let mut created = Vec::with_capacity(manifest.symlinks.len());

    for entry in &manifest.symlinks {
        let source = resolve_entry(linked_dir, &entry.source, "source")?;
        let target = resolve_entry(base_dir, &entry.target, "target")?;
        let expected_name = Path::new(entry.target.trim())
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let outcome = manager
            .reconcile(&source, &target, &expected_name, force)
            .map_err(|e| match e {
                PkglinkError::SourceNotFound(_)
                | PkglinkError::TargetAlreadyExists(_)
                | PkglinkError::UnsafeRemoval { .. } => e,
                other => PkglinkError::SetupFailed(other.to_string()),
            })?;
        info!("Setup link {:?} -> {:?}: {:?}", target, source, outcome);

        created.push(SetupLink {
            source,
            target,
            outcome,
        });
    }

    Ok(created)
}

fn resolve_entry(base: &Path, value: &str, field: &str) -> Result<PathBuf> {
    let relative = Path::new(value.trim());
    if value.trim().is_empty() || relative.is_absolute() {
        return Err(PkglinkError::SetupFailed(format!(
            "{} {:?} must be a non-empty relative path",
            field, value
        )));
    }

    let resolved = resolve_relative_path(base, relative);
    if !is_path_under(&resolved, base) {
        return Err(PkglinkError::SetupFailed(format!(
            "{} {:?} escapes {:?}",
            field, value, base
        )));
    }
    Ok(resolved)
}
