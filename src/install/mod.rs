//! Installer and cache.
//!
//! Remote sources are installed once into `{cache_root}/{name}_{key}` where
//! `key` is derived from the install string. Immutable sources are served
//! from that directory on later runs; mutable ones are refetched every time.

use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{PkglinkError, Result};
use crate::runtime::{Runtime, expand_home, path::normalize_path};
use crate::source::{SourceSpec, is_immutable};

mod strategy;

pub use strategy::InstallStrategy;

pub const CACHE_DIR_ENV: &str = "PKGLINK_CACHE_DIR";

/// First 8 hex chars of the SHA-256 of an install string.
pub fn cache_key(install_string: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(install_string.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

/// `PKGLINK_CACHE_DIR`, else `~/.cache/pkglink`. Always absolute.
pub fn default_cache_root<R: Runtime + ?Sized>(runtime: &R) -> Result<PathBuf> {
    if let Ok(dir) = runtime.env_var(CACHE_DIR_ENV)
        && !dir.trim().is_empty()
    {
        let expanded = expand_home(dir.trim(), runtime.home_dir().as_deref());
        return absolute_path(runtime, expanded);
    }

    let home = runtime.home_dir().ok_or_else(|| {
        PkglinkError::Config(format!(
            "Could not determine home directory; set {} instead",
            CACHE_DIR_ENV
        ))
    })?;
    Ok(home.join(".cache").join("pkglink"))
}

/// Anchor a relative path at the working directory.
///
/// Links point at paths under the cache root, so the root must not depend on
/// where the link itself lives.
pub fn absolute_path<R: Runtime + ?Sized>(runtime: &R, path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = runtime
        .current_dir()
        .map_err(|e| PkglinkError::io(format!("Failed to resolve {:?}", path), e))?;
    Ok(normalize_path(&cwd.join(path)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallMetadata {
    pub install_string: String,
    pub cache_key: Option<String>,
    pub from_cache: bool,
    pub force_reinstall: bool,
    pub strategy: Option<InstallStrategy>,
    pub dist_info: Option<String>,
    pub version: Option<String>,
}

pub struct Installer<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    cache_root: PathBuf,
    strategies: Vec<InstallStrategy>,
}

impl<'a, R: Runtime + ?Sized> Installer<'a, R> {
    pub fn new(runtime: &'a R, cache_root: PathBuf) -> Self {
        Self {
            runtime,
            cache_root,
            strategies: InstallStrategy::DEFAULT_CHAIN.to_vec(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<InstallStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Cache directory for a remote source; `None` for local paths.
    pub fn cache_dir_for(&self, spec: &SourceSpec) -> Option<PathBuf> {
        if spec.local_path().is_some() {
            return None;
        }
        let key = cache_key(&spec.install_string());
        Some(self.cache_root.join(format!("{}_{}", spec.name(), key)))
    }

    /// Resolve a source to a directory on disk, installing it if needed.
    #[tracing::instrument(skip(self), fields(source = %spec))]
    pub fn resolve(&self, spec: &SourceSpec) -> Result<(PathBuf, InstallMetadata)> {
        if let Some(path) = spec.local_path() {
            return self.resolve_local(path);
        }

        let install_string = spec.install_string();
        let key = cache_key(&install_string);
        let cache_dir = self.cache_root.join(format!("{}_{}", spec.name(), key));
        let immutable = is_immutable(spec);

        let mut metadata = InstallMetadata {
            install_string: install_string.clone(),
            cache_key: Some(key.clone()),
            ..Default::default()
        };

        let mut stale_remains = false;
        if self.runtime.exists(&cache_dir) {
            if immutable {
                info!("Using cached install of {} at {:?}", spec, cache_dir);
                metadata.from_cache = true;
                self.fill_dist_info(&mut metadata, &cache_dir, spec.name());
                return Ok((cache_dir, metadata));
            }

            info!("{} is mutable, refreshing cache at {:?}", spec, cache_dir);
            if let Err(e) = self.runtime.remove_dir_all(&cache_dir) {
                warn!(
                    "Failed to remove stale cache {:?}: {:#}; retrying before commit",
                    cache_dir, e
                );
                stale_remains = true;
            }
        }

        let force_reinstall = !immutable;
        metadata.force_reinstall = force_reinstall;

        self.runtime
            .create_dir_all(&self.cache_root)
            .map_err(|e| {
                PkglinkError::io(format!("Failed to create cache root {:?}", self.cache_root), e)
            })?;

        let staging = self.cache_root.join(format!(
            ".staging-{}_{}-{}",
            spec.name(),
            key,
            std::process::id()
        ));
        self.discard(&staging);

        let mut attempts = Vec::new();
        for strategy in &self.strategies {
            info!("Installing {} with {}", install_string, strategy);
            match strategy.fetch(self.runtime, &install_string, &staging, force_reinstall) {
                Ok(()) => {
                    metadata.strategy = Some(*strategy);
                    break;
                }
                Err(e) => {
                    warn!("{} failed for {}: {:#}", strategy, install_string, e);
                    attempts.push(format!("{}: {:#}", strategy, e));
                    self.discard(&staging);
                }
            }
        }

        if metadata.strategy.is_none() {
            return Err(PkglinkError::InstallationFailed {
                install_spec: install_string,
                attempts,
            });
        }

        if stale_remains {
            self.clear_stale(&cache_dir, &staging)?;
        }
        self.commit(&staging, &cache_dir)?;
        self.fill_dist_info(&mut metadata, &cache_dir, spec.name());
        Ok((cache_dir, metadata))
    }

    fn resolve_local(&self, raw: &str) -> Result<(PathBuf, InstallMetadata)> {
        let expanded = expand_home(raw, self.runtime.home_dir().as_deref());
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            let cwd = self
                .runtime
                .current_dir()
                .map_err(|e| PkglinkError::io("Failed to resolve local source", e))?;
            cwd.join(expanded)
        };
        let path = normalize_path(&absolute);

        if !self.runtime.exists(&path) {
            return Err(PkglinkError::SourceNotFound(path));
        }

        debug!("Using local source {:?}", path);
        let metadata = InstallMetadata {
            install_string: raw.to_string(),
            ..Default::default()
        };
        Ok((path, metadata))
    }

    /// Second attempt at removing a stale cache, right before the fresh
    /// install takes its place. Serving the old tree as a fresh install is
    /// never acceptable, so a second failure is an error.
    fn clear_stale(&self, cache_dir: &Path, staging: &Path) -> Result<()> {
        if !self.runtime.exists(cache_dir) {
            return Ok(());
        }
        if let Err(e) = self.runtime.remove_dir_all(cache_dir) {
            self.discard(staging);
            return Err(PkglinkError::io(
                format!("Failed to replace stale cache {:?}", cache_dir),
                e,
            ));
        }
        Ok(())
    }

    /// Move a finished staging directory into place under its final name.
    ///
    /// Only reached when `cache_dir` was absent, so finding it afterwards
    /// means another process committed first.
    fn commit(&self, staging: &Path, cache_dir: &Path) -> Result<()> {
        match self.runtime.rename(staging, cache_dir) {
            Ok(()) => Ok(()),
            Err(e) if self.runtime.exists(cache_dir) => {
                debug!(
                    "{:?} appeared while installing ({:#}); keeping the existing copy",
                    cache_dir, e
                );
                self.discard(staging);
                Ok(())
            }
            Err(e) => Err(PkglinkError::io(
                format!("Failed to move {:?} into {:?}", staging, cache_dir),
                e,
            )),
        }
    }

    fn discard(&self, dir: &Path) {
        if self.runtime.exists(dir)
            && let Err(e) = self.runtime.remove_dir_all(dir)
        {
            warn!("Failed to clean up {:?}: {:#}", dir, e);
        }
    }

    /// Record the `{name}-{version}.dist-info` directory, if the install has one.
    fn fill_dist_info(&self, metadata: &mut InstallMetadata, dir: &Path, name: &str) {
        let entries = match self.runtime.read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Could not list {:?}: {:#}", dir, e);
                return;
            }
        };

        let prefix = format!("{}-", name.replace('-', "_")).to_lowercase();
        for entry in entries {
            let Some(file_name) = entry.file_name().map(|n| n.to_string_lossy().to_string())
            else {
                continue;
            };
            let lower = file_name.to_lowercase();
            if lower.starts_with(&prefix)
                && let Some(stem) = file_name.strip_suffix(".dist-info")
            {
                metadata.version = stem.get(prefix.len()..).map(str::to_string);
                metadata.dist_info = Some(file_name);
                return;
            }
        }
    }
}
