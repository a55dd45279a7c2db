//! Link targets and the symlink reconciler.

use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use crate::error::{PkglinkError, Result};
use crate::locate::DEFAULT_RESOURCE_DIR;
use crate::runtime::{Runtime, relative_symlink_path};
use crate::source::SourceSpec;

/// Where a link points: a subdirectory of a resolved package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub source_path: PathBuf,
    pub target_directory: String,
    pub symlink_name: Option<String>,
}

impl LinkTarget {
    pub fn new(
        source_path: PathBuf,
        target_directory: impl Into<String>,
        symlink_name: Option<String>,
    ) -> Result<Self> {
        let target_directory = target_directory.into();
        validate_target_directory(&target_directory)?;
        Ok(Self {
            source_path,
            target_directory,
            symlink_name,
        })
    }

    pub fn with_default_directory(source_path: PathBuf) -> Self {
        Self {
            source_path,
            target_directory: DEFAULT_RESOURCE_DIR.to_string(),
            symlink_name: None,
        }
    }
}

/// A target directory must be a non-empty relative path that stays inside the package.
pub fn validate_target_directory(dir: &str) -> Result<()> {
    let trimmed = dir.trim();
    let path = Path::new(trimmed);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if trimmed.is_empty() || path.is_absolute() || escapes || trimmed.starts_with(['/', '\\']) {
        return Err(PkglinkError::InvalidTargetDirectory(dir.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOperation {
    pub spec: SourceSpec,
    pub module_name: String,
    pub target: LinkTarget,
    pub force: bool,
    pub dry_run: bool,
}

impl LinkOperation {
    /// Explicit override, else `.{module_name}`.
    pub fn symlink_name(&self) -> String {
        self.target
            .symlink_name
            .clone()
            .unwrap_or_else(|| default_symlink_name(&self.module_name))
    }

    pub fn full_source_path(&self) -> PathBuf {
        self.target.source_path.join(&self.target.target_directory)
    }
}

pub fn default_symlink_name(module_name: &str) -> String {
    format!(".{}", module_name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum LinkState {
    Absent,
    Correct,
    Incorrect(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    Symlink,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created(LinkMode),
    Replaced(LinkMode),
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymlinkStyle {
    #[default]
    Absolute,
    /// Relative to the link's parent; absolute when no relative form exists.
    Relative,
}

pub struct LinkManager<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    style: SymlinkStyle,
}

impl<'a, R: Runtime + ?Sized> LinkManager<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self {
            runtime,
            style: SymlinkStyle::Absolute,
        }
    }

    pub fn with_style(mut self, style: SymlinkStyle) -> Self {
        self.style = style;
        self
    }

    #[tracing::instrument(skip(self))]
    pub fn inspect(&self, source: &Path, target: &Path) -> LinkState {
        let is_symlink = self.runtime.is_symlink(target);
        if !is_symlink && !self.runtime.exists(target) {
            return LinkState::Absent;
        }
        if !is_symlink {
            let kind = if self.runtime.is_dir(target) {
                "directory"
            } else {
                "file"
            };
            return LinkState::Incorrect(format!("{:?} is a {}, not a symlink", target, kind));
        }

        let resolved = match self.runtime.canonicalize(target) {
            Ok(p) => p,
            Err(_) => return LinkState::Incorrect(format!("{:?} is a broken symlink", target)),
        };
        let expected = match self.runtime.canonicalize(source) {
            Ok(p) => p,
            Err(e) => return LinkState::Incorrect(format!("source cannot be resolved: {:#}", e)),
        };

        if resolved == expected {
            LinkState::Correct
        } else {
            LinkState::Incorrect(format!("{:?} points to {:?}", target, resolved))
        }
    }

    /// Bring `target` to a link of `source`.
    ///
    /// `expected_name` is the name the caller configured for the link. A
    /// forced replacement only removes an existing entry carrying that name.
    #[tracing::instrument(skip(self))]
    pub fn reconcile(
        &self,
        source: &Path,
        target: &Path,
        expected_name: &str,
        force: bool,
    ) -> Result<LinkOutcome> {
        if !self.runtime.exists(source) {
            return Err(PkglinkError::SourceNotFound(source.to_path_buf()));
        }

        match self.inspect(source, target) {
            LinkState::Absent => Ok(LinkOutcome::Created(self.create(source, target)?)),
            LinkState::Correct if !force => {
                debug!("{:?} already points to {:?}", target, source);
                Ok(LinkOutcome::Skipped)
            }
            LinkState::Incorrect(reason) if !force => {
                warn!("Not replacing {:?}: {}", target, reason);
                Err(PkglinkError::TargetAlreadyExists(target.to_path_buf()))
            }
            state => {
                info!("Replacing {:?} ({:?})", target, state);
                self.remove_managed(target, expected_name)?;
                Ok(LinkOutcome::Replaced(self.create(source, target)?))
            }
        }
    }

    /// Remove a link or copy that pkglink created.
    ///
    /// Only dot-prefixed names that match `expected_name` exactly are removed.
    /// Symlinks are unlinked without following them.
    #[tracing::instrument(skip(self))]
    pub fn remove_managed(&self, target: &Path, expected_name: &str) -> Result<()> {
        let is_symlink = self.runtime.is_symlink(target);
        if !is_symlink && !self.runtime.exists(target) {
            return Ok(());
        }

        let name = file_name_of(target);
        if !name.starts_with('.') {
            return Err(PkglinkError::UnsafeRemoval {
                path: target.to_path_buf(),
                reason: "Refusing to remove target without dot prefix".to_string(),
            });
        }
        if name != expected_name {
            return Err(PkglinkError::UnsafeRemoval {
                path: target.to_path_buf(),
                reason: format!(
                    "name mismatch. Expected \"{}\", got \"{}\"",
                    expected_name, name
                ),
            });
        }

        let removed = if is_symlink {
            self.runtime.remove_symlink(target)
        } else if self.runtime.is_dir(target) {
            self.runtime.remove_dir_all(target)
        } else {
            self.runtime.remove_file(target)
        };
        removed.map_err(|e| PkglinkError::io(format!("Failed to remove {:?}", target), e))
    }

    pub(crate) fn create(&self, source: &Path, target: &Path) -> Result<LinkMode> {
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
            && !self.runtime.exists(parent)
        {
            self.runtime
                .create_dir_all(parent)
                .map_err(|e| PkglinkError::io(format!("Failed to create {:?}", parent), e))?;
        }

        if self.runtime.supports_symlinks() {
            let original = match self.style {
                SymlinkStyle::Absolute => source.to_path_buf(),
                SymlinkStyle::Relative => {
                    relative_symlink_path(target, source).unwrap_or_else(|| source.to_path_buf())
                }
            };
            self.runtime.symlink(&original, target).map_err(|e| {
                PkglinkError::io(format!("Failed to link {:?} -> {:?}", target, original), e)
            })?;
            info!("Created symlink {:?} -> {:?}", target, original);
            return Ok(LinkMode::Symlink);
        }

        let copied = if self.runtime.is_dir(source) {
            self.runtime.copy_dir_all(source, target)
        } else {
            self.runtime.copy(source, target).map(|_| ())
        };
        copied.map_err(|e| {
            PkglinkError::io(format!("Failed to copy {:?} to {:?}", source, target), e)
        })?;
        info!("Symlinks unsupported, copied {:?} to {:?}", source, target);
        Ok(LinkMode::Copy)
    }

    /// Dot-prefixed entries of `dir` that are symlinks or directories.
    pub fn list_managed_links(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = self
            .runtime
            .read_dir(dir)
            .map_err(|e| PkglinkError::io(format!("Failed to read {:?}", dir), e))?;
        Ok(entries
            .into_iter()
            .filter(|p| file_name_of(p).starts_with('.'))
            .filter(|p| self.runtime.is_symlink(p) || self.runtime.is_dir(p))
            .collect())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
