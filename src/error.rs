//! Error types for pkglink.
//!
//! The core modules return [`PkglinkError`]; the CLI converts it into a single
//! message and a non-zero exit status.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, PkglinkError>;

#[derive(Debug, thiserror::Error)]
pub enum PkglinkError {
    #[error("Invalid source format: {input} ({reason})")]
    InvalidSourceFormat { input: String, reason: String },

    #[error("Installation of {install_spec} failed:\n{}", format_attempts(.attempts))]
    InstallationFailed {
        install_spec: String,
        attempts: Vec<String>,
    },

    #[error(
        "Package \"{expected}\" not found in {install_dir:?} (contents: {})",
        format_listing(.listing)
    )]
    PackageRootNotFound {
        expected: String,
        install_dir: PathBuf,
        listing: Vec<String>,
    },

    #[error(
        "No dist-info for \"{project_name}\" in {install_dir:?}; \
         you may need to provide --project-name"
    )]
    DistInfoNotFound {
        project_name: String,
        install_dir: PathBuf,
    },

    #[error("Source does not exist: {0:?}")]
    SourceNotFound(PathBuf),

    #[error("Target already exists: {0:?} (use --force to replace it)")]
    TargetAlreadyExists(PathBuf),

    #[error("Refusing to remove {path:?}: {reason}")]
    UnsafeRemoval { path: PathBuf, reason: String },

    #[error("Invalid target directory \"{0}\": must be a non-empty relative path")]
    InvalidTargetDirectory(String),

    #[error("{0}")]
    ConfigurationConflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Post-install setup failed: {0}")]
    SetupFailed(String),

    #[error("{context}: {cause:#}")]
    Io { context: String, cause: anyhow::Error },
}

impl PkglinkError {
    pub(crate) fn io(context: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Io {
            context: context.into(),
            cause,
        }
    }

    pub(crate) fn invalid_source(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSourceFormat {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

fn format_attempts(attempts: &[String]) -> String {
    attempts
        .iter()
        .map(|a| format!("  - {}", a.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_listing(listing: &[String]) -> String {
    if listing.is_empty() {
        "empty".to_string()
    } else {
        listing.join(", ")
    }
}
