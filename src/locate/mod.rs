//! Finding the package root inside an install directory.
//!
//! An install directory (a copied site-packages, a `--target` dir, or a
//! local checkout) usually holds more than the package we want. The locator
//! runs a chain of [`Matcher`]s over its immediate subdirectories and returns
//! the first hit.

use log::{debug, info, warn};
use similar::TextDiff;
use std::path::{Path, PathBuf};

use crate::error::{PkglinkError, Result};
use crate::runtime::Runtime;

pub const DEFAULT_RESOURCE_DIR: &str = "resources";
pub const MARKER_FILE: &str = "__init__.py";
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// `install_dir/{expected}` is a directory.
    ExactMatch,
    /// First candidate containing the marker file.
    MarkerFile(String),
    /// First candidate containing the given subdirectory.
    HasSubdir(String),
    Prefix,
    Suffix,
    /// Best character-level similarity at or above the threshold.
    Similarity(f64),
    FirstDir,
}

impl Matcher {
    pub fn name(&self) -> &'static str {
        match self {
            Matcher::ExactMatch => "exact-match",
            Matcher::MarkerFile(_) => "marker-file",
            Matcher::HasSubdir(_) => "has-subdir",
            Matcher::Prefix => "prefix",
            Matcher::Suffix => "suffix",
            Matcher::Similarity(_) => "similarity",
            Matcher::FirstDir => "first-dir",
        }
    }

    fn find<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        install_dir: &Path,
        expected: &str,
        candidates: &[Candidate],
    ) -> Option<PathBuf> {
        let mut eligible = candidates.iter().filter(|c| !c.is_excluded());
        match self {
            Matcher::ExactMatch => {
                let normalized = expected.replace('-', "_");
                [expected, normalized.as_str()]
                    .into_iter()
                    .map(|name| install_dir.join(name))
                    .find(|path| runtime.is_dir(path))
            }
            Matcher::MarkerFile(marker) => eligible
                .find(|c| runtime.exists(&c.path.join(marker)))
                .map(|c| c.path.clone()),
            Matcher::HasSubdir(subdir) => eligible
                .find(|c| runtime.is_dir(&c.path.join(subdir)))
                .map(|c| c.path.clone()),
            Matcher::Prefix => eligible
                .find(|c| c.name.starts_with(expected))
                .map(|c| c.path.clone()),
            Matcher::Suffix => eligible
                .find(|c| c.name.ends_with(expected))
                .map(|c| c.path.clone()),
            Matcher::Similarity(threshold) => {
                let mut best: Option<(&Candidate, f64)> = None;
                for candidate in eligible {
                    let ratio = similarity(expected, &candidate.name);
                    debug!("Similarity {:?} vs {:?}: {:.3}", expected, candidate.name, ratio);
                    // Strictly greater keeps the earliest candidate on ties.
                    if ratio >= *threshold && best.is_none_or(|(_, b)| ratio > b) {
                        best = Some((candidate, ratio));
                    }
                }
                best.map(|(c, _)| c.path.clone())
            }
            Matcher::FirstDir => eligible.next().map(|c| c.path.clone()),
        }
    }
}

/// Character-level similarity ratio in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    TextDiff::from_chars(a, b).ratio() as f64
}

#[derive(Debug)]
struct Candidate {
    name: String,
    path: PathBuf,
}

impl Candidate {
    fn is_excluded(&self) -> bool {
        is_hidden_or_metadata(&self.name)
    }
}

/// Hidden directories and packaging metadata never count as a package root.
pub fn is_hidden_or_metadata(name: &str) -> bool {
    name.starts_with('.')
        || name.ends_with(".dist-info")
        || name.ends_with(".egg-info")
        || name.ends_with(".data")
        || name == "__pycache__"
}

#[derive(Debug, Clone)]
pub struct PackageLocator {
    matchers: Vec<Matcher>,
}

impl Default for PackageLocator {
    fn default() -> Self {
        Self::with_resource_dir(DEFAULT_RESOURCE_DIR)
    }
}

impl PackageLocator {
    /// The standard chain, with `HasSubdir` looking for `resource_dir`.
    pub fn with_resource_dir(resource_dir: &str) -> Self {
        Self {
            matchers: vec![
                Matcher::ExactMatch,
                Matcher::MarkerFile(MARKER_FILE.to_string()),
                Matcher::HasSubdir(resource_dir.to_string()),
                Matcher::Prefix,
                Matcher::Suffix,
                Matcher::Similarity(SIMILARITY_THRESHOLD),
                Matcher::FirstDir,
            ],
        }
    }

    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self { matchers }
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn locate<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        install_dir: &Path,
        expected: &str,
    ) -> Result<PathBuf> {
        let entries = runtime.read_dir(install_dir).map_err(|e| {
            PkglinkError::io(format!("Failed to read install directory {:?}", install_dir), e)
        })?;

        let mut listing: Vec<String> = entries
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        listing.sort();

        let mut candidates: Vec<Candidate> = entries
            .into_iter()
            .filter(|p| runtime.is_dir(p))
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().to_string();
                Some(Candidate { name, path })
            })
            .collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));

        for matcher in &self.matchers {
            if let Some(found) = matcher.find(runtime, install_dir, expected, &candidates) {
                info!(
                    "Found package root for {:?} via {}: {:?}",
                    expected,
                    matcher.name(),
                    found
                );
                return Ok(found);
            }
        }

        warn!(
            "No package root for {:?} in {:?}; contents: {:?}",
            expected, install_dir, listing
        );
        Err(PkglinkError::PackageRootNotFound {
            expected: expected.to_string(),
            install_dir: install_dir.to_path_buf(),
            listing,
        })
    }
}

/// Locate `expected_name` inside `install_dir` with the default chain.
pub fn find_package_root<R: Runtime + ?Sized>(
    runtime: &R,
    install_dir: &Path,
    expected_name: &str,
) -> Result<PathBuf> {
    PackageLocator::default().locate(runtime, install_dir, expected_name)
}
