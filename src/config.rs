//! Batch configuration (`pkglink.config.yaml`).
//!
//! ```yaml
//! defaults:
//!   directory: resources
//! links:
//!   toolbelt:
//!     source: github:acme/toolbelt@v1.2.0
//!   guides:
//!     source: codeguide
//!     from: github:acme/guides@main
//!     inside_pkglink: true
//!   linter:
//!     source: github:acme/linter@v2.0.0
//!     tool: true
//! ```

use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::batch::{ContextOptions, PkglinkContext, ensure_unique_link_targets};
use crate::error::{PkglinkError, Result};
use crate::runtime::Runtime;
use crate::source::{SourceSpec, parse_source};

pub const DEFAULT_CONFIG_FILE: &str = "pkglink.config.yaml";

/// Optional settings; entry values override `defaults`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkOptions {
    pub directory: Option<String>,
    pub symlink_name: Option<String>,
    pub project_name: Option<String>,
    #[serde(rename = "from")]
    pub from_spec: Option<String>,
    pub force: Option<bool>,
    pub dry_run: Option<bool>,
    pub inside_pkglink: Option<bool>,
    pub skip_resources: Option<bool>,
    pub no_setup: Option<bool>,
    pub tool: Option<bool>,
}

/// One entry under `links:`. Same keys as [`LinkOptions`] plus `source`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkDefinition {
    pub source: String,
    pub directory: Option<String>,
    pub symlink_name: Option<String>,
    pub project_name: Option<String>,
    #[serde(rename = "from")]
    pub from_spec: Option<String>,
    pub force: Option<bool>,
    pub dry_run: Option<bool>,
    pub inside_pkglink: Option<bool>,
    pub skip_resources: Option<bool>,
    pub no_setup: Option<bool>,
    pub tool: Option<bool>,
}

impl LinkDefinition {
    pub fn options(&self) -> LinkOptions {
        LinkOptions {
            directory: self.directory.clone(),
            symlink_name: self.symlink_name.clone(),
            project_name: self.project_name.clone(),
            from_spec: self.from_spec.clone(),
            force: self.force,
            dry_run: self.dry_run,
            inside_pkglink: self.inside_pkglink,
            skip_resources: self.skip_resources,
            no_setup: self.no_setup,
            tool: self.tool,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PkglinkConfig {
    #[serde(default)]
    pub defaults: LinkOptions,
    #[serde(default)]
    pub links: BTreeMap<String, LinkDefinition>,
}

#[tracing::instrument(skip(runtime))]
pub fn load_config<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<PkglinkConfig> {
    if !runtime.exists(path) {
        return Err(PkglinkError::Config(format!(
            "config file {:?} not found",
            path
        )));
    }

    let content = runtime
        .read_to_string(path)
        .map_err(|e| PkglinkError::Config(format!("cannot read {:?}: {:#}", path, e)))?;

    let value: serde_yaml::Value = serde_yaml::from_str(&content)
        .map_err(|e| PkglinkError::Config(format!("invalid YAML in {:?}: {}", path, e)))?;
    if !value.is_mapping() {
        return Err(PkglinkError::Config(format!(
            "{:?} must contain a mapping at the top level",
            path
        )));
    }

    let config: PkglinkConfig = serde_yaml::from_value(value).map_err(|e| {
        PkglinkError::Config(format!("invalid pkglink configuration in {:?}: {}", path, e))
    })?;
    if config.links.is_empty() {
        return Err(PkglinkError::Config(format!(
            "no links defined in {:?}",
            path
        )));
    }

    debug!("Loaded {} link(s) from {:?}", config.links.len(), path);
    Ok(config)
}

/// Merge defaults into each entry and validate the whole batch.
///
/// A global dry run forces every entry into dry-run mode.
pub fn build_contexts(
    config: &PkglinkConfig,
    global_dry_run: bool,
) -> Result<Vec<PkglinkContext>> {
    let defaults = &config.defaults;
    let mut contexts = Vec::with_capacity(config.links.len());

    for (label, entry) in &config.links {
        let entry_opts = entry.options();
        let source = parse_labelled(label, &entry.source)?;
        let from = entry_opts
            .from_spec
            .as_deref()
            .or(defaults.from_spec.as_deref())
            .map(|raw| parse_labelled(label, raw))
            .transpose()?;

        let options = ContextOptions {
            directory: pick(&entry_opts.directory, &defaults.directory),
            symlink_name: pick(&entry_opts.symlink_name, &defaults.symlink_name),
            project_name: pick(&entry_opts.project_name, &defaults.project_name),
            from,
            force: flag(entry_opts.force, defaults.force),
            dry_run: global_dry_run || flag(entry_opts.dry_run, defaults.dry_run),
            inside_pkglink: flag(entry_opts.inside_pkglink, defaults.inside_pkglink),
            skip_resources: flag(entry_opts.skip_resources, defaults.skip_resources),
            no_setup: flag(entry_opts.no_setup, defaults.no_setup),
            tool: flag(entry_opts.tool, defaults.tool),
        };

        contexts.push(PkglinkContext::new(label.clone(), source, options)?);
    }

    ensure_unique_link_targets(&contexts)?;
    Ok(contexts)
}

/// Load, build, and optionally keep only the named entries.
pub fn load_contexts<R: Runtime + ?Sized>(
    runtime: &R,
    path: &Path,
    global_dry_run: bool,
    only: &[String],
) -> Result<Vec<PkglinkContext>> {
    let config = load_config(runtime, path)?;

    let unknown: Vec<&str> = only
        .iter()
        .filter(|name| !config.links.contains_key(name.as_str()))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(PkglinkError::Config(format!(
            "unknown entries in {:?}: {}",
            path,
            unknown.join(", ")
        )));
    }

    let contexts = build_contexts(&config, global_dry_run)?;
    if only.is_empty() {
        return Ok(contexts);
    }
    Ok(contexts
        .into_iter()
        .filter(|ctx| only.contains(&ctx.label))
        .collect())
}

fn parse_labelled(label: &str, raw: &str) -> Result<SourceSpec> {
    parse_source(raw).map_err(|e| match e {
        PkglinkError::InvalidSourceFormat { input, reason } => PkglinkError::InvalidSourceFormat {
            input,
            reason: format!("{} (entry '{}')", reason, label),
        },
        other => other,
    })
}

fn pick(entry: &Option<String>, default: &Option<String>) -> Option<String> {
    entry.clone().or_else(|| default.clone())
}

fn flag(entry: Option<bool>, default: Option<bool>) -> bool {
    entry.or(default).unwrap_or(false)
}
