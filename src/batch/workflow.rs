//! Three-phase batch execution: download everything, plan everything, then link.
//!
//! A failure in one phase stops the batch before the next phase starts, so a
//! conflicting target is reported before any entry touches the project tree.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::batch::PkglinkContext;
use crate::error::{PkglinkError, Result};
use crate::install::{InstallMetadata, Installer};
use crate::link::{LinkManager, LinkOutcome, LinkState};
use crate::locate::PackageLocator;
use crate::runtime::Runtime;
use crate::setup::{SetupLink, manifest_path, run_post_install_setup};
use crate::tool::{self, ToolProject, ToolReport};

pub const METADATA_FILE: &str = ".pkglink-metadata.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSource {
    pub install_dir: PathBuf,
    pub package_root: PathBuf,
    pub install: InstallMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannedAction {
    Create,
    Skip,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkPlan {
    pub label: String,
    pub link_path: PathBuf,
    pub source_dir: PathBuf,
    pub state: LinkState,
    pub action: PlannedAction,
    pub run_setup: bool,
    pub dry_run: bool,
    pub skip_resources: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolProject>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowEntry {
    pub context: PkglinkContext,
    pub resolved: Option<ResolvedSource>,
    pub plan: Option<LinkPlan>,
}

impl WorkflowEntry {
    pub fn new(context: PkglinkContext) -> Self {
        Self {
            context,
            resolved: None,
            plan: None,
        }
    }
}

/// What happened to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub label: String,
    pub link_path: PathBuf,
    pub source_dir: PathBuf,
    /// `None` when nothing was linked (dry run or `skip_resources`).
    pub outcome: Option<LinkOutcome>,
    pub dry_run: bool,
    pub setup_links: Vec<SetupLink>,
    pub tool: Option<ToolReport>,
}

#[derive(Debug, Serialize)]
struct MetadataRecord<'a> {
    label: &'a str,
    source: String,
    install_spec: String,
    install_string: &'a str,
    cache_key: Option<&'a str>,
    version: Option<&'a str>,
    project_name: &'a str,
    symlink_name: &'a str,
    directory: &'a str,
    package_root: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_hash: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    console_scripts: Option<&'a BTreeMap<String, String>>,
}

/// Install (or reuse) every entry's package and find its root.
#[tracing::instrument(skip_all)]
pub fn download_phase<R: Runtime + ?Sized>(
    runtime: &R,
    installer: &Installer<'_, R>,
    entries: &mut [WorkflowEntry],
) -> Result<()> {
    for entry in entries.iter_mut() {
        let ctx = &entry.context;
        info!("[{}] resolving {}", ctx.label, ctx.install_spec);
        let (install_dir, install) = installer.resolve(&ctx.install_spec)?;

        let package_root = if ctx.install_spec.local_path().is_some() {
            install_dir.clone()
        } else {
            PackageLocator::with_resource_dir(&ctx.directory).locate(
                runtime,
                &install_dir,
                &ctx.module_name,
            )?
        };
        debug!("[{}] package root {:?}", ctx.label, package_root);

        entry.resolved = Some(ResolvedSource {
            install_dir,
            package_root,
            install,
        });
    }
    Ok(())
}

/// Decide what each entry will do, failing on the first conflict.
#[tracing::instrument(skip_all)]
pub fn planning_phase<R: Runtime + ?Sized>(
    runtime: &R,
    base_dir: &Path,
    entries: &mut [WorkflowEntry],
) -> Result<()> {
    let manager = LinkManager::new(runtime);

    for entry in entries.iter_mut() {
        let ctx = &entry.context;
        let resolved = entry.resolved.as_ref().ok_or_else(|| {
            PkglinkError::Config(format!("entry '{}' was not downloaded", ctx.label))
        })?;

        let operation = ctx.link_operation(resolved.package_root.clone());
        let source_dir = operation.full_source_path();
        let link_path = ctx.link_path(base_dir);

        if !ctx.skip_resources && !runtime.exists(&source_dir) {
            log_parent_listing(runtime, &source_dir);
            return Err(PkglinkError::SourceNotFound(source_dir));
        }

        let state = manager.inspect(&source_dir, &link_path);
        let action = match (&state, ctx.force) {
            (_, _) if ctx.skip_resources => PlannedAction::Skip,
            (LinkState::Absent, _) => PlannedAction::Create,
            (LinkState::Correct, false) => PlannedAction::Skip,
            (LinkState::Incorrect(reason), false) => {
                warn!("[{}] {}", ctx.label, reason);
                return Err(PkglinkError::TargetAlreadyExists(link_path));
            }
            (_, true) => PlannedAction::Replace,
        };

        let run_setup = !ctx.no_setup && runtime.exists(&manifest_path(&source_dir));

        // Read before anything is written so a missing dist-info fails the batch.
        let tool = if ctx.tool {
            let dist = tool::read_dist_info(runtime, &resolved.install_dir, &ctx.project_name)?;
            Some(ToolProject::new(
                ctx.project_dir(base_dir),
                ctx.module_name.clone(),
                resolved.package_root.clone(),
                dist,
            ))
        } else {
            None
        };

        entry.plan = Some(LinkPlan {
            label: ctx.label.clone(),
            link_path,
            source_dir,
            state,
            action,
            run_setup,
            dry_run: ctx.dry_run,
            skip_resources: ctx.skip_resources,
            tool,
        });
    }
    Ok(())
}

/// Apply every plan: link, record metadata, run setup.
#[tracing::instrument(skip_all)]
pub fn execution_phase<R: Runtime + ?Sized>(
    runtime: &R,
    base_dir: &Path,
    entries: &[WorkflowEntry],
) -> Result<Vec<EntryReport>> {
    let manager = LinkManager::new(runtime);
    let mut reports = Vec::with_capacity(entries.len());

    for entry in entries {
        let ctx = &entry.context;
        let (Some(plan), Some(resolved)) = (&entry.plan, &entry.resolved) else {
            return Err(PkglinkError::Config(format!(
                "entry '{}' was not planned",
                ctx.label
            )));
        };

        let mut report = EntryReport {
            label: ctx.label.clone(),
            link_path: plan.link_path.clone(),
            source_dir: plan.source_dir.clone(),
            outcome: None,
            dry_run: plan.dry_run,
            setup_links: Vec::new(),
            tool: None,
        };

        if plan.dry_run {
            info!(
                "[{}] dry run: would {:?} {:?} -> {:?}",
                ctx.label, plan.action, plan.link_path, plan.source_dir
            );
            reports.push(report);
            continue;
        }

        if !plan.skip_resources {
            let outcome = manager.reconcile(
                &plan.source_dir,
                &plan.link_path,
                &ctx.symlink_name,
                ctx.force,
            )?;
            info!("[{}] {:?}", ctx.label, outcome);
            report.outcome = Some(outcome);
        }

        if let Some(project) = &plan.tool {
            let install_spec = ctx.install_spec.to_string();
            let stale = tool::needs_refresh(
                runtime,
                &project.metadata_path(),
                resolved.install.cache_key.as_deref(),
                &install_spec,
            );
            project.write(runtime)?;
            write_metadata(runtime, base_dir, ctx, resolved, Some(project))?;
            let refreshed = stale && tool::refresh(runtime, project);
            report.tool = Some(ToolReport {
                project_dir: project.project_dir.clone(),
                console_scripts: project.dist.console_scripts.keys().cloned().collect(),
                refreshed,
            });
        } else if ctx.inside_pkglink {
            write_metadata(runtime, base_dir, ctx, resolved, None)?;
        }

        if plan.run_setup {
            let linked_dir = if runtime.exists(&plan.link_path) {
                plan.link_path.as_path()
            } else {
                plan.source_dir.as_path()
            };
            report.setup_links = run_post_install_setup(runtime, linked_dir, base_dir, ctx.force)?;
        }

        reports.push(report);
    }

    Ok(reports)
}

/// Run all three phases over `contexts`.
#[tracing::instrument(skip_all, fields(entries = contexts.len()))]
pub fn run_batch<R: Runtime + ?Sized>(
    runtime: &R,
    installer: &Installer<'_, R>,
    base_dir: &Path,
    contexts: Vec<PkglinkContext>,
) -> Result<Vec<EntryReport>> {
    let mut entries: Vec<WorkflowEntry> = contexts.into_iter().map(WorkflowEntry::new).collect();

    download_phase(runtime, installer, &mut entries)?;
    planning_phase(runtime, base_dir, &mut entries)?;
    execution_phase(runtime, base_dir, &entries)
}

fn write_metadata<R: Runtime + ?Sized>(
    runtime: &R,
    base_dir: &Path,
    ctx: &PkglinkContext,
    resolved: &ResolvedSource,
    tool: Option<&ToolProject>,
) -> Result<()> {
    let dir = ctx.project_dir(base_dir);
    runtime
        .create_dir_all(&dir)
        .map_err(|e| PkglinkError::io(format!("Failed to create {:?}", dir), e))?;

    let record = MetadataRecord {
        label: &ctx.label,
        source: ctx.source.to_string(),
        install_spec: ctx.install_spec.to_string(),
        install_string: &resolved.install.install_string,
        cache_key: resolved.install.cache_key.as_deref(),
        version: resolved
            .install
            .version
            .as_deref()
            .or(tool.map(|t| t.dist.version.as_str())),
        project_name: &ctx.project_name,
        symlink_name: &ctx.symlink_name,
        directory: &ctx.directory,
        package_root: &resolved.package_root,
        source_hash: tool.and(resolved.install.cache_key.as_deref()),
        package_name: tool.map(ToolProject::package_name),
        console_scripts: tool.map(|t| &t.dist.console_scripts),
    };
    let yaml = serde_yaml::to_string(&record)
        .map_err(|e| PkglinkError::io("Failed to serialize metadata", e.into()))?;

    let path = dir.join(METADATA_FILE);
    runtime
        .write(&path, yaml.as_bytes())
        .map_err(|e| PkglinkError::io(format!("Failed to write {:?}", path), e))?;
    debug!("Wrote {:?}", path);
    Ok(())
}

fn log_parent_listing<R: Runtime + ?Sized>(runtime: &R, missing: &Path) {
    let Some(parent) = missing.parent() else {
        return;
    };
    match runtime.read_dir(parent) {
        Ok(entries) => {
            let names: Vec<String> = entries
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
                .collect();
            warn!("{:?} does not exist; {:?} contains {:?}", missing, parent, names);
        }
        Err(e) => warn!("{:?} does not exist and {:?} is unreadable: {:#}", missing, parent, e),
    }
}
