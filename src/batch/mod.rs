//! Per-entry link contexts and cross-entry conflict detection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{PkglinkError, Result};
use crate::link::{LinkOperation, LinkTarget, default_symlink_name, validate_target_directory};
use crate::locate::DEFAULT_RESOURCE_DIR;
use crate::source::SourceSpec;

pub mod workflow;

pub use workflow::{
    EntryReport, LinkPlan, PlannedAction, ResolvedSource, WorkflowEntry, download_phase,
    execution_phase, planning_phase, run_batch,
};

/// Directory under the project root that holds `inside_pkglink` entries.
pub const PKGLINK_DIR: &str = ".pkglink";

/// Optional settings shared by the CLI and the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    pub directory: Option<String>,
    pub symlink_name: Option<String>,
    pub project_name: Option<String>,
    pub from: Option<SourceSpec>,
    pub force: bool,
    pub dry_run: bool,
    pub inside_pkglink: bool,
    pub skip_resources: bool,
    pub no_setup: bool,
    pub tool: bool,
}

/// Everything needed to run one link entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkglinkContext {
    pub label: String,
    /// Where the module name comes from.
    pub source: SourceSpec,
    /// What gets installed; differs from `source` when `from` is given.
    pub install_spec: SourceSpec,
    pub module_name: String,
    pub project_name: String,
    pub symlink_name: String,
    pub directory: String,
    pub force: bool,
    pub dry_run: bool,
    pub inside_pkglink: bool,
    pub skip_resources: bool,
    pub no_setup: bool,
    /// Generate a `uvx`-runnable project in `project_dir`.
    pub tool: bool,
}

impl PkglinkContext {
    pub fn new(
        label: impl Into<String>,
        source: SourceSpec,
        options: ContextOptions,
    ) -> Result<Self> {
        let directory = options
            .directory
            .unwrap_or_else(|| DEFAULT_RESOURCE_DIR.to_string());
        validate_target_directory(&directory)?;

        let install_spec = options.from.unwrap_or_else(|| source.clone());
        let module_name = source.module_name().to_string();
        let project_name = options
            .project_name
            .unwrap_or_else(|| install_spec.project_name().to_string());
        let symlink_name = options
            .symlink_name
            .unwrap_or_else(|| default_symlink_name(&module_name));

        Ok(Self {
            label: label.into(),
            source,
            install_spec,
            module_name,
            project_name,
            symlink_name,
            directory,
            force: options.force,
            dry_run: options.dry_run,
            inside_pkglink: options.inside_pkglink,
            skip_resources: options.skip_resources,
            no_setup: options.no_setup,
            tool: options.tool,
        })
    }

    /// `{base}/.pkglink/{project_name}` for inside and tool entries.
    pub fn project_dir(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(PKGLINK_DIR).join(&self.project_name)
    }

    /// Tool entries keep their resources beside the project, in
    /// `{base}/.pkglink/{symlink_name}`.
    pub fn link_path(&self, base_dir: &Path) -> PathBuf {
        if self.tool {
            base_dir.join(PKGLINK_DIR).join(&self.symlink_name)
        } else if self.inside_pkglink {
            self.project_dir(base_dir).join(&self.symlink_name)
        } else {
            base_dir.join(&self.symlink_name)
        }
    }

    pub fn link_operation(&self, package_root: PathBuf) -> LinkOperation {
        LinkOperation {
            spec: self.install_spec.clone(),
            module_name: self.module_name.clone(),
            target: LinkTarget {
                source_path: package_root,
                target_directory: self.directory.clone(),
                symlink_name: Some(self.symlink_name.clone()),
            },
            force: self.force,
            dry_run: self.dry_run,
        }
    }
}

/// Reject batches where two entries would fight over the same link.
///
/// Entries may share a project name only when they install the same spec
/// and at most one of them lives inside `.pkglink` (tool entries count as
/// inside). Symlink names must be unique.
pub fn ensure_unique_link_targets(contexts: &[PkglinkContext]) -> Result<()> {
    let mut projects: BTreeMap<&str, Vec<&PkglinkContext>> = BTreeMap::new();
    let mut symlinks: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for ctx in contexts {
        projects.entry(&ctx.project_name).or_default().push(ctx);
        symlinks
            .entry(&ctx.symlink_name)
            .or_default()
            .push(&ctx.label);
    }

    let project_conflicts: Vec<(&str, Vec<&str>)> = projects
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .filter(|(_, group)| {
            let same_spec = group.iter().all(|c| c.install_spec == group[0].install_spec);
            let inside = group
                .iter()
                .filter(|c| c.inside_pkglink || c.tool)
                .count();
            !(same_spec && inside <= 1)
        })
        .map(|(name, group)| (name, group.iter().map(|c| c.label.as_str()).collect()))
        .collect();

    let symlink_conflicts: Vec<(&str, Vec<&str>)> = symlinks
        .into_iter()
        .filter(|(_, labels)| labels.len() > 1)
        .collect();

    if project_conflicts.is_empty() && symlink_conflicts.is_empty() {
        return Ok(());
    }

    let mut lines = vec!["duplicate link targets detected:".to_string()];
    if !project_conflicts.is_empty() {
        lines.push("project_name conflicts:".to_string());
        for (name, labels) in &project_conflicts {
            lines.push(format!("  '{}' used by: {}", name, labels.join(", ")));
        }
    }
    if !symlink_conflicts.is_empty() {
        lines.push("symlink_name conflicts:".to_string());
        for (name, labels) in &symlink_conflicts {
            lines.push(format!("  '{}' used by: {}", name, labels.join(", ")));
        }
    }
    lines.push("Each project_name and symlink_name must be unique across links.".to_string());

    Err(PkglinkError::ConfigurationConflict(lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(label: &str, source: &str, options: ContextOptions) -> PkglinkContext {
        PkglinkContext::new(label, source.parse().unwrap(), options).unwrap()
    }

    #[test]
    fn test_context_defaults() {
        let c = ctx("toolbelt", "github:acme/toolbelt@v1.0.0", ContextOptions::default());
        assert_eq!(c.module_name, "toolbelt");
        assert_eq!(c.project_name, "toolbelt");
        assert_eq!(c.symlink_name, ".toolbelt");
        assert_eq!(c.directory, "resources");
        assert_eq!(c.install_spec, c.source);
        assert_eq!(c.link_path(Path::new("/project")), PathBuf::from("/project/.toolbelt"));
    }

    #[test]
    fn test_from_changes_install_spec_but_not_module() {
        let c = ctx(
            "guide",
            "codeguide",
            ContextOptions {
                from: Some("github:acme/guides@main".parse().unwrap()),
                ..Default::default()
            },
        );
        assert_eq!(c.module_name, "codeguide");
        assert_eq!(c.symlink_name, ".codeguide");
        assert_eq!(c.project_name, "guides");
        assert_eq!(c.install_spec.to_string(), "github:acme/guides@main");
    }

    #[test]
    fn test_inside_link_path() {
        let c = ctx(
            "toolbelt",
            "toolbelt",
            ContextOptions {
                inside_pkglink: true,
                ..Default::default()
            },
        );
        assert_eq!(
            c.link_path(Path::new("/project")),
            Path::new("/project").join(".pkglink").join("toolbelt").join(".toolbelt")
        );
    }

    #[test]
    fn test_tool_link_path() {
        let c = ctx(
            "toolbelt",
            "toolbelt",
            ContextOptions {
                tool: true,
                ..Default::default()
            },
        );
        let base = Path::new("/project");
        assert_eq!(c.link_path(base), base.join(".pkglink").join(".toolbelt"));
        assert_eq!(c.project_dir(base), base.join(".pkglink").join("toolbelt"));
    }

    #[test]
    fn test_tool_and_inside_entries_cannot_share_a_project() {
        let contexts = vec![
            ctx(
                "linked",
                "toolbelt@1.0",
                ContextOptions {
                    inside_pkglink: true,
                    ..Default::default()
                },
            ),
            ctx(
                "runnable",
                "toolbelt@1.0",
                ContextOptions {
                    tool: true,
                    symlink_name: Some(".tb".to_string()),
                    ..Default::default()
                },
            ),
        ];
        let err = ensure_unique_link_targets(&contexts).unwrap_err();
        assert!(err.to_string().contains("'toolbelt' used by: linked, runnable"));
    }

    #[test]
    fn test_invalid_directory_is_rejected() {
        let err = PkglinkContext::new(
            "bad",
            "toolbelt".parse().unwrap(),
            ContextOptions {
                directory: Some("".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, PkglinkError::InvalidTargetDirectory(_)));
    }

    #[test]
    fn test_unique_targets_pass() {
        let contexts = vec![
            ctx("a", "alpha", ContextOptions::default()),
            ctx("b", "beta", ContextOptions::default()),
        ];
        ensure_unique_link_targets(&contexts).unwrap();
    }

    #[test]
    fn test_same_spec_may_share_project() {
        let contexts = vec![
            ctx(
                "docs",
                "toolbelt@1.0",
                ContextOptions {
                    directory: Some("docs".to_string()),
                    symlink_name: Some(".toolbelt-docs".to_string()),
                    inside_pkglink: true,
                    ..Default::default()
                },
            ),
            ctx("resources", "toolbelt@1.0", ContextOptions::default()),
        ];
        ensure_unique_link_targets(&contexts).unwrap();
    }

    #[test]
    fn test_two_inside_entries_for_one_project_conflict() {
        let inside = ContextOptions {
            inside_pkglink: true,
            ..Default::default()
        };
        let contexts = vec![
            ctx(
                "one",
                "toolbelt@1.0",
                ContextOptions {
                    symlink_name: Some(".one".to_string()),
                    ..inside.clone()
                },
            ),
            ctx(
                "two",
                "toolbelt@1.0",
                ContextOptions {
                    symlink_name: Some(".two".to_string()),
                    ..inside
                },
            ),
        ];
        let err = ensure_unique_link_targets(&contexts).unwrap_err();
        assert!(err.to_string().contains("'toolbelt' used by: one, two"));
    }

    #[test]
    fn test_all_conflicts_reported_together() {
        let contexts = vec![
            ctx(
                "first",
                "github:acme/toolbelt@main",
                ContextOptions {
                    symlink_name: Some(".shared".to_string()),
                    ..Default::default()
                },
            ),
            ctx(
                "second",
                "github:other/toolbelt@main",
                ContextOptions {
                    symlink_name: Some(".tb2".to_string()),
                    ..Default::default()
                },
            ),
            ctx(
                "third",
                "gadget",
                ContextOptions {
                    symlink_name: Some(".shared".to_string()),
                    ..Default::default()
                },
            ),
        ];
        let err = ensure_unique_link_targets(&contexts).unwrap_err();
        assert!(matches!(err, PkglinkError::ConfigurationConflict(_)));
        assert_eq!(
            err.to_string(),
            "duplicate link targets detected:\n\
             project_name conflicts:\n  'toolbelt' used by: first, second\n\
             symlink_name conflicts:\n  '.shared' used by: first, third\n\
             Each project_name and symlink_name must be unique across links."
        );
    }

    #[test]
    fn test_project_and_symlink_conflicts_name_every_entry() {
        let shared_project = |symlink: &str| ContextOptions {
            project_name: Some("shared-project".to_string()),
            symlink_name: Some(symlink.to_string()),
            ..Default::default()
        };
        let shared_symlink = ContextOptions {
            symlink_name: Some(".shared".to_string()),
            ..Default::default()
        };
        let contexts = vec![
            ctx("alpha-entry", "alpha@1.0.0", shared_project(".alpha")),
            ctx("beta-entry", "beta@2.0.0", shared_project(".beta")),
            ctx("gamma-entry", "gamma", shared_symlink.clone()),
            ctx("delta-entry", "delta", shared_symlink),
        ];

        let message = ensure_unique_link_targets(&contexts)
            .unwrap_err()
            .to_string();
        assert!(message.contains("'shared-project' used by: alpha-entry, beta-entry"));
        assert!(message.contains("'.shared' used by: gamma-entry, delta-entry"));
        for label in ["alpha-entry", "beta-entry", "gamma-entry", "delta-entry"] {
            assert!(message.contains(label), "{} missing from {}", label, message);
        }
    }
}
