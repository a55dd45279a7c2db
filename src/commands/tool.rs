use anyhow::{Context, Result};

use crate::batch::{ContextOptions, PkglinkContext, run_batch};
use crate::install::Installer;
use crate::runtime::Runtime;
use crate::source::parse_source;

use super::config::Config;
use super::report::print_reports;

/// Options for `pkglink tool`: like `link`, minus `--inside`.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArgs {
    /// Package source: `github:org/repo[@ref]`, `name[@version]`, or a local path
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Directory inside the package to link (defaults to `resources`)
    #[arg(value_name = "DIRECTORY")]
    pub directory: Option<String>,

    /// Name of the resource link under `.pkglink/` (defaults to `.{module}`)
    #[arg(long)]
    pub symlink_name: Option<String>,

    /// Install this source instead, keeping the module name from SOURCE
    #[arg(long, value_name = "SOURCE")]
    pub from: Option<String>,

    /// Distribution name whose dist-info describes the tool (defaults to the installed package name)
    #[arg(long)]
    pub project_name: Option<String>,

    /// Replace an existing resource link
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Show what would happen without touching the project
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Build the project only; do not link the resource directory
    #[arg(long)]
    pub skip_resources: bool,

    /// Do not run the package's `pkglink.yaml` setup
    #[arg(long)]
    pub no_setup: bool,
}

impl ToolArgs {
    pub fn to_context(&self) -> Result<PkglinkContext> {
        let source = parse_source(&self.source)?;
        let from = self.from.as_deref().map(parse_source).transpose()?;

        let options = ContextOptions {
            directory: self.directory.clone(),
            symlink_name: self.symlink_name.clone(),
            project_name: self.project_name.clone(),
            from,
            force: self.force,
            dry_run: self.dry_run,
            inside_pkglink: false,
            skip_resources: self.skip_resources,
            no_setup: self.no_setup,
            tool: true,
        };
        Ok(PkglinkContext::new(self.source.clone(), source, options)?)
    }
}

/// Install a package and generate a project under `.pkglink/` that
/// `uvx --from` can run.
#[tracing::instrument(skip(runtime, config))]
pub fn tool<R: Runtime>(runtime: R, args: &ToolArgs, config: Config) -> Result<()> {
    let context = args.to_context()?;
    let installer = Installer::new(&runtime, config.cache_root.clone());

    let reports = run_batch(&runtime, &installer, &config.base_dir, vec![context])
        .with_context(|| format!("Failed to prepare {}", args.source))?;
    print_reports(&reports);
    Ok(())
}
