use anyhow::{Context, Result};
use log::debug;

use crate::batch::{
    ContextOptions, PkglinkContext, WorkflowEntry, download_phase, planning_phase, run_batch,
};
use crate::install::Installer;
use crate::runtime::Runtime;
use crate::source::parse_source;

use super::config::Config;
use super::report::{plan_line, print_reports};

/// Options for a single link entry given on the command line.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkArgs {
    /// Package source: `github:org/repo[@ref]`, `name[@version]`, or a local path
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Directory inside the package to link (defaults to `resources`)
    #[arg(value_name = "DIRECTORY")]
    pub directory: Option<String>,

    /// Name of the link in the project (defaults to `.{module}`)
    #[arg(long)]
    pub symlink_name: Option<String>,

    /// Install this source instead, keeping the module name from SOURCE
    #[arg(long, value_name = "SOURCE")]
    pub from: Option<String>,

    /// Project name used under `.pkglink/` (defaults to the installed package name)
    #[arg(long)]
    pub project_name: Option<String>,

    /// Replace an existing link or directory
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Show what would happen without touching the project
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Create the link under `.pkglink/<project>/`
    #[arg(long)]
    pub inside: bool,

    /// Install only; do not link the resource directory
    #[arg(long)]
    pub skip_resources: bool,

    /// Do not run the package's `pkglink.yaml` setup
    #[arg(long)]
    pub no_setup: bool,
}

impl LinkArgs {
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
            inside_pkglink: self.inside,
            skip_resources: self.skip_resources,
            no_setup: self.no_setup,
            tool: false,
        };
        Ok(PkglinkContext::new(self.source.clone(), source, options)?)
    }
}

/// Install one package and link its resources into the working directory.
#[tracing::instrument(skip(runtime, config))]
pub fn link<R: Runtime>(runtime: R, args: &LinkArgs, config: Config) -> Result<()> {
    let context = args.to_context()?;
    let installer = Installer::new(&runtime, config.cache_root.clone());

    let reports = run_batch(&runtime, &installer, &config.base_dir, vec![context])
        .with_context(|| format!("Failed to link {}", args.source))?;
    print_reports(&reports);
    Ok(())
}

/// Install and plan without linking, then print the plan.
#[tracing::instrument(skip(runtime, config))]
pub fn plan<R: Runtime>(runtime: R, args: &LinkArgs, json: bool, config: Config) -> Result<()> {
    let context = args.to_context()?;
    let installer = Installer::new(&runtime, config.cache_root.clone());
    let mut entries = vec![WorkflowEntry::new(context)];

    download_phase(&runtime, &installer, &mut entries)?;
    planning_phase(&runtime, &config.base_dir, &mut entries)?;

    let plans: Vec<_> = entries.iter().filter_map(|e| e.plan.as_ref()).collect();
    debug!("Planned {} entr(ies)", plans.len());

    if json {
        let rendered =
            serde_json::to_string_pretty(&plans).context("Failed to serialize link plan")?;
        println!("{}", rendered);
    } else {
        for plan in plans {
            println!("{}", plan_line(plan));
        }
    }
    Ok(())
}
