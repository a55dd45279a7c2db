use anyhow::Result;
use clap::Parser;
use pkglink::commands::{self, Config, LinkArgs, ToolArgs};
use pkglink::runtime::RealRuntime;
use std::path::PathBuf;
use std::process::ExitCode;

/// pkglink - link resources from Python packages into your project
///
/// Installs a package with uvx (falling back to `uv pip install --target`),
/// caches it, finds its resource directory, and links it into the current
/// directory as a dot-prefixed symlink.
///
/// Examples:
///   pkglink link github:acme/toolbelt@v1.2.0   # link toolbelt's resources as .toolbelt
///   pkglink link mypkg docs --inside           # link mypkg/docs under .pkglink/mypkg/
///   pkglink tool github:acme/linter@v2.0.0     # make linter runnable with uvx --from
///   pkglink sync                               # apply pkglink.config.yaml
#[derive(Parser, Debug)]
#[command(author, version = env!("PKGLINK_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Package cache directory (defaults to ~/.cache/pkglink)
    #[arg(
        long = "cache-dir",
        env = "PKGLINK_CACHE_DIR",
        value_name = "PATH",
        global = true
    )]
    cache_dir: Option<PathBuf>,

    /// More output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package and link its resources
    Link(LinkArgs),

    /// Install a package and show what `link` would do
    Plan(PlanArgs),

    /// Install a package and prepare it for `uvx --from .pkglink/<project>`
    #[command(visible_alias = "x")]
    Tool(ToolArgs),

    /// Link every entry from a config file
    Sync(SyncArgs),

    /// List links in a directory
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
struct PlanArgs {
    #[command(flatten)]
    link: LinkArgs,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct SyncArgs {
    /// Config file (defaults to pkglink.config.yaml)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show what would happen without touching the project
    #[arg(long, short = 'n')]
    dry_run: bool,

    /// Only sync these entries
    #[arg(value_name = "ENTRY")]
    entries: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    /// Directory to inspect (defaults to the current directory)
    #[arg(value_name = "DIR")]
    dir: Option<PathBuf>,
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn run(cli: Cli) -> Result<()> {
    let runtime = RealRuntime;
    let config = Config::new(&runtime, cli.cache_dir)?;

    match cli.command {
        Commands::Link(args) => commands::link(runtime, &args, config),
        Commands::Plan(args) => commands::plan(runtime, &args.link, args.json, config),
        Commands::Tool(args) => commands::tool(runtime, &args, config),
        Commands::Sync(args) => {
            commands::sync(runtime, args.config, &args.entries, args.dry_run, config)
        }
        Commands::List(args) => commands::list(runtime, args.dir, config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbose)),
    )
    .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
