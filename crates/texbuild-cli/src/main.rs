use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use texbuild_core::CancelToken;
use texbuild_runner::Project;

#[derive(Parser)]
#[command(name = "texbuild", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize texbuild in the current directory (creates .texbuild/, config, db)
    Init,

    /// Check that the configured TeX tools can be started
    Doctor,

    /// Build the main document until it settles or the pass limit is reached
    Build {
        /// Override build.max_passes for this build
        #[arg(long)]
        max_passes: Option<u32>,
        /// Print the build report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List tracked files as of the last build
    Status,

    /// Forget tracked files so the next build starts from scratch
    Clean,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Project::init(&root)?;
            println!("Initialized texbuild in {}", root.display());
        }
        Command::Doctor => {
            let p = Project::open(root)?;
            for check in p.doctor()? {
                let state = if check.found { "ok" } else { "missing" };
                println!("- {} ({}): {} {}", check.runner, check.executable, state, check.version.unwrap_or_default());
            }
        }
        Command::Build { max_passes, json } => {
            let p = Project::open(root)?;
            let report = p.build(max_passes, &CancelToken::new())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let runners: Vec<&str> = report.runners_run.iter().map(|r| r.as_str()).collect();
                println!("Built {} in {} passes", p.cfg.project.main, report.passes);
                if !runners.is_empty() {
                    println!("Runners: {}", runners.join(", "));
                }
                for out in &report.outputs {
                    println!("Output: {}", out);
                }
                if report.maxed_out {
                    println!("Pass limit reached; the document may not have settled");
                }
            }
        }
        Command::Status => {
            let p = Project::open(root)?;
            let cache = p.tracked_files()?;
            println!("Tracked files: {}", cache.len());
            for (path, entry) in cache.iter() {
                println!("- {} @ {}", path, entry.stamp.0);
            }
        }
        Command::Clean => {
            let p = Project::open(root)?;
            p.clean()?;
            println!("Cleared file cache for {}", p.cfg.project.id);
        }
    }

    Ok(())
}
