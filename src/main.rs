use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use baton::baton_config::ExecutionMode;
use baton::config::{CliOverrides, Config};
use baton::errors::EXIT_FATAL;
use baton::init::is_initialized;

mod cmd;

#[derive(Parser)]
#[command(name = "baton")]
#[command(version, about = "Deterministic multi-phase workflow coordinator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace containing the .baton directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Project id. Defaults to project.default_id or the only project present.
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// How delegation requests reach the executor: interactive, process or mock
    #[arg(long, global = true)]
    pub mode: Option<ExecutionMode>,

    /// Per-attempt delegation deadline in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the .baton workspace (if needed) and a new project
    Init {
        project_id: String,
    },
    /// Import an operator-supplied artifact from a JSON file
    Import {
        /// Artifact name, e.g. feature_spec
        artifact: String,
        file: PathBuf,
        /// Replace an input that later states have already consumed
        #[arg(long)]
        force: bool,
    },
    /// Run one state machine iteration
    Step,
    /// Iterate until a halt or completion
    Run {
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Show the current state, artifacts and counters
    Status,
    /// Show quality gate history
    History {
        /// Only show the most recent N results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Start another maintenance cycle on a completed project
    Maintain,
    /// Move the project under .baton/archive
    Archive {
        #[arg(long)]
        force: bool,
    },
    /// View and validate baton.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Create a default baton.toml
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            baton::ui::print_fatal(&err);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let overrides = CliOverrides {
        verbose: cli.verbose,
        mode: cli.mode,
        timeout_ms: cli.timeout_ms,
    };
    let config = Config::new(project_dir, overrides)?;

    let log_dir = is_initialized(&config.project_dir).then_some(config.log_dir.as_path());
    let _log_guard = baton::logging::init(&config.toml().logging, config.verbose, log_dir)?;

    let project = || config.resolve_project_id(cli.project.as_deref());
    match cli.command {
        Commands::Init { project_id } => cmd::cmd_init(&config, &project_id),
        Commands::Import {
            artifact,
            file,
            force,
        } => cmd::cmd_import(&config, &project()?, &artifact, &file, force),
        Commands::Step => cmd::cmd_step(&config, &project()?).await,
        Commands::Run { max_steps } => cmd::cmd_run(&config, &project()?, max_steps).await,
        Commands::Status => cmd::cmd_status(&config, &project()?),
        Commands::History { limit } => cmd::cmd_history(&config, &project()?, limit),
        Commands::Maintain => cmd::cmd_maintain(&config, &project()?),
        Commands::Archive { force } => cmd::cmd_archive(&config, &project()?, force),
        Commands::Config { command } => cmd::cmd_config(&config, command),
    }
}
