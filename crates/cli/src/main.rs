//! ironloop CLI: the main entry point.
//!
//! Commands:
//! - `ask`          Run one query through the ReAct controller
//! - `keys`         List discovered API keys (masked)
//! - `check-path`   Resolve a path under an access level
//! - `check-shell`  Vet a shell command against the security layer
//! - `doctor`       Diagnose config, keys and sandbox

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ironloop",
    about = "ironloop: a streaming ReAct agent with a sandboxed tool layer",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the agent a question
    Ask(commands::ask::AskArgs),

    /// List API keys discovered for the configured provider
    Keys,

    /// Show how a path resolves under an access level
    CheckPath {
        path: String,

        /// sandbox, project or system (defaults to config)
        #[arg(long)]
        access_level: Option<String>,

        /// Override the resolution root
        #[arg(long)]
        root: Option<std::path::PathBuf>,
    },

    /// Check whether a shell command would be allowed
    CheckShell {
        command: String,

        /// sandbox, project or system (defaults to config)
        #[arg(long)]
        access_level: Option<String>,
    },

    /// Diagnose configuration and environment
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Ask(args) => commands::ask::run(args).await?,
        Commands::Keys => commands::keys::run()?,
        Commands::CheckPath {
            path,
            access_level,
            root,
        } => commands::check::path(&path, access_level.as_deref(), root)?,
        Commands::CheckShell {
            command,
            access_level,
        } => commands::check::shell(&command, access_level.as_deref())?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
