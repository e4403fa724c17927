// Admin Diagnostics - Main Entry Point
//
// - `serve`: run the authenticated HTTP endpoint
// - `run`: execute one whitelisted diagnostic locally
// - `list`: show the registry

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use admin_diagnostics::config::Config;
use admin_diagnostics::logging;
use admin_diagnostics::server::{self, DiagnosticError};
use admin_diagnostics::tools::{self, CommandRegistry, CommandValidator, DiagnosticExecutor};

/// Admin Diagnostics: allow-listed diagnostic commands over HTTP
#[derive(Parser, Debug)]
#[command(name = "admin-diagnostics")]
#[command(version)]
#[command(about = "Authenticated, allow-listed diagnostics endpoint for administrators", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the diagnostics endpoint
    Serve {
        /// Override the listen address (e.g. 127.0.0.1:8080)
        #[arg(long)]
        listen: Option<String>,
    },
    /// Run one diagnostic locally and print the result as JSON
    Run {
        /// Diagnostic to run, e.g. "uptime" or "cat /proc/cpuinfo"
        command: String,
    },
    /// List the allowed diagnostics
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    tools::mark_process_start();
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging, args.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let outcome = match args.command {
        Commands::Serve { listen } => serve(config, listen).await,
        Commands::Run { command } => run_once(&config, &command).await,
        Commands::List => {
            list();
            Ok(ExitCode::SUCCESS)
        }
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

async fn serve(mut config: Config, listen: Option<String>) -> Result<ExitCode> {
    if let Some(listen) = listen {
        config.server.listen = listen;
        config.validate()?;
    }

    info!("Admin diagnostics v{} starting...", env!("CARGO_PKG_VERSION"));

    server::serve(&config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await?;

    Ok(ExitCode::SUCCESS)
}

/// Validate and execute a single diagnostic, printing JSON to stdout
async fn run_once(config: &Config, raw: &str) -> Result<ExitCode> {
    let validator = CommandValidator::new(CommandRegistry::builtin());
    let executor = DiagnosticExecutor::with_config(config.executor.executor_config());

    let command = match validator.validate(raw) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "Rejected diagnostic command");
            eprintln!("{}", DiagnosticError::from(e).public_message());
            return Ok(ExitCode::from(2));
        }
    };

    match executor.run(&command).await {
        Ok(result) => {
            let json = serde_json::to_string_pretty(&result).context("Failed to encode result")?;
            println!("{}", json);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            warn!(error = %failure, "Diagnostic execution failed");
            let err = DiagnosticError::from_execution(failure, config.executor.expose_stderr);
            eprintln!("{}", err.public_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn list() {
    for command in CommandRegistry::builtin().list() {
        println!("{:<22} {}", command.key, command.kind());
    }
}
