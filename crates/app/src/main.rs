//! studioctl - command line front end for the studio scheduling core

use std::io;
use std::process::ExitCode;

use clap::Parser;
use studio_core::{Database, LogNotifier, RolePolicy, SystemClock, UserId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod config;
mod error;

use cli::Cli;
use commands::Session;
use config::AppConfig;
use error::{AppError, AppResult};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("CONFIG: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("{}: {}", e.code(), e);
            if matches!(&e, AppError::Core(core) if core.suggests_top_up()) {
                eprintln!("Ask the studio to top up your credits, then book again.");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &AppConfig) -> AppResult<()> {
    let path = match &cli.db {
        Some(path) => path.clone(),
        None => config.database_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::open(&path)?;
    tracing::info!(path = %path.display(), schema = db.schema_version(), "Database ready");

    let actor = cli
        .actor
        .as_deref()
        .ok_or_else(|| AppError::Usage("--as <USER_ID> is required".into()))?;
    let policy = RolePolicy::new(config.admin_ids());
    let clock = SystemClock;
    let notifier = LogNotifier;
    let session = Session::resolve(&db, &clock, &notifier, &policy, &UserId::new(actor))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    cli.command.execute(&session, &mut out)
}
