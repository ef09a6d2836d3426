//! Binôme CLI - record field visits and zones from the terminal
//!
//! Works against the local replica; `sync` reconciles it with the remote
//! team tables.

mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::{run_login, run_logout, run_whoami};
use crate::commands::common::{resolve_db_path, Context};
use crate::commands::config::run_config;
use crate::commands::sync::run_sync;
use crate::commands::visit::run_visit;
use crate::commands::zone::run_zone;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "binome=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    let command = match cli.command {
        Commands::Config { command } => return run_config(command, profile),
        other => other,
    };

    let db_path = resolve_db_path(cli.db_path);
    tracing::debug!("Opening local replica at {}", db_path.display());
    let mut context = Context::open(&db_path, profile)?;

    match command {
        Commands::Login {
            user,
            name,
            zone,
            admin,
        } => run_login(&context, user, name, zone, admin),
        Commands::Logout => run_logout(&context),
        Commands::Whoami { json } => run_whoami(&context, json),
        Commands::Visit { command } => run_visit(&mut context, command, cli.sync).await,
        Commands::Zone { command } => run_zone(&mut context, command, cli.sync).await,
        Commands::Sync { command } => run_sync(&context, command).await,
        Commands::Config { command } => run_config(command, profile),
    }
}
