use std::io;

use binome_core::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] binome_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Profile error: {0}")]
    Profile(String),
    #[error("Not signed in. Run `binome login --user <TEAM>` first.")]
    NotSignedIn,
    #[error("Only administrators can {0}")]
    AdminOnly(&'static str),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("No visible {kind} matches '{query}'")]
    NotFound { kind: &'static str, query: String },
    #[error("{0}")]
    Ambiguous(String),
    #[error(
        "Sync is not configured. Run `binome config init --api-url <URL>` or set BINOME_TABLE_API_URL and BINOME_TABLE_API_TOKEN."
    )]
    SyncNotConfigured,
}
