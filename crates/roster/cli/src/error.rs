use roster_service::ActionError;
use roster_storage::StorageError;
use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Action(#[from] ActionError),

    /// The `--as` member has no record to derive a principal from.
    #[error("Unknown acting member: {0}")]
    UnknownActor(String),

    #[error("An acting member is required, pass --as or set ROSTER_ACTOR")]
    MissingActor,

    #[error("Storage backend `{0}` needs rosterctl built with the `{0}` feature")]
    BackendDisabled(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
