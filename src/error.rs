/// Typed failures for the store, the backend client, configuration and the
/// session logic. The binary boundary wraps these in `anyhow`.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    NotFound(String),
    #[error("conversation already exists: {0}")]
    Duplicate(String),
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create database directory {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid message role `{0}` in database")]
    InvalidRole(String),
    #[error("invalid timestamp `{0}` in database")]
    InvalidTimestamp(i64),
    #[error("database connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no choices returned")]
    NoChoices,
    #[error("backend is not running")]
    NotRunning,
    #[error("backend failed to start within {0:?}")]
    StartupTimeout(std::time::Duration),
    #[error("failed to launch backend `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine the user home directory")]
    NoHomeDir,
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("conversation {0} has no messages")]
    EmptyConversation(String),
}
