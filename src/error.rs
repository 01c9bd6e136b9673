use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    /// The route target was neither an alias nor a configuration record.
    #[error("invalid route target: {0}")]
    InvalidTarget(String),

    /// Closing a scope-owned connection failed during exit.
    #[error("failed to close connection '{alias}': {source}")]
    CleanupFailure {
        alias: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("connection '{0}' is still in use")]
    ConnectionBusy(String),

    #[error("database alias '{0}' is already registered")]
    DuplicateAlias(String),

    #[error("database alias '{0}' is not registered")]
    UnknownAlias(String),

    #[error("unsupported database engine '{0}'")]
    UnsupportedEngine(String),

    #[error("database '{alias}' is missing required setting '{key}'")]
    MissingSetting { alias: String, key: &'static str },

    #[error("invalid value for setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("invalid connection url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RouteError>;
