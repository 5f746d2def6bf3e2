use thiserror::Error;

#[derive(Debug, Error)]
pub enum MusterError {
    #[error("invalid identifier '{0}': must be 1-128 ASCII letters, digits, '_' or '-'")]
    InvalidIdentifier(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid unit status: {0}")]
    InvalidStatus(String),

    #[error("unknown hook event: {0}")]
    InvalidHookKind(String),

    #[error("unit not found: {0}")]
    UnitNotFound(String),

    #[error("stage manifest not found: {0}")]
    ManifestMissing(String),

    #[error("invalid stage manifest: {0}")]
    ManifestInvalid(String),

    #[error("stage {index} missing from manifest '{manifest}'")]
    StageMissing { index: u32, manifest: String },

    #[error("spawner unavailable: '{0}' not found on PATH")]
    SpawnUnavailable(String),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("malformed store row: {0}")]
    MalformedRow(String),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MusterError>;
