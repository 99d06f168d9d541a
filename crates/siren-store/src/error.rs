use thiserror::Error;

/// Errors surfaced by the persistent store and site registry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("site registry parse error: {0}")]
    Registry(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
