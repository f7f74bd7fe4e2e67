use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Market data error: {0}")]
    Data(String),

    #[error("Rate limited by data provider: {0}")]
    RateLimited(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
