/// Core error type for TeleBot Pro.
///
/// Adapter crates should map their specific errors into this type so the
/// application core can handle failures consistently (operator-facing
/// message vs fatal-to-one-job).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
