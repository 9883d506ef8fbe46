//! Error types for the FraudShield core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The user cancelled the active download session. This is a controlled
    /// exit, never surfaced to the UI as a failure.
    #[error("Download cancelled by user")]
    Cancelled,

    /// A single file transfer failed (bad status, truncated stream).
    #[error("{0}")]
    Transfer(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The external inference engine rejected initialization or generation.
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Unknown model variant: {0}")]
    UnknownVariant(String),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
