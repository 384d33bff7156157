use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },
}

impl Error {
    /// Build an upstream error from a response status and body
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Error::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Whether the failure should be retried on the next poll
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Upstream { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
