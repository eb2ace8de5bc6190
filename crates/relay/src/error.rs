use std::error::Error as StdError;

/// Crate-wide result type for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed relay errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A persistence call failed.
    #[error("storage operation failed: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A chat-platform call (send, edit, delete) failed.
    #[error("outbound operation failed: {context}: {source}")]
    Outbound {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{message}")]
    Message { message: String },

    /// JSON (de)serialization of a stored guild config failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn storage(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn outbound(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Outbound {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
