use thiserror::Error;

/// Errors shared by crates that do not need a richer taxonomy of their own
/// (configuration loading, CLI helpers).
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid {format}: {message}")]
    Parse { format: &'static str, message: String },

    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn parse(format: &'static str, source: impl std::fmt::Display) -> Self {
        Self::Parse {
            format,
            message: source.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
