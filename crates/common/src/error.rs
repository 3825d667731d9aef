//! Error types shared across the cssbuild workspace

use thiserror::Error;

/// Result type alias using the common Error
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSS parse error at byte {offset}: {reason}")]
    CssParse { offset: usize, reason: String },
}

impl Error {
    pub(crate) fn css(offset: usize, reason: impl Into<String>) -> Self {
        Error::CssParse {
            offset,
            reason: reason.into(),
        }
    }
}
