//! Errors raised by the configuration model and its file codec

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Malformed line {line} ({reason}): {text}")]
    Format {
        line: usize,
        text: String,
        reason: String,
    },
    #[error("Unknown reference: {0}")]
    Reference(String),
    #[error("Duplicate name: {0}")]
    Duplicate(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub(crate) fn format(line: usize, text: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            line,
            text: text.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from the file content rather than the file system
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
