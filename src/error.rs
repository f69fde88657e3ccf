//! Error types used throughout the tracker

use thiserror::Error;

/// Main error type for the routine tracker
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid time '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl TrackerError {
    /// Stable label for structured log fields.
    pub fn label(&self) -> &'static str {
        match self {
            TrackerError::Storage(_) => "storage",
            TrackerError::Serialization(_) => "serialization",
            TrackerError::Io(_) => "io",
            TrackerError::InvalidTime(_) => "invalid_time",
            TrackerError::InvalidInput(_) => "invalid_input",
            TrackerError::NotFound(_) => "not_found",
            TrackerError::Config(_) => "config",
            TrackerError::Lock(_) => "lock",
        }
    }
}

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TrackerError::InvalidTime("25:00".to_string());
        assert_eq!(err.to_string(), "Invalid time '25:00': expected HH:MM");
        assert_eq!(err.label(), "invalid_time");

        let err: TrackerError = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert_eq!(err.label(), "serialization");
    }
}
