//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why the chat hub settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read chathub settings at {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("chathub settings at {} are not valid JSON: {source}", path.display())]
    Json {
        /// File that failed.
        path: PathBuf,
        /// Parser error.
        source: serde_json::Error,
    },
    /// The merged settings tree does not match the settings schema.
    #[error("chathub settings have the wrong shape: {0}")]
    Schema(#[from] serde_json::Error),
    /// A hub limit or timing combination was rejected.
    #[error("invalid chathub setting: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_path() {
        let err = SettingsError::Io {
            path: PathBuf::from("/etc/chathub/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/chathub/settings.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn schema_error_from_conversion() {
        let json_err = serde_json::from_str::<u16>("\"eighty\"").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(matches!(err, SettingsError::Schema(_)));
        assert!(err.to_string().starts_with("chathub settings have the wrong shape"));
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("sendQueueCapacity must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "invalid chathub setting: sendQueueCapacity must be > 0"
        );
    }
}
