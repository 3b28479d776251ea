use thiserror::Error;

pub const NOT_FOUND_CODE: &str = "NoSuchKey";

/// Error surfaced by a transport client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: String,
    pub message: String,
    pub status: Option<u16>,
    pub not_found: bool,
}

impl TransportError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            status: None,
            not_found: false,
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self {
            code: NOT_FOUND_CODE.to_string(),
            message: format!("the specified key does not exist: {}", key),
            status: Some(404),
            not_found: true,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("client not initialized")]
    NotInitialized,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to write {path}: {message}")]
    Io { path: String, message: String },
}

impl StorageError {
    /// Message carried by a failure envelope.
    pub fn user_message(&self) -> String {
        match self {
            StorageError::Transport(err) if !err.message.is_empty() => err.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Transport(err) if err.not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message() {
        let cases = vec![
            (StorageError::NotInitialized, "client not initialized"),
            (
                StorageError::Configuration("region and bucket are required".to_string()),
                "configuration error: region and bucket are required",
            ),
            (
                StorageError::Transport(TransportError::new("AccessDenied", "denied")),
                "denied",
            ),
            (
                StorageError::Transport(TransportError::new("Unknown", "")),
                "Unknown: ",
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.user_message(), expected, "failed for case: {:?}", err);
        }
    }

    #[test]
    fn test_is_not_found() {
        assert!(StorageError::Transport(TransportError::not_found("a")).is_not_found());
        assert!(!StorageError::Transport(TransportError::new("AccessDenied", "x")).is_not_found());
        assert!(!StorageError::NotInitialized.is_not_found());
    }
}
