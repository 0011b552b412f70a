use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Store-tier failures are recovered locally and never reach callers
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

/// Error returned by a cached fetch
///
/// Only key derivation failures and executor failures are visible to callers;
/// the executor's own error is handed back untouched.
#[derive(Debug, Error)]
pub enum FetchError<E> {
    #[error(transparent)]
    Key(DomainError),

    #[error(transparent)]
    Executor(E),
}

impl<E> FetchError<E> {
    /// Returns the executor error, if that is what failed
    pub fn into_executor(self) -> Option<E> {
        match self {
            Self::Executor(e) => Some(e),
            Self::Key(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error() {
        let error = DomainError::serialization("key must be a string");
        assert_eq!(error.to_string(), "Serialization error: key must be a string");
    }

    #[test]
    fn test_store_unavailable_error() {
        let error = DomainError::store_unavailable("connection refused");
        assert_eq!(error.to_string(), "Store unavailable: connection refused");
        assert!(error.is_store_failure());
        assert!(!DomainError::cache("bad payload").is_store_failure());
    }

    #[test]
    fn test_fetch_error_is_transparent() {
        let error: FetchError<std::io::Error> =
            FetchError::Executor(std::io::Error::other("database down"));
        assert_eq!(error.to_string(), "database down");

        let error: FetchError<std::io::Error> =
            FetchError::Key(DomainError::serialization("cycle"));
        assert_eq!(error.to_string(), "Serialization error: cycle");
        assert!(error.into_executor().is_none());
    }
}
