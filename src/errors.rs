use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors that can occur in hdvault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Lifecycle errors ---
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: wrong password or corrupted envelope")]
    Authentication,

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Benchmark failed: {0}")]
    Benchmark(String),

    #[error("Handle has been revoked")]
    Revoked,

    // --- Crypto errors ---
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Format errors ---
    #[error("Invalid envelope format: {0}")]
    InvalidFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- Remote errors ---
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error ({kind:?}): {message}")]
    Remote { kind: ErrorKind, message: String },

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire-stable classification of a [`VaultError`].
///
/// Carried in `throw` replies so the client can rebuild an error of the
/// same kind on its side of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Configuration,
    NotFound,
    Authentication,
    State,
    Unsupported,
    Benchmark,
    Revoked,
    Internal,
}

impl VaultError {
    /// Classify this error for transmission.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Authentication => ErrorKind::Authentication,
            Self::State(_) => ErrorKind::State,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Benchmark(_) => ErrorKind::Benchmark,
            Self::Revoked => ErrorKind::Revoked,
            Self::Remote { kind, .. } => *kind,
            _ => ErrorKind::Internal,
        }
    }

    /// Rebuild an error received from the other side of an RPC channel.
    pub fn from_remote(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Configuration => Self::Configuration(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Authentication => Self::Authentication,
            ErrorKind::State => Self::State(message),
            ErrorKind::Unsupported => Self::Unsupported(message),
            ErrorKind::Benchmark => Self::Benchmark(message),
            ErrorKind::Revoked => Self::Revoked,
            ErrorKind::Internal => Self::Remote { kind, message },
        }
    }

    /// Message body without the kind prefix, for the wire.
    pub fn detail(&self) -> String {
        match self {
            Self::Configuration(m)
            | Self::NotFound(m)
            | Self::State(m)
            | Self::Unsupported(m)
            | Self::Benchmark(m) => m.clone(),
            Self::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Convenience type alias for hdvault results.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_survive_a_remote_round_trip() {
        let errors = [
            VaultError::Configuration("twice".into()),
            VaultError::NotFound("vault 1".into()),
            VaultError::Authentication,
            VaultError::State("sealed".into()),
            VaultError::Benchmark("clock".into()),
            VaultError::Revoked,
        ];
        for err in errors {
            let rebuilt = VaultError::from_remote(err.kind(), err.detail());
            assert_eq!(rebuilt.kind(), err.kind());
            assert_eq!(rebuilt.detail(), err.detail());
        }
    }

    #[test]
    fn plumbing_errors_are_internal() {
        let err = VaultError::Crypto("bad key".into());
        assert_eq!(err.kind(), ErrorKind::Internal);
        let rebuilt = VaultError::from_remote(err.kind(), err.detail());
        assert!(matches!(rebuilt, VaultError::Remote { .. }));
    }
}
