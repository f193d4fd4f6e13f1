//! Structured error types for AgentPact
//!
//! Every failure a caller can observe falls into one of the categories
//! below. Per-record problems met while scanning the ledger are not errors;
//! they are counted in [`crate::scanner::ScanReport`] instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Missing or invalid client setup. Fatal, surfaced immediately.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Neither a local credential nor a complete remote wallet is configured
    #[error("no signing method configured: provide a local keypair or a remote wallet token and handle")]
    NoSigner,

    /// RPC or wallet endpoint is unusable
    #[error("invalid endpoint {field}: {reason}")]
    InvalidEndpoint { field: String, reason: String },

    /// Key material could not be decoded into a keypair
    #[error("invalid key material: {reason}")]
    InvalidKeyMaterial { reason: String },

    /// Keypair file could not be read
    #[error("keypair file unreadable: {path}")]
    KeypairFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration value is out of range
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// A credential or signing backend cannot authorize a write
#[derive(Error, Debug)]
pub enum SigningError {
    /// Local strategy selected but no key material was supplied
    #[error("no local credential configured")]
    NoCredential,

    /// The remote wallet service could not resolve the account handle
    #[error("could not resolve wallet identity for '{handle}': {reason}")]
    UnresolvedIdentity { handle: String, reason: String },

    /// The remote wallet backend cannot sign transactions
    #[error("wallet backend '{backend}' does not support transaction signing")]
    UnsupportedByBackend { backend: String },

    /// The signing service refused or returned an unusable answer
    #[error("signing rejected: {reason}")]
    Rejected { reason: String },
}

/// Transport, RPC, or confirmation failure
#[derive(Error, Debug)]
pub enum NetworkError {
    /// A single request exceeded its timeout
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Connection-level failure
    #[error("{operation} failed: {message}")]
    Transport { operation: String, message: String },

    /// Non-success HTTP status
    #[error("{operation} returned HTTP {status}: {body}")]
    HttpStatus {
        operation: String,
        status: u16,
        body: String,
    },

    /// JSON-RPC error object returned by the node
    #[error("rpc {method} error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response from {operation}: {message}")]
    InvalidResponse { operation: String, message: String },

    /// The blockhash expired before the write was confirmed
    #[error("checkpoint expired before {signature} was confirmed")]
    CheckpointExpired { signature: String },

    /// Confirmation polling ran past its deadline
    #[error("confirmation of {signature} not observed within {duration:?}")]
    ConfirmationTimeout {
        signature: String,
        duration: Duration,
    },

    /// The write landed but the ledger recorded it as failed
    #[error("transaction {signature} failed on ledger: {reason}")]
    TransactionFailed { signature: String, reason: String },
}

impl NetworkError {
    /// Check if error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::Transport { .. }
            | Self::CheckpointExpired { .. }
            | Self::ConfirmationTimeout { .. }
            | Self::InvalidResponse { .. } => true,
            Self::HttpStatus { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            // -32005 node behind, -32004 block not available
            Self::Rpc { code, .. } => matches!(code, -32005 | -32004 | -32603),
            Self::TransactionFailed { .. } => false,
        }
    }

    /// Map a reqwest failure for a named operation
    pub fn from_reqwest(operation: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                operation: operation.to_string(),
                duration: timeout,
            }
        } else if err.is_decode() {
            Self::InvalidResponse {
                operation: operation.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                operation: operation.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Failure of a `publish` call; nothing partial is returned
#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A display field was empty
    #[error("invalid event: {field} must not be empty")]
    InvalidEvent { field: &'static str },

    /// The serialized write exceeds the ledger packet size
    #[error("encoded write is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PublishError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Failure of a history scan; only the signature listing can cause one
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("identity is not a valid address: {0}")]
    InvalidIdentity(String),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Primary error type for AgentPact operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("scan failed: {0}")]
    Scan(#[from] ScanError),
}

impl Error {
    /// Check if error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(err) => err.is_retryable(),
            Self::Publish(err) => err.is_retryable(),
            Self::Scan(ScanError::Network(err)) => err.is_retryable(),
            Self::Configuration(_) | Self::Signing(_) | Self::Scan(_) => false,
        }
    }

    /// Check if error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Signing(_)
                | Self::Publish(PublishError::Configuration(_))
                | Self::Publish(PublishError::Signing(_))
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(ConfigurationError::NoSigner)
            | Self::Publish(PublishError::Configuration(ConfigurationError::NoSigner)) => {
                "No signer configured. Set [local] private_key or keypair_path, or a remote wallet token and handle.".to_string()
            }
            Self::Signing(SigningError::UnsupportedByBackend { .. })
            | Self::Publish(PublishError::Signing(SigningError::UnsupportedByBackend { .. })) => {
                "The remote wallet can only sign messages, not transactions. Use a local keypair instead.".to_string()
            }
            err if err.is_retryable() => format!("{}. The network may be busy; try again.", err),
            _ => self.to_string(),
        }
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(NetworkError::Timeout {
            operation: "getTransaction".to_string(),
            duration: Duration::from_secs(30),
        }
        .is_retryable());

        assert!(NetworkError::HttpStatus {
            operation: "sendTransaction".to_string(),
            status: 429,
            body: String::new(),
        }
        .is_retryable());

        assert!(!NetworkError::TransactionFailed {
            signature: "abc".to_string(),
            reason: "InstructionError".to_string(),
        }
        .is_retryable());

        assert!(!Error::from(PublishError::Configuration(ConfigurationError::NoSigner)).is_retryable());
    }

    #[test]
    fn test_publish_wraps_network() {
        let err: PublishError = NetworkError::Transport {
            operation: "sendTransaction".to_string(),
            message: "connection refused".to_string(),
        }
        .into();
        assert!(err.is_retryable());
        assert!(Error::from(err).is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let err = Error::from(PublishError::Configuration(ConfigurationError::NoSigner));
        assert!(err.user_message().contains("No signer configured"));
        assert!(err.requires_user_action());

        let err = Error::from(SigningError::UnsupportedByBackend {
            backend: "message_signing_only".to_string(),
        });
        assert!(err.user_message().contains("only sign messages"));
    }
}
