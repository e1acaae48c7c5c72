//! Error types for smart account session operations

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while deriving, operating or linking a smart
/// account session
#[derive(Debug, Error)]
pub enum Error {
    // ============ Signer Errors ============
    /// The primary wallet has no usable provider or refused the chain switch
    #[error("Signer unavailable: {0}")]
    SignerUnavailable(String),

    /// A signature request was refused (e.g. the user cancelled it)
    #[error("Signing declined: {0}")]
    SigningDeclined(String),

    // ============ Derivation Errors ============
    /// Unknown smart account variant
    #[error("Unsupported account variant: {0}")]
    UnsupportedVariant(String),

    /// Address derivation failed; safe to retry with the same inputs
    #[error("Address derivation failed: {0}")]
    DerivationFailed(String),

    // ============ Middleware Errors ============
    /// Paymaster or bundler endpoint unreachable at construction
    #[error("Middleware unavailable: {0}")]
    MiddlewareUnavailable(String),

    /// The paymaster declined to sponsor the operation
    #[error("Sponsorship rejected: {0}")]
    SponsorshipRejected(String),

    /// The bundler rejected the operation or timed out
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    // ============ Linking Errors ============
    /// The identity collaborator rejected the challenge or signature
    #[error("Linking rejected: {0}")]
    LinkingRejected(String),

    /// Linking was attempted without a Ready session
    #[error("Session not ready: {0}")]
    SessionNotReady(String),

    // ============ Configuration Errors ============
    /// Entry-point version or endpoint mismatch
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ============ Transport Errors ============
    /// JSON-RPC transport failure
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Timeout waiting for a network-dependent step
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    // ============ Internal Errors ============
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check whether retrying with identical inputs is safe
    ///
    /// Only address derivation is a pure function of its inputs; every
    /// other failure requires fresh caller input (a new chain switch,
    /// an adjusted operation, a fresh challenge).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DerivationFailed(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Serialization(e.to_string())
    }
}
