//! Error types for ReasonKit Hooks
//!
//! This module provides a comprehensive error type hierarchy using `thiserror`
//! for proper error handling across all components.

use thiserror::Error;

/// The main error type for ReasonKit Hooks operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (startup-time)
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Secret encryption/decryption errors
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Store lookup/ownership errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Outbound forwarding errors
    #[error("Forward error: {0}")]
    Forward(#[from] ForwardError),

    /// Provider resource-fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Startup configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The encryption key env var is required
    #[error("REASONKIT_HOOKS_ENCRYPTION_KEY environment variable not set")]
    MissingEncryptionKey,

    /// A config value failed to parse or is out of range
    #[error("Invalid value for {var}: {message}")]
    InvalidValue {
        /// Environment variable name
        var: String,
        /// What was wrong with it
        message: String,
    },

    /// The public base URL is not a valid URL
    #[error("Invalid public URL: {0}")]
    InvalidPublicUrl(String),
}

/// Secret cipher errors
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Master key was empty
    #[error("Encryption key cannot be empty")]
    EmptyKey,

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptFailed(String),

    /// Decryption failed (wrong key or tampered data)
    #[error("Decryption failed: {0}")]
    DecryptFailed(String),

    /// Stored blob is not a valid envelope
    #[error("Malformed ciphertext envelope: {0}")]
    MalformedEnvelope(String),
}

/// Store lookup errors. Ownership mismatches surface as not-found so the
/// API never reveals that a foreign id exists.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Endpoint does not exist
    #[error("Endpoint not found")]
    EndpointNotFound,

    /// Credential does not exist
    #[error("Credential not found")]
    CredentialNotFound,

    /// Log record does not exist
    #[error("Webhook log not found")]
    LogNotFound,
}

/// Forwarding attempt errors (internal to the engine; callers receive a
/// `ForwardingResult`, never one of these)
#[derive(Error, Debug)]
pub enum ForwardError {
    /// Attempt exceeded its time budget
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Connection/transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Provider resource-fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// Resource kind needs a parent id and cannot be fetched by bare id
    #[error("Cannot fetch {kind} directly - requires {parent} ID")]
    RequiresParent {
        /// Resource kind being fetched
        kind: String,
        /// Parent resource the provider API requires
        parent: String,
    },

    /// Unmapped resource kind
    #[error("Unknown resource type: {0}")]
    UnknownType(String),

    /// Provider API returned a non-2xx status
    #[error("Provider API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response detail
        message: String,
    },

    /// Connection/transport failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for ReasonKit Hooks operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }
}

/// Convert reqwest errors
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}
