//! Error handling module for nixstrap
//!
//! Provides centralized error handling with proper error types using thiserror.
//! All errors in the application should use these types for consistency.
//!
//! User cancellation (`Cancelled`) is deliberately a variant of this enum and
//! not an error in the exit-status sense: it always maps to exit code 0 and
//! must never be conflated with a decryption or tool failure.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for nixstrap
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// IO errors (file operations, terminal, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// User-initiated cancellation (Ctrl-C during a prompt)
    #[error("interrupted by user")]
    Cancelled,

    /// Master key decryption exhausted all passphrase attempts
    #[error("failed to decrypt master key {} after {attempts} attempts", .path.display())]
    MasterKeyDecrypt { path: PathBuf, attempts: u32 },

    /// Derived secret decryption failed (single attempt, no retry)
    #[error("failed to decrypt secret {}: {reason}", .path.display())]
    SecretDecrypt { path: PathBuf, reason: String },

    /// An external tool exited with a non-zero status
    #[error("{tool} failed with exit code {}", .code.unwrap_or(-1))]
    Tool { tool: &'static str, code: Option<i32> },

    /// Secret store errors (missing host/user subtree, unresolvable root)
    #[error("secret store error: {0}")]
    Store(String),

    /// Filesystem errors while installing staged material
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// System errors (spawning tools, signal handlers)
    #[error("system error: {0}")]
    System(String),
}

/// Result type alias for nixstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

// Convenient error constructors
impl BootstrapError {
    /// Create a secret store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a filesystem error
    pub fn filesystem(msg: impl Into<String>) -> Self {
        Self::Filesystem(msg.into())
    }

    /// Create a system error
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// True for user-initiated cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Process exit code for this error.
    ///
    /// Cancellation is clean (0). A derived-secret failure reserves its own
    /// status so callers can tell key-material corruption apart from a wrong
    /// human-entered passphrase. Everything else is a generic fatal 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 0,
            Self::SecretDecrypt { .. } => 128,
            _ => 1,
        }
    }
}
