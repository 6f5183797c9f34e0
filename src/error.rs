//! Error handling for the phalanx discovery engine
//!
//! Run-level failures are real errors; per-host outcomes are data. A single
//! host failing never crosses the coordinator boundary as an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for discovery operations
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid address space: {0}")]
    InvalidAddressSpace(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No credential profiles, assignments, or fallback configured")]
    NoCredentialSource,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Output error: {0}")]
    OutputError(String),
}

/// Result type alias for discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Terminal per-host outcome for hosts that produced no discovery result.
///
/// These are normal data, not errors. `Unreachable` hosts are eligible for
/// retry on a future run; `AuthFailed` should raise an operator-visible
/// alert distinct from plain unreachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// No credential assignment or fallback matched the address
    NoCredentials,
    /// No protocol handshake succeeded at all
    Unreachable,
    /// At least one TCP/TLS handshake succeeded but every credential was rejected
    AuthFailed,
    /// The run was cancelled before this host completed
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoCredentials => write!(f, "no-credentials"),
            SkipReason::Unreachable => write!(f, "unreachable"),
            SkipReason::AuthFailed => write!(f, "auth-failed"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Pipeline stage in which a per-host failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    CredentialResolution,
    Probe,
    Compliance,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::CredentialResolution => write!(f, "credential-resolution"),
            FailureStage::Probe => write!(f, "probe"),
            FailureStage::Compliance => write!(f, "compliance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::NoCredentials.to_string(), "no-credentials");
        assert_eq!(SkipReason::Unreachable.to_string(), "unreachable");
        assert_eq!(SkipReason::AuthFailed.to_string(), "auth-failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DiscoveryError = io.into();
        assert!(matches!(err, DiscoveryError::IoError(_)));
    }
}
