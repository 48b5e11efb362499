//! Error taxonomy shared by every layer of the simulator.

use thiserror::Error;

/// Errors that can occur anywhere in the simulation core.
///
/// Every fallible operation returns one of these; there is no exception-style
/// control flow. RPC maps each variant onto a stable numeric code so clients
/// can branch on the kind without parsing messages.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimError {
    /// Settings invalid or an unknown vehicle type was requested.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// API called before arming or before initialization completed.
    #[error("not ready: {0}")]
    NotReady(String),

    /// Vehicle name is not present in the API registry.
    #[error("vehicle not found: {0}")]
    VehicleNotFound(String),

    /// Out-of-range or malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command did not complete within its budget.
    #[error("timeout after {0:.3}s")]
    Timeout(f64),

    /// Command pre-empted by a subsequent command on the same vehicle.
    #[error("cancelled")]
    Cancelled,

    /// Goal violates the geofence or a collision constraint.
    #[error("unsafe goal: {0}")]
    Unsafe(String),

    /// RPC socket or framing failure.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Broken invariant; should never occur.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl SimError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Creates an invalid-argument error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates an internal-invariant error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Stable numeric code used by the RPC layer.
    pub fn code(&self) -> i64 {
        match self {
            Self::ConfigError(_) => 1,
            Self::NotReady(_) => 2,
            Self::VehicleNotFound(_) => 3,
            Self::InvalidArgument(_) => 4,
            Self::Timeout(_) => 5,
            Self::Cancelled => 6,
            Self::Unsafe(_) => 7,
            Self::TransportError(_) => 8,
            Self::InternalError(_) => 9,
        }
    }

    /// Whether a caller may reasonably retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(SimError::config("x").code(), 1);
        assert_eq!(SimError::VehicleNotFound("a".into()).code(), 3);
        assert_eq!(SimError::Cancelled.code(), 6);
        assert_eq!(SimError::internal("x").code(), 9);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(SimError::NotReady("arming".into()).is_retryable());
        assert!(SimError::Timeout(1.0).is_retryable());
        assert!(!SimError::Cancelled.is_retryable());
        assert!(!SimError::invalid("x").is_retryable());
    }
}
