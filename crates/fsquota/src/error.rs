//! Error types for quota and mount table operations.

use thiserror::Error;

/// Errors surfaced by [`QuotaClient`](crate::QuotaClient) and
/// [`MountEnumerator`](crate::MountEnumerator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    /// The backend reported a failure through its last-error channel.
    ///
    /// The display form is the backend's message, verbatim.
    #[error("{message}")]
    Backend {
        /// Backend operation that reported the failure (e.g. `quota_query`)
        operation: &'static str,
        /// Message read from the last-error channel
        message: String,
    },

    /// An argument cannot be passed to the backend.
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument
        argument: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// A mount enumerator is already open on this session.
    ///
    /// The backend has a single enumeration cursor, so enumerators cannot
    /// interleave.
    #[error("a mount table enumeration is already in progress")]
    CursorBusy,

    /// The native backend is held by another client session.
    #[error("the native quota backend is already in use by another client")]
    BackendUnavailable,
}

impl QuotaError {
    /// The backend message, if this error came from the last-error channel.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            QuotaError::Backend { message, .. } => Some(message),
            _ => None,
        }
    }

    /// The backend operation that failed, if any.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            QuotaError::Backend { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

/// Result type for quota operations.
pub type Result<T> = std::result::Result<T, QuotaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_displays_message_verbatim() {
        let err = QuotaError::Backend {
            operation: "quota_query",
            message: "Not privileged".to_string(),
        };
        assert_eq!(err.to_string(), "Not privileged");
        assert_eq!(err.backend_message(), Some("Not privileged"));
        assert_eq!(err.operation(), Some("quota_query"));
    }

    #[test]
    fn test_non_backend_errors_have_no_message() {
        assert_eq!(QuotaError::CursorBusy.backend_message(), None);
        assert_eq!(QuotaError::BackendUnavailable.operation(), None);
    }
}
