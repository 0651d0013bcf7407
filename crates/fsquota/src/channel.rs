//! The backend's last-error channel.
//!
//! The backend overwrites a single message after every call. An empty
//! message or the literal `"Success"` (what `strerror(0)` yields) means the
//! call went through; anything else is the failure text.

use tracing::debug;

use crate::backend::QuotaBackend;
use crate::error::{QuotaError, Result};
use crate::marshal::from_backend_buffer;

/// Sentinel the backend reports when nothing failed.
pub const SUCCESS_SENTINEL: &str = "Success";

/// Read-only view of the backend's last-error message.
pub struct ErrorChannel;

impl ErrorChannel {
    /// Read the current message. A null message reads as empty.
    pub fn read<B: QuotaBackend + ?Sized>(backend: &mut B) -> String {
        // SAFETY: QuotaBackend guarantees strerr() is null or a valid C string
        // until the next backend call; we copy it before making one.
        unsafe { from_backend_buffer(backend.strerr()) }.unwrap_or_default()
    }

    /// True when `message` signals a failure.
    pub fn is_failure(message: &str) -> bool {
        !message.is_empty() && message != SUCCESS_SENTINEL
    }

    /// Convert a message read after `operation` into a result.
    pub fn into_result(operation: &'static str, message: String) -> Result<()> {
        if Self::is_failure(&message) {
            debug!(operation, error = %message, "Backend reported failure");
            Err(QuotaError::Backend { operation, message })
        } else {
            Ok(())
        }
    }

    /// Read the channel and fail if it holds an error.
    pub fn check<B: QuotaBackend + ?Sized>(backend: &mut B, operation: &'static str) -> Result<()> {
        let message = Self::read(backend);
        Self::into_result(operation, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_not_failures() {
        assert!(!ErrorChannel::is_failure(""));
        assert!(!ErrorChannel::is_failure("Success"));
    }

    #[test]
    fn test_anything_else_is_a_failure() {
        assert!(ErrorChannel::is_failure("Not privileged"));
        assert!(ErrorChannel::is_failure("success"));
        assert!(ErrorChannel::is_failure(" "));
    }

    #[test]
    fn test_into_result_keeps_message() {
        let err = ErrorChannel::into_result("quota_sync", "No quotas on this system".into())
            .unwrap_err();
        assert_eq!(err.to_string(), "No quotas on this system");
        assert_eq!(err.operation(), Some("quota_sync"));
        assert!(ErrorChannel::into_result("quota_sync", "Success".into()).is_ok());
    }
}
