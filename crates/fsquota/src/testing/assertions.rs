//! Assertions shared by the crate's unit and integration tests.

use std::fmt::Debug;

use crate::error::{QuotaError, Result};
use crate::marshal::BufferStats;

use super::StubBackend;

/// Assert that `result` failed with a backend message equal to `expected`.
///
/// Shows the operation that actually failed on mismatch.
pub fn assert_backend_error<T: Debug>(result: Result<T>, expected: &str, context: &str) {
    match result {
        Ok(value) => panic!("{context}: expected backend error {expected:?}, got success with {value:?}"),
        Err(QuotaError::Backend { operation, message }) => {
            assert!(
                message == expected,
                "{context}: {operation} reported {message:?}, expected {expected:?}"
            );
        }
        Err(other) => panic!("{context}: expected backend error {expected:?}, got {other:?}"),
    }
}

/// Assert that every marshalled argument buffer was released.
pub fn assert_buffers_released(stats: BufferStats, context: &str) {
    assert!(
        stats.outstanding() == 0,
        "{context}: {} of {} argument buffers still outstanding",
        stats.outstanding(),
        stats.allocated
    );
}

/// Assert that the stub's mount cursor is closed and every owned string freed.
pub fn assert_cursor_released(stub: &StubBackend, context: &str) {
    let stats = stub.stats();
    assert!(!stub.cursor_open(), "{context}: mount cursor still open ({stats:?})");
    assert!(
        stats.setmntent_calls == stats.endmntent_calls,
        "{context}: {} setmntent calls but {} endmntent calls",
        stats.setmntent_calls,
        stats.endmntent_calls
    );
    assert!(
        stats.owned_outstanding() == 0,
        "{context}: {} owned mount strings never freed",
        stats.owned_outstanding()
    );
}
