//! Test support: an in-memory backend and matching assertions.
//!
//! [`StubBackend`] implements [`QuotaBackend`](crate::backend::QuotaBackend)
//! without touching the kernel. It backs this crate's tests, the doc
//! examples, and the CLI's `--fixture` mode.
//!
//! ```
//! use fsquota::testing::{StubBackend, StubMount, StubOp, assert_backend_error};
//! use fsquota::QuotaClient;
//!
//! let stub = StubBackend::new()
//!     .with_device("/dev/vda1")
//!     .with_mount(StubMount::new("/dev/vda1", "/", "ext4", "rw,usrquota"));
//! stub.fail_next(StubOp::Query, "Permission denied");
//!
//! let client = QuotaClient::new(stub.clone());
//! assert_backend_error(client.query("/dev/vda1", None, None), "Permission denied", "query");
//! assert_eq!(stub.calls(StubOp::Query), 1);
//! ```

mod assertions;
mod fixture;
mod stub;

pub use assertions::{assert_backend_error, assert_buffers_released, assert_cursor_released};
pub use stub::{
    MSG_BAD_CURSOR, MSG_INVALID_ARGUMENT, MSG_NOT_STANDARD_FS, MSG_UNKNOWN_HOST, StubAuth,
    StubBackend, StubMount, StubOp, StubPeer, StubStats,
};
