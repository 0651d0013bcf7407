//! Client library for filesystem disk quotas.
//!
//! `fsquota` drives a native quota backend (`libquota`, behind the `native`
//! feature) and turns its C-style interface into typed Rust calls:
//!
//! - local quota queries and limit updates per user or group
//! - quota file synchronisation
//! - remote queries against `rquotad`, with configurable transport and credentials
//! - enumeration of the system mount table
//!
//! # Components
//!
//! - [`QuotaClient`] - a session over one backend; all calls are serialized
//! - [`MountEnumerator`] - replayable iterator over the mount table
//! - [`QuotaError`] - backend messages are surfaced verbatim
//! - [`backend::QuotaBackend`] - the contract a backend implements
//! - [`testing::StubBackend`] - in-memory backend for tests and fixtures
//!
//! # Error reporting
//!
//! The backend reports failures out of band: after every call the client
//! reads the backend's last-error message. An empty message or `"Success"`
//! means the call succeeded; anything else becomes
//! [`QuotaError::Backend`] and supersedes the returned value.
//!
//! # Example
//!
//! ```
//! use fsquota::testing::{StubBackend, StubMount};
//! use fsquota::QuotaClient;
//!
//! let client = QuotaClient::new(
//!     StubBackend::new()
//!         .with_mount(StubMount::new("/dev/vda1", "/", "ext4", "rw,usrquota"))
//!         .with_mount(StubMount::new("tmpfs", "/run", "tmpfs", "rw")),
//! );
//!
//! let with_quota: Vec<_> = client
//!     .mounts()?
//!     .filter_map(Result::ok)
//!     .filter(|m| m.has_quota_options())
//!     .map(|m| m.mount_point)
//!     .collect();
//! assert_eq!(with_quota, ["/"]);
//! # Ok::<(), fsquota::QuotaError>(())
//! ```

#![warn(missing_docs)]

pub mod backend;
mod channel;
mod client;
pub mod config;
mod error;
mod marshal;
mod mounts;
pub mod testing;
mod types;

pub use channel::{ErrorChannel, SUCCESS_SENTINEL};
pub use client::{QuotaClient, real_uid, resolve_uid};
pub use config::{ConfigError, QuotaConfig};
pub use error::{QuotaError, Result};
pub use marshal::{BackendString, BufferStats, StringMarshal};
pub use mounts::{EnumState, MountEntry, MountEnumerator};
pub use types::{
    DEFAULT_RPC_TIMEOUT, QuotaKind, QuotaLimits, QuotaRecord, RpcAuth, RpcPeer, Status,
};
