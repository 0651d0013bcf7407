//! Quota client session.
//!
//! A [`QuotaClient`] owns one backend and serializes every call to it behind
//! a mutex. Each call follows the same sequence:
//!
//! 1. marshal string arguments into [`BackendString`] buffers
//! 2. lock the backend and invoke the operation
//! 3. read the last-error channel while still holding the lock
//! 4. drop the buffers (on success and on failure alike)
//!
//! A non-empty error message other than `"Success"` wins over whatever
//! status the backend returned.

use std::fmt;
use std::os::raw::{c_int, c_uint};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use parking_lot::{Mutex, MutexGuard};
use tracing::{info, instrument, trace};

use crate::backend::QuotaBackend;
use crate::channel::ErrorChannel;
use crate::config::QuotaConfig;
use crate::error::Result;
use crate::marshal::{BackendString, BufferStats, StringMarshal, from_backend_buffer};
use crate::mounts::MountEnumerator;
use crate::types::{QuotaKind, QuotaLimits, QuotaRecord, RpcAuth, RpcPeer, Status};

/// State shared by a client and its mount enumerators.
pub(crate) struct Session<B> {
    backend: Mutex<B>,
    pub(crate) marshal: StringMarshal,
    /// Set while a mount enumerator holds the backend cursor.
    pub(crate) cursor_open: AtomicBool,
    transport: Mutex<RpcPeer>,
}

impl<B: QuotaBackend> Session<B> {
    fn new(backend: B) -> Self {
        Self {
            backend: Mutex::new(backend),
            marshal: StringMarshal::new(),
            cursor_open: AtomicBool::new(false),
            transport: Mutex::new(RpcPeer::default()),
        }
    }

    /// Lock the backend for a sequence of calls.
    pub(crate) fn lock(&self) -> MutexGuard<'_, B> {
        self.backend.lock()
    }

    /// Invoke one backend operation and check the error channel.
    pub(crate) fn call<T>(&self, operation: &'static str, f: impl FnOnce(&mut B) -> T) -> Result<T> {
        let mut backend = self.backend.lock();
        trace!(operation, "Calling backend");
        let out = f(&mut backend);
        ErrorChannel::check(&mut *backend, operation)?;
        Ok(out)
    }
}

/// Client for quota queries, limit updates and mount enumeration.
///
/// Cloning a client shares the underlying session.
///
/// # Example
///
/// ```
/// use fsquota::testing::StubBackend;
/// use fsquota::{QuotaClient, QuotaKind, QuotaLimits};
///
/// let client = QuotaClient::new(StubBackend::new().with_device("/dev/vda1"));
///
/// let mut limits = client.query("/dev/vda1", Some(1000), None)?.limits();
/// limits.block_hard = 25;
/// client.set_limit("/dev/vda1", Some(1000), &limits, Some(QuotaKind::User))?;
/// client.sync(Some("/dev/vda1"))?;
///
/// assert_eq!(client.query("/dev/vda1", Some(1000), None)?.block_hard_limit(), 25);
/// # Ok::<(), fsquota::QuotaError>(())
/// ```
pub struct QuotaClient<B: QuotaBackend> {
    session: Arc<Session<B>>,
}

impl<B: QuotaBackend> Clone for QuotaClient<B> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl<B: QuotaBackend> fmt::Debug for QuotaClient<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaClient")
            .field("buffers", &self.session.marshal.stats())
            .field("transport", &*self.session.transport.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "native")]
impl QuotaClient<crate::backend::NativeBackend> {
    /// Create a client over the linked `libquota`.
    pub fn native() -> Result<Self> {
        Ok(Self::new(crate::backend::NativeBackend::acquire()?))
    }
}

/// The calling process's real user id.
pub fn real_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

/// Resolve an optional uid to the value sent to the backend.
pub fn resolve_uid(uid: Option<u32>) -> u32 {
    uid.unwrap_or_else(real_uid)
}

/// Ids travel as C `int`; -1 is the backend's "unset" marker.
fn id_arg(id: Option<u32>) -> c_int {
    id.map_or(-1, u32::cast_signed)
}

impl<B: QuotaBackend> QuotaClient<B> {
    /// Create a client over `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            session: Arc::new(Session::new(backend)),
        }
    }

    /// Read usage and limits of `uid` (default: real uid) on `device`.
    #[instrument(level = "debug", skip(self))]
    pub fn query(&self, device: &str, uid: Option<u32>, kind: Option<QuotaKind>) -> Result<QuotaRecord> {
        let uid = id_arg(Some(resolve_uid(uid)));
        let kind = kind.unwrap_or_default().as_raw();
        let dev = self.session.marshal.to_backend_buffer("device", device)?;

        let raw = self
            .session
            .call("quota_query", |b| b.query(dev.as_c_str(), uid, kind))?;
        Ok(QuotaRecord::from(raw))
    }

    /// Write new soft/hard limits for `uid` (default: real uid) on `device`.
    #[instrument(level = "debug", skip(self))]
    pub fn set_limit(
        &self,
        device: &str,
        uid: Option<u32>,
        limits: &QuotaLimits,
        kind: Option<QuotaKind>,
    ) -> Result<Status> {
        let uid = id_arg(Some(resolve_uid(uid)));
        let kind = kind.unwrap_or_default().as_raw();
        let raw_limits = limits.to_raw();
        let dev = self.session.marshal.to_backend_buffer("device", device)?;

        let code = self.session.call("quota_setqlim", |b| {
            b.setqlim(dev.as_c_str(), uid, raw_limits, kind)
        })?;
        Ok(Status::new(code))
    }

    /// Flush quota state to disk; `None` or `""` syncs every device.
    #[instrument(level = "debug", skip(self))]
    pub fn sync(&self, device: Option<&str>) -> Result<Status> {
        let dev = device
            .filter(|d| !d.is_empty())
            .map(|d| self.session.marshal.to_backend_buffer("device", d))
            .transpose()?;

        let code = self.session.call("quota_sync", |b| {
            b.sync(dev.as_ref().map(BackendString::as_c_str))
        })?;
        Ok(Status::new(code))
    }

    /// Query a remote rquota daemon for `path` exported by `host`.
    ///
    /// Uses the transport set by [`rpc_configure_peer`](Self::rpc_configure_peer).
    #[instrument(level = "debug", skip(self))]
    pub fn rpc_query(
        &self,
        host: &str,
        path: &str,
        uid: Option<u32>,
        kind: Option<QuotaKind>,
    ) -> Result<QuotaRecord> {
        let uid = id_arg(Some(resolve_uid(uid)));
        let kind = kind.unwrap_or_default().as_raw();
        let host = self.session.marshal.to_backend_buffer("host", host)?;
        let path = self.session.marshal.to_backend_buffer("path", path)?;

        let raw = self.session.call("quota_rpcquery", |b| {
            b.rpcquery(host.as_c_str(), path.as_c_str(), uid, kind)
        })?;
        Ok(QuotaRecord::from(raw))
    }

    /// Set the transport used by later remote calls.
    ///
    /// `RpcPeer::default()` selects port 0 (portmapper), UDP and 4000 ms.
    #[instrument(level = "debug", skip(self))]
    pub fn rpc_configure_peer(&self, peer: RpcPeer) -> Result<()> {
        let port = c_uint::from(peer.port);
        let use_tcp = c_uint::from(peer.use_tcp);
        let timeout_ms = peer.timeout_ms();

        self.session
            .call("quota_rpcpeer", |b| b.rpcpeer(port, use_tcp, timeout_ms))?;
        *self.session.transport.lock() = peer;
        Ok(())
    }

    /// The transport last configured on this session.
    pub fn transport(&self) -> RpcPeer {
        *self.session.transport.lock()
    }

    /// Set the credentials presented to remote daemons.
    #[instrument(level = "debug", skip(self))]
    pub fn rpc_auth(&self, auth: &RpcAuth) -> Result<Status> {
        let uid = id_arg(auth.uid);
        let gid = id_arg(auth.gid);
        let hostname = auth
            .hostname
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(|h| self.session.marshal.to_backend_buffer("hostname", h))
            .transpose()?;

        let code = self.session.call("quota_rpcauth", |b| {
            b.rpcauth(uid, gid, hostname.as_ref().map(BackendString::as_c_str))
        })?;
        Ok(Status::new(code))
    }

    /// Identify the compiled backend variant (e.g. `dev`, `mntpt`, `dev,XFS`).
    pub fn backend_kind(&self) -> Result<String> {
        self.session.call("quota_getqcargtype", |b| {
            // SAFETY: QuotaBackend guarantees a valid C string until the next
            // call; it is copied before the error channel is read.
            unsafe { from_backend_buffer(b.getqcargtype()) }.unwrap_or_default()
        })
    }

    /// Start enumerating the mount table.
    ///
    /// Only one enumerator may be open per session.
    pub fn mounts(&self) -> Result<MountEnumerator<B>> {
        MountEnumerator::open(Arc::clone(&self.session))
    }

    /// Apply configured transport and, if present, credentials.
    pub fn apply_config(&self, config: &QuotaConfig) -> Result<()> {
        self.rpc_configure_peer(config.rpc)?;
        if let Some(auth) = &config.auth {
            self.rpc_auth(auth)?;
        }
        info!(
            port = config.rpc.port,
            tcp = config.rpc.use_tcp,
            timeout_ms = config.rpc.timeout_ms(),
            "Applied quota client configuration"
        );
        Ok(())
    }

    /// Allocation counters of this session's string marshal.
    pub fn buffer_stats(&self) -> BufferStats {
        self.session.marshal.stats()
    }
}
