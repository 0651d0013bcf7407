//! In-memory quota backend.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{
    FREE_DEV, FREE_OPTS, FREE_PATH, FREE_TYPE, QuotaBackend, RawLimits, RawMountEntry, RawQuota,
};
use crate::channel::SUCCESS_SENTINEL;
use crate::types::QuotaKind;

/// Messages the stub reports, modelled on the native backend's wording.
pub const MSG_NOT_STANDARD_FS: &str = "Not a standard file system";
/// Reported by `getmntent` without a prior `setmntent`.
pub const MSG_BAD_CURSOR: &str = "Bad file descriptor";
/// Reported by `rpcquery` for hosts the stub does not know.
pub const MSG_UNKNOWN_HOST: &str = "RPC: Unknown host";
/// Reported by `rpcauth` for over-long hostnames.
pub const MSG_INVALID_ARGUMENT: &str = "Invalid argument";

/// Hostnames of this length or longer are rejected by `rpcauth`.
const MAX_MACHINE_NAME: usize = 255;

/// Backend operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubOp {
    /// `quota_query`
    Query,
    /// `quota_setqlim`
    SetQlim,
    /// `quota_sync`
    Sync,
    /// `quota_rpcquery`
    RpcQuery,
    /// `quota_rpcpeer`
    RpcPeer,
    /// `quota_rpcauth`
    RpcAuth,
    /// `quota_setmntent`
    SetMntEnt,
    /// `quota_getmntent`
    GetMntEnt,
    /// `quota_endmntent`
    EndMntEnt,
    /// `quota_getqcargtype`
    GetQcArgType,
}

/// A mount table row served by the stub.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct StubMount {
    /// Device
    pub device: String,
    /// Mount point
    pub mount_point: String,
    /// Filesystem type
    pub fs_type: String,
    /// Mount options
    #[serde(default)]
    pub options: String,
    /// Which fields are handed out as owned allocations (bits as in `getmntent_ret`)
    #[serde(default)]
    pub freemask: u8,
}

impl StubMount {
    /// A row whose strings are all borrowed from the stub.
    pub fn new(device: &str, mount_point: &str, fs_type: &str, options: &str) -> Self {
        Self {
            device: device.to_string(),
            mount_point: mount_point.to_string(),
            fs_type: fs_type.to_string(),
            options: options.to_string(),
            freemask: 0,
        }
    }

    /// Hand out the fields selected by `freemask` as owned allocations.
    #[must_use]
    pub fn owned(mut self, freemask: u8) -> Self {
        self.freemask = freemask & 0b1111;
        self
    }
}

/// Transport parameters last passed to `rpcpeer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubPeer {
    /// Port
    pub port: c_uint,
    /// TCP flag
    pub use_tcp: c_uint,
    /// Timeout in milliseconds
    pub timeout_ms: c_uint,
}

/// Credentials last passed to `rpcauth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubAuth {
    /// User id (-1 when unset)
    pub uid: c_int,
    /// Group id (-1 when unset)
    pub gid: c_int,
    /// Hostname (None for a null pointer)
    pub hostname: Option<String>,
}

/// Call and allocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubStats {
    /// `setmntent` calls
    pub setmntent_calls: u64,
    /// `getmntent` calls
    pub getmntent_calls: u64,
    /// `getmntent_free` calls
    pub free_calls: u64,
    /// `endmntent` calls
    pub endmntent_calls: u64,
    /// Owned strings handed out by `getmntent`
    pub owned_allocated: u64,
    /// Owned strings reclaimed by `getmntent_free`
    pub owned_freed: u64,
}

impl StubStats {
    /// Owned strings not yet freed.
    pub fn owned_outstanding(&self) -> u64 {
        self.owned_allocated.saturating_sub(self.owned_freed)
    }
}

type QuotaKey = (String, c_int, c_int);
type RemoteKey = (String, String, c_int, c_int);

#[derive(Debug)]
struct StubState {
    devices: BTreeSet<String>,
    quotas: HashMap<QuotaKey, RawQuota>,
    remote_hosts: BTreeSet<String>,
    remote: HashMap<RemoteKey, RawQuota>,
    mounts: Vec<StubMount>,
    cursor: Option<usize>,
    /// What strerr reports after a successful call; None reads as null.
    idle_message: Option<CString>,
    last_error: Option<CString>,
    failures: HashMap<StubOp, String>,
    calls: HashMap<StubOp, u64>,
    qcargtype: CString,
    peer: Option<StubPeer>,
    auth: Option<StubAuth>,
    last_id: Option<(c_int, c_int)>,
    /// Backing storage for borrowed strings of the current mount row.
    borrowed: Vec<CString>,
    /// Addresses of owned strings not yet freed.
    outstanding: HashSet<usize>,
    stats: StubStats,
}

impl Default for StubState {
    fn default() -> Self {
        let success = CString::new(SUCCESS_SENTINEL).ok();
        Self {
            devices: BTreeSet::new(),
            quotas: HashMap::new(),
            remote_hosts: BTreeSet::new(),
            remote: HashMap::new(),
            mounts: Vec::new(),
            cursor: None,
            idle_message: success.clone(),
            last_error: success,
            failures: HashMap::new(),
            calls: HashMap::new(),
            qcargtype: c"dev".to_owned(),
            peer: None,
            auth: None,
            last_id: None,
            borrowed: Vec::new(),
            outstanding: HashSet::new(),
            stats: StubStats::default(),
        }
    }
}

impl StubState {
    /// Start an operation; returns the injected failure, if any.
    fn begin(&mut self, op: StubOp) -> bool {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.remove(&op) {
            Some(message) => {
                self.set_error(&message);
                true
            }
            None => {
                self.last_error.clone_from(&self.idle_message);
                false
            }
        }
    }

    fn set_error(&mut self, message: &str) {
        self.last_error = Some(to_cstring(message));
    }

    fn known_device(&mut self, dev: &CStr) -> Option<String> {
        let dev = dev.to_string_lossy().into_owned();
        if self.devices.contains(&dev) {
            Some(dev)
        } else {
            self.set_error(MSG_NOT_STANDARD_FS);
            None
        }
    }

    fn hand_out(&mut self, value: &str, owned: bool) -> *mut c_char {
        let s = to_cstring(value);
        if owned {
            let ptr = s.into_raw();
            self.outstanding.insert(ptr as usize);
            self.stats.owned_allocated += 1;
            ptr
        } else {
            let ptr = s.as_ptr().cast_mut();
            // Moving the CString into the Vec does not move its heap buffer.
            self.borrowed.push(s);
            ptr
        }
    }

    fn reclaim(&mut self, ptr: *mut c_char) {
        assert!(
            self.outstanding.remove(&(ptr as usize)),
            "getmntent_free on a pointer that is not outstanding (double free?)"
        );
        // SAFETY: the address came from CString::into_raw in hand_out and
        // has not been reclaimed before (checked above).
        drop(unsafe { CString::from_raw(ptr) });
        self.stats.owned_freed += 1;
    }
}

fn to_cstring(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

/// In-memory [`QuotaBackend`].
///
/// Clones share state, so a test can keep a handle for inspection after
/// moving the backend into a client.
///
/// - Quotas live per `(device, uid, kind)`; unknown devices fail with
///   [`MSG_NOT_STANDARD_FS`], unknown ids read as all zeros.
/// - Remote quotas live per `(host, path, uid, kind)`; unknown hosts fail
///   with [`MSG_UNKNOWN_HOST`].
/// - Mount rows hand out owned or borrowed strings per [`StubMount::freemask`]
///   and panic on a double free.
/// - [`fail_next`](Self::fail_next) injects a one-shot error message.
#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    state: Arc<Mutex<StubState>>,
}

impl StubBackend {
    /// An empty stub: no devices, no mounts, idle message `"Success"`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local device.
    #[must_use]
    pub fn with_device(self, device: &str) -> Self {
        self.state.lock().devices.insert(device.to_string());
        self
    }

    /// Seed a local quota (registers the device too).
    #[must_use]
    pub fn with_quota(self, device: &str, uid: u32, kind: QuotaKind, quota: RawQuota) -> Self {
        {
            let mut state = self.state.lock();
            state.devices.insert(device.to_string());
            state
                .quotas
                .insert((device.to_string(), uid.cast_signed(), kind.as_raw()), quota);
        }
        self
    }

    /// Seed a remote quota (registers the host too).
    #[must_use]
    pub fn with_remote_quota(
        self,
        host: &str,
        path: &str,
        uid: u32,
        kind: QuotaKind,
        quota: RawQuota,
    ) -> Self {
        {
            let mut state = self.state.lock();
            state.remote_hosts.insert(host.to_string());
            state.remote.insert(
                (host.to_string(), path.to_string(), uid.cast_signed(), kind.as_raw()),
                quota,
            );
        }
        self
    }

    /// Append a mount table row.
    #[must_use]
    pub fn with_mount(self, mount: StubMount) -> Self {
        self.state.lock().mounts.push(mount);
        self
    }

    /// What the error channel reads after a successful call.
    ///
    /// `Some("Success")` by default; `Some("")` and `None` (null) are the
    /// other "no error" encodings.
    #[must_use]
    pub fn with_idle_message(self, message: Option<&str>) -> Self {
        {
            let mut state = self.state.lock();
            let idle = message.map(to_cstring);
            state.last_error.clone_from(&idle);
            state.idle_message = idle;
        }
        self
    }

    /// Backend variant reported by `getqcargtype`.
    #[must_use]
    pub fn with_qcargtype(self, kind: &str) -> Self {
        self.state.lock().qcargtype = to_cstring(kind);
        self
    }

    /// Make the next call to `op` report `message`.
    pub fn fail_next(&self, op: StubOp, message: &str) {
        self.state.lock().failures.insert(op, message.to_string());
    }

    /// Stored local quota, if any.
    pub fn quota(&self, device: &str, uid: u32, kind: QuotaKind) -> Option<RawQuota> {
        self.state
            .lock()
            .quotas
            .get(&(device.to_string(), uid.cast_signed(), kind.as_raw()))
            .copied()
    }

    /// `(uid, kind)` of the most recent local or remote quota call.
    pub fn last_id(&self) -> Option<(c_int, c_int)> {
        self.state.lock().last_id
    }

    /// Transport last configured.
    pub fn peer(&self) -> Option<StubPeer> {
        self.state.lock().peer
    }

    /// Credentials last configured.
    pub fn auth(&self) -> Option<StubAuth> {
        self.state.lock().auth.clone()
    }

    /// Number of calls made to `op`.
    pub fn calls(&self, op: StubOp) -> u64 {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Mount cursor counters.
    pub fn stats(&self) -> StubStats {
        self.state.lock().stats
    }

    /// True while the mount cursor is open.
    pub fn cursor_open(&self) -> bool {
        self.state.lock().cursor.is_some()
    }
}

// SAFETY: strings handed out by getmntent live in `borrowed` (until the next
// getmntent) or are leaked CStrings (until getmntent_free); strerr and
// getqcargtype point into CStrings that are only replaced by later calls.
unsafe impl QuotaBackend for StubBackend {
    fn query(&mut self, dev: &CStr, uid: c_int, kind: c_int) -> RawQuota {
        let mut state = self.state.lock();
        if state.begin(StubOp::Query) {
            return RawQuota::default();
        }
        state.last_id = Some((uid, kind));
        match state.known_device(dev) {
            Some(dev) => state.quotas.get(&(dev, uid, kind)).copied().unwrap_or_default(),
            None => RawQuota::default(),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn setqlim(&mut self, dev: &CStr, uid: c_int, limits: RawLimits, kind: c_int) -> c_int {
        let mut state = self.state.lock();
        if state.begin(StubOp::SetQlim) {
            return -1;
        }
        state.last_id = Some((uid, kind));
        let Some(dev) = state.known_device(dev) else {
            return -1;
        };
        let quota = state.quotas.entry((dev, uid, kind)).or_default();
        quota.bs = limits.bs as u64;
        quota.bh = limits.bh as u64;
        quota.fs = limits.fs as u64;
        quota.fh = limits.fh as u64;
        if limits.timelimflag != 0 {
            quota.bt = 0;
            quota.ft = 0;
        }
        0
    }

    fn sync(&mut self, dev: Option<&CStr>) -> c_int {
        let mut state = self.state.lock();
        if state.begin(StubOp::Sync) {
            return -1;
        }
        match dev {
            Some(dev) if state.known_device(dev).is_none() => -1,
            _ => 0,
        }
    }

    fn rpcquery(&mut self, host: &CStr, path: &CStr, uid: c_int, kind: c_int) -> RawQuota {
        let mut state = self.state.lock();
        if state.begin(StubOp::RpcQuery) {
            return RawQuota::default();
        }
        state.last_id = Some((uid, kind));
        let host = host.to_string_lossy().into_owned();
        if !state.remote_hosts.contains(&host) {
            state.set_error(MSG_UNKNOWN_HOST);
            return RawQuota::default();
        }
        let key = (host, path.to_string_lossy().into_owned(), uid, kind);
        state.remote.get(&key).copied().unwrap_or_default()
    }

    fn rpcpeer(&mut self, port: c_uint, use_tcp: c_uint, timeout_ms: c_uint) {
        let mut state = self.state.lock();
        if state.begin(StubOp::RpcPeer) {
            return;
        }
        state.peer = Some(StubPeer {
            port,
            use_tcp,
            timeout_ms,
        });
    }

    fn rpcauth(&mut self, uid: c_int, gid: c_int, hostname: Option<&CStr>) -> c_int {
        let mut state = self.state.lock();
        if state.begin(StubOp::RpcAuth) {
            return -1;
        }
        let hostname = hostname.map(|h| h.to_string_lossy().into_owned());
        if hostname.as_ref().is_some_and(|h| h.len() >= MAX_MACHINE_NAME) {
            state.set_error(MSG_INVALID_ARGUMENT);
            return -1;
        }
        state.auth = Some(StubAuth { uid, gid, hostname });
        0
    }

    fn setmntent(&mut self) -> c_int {
        let mut state = self.state.lock();
        state.stats.setmntent_calls += 1;
        if state.begin(StubOp::SetMntEnt) {
            return -1;
        }
        state.cursor = Some(0);
        0
    }

    fn getmntent(&mut self) -> RawMountEntry {
        let mut state = self.state.lock();
        state.stats.getmntent_calls += 1;
        state.borrowed.clear();
        // An injected failure still serves the row, so callers must free it.
        state.begin(StubOp::GetMntEnt);
        let Some(index) = state.cursor else {
            state.set_error(MSG_BAD_CURSOR);
            return RawMountEntry::end();
        };
        let Some(mount) = state.mounts.get(index).cloned() else {
            return RawMountEntry::end();
        };
        state.cursor = Some(index + 1);

        let mask = c_char::try_from(mount.freemask & 0b1111).unwrap_or_default();
        RawMountEntry {
            dev: state.hand_out(&mount.device, mask & FREE_DEV != 0),
            path: state.hand_out(&mount.mount_point, mask & FREE_PATH != 0),
            fstype: state.hand_out(&mount.fs_type, mask & FREE_TYPE != 0),
            opts: state.hand_out(&mount.options, mask & FREE_OPTS != 0),
            freemask: mask,
        }
    }

    fn getmntent_free(&mut self, entry: RawMountEntry) {
        let mut state = self.state.lock();
        state.stats.free_calls += 1;
        let fields = [
            (FREE_DEV, entry.dev),
            (FREE_PATH, entry.path),
            (FREE_TYPE, entry.fstype),
            (FREE_OPTS, entry.opts),
        ];
        for (bit, ptr) in fields {
            if entry.freemask & bit != 0 && !ptr.is_null() {
                state.reclaim(ptr);
            }
        }
    }

    fn endmntent(&mut self) {
        let mut state = self.state.lock();
        state.stats.endmntent_calls += 1;
        if state.begin(StubOp::EndMntEnt) {
            return;
        }
        state.cursor = None;
    }

    fn getqcargtype(&mut self) -> *const c_char {
        let mut state = self.state.lock();
        if state.begin(StubOp::GetQcArgType) {
            return ptr::null();
        }
        state.qcargtype.as_ptr()
    }

    fn strerr(&mut self) -> *const c_char {
        self.state
            .lock()
            .last_error
            .as_ref()
            .map_or(ptr::null(), |s| s.as_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_error(stub: &mut StubBackend) -> Option<String> {
        let ptr = stub.strerr();
        // SAFETY: stub strerr pointers are valid until the next call.
        unsafe { crate::marshal::from_backend_buffer(ptr) }
    }

    #[test]
    fn test_idle_message_default_is_success() {
        let mut stub = StubBackend::new();
        assert_eq!(read_error(&mut stub).as_deref(), Some("Success"));
    }

    #[test]
    fn test_null_idle_message() {
        let mut stub = StubBackend::new().with_idle_message(None);
        assert_eq!(read_error(&mut stub), None);
    }

    #[test]
    fn test_unknown_device_sets_error() {
        let mut stub = StubBackend::new();
        stub.query(c"/dev/nope", 0, 0);
        assert_eq!(read_error(&mut stub).as_deref(), Some(MSG_NOT_STANDARD_FS));
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let mut stub = StubBackend::new().with_device("/dev/vda1");
        stub.fail_next(StubOp::Query, "Not privileged");
        stub.query(c"/dev/vda1", 0, 0);
        assert_eq!(read_error(&mut stub).as_deref(), Some("Not privileged"));
        stub.query(c"/dev/vda1", 0, 0);
        assert_eq!(read_error(&mut stub).as_deref(), Some("Success"));
        assert_eq!(stub.calls(StubOp::Query), 2);
    }

    #[test]
    fn test_owned_strings_are_reclaimed() {
        let mut stub = StubBackend::new()
            .with_mount(StubMount::new("/dev/vda1", "/", "ext4", "rw").owned(0b1001));
        stub.setmntent();
        let entry = stub.getmntent();
        assert!(!entry.is_end());
        assert_eq!(stub.stats().owned_outstanding(), 2);
        stub.getmntent_free(entry);
        assert_eq!(stub.stats().owned_outstanding(), 0);
        assert!(stub.getmntent().is_end());
    }

    #[test]
    fn test_getmntent_without_cursor() {
        let mut stub = StubBackend::new().with_mount(StubMount::new("a", "/", "ext4", ""));
        assert!(stub.getmntent().is_end());
        assert_eq!(read_error(&mut stub).as_deref(), Some(MSG_BAD_CURSOR));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_panics() {
        let mut stub =
            StubBackend::new().with_mount(StubMount::new("a", "/", "ext4", "").owned(1));
        stub.setmntent();
        let entry = stub.getmntent();
        let copy = RawMountEntry {
            dev: entry.dev,
            path: entry.path,
            fstype: entry.fstype,
            opts: entry.opts,
            freemask: entry.freemask,
        };
        stub.getmntent_free(entry);
        stub.getmntent_free(copy);
    }
}
