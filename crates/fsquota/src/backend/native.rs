//! Statically linked binding to the native `libquota` backend.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::{QuotaBackend, RawLimits, RawMountEntry, RawQuota};
use crate::error::{QuotaError, Result};

#[link(name = "quota")]
unsafe extern "C" {
    fn quota_query(dev: *mut c_char, uid: c_int, kind: c_int) -> RawQuota;
    fn quota_setqlim(
        dev: *mut c_char,
        uid: c_int,
        bs: f64,
        bh: f64,
        fs: f64,
        fh: f64,
        timelimflag: c_int,
        kind: c_int,
    ) -> c_int;
    fn quota_sync(dev: *mut c_char) -> c_int;
    fn quota_rpcquery(host: *mut c_char, path: *mut c_char, uid: c_int, kind: c_int) -> RawQuota;
    fn quota_rpcpeer(port: c_uint, use_tcp: c_uint, timeout: c_uint);
    fn quota_rpcauth(uid: c_int, gid: c_int, hostname: *mut c_char) -> c_int;
    fn quota_setmntent() -> c_int;
    fn quota_getmntent() -> RawMountEntry;
    fn quota_getmntent_free(ret: RawMountEntry);
    fn quota_endmntent();
    fn quota_getqcargtype() -> *mut c_char;
    fn quota_strerr() -> *const c_char;
}

/// Set while a [`NativeBackend`] handle is alive.
static ACQUIRED: AtomicBool = AtomicBool::new(false);

/// Handle to the process-wide native backend.
///
/// `libquota` keeps its error string, RPC configuration and mount cursor in
/// globals, so at most one handle exists at a time.
#[derive(Debug)]
pub struct NativeBackend {
    _private: (),
}

impl NativeBackend {
    /// Acquire the native backend.
    ///
    /// Fails with [`QuotaError::BackendUnavailable`] while another handle is alive.
    pub fn acquire() -> Result<Self> {
        ACQUIRED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| QuotaError::BackendUnavailable)?;
        debug!("Acquired native quota backend");
        Ok(Self { _private: () })
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        ACQUIRED.store(false, Ordering::Release);
        debug!("Released native quota backend");
    }
}

/// The C prototypes take `char *` but never write through string arguments.
fn arg(s: &CStr) -> *mut c_char {
    s.as_ptr().cast_mut()
}

fn opt_arg(s: Option<&CStr>) -> *mut c_char {
    s.map_or(ptr::null_mut(), arg)
}

// SAFETY: libquota returns mntent strings that live until the next getmntent
// (borrowed) or until quota_getmntent_free (owned), and static/thread-global
// buffers from getqcargtype/strerr. Access is serialized by the client session
// and by the single-handle guard above.
unsafe impl QuotaBackend for NativeBackend {
    fn query(&mut self, dev: &CStr, uid: c_int, kind: c_int) -> RawQuota {
        // SAFETY: `dev` is a valid NUL-terminated string for the duration of the call.
        unsafe { quota_query(arg(dev), uid, kind) }
    }

    fn setqlim(&mut self, dev: &CStr, uid: c_int, limits: RawLimits, kind: c_int) -> c_int {
        // SAFETY: as above.
        unsafe {
            quota_setqlim(
                arg(dev),
                uid,
                limits.bs,
                limits.bh,
                limits.fs,
                limits.fh,
                limits.timelimflag,
                kind,
            )
        }
    }

    fn sync(&mut self, dev: Option<&CStr>) -> c_int {
        // SAFETY: null is the documented "all devices" argument.
        unsafe { quota_sync(opt_arg(dev)) }
    }

    fn rpcquery(&mut self, host: &CStr, path: &CStr, uid: c_int, kind: c_int) -> RawQuota {
        // SAFETY: both strings outlive the call.
        unsafe { quota_rpcquery(arg(host), arg(path), uid, kind) }
    }

    fn rpcpeer(&mut self, port: c_uint, use_tcp: c_uint, timeout_ms: c_uint) {
        // SAFETY: plain integer arguments.
        unsafe { quota_rpcpeer(port, use_tcp, timeout_ms) }
    }

    fn rpcauth(&mut self, uid: c_int, gid: c_int, hostname: Option<&CStr>) -> c_int {
        // SAFETY: null hostname is accepted and means "derive or reset".
        unsafe { quota_rpcauth(uid, gid, opt_arg(hostname)) }
    }

    fn setmntent(&mut self) -> c_int {
        // SAFETY: no arguments.
        unsafe { quota_setmntent() }
    }

    fn getmntent(&mut self) -> RawMountEntry {
        // SAFETY: no arguments; the result is handed back via getmntent_free.
        unsafe { quota_getmntent() }
    }

    fn getmntent_free(&mut self, entry: RawMountEntry) {
        // SAFETY: `entry` came from quota_getmntent and is consumed here.
        unsafe { quota_getmntent_free(entry) }
    }

    fn endmntent(&mut self) {
        // SAFETY: no arguments; a closed cursor is tolerated.
        unsafe { quota_endmntent() }
    }

    fn getqcargtype(&mut self) -> *const c_char {
        // SAFETY: returns a static buffer.
        unsafe { quota_getqcargtype().cast_const() }
    }

    fn strerr(&mut self) -> *const c_char {
        // SAFETY: returns a static string or null.
        unsafe { quota_strerr() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_handle() {
        let first = NativeBackend::acquire().unwrap();
        assert_eq!(
            NativeBackend::acquire().unwrap_err(),
            QuotaError::BackendUnavailable
        );
        drop(first);
        let again = NativeBackend::acquire();
        assert!(again.is_ok());
    }
}
