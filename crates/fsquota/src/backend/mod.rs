//! The quota backend contract.
//!
//! The backend is the native library that talks to the kernel quota
//! interfaces and to remote `rquotad` daemons. This crate never implements
//! those itself; it drives a [`QuotaBackend`] and interprets its results.
//!
//! Two implementations exist:
//! - [`NativeBackend`] - statically linked `libquota` (feature `native`)
//! - [`StubBackend`](crate::testing::StubBackend) - in-memory, for tests and fixtures
//!
//! The trait mirrors the C ABI closely: string arguments arrive as
//! zero-terminated buffers, results that carry strings are raw pointers with
//! backend-defined ownership, and failures are reported out of band through
//! [`QuotaBackend::strerr`].

#[cfg(feature = "native")]
mod native;

#[cfg(feature = "native")]
pub use native::NativeBackend;

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr;

/// Bit in [`RawMountEntry::freemask`] marking `dev` as owned by the entry.
pub const FREE_DEV: c_char = 1 << 0;
/// Bit in [`RawMountEntry::freemask`] marking `path` as owned by the entry.
pub const FREE_PATH: c_char = 1 << 1;
/// Bit in [`RawMountEntry::freemask`] marking `type` as owned by the entry.
pub const FREE_TYPE: c_char = 1 << 2;
/// Bit in [`RawMountEntry::freemask`] marking `opts` as owned by the entry.
pub const FREE_OPTS: c_char = 1 << 3;

/// Quota usage and limits as returned by the backend (`query_ret`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawQuota {
    /// Blocks in use
    pub bc: u64,
    /// Block soft limit
    pub bs: u64,
    /// Block hard limit
    pub bh: u64,
    /// Block grace deadline
    pub bt: u64,
    /// Files (inodes) in use
    pub fc: u64,
    /// File soft limit
    pub fs: u64,
    /// File hard limit
    pub fh: u64,
    /// File grace deadline
    pub ft: u64,
}

/// One mount table row as returned by the backend (`getmntent_ret`).
///
/// All four pointers null marks the end of the table. Each pointer is either
/// borrowed from backend storage or owned by the entry, as recorded in
/// `freemask`; either way the entry goes back through
/// [`QuotaBackend::getmntent_free`] exactly once.
#[repr(C)]
#[derive(Debug)]
pub struct RawMountEntry {
    /// Device or remote export (`mnt_fsname`)
    pub dev: *mut c_char,
    /// Mount point (`mnt_dir`)
    pub path: *mut c_char,
    /// Filesystem type (`mnt_type`)
    pub fstype: *mut c_char,
    /// Comma-separated mount options (`mnt_opts`)
    pub opts: *mut c_char,
    /// Ownership bits, see [`FREE_DEV`] and friends
    pub freemask: c_char,
}

impl RawMountEntry {
    /// The end-of-table marker.
    pub fn end() -> Self {
        Self {
            dev: ptr::null_mut(),
            path: ptr::null_mut(),
            fstype: ptr::null_mut(),
            opts: ptr::null_mut(),
            freemask: 0,
        }
    }

    /// True when every field is absent.
    pub fn is_end(&self) -> bool {
        self.dev.is_null() && self.path.is_null() && self.fstype.is_null() && self.opts.is_null()
    }
}

/// Limits handed to `quota_setqlim`.
///
/// The C interface takes limits as `double` and the time-limit flag as an int.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawLimits {
    /// Block soft limit
    pub bs: f64,
    /// Block hard limit
    pub bh: f64,
    /// File soft limit
    pub fs: f64,
    /// File hard limit
    pub fh: f64,
    /// Non-zero requests a grace period reset
    pub timelimflag: c_int,
}

/// Operations exposed by a quota backend.
///
/// Every call may overwrite the backend's last-error message, which the
/// client reads through [`strerr`](QuotaBackend::strerr) immediately after.
/// Integer `kind` arguments are `0` for user and `1` for group quotas.
///
/// # Safety
///
/// Implementors guarantee that:
/// - non-null pointers returned by [`getmntent`](QuotaBackend::getmntent) point
///   to NUL-terminated strings that stay valid until the entry is passed to
///   [`getmntent_free`](QuotaBackend::getmntent_free);
/// - non-null pointers returned by [`getqcargtype`](QuotaBackend::getqcargtype)
///   and [`strerr`](QuotaBackend::strerr) point to NUL-terminated strings that
///   stay valid until the next call on the backend.
pub unsafe trait QuotaBackend: Send {
    /// `quota_query`
    fn query(&mut self, dev: &CStr, uid: c_int, kind: c_int) -> RawQuota;

    /// `quota_setqlim`
    fn setqlim(&mut self, dev: &CStr, uid: c_int, limits: RawLimits, kind: c_int) -> c_int;

    /// `quota_sync`; `None` syncs every device.
    fn sync(&mut self, dev: Option<&CStr>) -> c_int;

    /// `quota_rpcquery`
    fn rpcquery(&mut self, host: &CStr, path: &CStr, uid: c_int, kind: c_int) -> RawQuota;

    /// `quota_rpcpeer`
    fn rpcpeer(&mut self, port: c_uint, use_tcp: c_uint, timeout_ms: c_uint);

    /// `quota_rpcauth`; `-1` ids and a `None` hostname select defaults.
    fn rpcauth(&mut self, uid: c_int, gid: c_int, hostname: Option<&CStr>) -> c_int;

    /// `quota_setmntent`, opens the shared enumeration cursor.
    fn setmntent(&mut self) -> c_int;

    /// `quota_getmntent`, fetches the next row or the end marker.
    fn getmntent(&mut self) -> RawMountEntry;

    /// `quota_getmntent_free`, releases the owned strings of an entry.
    fn getmntent_free(&mut self, entry: RawMountEntry);

    /// `quota_endmntent`, closes the shared enumeration cursor.
    fn endmntent(&mut self);

    /// `quota_getqcargtype`
    fn getqcargtype(&mut self) -> *const c_char;

    /// `quota_strerr`, the last-error message (may be null).
    fn strerr(&mut self) -> *const c_char;
}
