//! Value types exchanged with [`QuotaClient`](crate::QuotaClient).

use std::fmt;
use std::os::raw::c_int;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{RawLimits, RawQuota};

/// Whether a quota applies to a user or to a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaKind {
    /// Per-user quota
    #[default]
    User,
    /// Per-group quota
    Group,
}

impl QuotaKind {
    /// Integer encoding used by the backend (`quota_type`).
    pub(crate) fn as_raw(self) -> c_int {
        match self {
            QuotaKind::User => 0,
            QuotaKind::Group => 1,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            QuotaKind::User => "user",
            QuotaKind::Group => "group",
        }
    }
}

impl fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "usr" => Ok(QuotaKind::User),
            "group" | "grp" => Ok(QuotaKind::Group),
            other => Err(format!("unknown quota kind '{other}' (expected user or group)")),
        }
    }
}

/// Usage and limits of one identity on one filesystem.
///
/// Block values are in the backend's quota block unit (1 KiB on Linux).
/// Time limits are grace deadlines in seconds since the epoch, 0 when no
/// grace period is running. A limit of 0 means "no limit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuotaRecord {
    block_usage: u64,
    block_soft_limit: u64,
    block_hard_limit: u64,
    block_time_limit: u64,
    file_usage: u64,
    file_soft_limit: u64,
    file_hard_limit: u64,
    file_time_limit: u64,
}

impl QuotaRecord {
    /// Blocks in use.
    pub fn block_usage(&self) -> u64 {
        self.block_usage
    }

    /// Block soft limit.
    pub fn block_soft_limit(&self) -> u64 {
        self.block_soft_limit
    }

    /// Block hard limit.
    pub fn block_hard_limit(&self) -> u64 {
        self.block_hard_limit
    }

    /// Block grace deadline.
    pub fn block_time_limit(&self) -> u64 {
        self.block_time_limit
    }

    /// Files (inodes) in use.
    pub fn file_usage(&self) -> u64 {
        self.file_usage
    }

    /// File soft limit.
    pub fn file_soft_limit(&self) -> u64 {
        self.file_soft_limit
    }

    /// File hard limit.
    pub fn file_hard_limit(&self) -> u64 {
        self.file_hard_limit
    }

    /// File grace deadline.
    pub fn file_time_limit(&self) -> u64 {
        self.file_time_limit
    }

    /// Block usage exceeds a non-zero soft limit.
    pub fn is_over_block_soft_limit(&self) -> bool {
        self.block_soft_limit != 0 && self.block_usage > self.block_soft_limit
    }

    /// File usage exceeds a non-zero soft limit.
    pub fn is_over_file_soft_limit(&self) -> bool {
        self.file_soft_limit != 0 && self.file_usage > self.file_soft_limit
    }

    /// Current limits, ready to be modified and written back.
    pub fn limits(&self) -> QuotaLimits {
        QuotaLimits {
            block_soft: self.block_soft_limit,
            block_hard: self.block_hard_limit,
            file_soft: self.file_soft_limit,
            file_hard: self.file_hard_limit,
            reset_grace: false,
        }
    }
}

impl From<RawQuota> for QuotaRecord {
    fn from(raw: RawQuota) -> Self {
        Self {
            block_usage: raw.bc,
            block_soft_limit: raw.bs,
            block_hard_limit: raw.bh,
            block_time_limit: raw.bt,
            file_usage: raw.fc,
            file_soft_limit: raw.fs,
            file_hard_limit: raw.fh,
            file_time_limit: raw.ft,
        }
    }
}

/// New limits for [`QuotaClient::set_limit`](crate::QuotaClient::set_limit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Block soft limit
    pub block_soft: u64,
    /// Block hard limit
    pub block_hard: u64,
    /// File soft limit
    pub file_soft: u64,
    /// File hard limit
    pub file_hard: u64,
    /// Request a grace period reset (the backend's time-limit flag)
    #[serde(default)]
    pub reset_grace: bool,
}

impl QuotaLimits {
    pub(crate) fn to_raw(self) -> RawLimits {
        RawLimits {
            bs: self.block_soft as f64,
            bh: self.block_hard as f64,
            fs: self.file_soft as f64,
            fh: self.file_hard as f64,
            timelimflag: c_int::from(self.reset_grace),
        }
    }
}

/// Status code returned by state-changing backend calls.
///
/// Meaning is backend-defined; 0 conventionally signals success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(i32);

impl Status {
    pub(crate) fn new(code: c_int) -> Self {
        Self(code)
    }

    /// Raw status code.
    pub fn code(self) -> i32 {
        self.0
    }

    /// True for status 0.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

/// Default RPC timeout (4 seconds).
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(4000);

/// Transport parameters for remote quota queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcPeer {
    /// Server port; 0 asks the remote portmapper
    pub port: u16,
    /// Use TCP instead of UDP
    pub use_tcp: bool,
    /// Per-call timeout (millisecond resolution)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RpcPeer {
    fn default() -> Self {
        Self {
            port: 0,
            use_tcp: false,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

impl RpcPeer {
    /// Timeout in whole milliseconds, saturating at `u32::MAX`.
    pub fn timeout_ms(&self) -> u32 {
        u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX)
    }
}

/// Credentials presented to remote quota daemons.
///
/// Absent ids are sent as -1 and an absent hostname as null, letting the
/// backend derive them from the calling process. All three absent resets the
/// backend to its default credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcAuth {
    /// User id to present
    pub uid: Option<u32>,
    /// Group id to present
    pub gid: Option<u32>,
    /// Machine name to present
    pub hostname: Option<String>,
}
