//! TOML fixtures describing a [`StubBackend`].
//!
//! ```toml
//! devices = ["/dev/vdb1"]
//! qcargtype = "dev"
//!
//! [[quotas]]
//! device = "/dev/vda1"
//! uid = 1000
//! block_usage = 120
//! block_soft = 1000
//! block_hard = 2000
//!
//! [[remote]]
//! host = "nfs1"
//! path = "/export/home"
//! uid = 1000
//! kind = "group"
//! file_usage = 17
//!
//! [[mounts]]
//! device = "/dev/vda1"
//! mount_point = "/"
//! fs_type = "ext4"
//! options = "rw,usrquota"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::backend::RawQuota;
use crate::config::ConfigError;
use crate::types::QuotaKind;

use super::{StubBackend, StubMount};

/// Usage and limits of one fixture row, all defaulting to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct FixtureQuota {
    block_usage: u64,
    block_soft: u64,
    block_hard: u64,
    block_time: u64,
    file_usage: u64,
    file_soft: u64,
    file_hard: u64,
    file_time: u64,
}

impl From<FixtureQuota> for RawQuota {
    fn from(q: FixtureQuota) -> Self {
        RawQuota {
            bc: q.block_usage,
            bs: q.block_soft,
            bh: q.block_hard,
            bt: q.block_time,
            fc: q.file_usage,
            fs: q.file_soft,
            fh: q.file_hard,
            ft: q.file_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LocalQuota {
    device: String,
    uid: u32,
    #[serde(default)]
    kind: QuotaKind,
    #[serde(flatten)]
    quota: FixtureQuota,
}

#[derive(Debug, Deserialize)]
struct RemoteQuota {
    host: String,
    path: String,
    uid: u32,
    #[serde(default)]
    kind: QuotaKind,
    #[serde(flatten)]
    quota: FixtureQuota,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StubFixture {
    devices: Vec<String>,
    qcargtype: Option<String>,
    quotas: Vec<LocalQuota>,
    remote: Vec<RemoteQuota>,
    mounts: Vec<StubMount>,
}

impl StubBackend {
    /// Build a stub from TOML fixture text.
    pub fn from_fixture_str(s: &str) -> Result<Self, ConfigError> {
        let fixture: StubFixture = toml::from_str(s)?;

        let mut stub = StubBackend::new();
        for device in &fixture.devices {
            stub = stub.with_device(device);
        }
        if let Some(kind) = &fixture.qcargtype {
            stub = stub.with_qcargtype(kind);
        }
        for q in fixture.quotas {
            stub = stub.with_quota(&q.device, q.uid, q.kind, q.quota.into());
        }
        for r in fixture.remote {
            stub = stub.with_remote_quota(&r.host, &r.path, r.uid, r.kind, r.quota.into());
        }
        for mount in fixture.mounts {
            stub = stub.with_mount(mount);
        }
        Ok(stub)
    }

    /// Load a fixture file.
    pub fn from_fixture_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_fixture_str(&content)
    }
}
