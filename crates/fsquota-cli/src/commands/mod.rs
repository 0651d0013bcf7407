pub mod backend;
pub mod mounts;
pub mod query;
pub mod rpc_query;
pub mod set_limit;
pub mod sync;

use fsquota::QuotaKind;

/// Quota kind selected by a `--group` flag.
pub fn kind_from_flag(group: bool) -> QuotaKind {
    if group { QuotaKind::Group } else { QuotaKind::User }
}
