//! Mount table enumeration.
//!
//! The backend exposes a single cursor over the system mount table
//! (`setmntent` / `getmntent` / `endmntent`). [`MountEnumerator`] wraps it in
//! a small state machine:
//!
//! ```text
//!   Closed --open--> Open --end of table--> Exhausted
//!                     |
//!                     +--close / drop--> Closed
//! ```
//!
//! Entries are read one ahead of the caller and appended to a cache, so
//! stepping back with [`rewind`](MountEnumerator::rewind) replays from memory
//! instead of the backend.

use std::fmt;
use std::os::raw::c_char;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::backend::{QuotaBackend, RawMountEntry};
use crate::channel::ErrorChannel;
use crate::client::Session;
use crate::error::{QuotaError, Result};
use crate::marshal::from_backend_buffer;

/// One row of the mount table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    /// Device or remote export (e.g. `/dev/vda1`, `nfs1:/export`)
    pub device: String,
    /// Mount point
    pub mount_point: String,
    /// Filesystem type
    pub fs_type: String,
    /// Comma-separated mount options
    pub options: String,
}

impl MountEntry {
    /// Copy a raw backend entry. Absent fields become empty strings.
    ///
    /// # Safety
    ///
    /// Each non-null pointer in `raw` must point to a valid NUL-terminated string.
    pub(crate) unsafe fn copy_from_raw(raw: &RawMountEntry) -> Self {
        // SAFETY: forwarded from the caller.
        let field = |ptr: *mut c_char| unsafe { from_backend_buffer(ptr.cast_const()) }.unwrap_or_default();
        Self {
            device: field(raw.dev),
            mount_point: field(raw.path),
            fs_type: field(raw.fstype),
            options: field(raw.opts),
        }
    }

    /// Individual mount options.
    pub fn options(&self) -> impl Iterator<Item = &str> {
        self.options.split(',').filter(|o| !o.is_empty())
    }

    /// True if `option` is set (exact match, or `option=value`).
    pub fn has_option(&self, option: &str) -> bool {
        self.options()
            .any(|o| o == option || o.split_once('=').is_some_and(|(k, _)| k == option))
    }

    /// True for filesystems mounted with user or group quota options.
    pub fn has_quota_options(&self) -> bool {
        const QUOTA_OPTIONS: &[&str] = &[
            "quota", "usrquota", "grpquota", "usrjquota", "grpjquota", "uquota", "gquota",
        ];
        QUOTA_OPTIONS.iter().any(|o| self.has_option(o))
    }
}

/// Lifecycle of a [`MountEnumerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumState {
    /// The backend cursor is not held
    Closed,
    /// The backend cursor is held and more rows may follow
    Open,
    /// The end of the table was reached and the cursor released
    Exhausted,
}

/// Lazily filled, replayable iterator over the mount table.
///
/// Opening takes the session's single backend cursor; it is released when
/// the table is exhausted, on [`close`](Self::close), or on drop, whichever
/// happens first.
pub struct MountEnumerator<B: QuotaBackend> {
    session: Arc<Session<B>>,
    state: EnumState,
    /// Number of entries handed out by `next_entry`, minus rewinds
    position: usize,
    cache: Vec<MountEntry>,
    /// Read-ahead failure, reported once the cache runs out
    deferred: Option<QuotaError>,
}

impl<B: QuotaBackend> MountEnumerator<B> {
    /// Take the cursor, open it, and prefetch the first row.
    pub(crate) fn open(session: Arc<Session<B>>) -> Result<Self> {
        session
            .cursor_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| QuotaError::CursorBusy)?;

        if let Err(e) = session.call("quota_setmntent", |b| b.setmntent()) {
            session.cursor_open.store(false, Ordering::Release);
            return Err(e);
        }
        debug!("Opened mount table cursor");

        let mut enumerator = Self {
            session,
            state: EnumState::Open,
            position: 0,
            cache: Vec::new(),
            deferred: None,
        };
        enumerator.fetch()?;
        Ok(enumerator)
    }

    /// Pull one row from the backend into the cache.
    ///
    /// Returns `false` once the table is exhausted (or the cursor closed).
    fn fetch(&mut self) -> Result<bool> {
        if self.state != EnumState::Open {
            return Ok(false);
        }

        let fetched = {
            let mut backend = self.session.lock();
            let raw = backend.getmntent();
            let message = ErrorChannel::read(&mut *backend);
            if raw.is_end() {
                // errno is sticky across a clean end of file, so a message
                // next to the end marker does not fail the enumeration.
                if ErrorChannel::is_failure(&message) {
                    debug!(error = %message, "Ignoring error message at end of mount table");
                }
                None
            } else {
                // SAFETY: QuotaBackend guarantees the strings stay valid
                // until getmntent_free, which happens right after the copy.
                let entry = unsafe { MountEntry::copy_from_raw(&raw) };
                backend.getmntent_free(raw);
                ErrorChannel::into_result("quota_getmntent", message)?;
                Some(entry)
            }
        };

        match fetched {
            Some(entry) => {
                trace!(device = %entry.device, mount_point = %entry.mount_point, "Fetched mount entry");
                self.cache.push(entry);
                Ok(true)
            }
            None => {
                debug!(entries = self.cache.len(), "Mount table exhausted");
                self.release_cursor(EnumState::Exhausted)?;
                Ok(false)
            }
        }
    }

    /// Move the state away from `Open` and close the backend cursor.
    fn release_cursor(&mut self, next: EnumState) -> Result<()> {
        if self.state != EnumState::Open {
            return Ok(());
        }
        self.state = next;
        let result = self.session.call("quota_endmntent", |b| b.endmntent());
        self.session.cursor_open.store(false, Ordering::Release);
        result
    }

    /// Return the next entry.
    ///
    /// Cached entries are returned without a backend call. After handing
    /// out the last cached entry the enumerator reads one row ahead, so the
    /// end of the table is noticed (and the cursor closed) as soon as the
    /// last entry is returned. A failed read-ahead does not withhold the
    /// entry; its error is reported by the following call instead.
    ///
    /// Returns `Ok(None)` at the end of the table, and keeps doing so on
    /// later calls without touching the backend.
    pub fn next_entry(&mut self) -> Result<Option<MountEntry>> {
        if self.position >= self.cache.len() {
            if let Some(e) = self.deferred.take() {
                return Err(e);
            }
            if !self.fetch()? {
                return Ok(None);
            }
        }
        let entry = self.cache[self.position].clone();
        self.position += 1;

        if self.position == self.cache.len()
            && self.deferred.is_none()
            && let Err(e) = self.fetch()
        {
            debug!(error = %e, "Mount table read-ahead failed");
            self.deferred = Some(e);
        }
        Ok(Some(entry))
    }

    /// Step back by one entry.
    ///
    /// This does not restart the enumeration: after entries `[E1, E2]` a
    /// rewind makes the next call return `E2` again. At position 0 it is a
    /// no-op.
    pub fn rewind(&mut self) {
        self.position = self.position.saturating_sub(1);
    }

    /// The entry most recently returned by [`next_entry`](Self::next_entry).
    pub fn current(&self) -> Option<&MountEntry> {
        self.key().and_then(|i| self.cache.get(i))
    }

    /// Table index of the entry most recently returned, i.e. `position() - 1`.
    ///
    /// This is the index of [`current`](Self::current), not the slot the
    /// next call will read. `None` before the first entry is returned.
    pub fn key(&self) -> Option<usize> {
        self.position.checked_sub(1)
    }

    /// Entries handed out so far, net of rewinds.
    pub fn position(&self) -> usize {
        self.position
    }

    /// True while another call to [`next_entry`](Self::next_entry) can yield an entry.
    pub fn is_valid(&self) -> bool {
        self.position < self.cache.len() || self.state == EnumState::Open
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EnumState {
        self.state
    }

    /// Every entry observed so far, in table order.
    pub fn cached(&self) -> &[MountEntry] {
        &self.cache
    }

    /// Release the backend cursor now instead of on drop.
    pub fn close(mut self) -> Result<()> {
        self.release_cursor(EnumState::Closed)
    }
}

impl<B: QuotaBackend> Iterator for MountEnumerator<B> {
    type Item = Result<MountEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl<B: QuotaBackend> Drop for MountEnumerator<B> {
    fn drop(&mut self) {
        if let Err(e) = self.release_cursor(EnumState::Closed) {
            warn!(error = %e, "Failed to close mount table cursor");
        }
    }
}

impl<B: QuotaBackend> fmt::Debug for MountEnumerator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountEnumerator")
            .field("state", &self.state)
            .field("position", &self.position)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn entry(options: &str) -> MountEntry {
        MountEntry {
            device: "/dev/vda1".to_string(),
            mount_point: "/".to_string(),
            fs_type: "ext4".to_string(),
            options: options.to_string(),
        }
    }

    #[test]
    fn test_options_split() {
        let e = entry("rw,relatime,usrquota");
        assert_eq!(e.options().collect::<Vec<_>>(), ["rw", "relatime", "usrquota"]);
        assert!(e.has_option("relatime"));
        assert!(!e.has_option("ro"));
    }

    #[test]
    fn test_option_with_value() {
        let e = entry("rw,usrjquota=aquota.user,jqfmt=vfsv1");
        assert!(e.has_option("usrjquota"));
        assert!(e.has_quota_options());
    }

    #[test]
    fn test_no_quota_options() {
        assert!(!entry("rw,relatime").has_quota_options());
        assert_eq!(entry("").options().count(), 0);
    }

    #[test]
    fn test_copy_from_raw_with_missing_field() {
        let dev = CString::new("tmpfs").unwrap();
        let path = CString::new("/run").unwrap();
        let raw = RawMountEntry {
            dev: dev.as_ptr().cast_mut(),
            path: path.as_ptr().cast_mut(),
            ..RawMountEntry::end()
        };
        // SAFETY: both pointers are live CStrings, the rest are null.
        let copied = unsafe { MountEntry::copy_from_raw(&raw) };
        assert_eq!(copied.device, "tmpfs");
        assert_eq!(copied.mount_point, "/run");
        assert_eq!(copied.fs_type, "");
        assert_eq!(copied.options, "");
    }
}
