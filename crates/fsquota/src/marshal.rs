//! String marshaling across the backend boundary.
//!
//! Client strings travel to the backend as zero-terminated buffers owned by
//! a [`BackendString`]; the buffer is released when the guard is dropped, so
//! every exit path of a call releases exactly what it allocated. Strings
//! coming back from the backend are copied out with [`from_backend_buffer`]
//! and never adopted.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{QuotaError, Result};

/// Allocation counters of a [`StringMarshal`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Buffers handed out
    pub allocated: u64,
    /// Buffers released
    pub released: u64,
}

impl BufferStats {
    /// Buffers currently alive.
    pub fn outstanding(&self) -> u64 {
        self.allocated.saturating_sub(self.released)
    }
}

/// Allocates backend buffers and tracks their release.
#[derive(Debug, Default)]
pub struct StringMarshal {
    allocated: AtomicU64,
    released: AtomicU64,
}

impl StringMarshal {
    /// Create a marshal with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `s` into a fresh zero-terminated buffer.
    ///
    /// The buffer is `s.len() + 1` bytes, zero-filled before the copy so the
    /// last byte is the terminator. Interior NUL bytes would silently truncate
    /// the string on the backend side and are rejected.
    pub fn to_backend_buffer(&self, argument: &'static str, s: &str) -> Result<BackendString<'_>> {
        if let Some(pos) = s.bytes().position(|b| b == 0) {
            return Err(QuotaError::InvalidArgument {
                argument,
                reason: format!("contains a NUL byte at offset {pos}"),
            });
        }

        let mut bytes = vec![0u8; s.len() + 1].into_boxed_slice();
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        self.allocated.fetch_add(1, Ordering::Relaxed);

        Ok(BackendString {
            bytes,
            released: &self.released,
        })
    }

    /// Current allocation counters.
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }
}

/// A zero-terminated buffer lent to the backend for the span of one call.
#[derive(Debug)]
pub struct BackendString<'m> {
    bytes: Box<[u8]>,
    released: &'m AtomicU64,
}

impl BackendString<'_> {
    /// View the buffer as a C string.
    pub fn as_c_str(&self) -> &CStr {
        // The buffer always ends with the terminator and has no interior NUL.
        CStr::from_bytes_until_nul(&self.bytes).unwrap_or_default()
    }

    /// Buffer length including the terminator.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl Drop for BackendString<'_> {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

/// Copy a backend-owned string into a client `String`.
///
/// Returns `None` for a null pointer. The original buffer is left untouched;
/// freeing it remains the caller's job. Invalid UTF-8 is replaced lossily.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for reads.
pub unsafe fn from_backend_buffer(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    let s = unsafe { CStr::from_ptr(ptr) };
    Some(s.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_buffer_is_terminated_and_sized() {
        let marshal = StringMarshal::new();
        let buf = marshal.to_backend_buffer("dev", "/dev/sda1").unwrap();
        assert_eq!(buf.capacity(), "/dev/sda1".len() + 1);
        assert_eq!(buf.as_c_str().to_bytes(), b"/dev/sda1");
        assert_eq!(buf.as_c_str().to_bytes_with_nul().last(), Some(&0));
    }

    #[test]
    fn test_empty_string() {
        let marshal = StringMarshal::new();
        let buf = marshal.to_backend_buffer("dev", "").unwrap();
        assert_eq!(buf.capacity(), 1);
        assert!(buf.as_c_str().is_empty());
    }

    #[test]
    fn test_release_on_drop() {
        let marshal = StringMarshal::new();
        {
            let _a = marshal.to_backend_buffer("host", "nfs1").unwrap();
            let _b = marshal.to_backend_buffer("path", "/export").unwrap();
            assert_eq!(marshal.stats().outstanding(), 2);
        }
        assert_eq!(
            marshal.stats(),
            BufferStats {
                allocated: 2,
                released: 2
            }
        );
    }

    #[test]
    fn test_interior_nul_rejected_without_allocating() {
        let marshal = StringMarshal::new();
        let err = marshal.to_backend_buffer("dev", "/dev/sd\0a").unwrap_err();
        assert!(matches!(
            err,
            QuotaError::InvalidArgument { argument: "dev", .. }
        ));
        assert_eq!(marshal.stats(), BufferStats::default());
    }

    #[test]
    fn test_from_backend_buffer_null() {
        // SAFETY: null is allowed.
        assert_eq!(unsafe { from_backend_buffer(std::ptr::null()) }, None);
    }

    #[test]
    fn test_from_backend_buffer_copies() {
        let original = c"rw,usrquota".to_owned();
        // SAFETY: `original` is a valid C string.
        let copy = unsafe { from_backend_buffer(original.as_ptr()) };
        assert_eq!(copy.as_deref(), Some("rw,usrquota"));
        // The source is still ours to drop.
        drop(original);
    }

    #[test]
    fn test_from_backend_buffer_lossy() {
        let bytes = b"bad\xffname\0";
        // SAFETY: NUL-terminated byte string.
        let copy = unsafe { from_backend_buffer(bytes.as_ptr().cast()) }.unwrap();
        assert!(copy.starts_with("bad"));
        assert!(copy.ends_with("name"));
    }

    proptest! {
        #[test]
        fn prop_marshal_preserves_bytes(s in "[^\\x00]{0,64}") {
            let marshal = StringMarshal::new();
            {
                let buf = marshal.to_backend_buffer("arg", &s).unwrap();
                prop_assert_eq!(buf.capacity(), s.len() + 1);
                prop_assert_eq!(buf.as_c_str().to_str().unwrap(), s.as_str());
            }
            prop_assert_eq!(marshal.stats().outstanding(), 0);
        }
    }
}
