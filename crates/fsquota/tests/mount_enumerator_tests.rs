//! MountEnumerator state machine and resource accounting.

use fsquota::testing::{
    StubBackend, StubMount, StubOp, assert_backend_error, assert_cursor_released,
};
use fsquota::{EnumState, MountEntry, QuotaClient, QuotaError};

fn root() -> StubMount {
    StubMount::new("/dev/vda1", "/", "ext4", "rw,relatime,usrquota")
}

fn home() -> StubMount {
    StubMount::new("nfs1:/export/home", "/home", "nfs", "rw,vers=4.2")
}

fn run() -> StubMount {
    StubMount::new("tmpfs", "/run", "tmpfs", "rw,nosuid")
}

fn expected(mount: &StubMount) -> MountEntry {
    MountEntry {
        device: mount.device.clone(),
        mount_point: mount.mount_point.clone(),
        fs_type: mount.fs_type.clone(),
        options: mount.options.clone(),
    }
}

fn two_mounts() -> StubBackend {
    StubBackend::new().with_mount(root()).with_mount(home())
}

// ============================================================================
// Iteration
// ============================================================================

#[test]
fn test_two_entries_then_exhausted() {
    let stub = two_mounts();
    let client = QuotaClient::new(stub.clone());
    let mut mounts = client.mounts().unwrap();
    assert!(mounts.is_valid());
    assert_eq!(mounts.state(), EnumState::Open);

    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&root())));
    assert!(mounts.is_valid());
    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&home())));
    assert!(!mounts.is_valid());
    assert_eq!(mounts.state(), EnumState::Exhausted);

    let calls_before = stub.stats().getmntent_calls;
    assert_eq!(mounts.next_entry().unwrap(), None);
    assert_eq!(mounts.next_entry().unwrap(), None);
    assert_eq!(stub.stats().getmntent_calls, calls_before);

    // The cursor closed at exhaustion; dropping must not close it again.
    drop(mounts);
    assert_eq!(stub.stats().endmntent_calls, 1);
    assert_cursor_released(&stub, "exhausted");
}

#[test]
fn test_empty_table_is_detected_at_open() {
    let stub = StubBackend::new();
    let client = QuotaClient::new(stub.clone());
    let mut mounts = client.mounts().unwrap();

    assert!(!mounts.is_valid());
    assert_eq!(mounts.state(), EnumState::Exhausted);
    assert_eq!(mounts.next_entry().unwrap(), None);
    assert_eq!(mounts.current(), None);
    assert_cursor_released(&stub, "empty");
}

#[test]
fn test_iterator_collects_every_entry() {
    let stub = two_mounts().with_mount(run());
    let client = QuotaClient::new(stub.clone());

    let entries: Vec<MountEntry> = client
        .mounts()
        .unwrap()
        .collect::<Result<_, QuotaError>>()
        .unwrap();
    assert_eq!(entries, [expected(&root()), expected(&home()), expected(&run())]);
    assert!(entries[0].has_quota_options());
    assert!(!entries[2].has_quota_options());
    assert_cursor_released(&stub, "collect");
}

#[test]
fn test_empty_options() {
    let client = QuotaClient::new(StubBackend::new().with_mount(StubMount::new("none", "/sys", "sysfs", "")));
    let entry = client.mounts().unwrap().next().unwrap().unwrap();
    assert_eq!(entry.options, "");
    assert_eq!(entry.options().count(), 0);
}

// ============================================================================
// Position, current, rewind
// ============================================================================

#[test]
fn test_current_and_key_track_last_returned() {
    let client = QuotaClient::new(two_mounts());
    let mut mounts = client.mounts().unwrap();
    assert_eq!(mounts.current(), None);
    assert_eq!(mounts.key(), None);

    mounts.next_entry().unwrap();
    assert_eq!(mounts.key(), Some(0));
    assert_eq!(mounts.current(), Some(&expected(&root())));

    mounts.next_entry().unwrap();
    assert_eq!(mounts.key(), Some(1));
    assert_eq!(mounts.current(), Some(&expected(&home())));
}

#[test]
fn test_rewind_steps_back_one_entry_only() {
    // Rewind does not restart the table: it replays the last entry.
    let stub = two_mounts().with_mount(run());
    let client = QuotaClient::new(stub.clone());
    let mut mounts = client.mounts().unwrap();

    mounts.next_entry().unwrap();
    mounts.next_entry().unwrap();
    assert_eq!(mounts.position(), 2);

    mounts.rewind();
    assert_eq!(mounts.position(), 1);
    assert_eq!(mounts.current(), Some(&expected(&root())));

    let calls_before = stub.stats().getmntent_calls;
    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&home())));
    assert_eq!(stub.stats().getmntent_calls, calls_before);
    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&run())));
    assert_eq!(mounts.next_entry().unwrap(), None);
}

#[test]
fn test_rewind_at_start_is_noop() {
    let client = QuotaClient::new(two_mounts());
    let mut mounts = client.mounts().unwrap();
    mounts.rewind();
    assert_eq!(mounts.position(), 0);
    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&root())));
}

#[test]
fn test_rewind_after_exhaustion_replays_from_cache() {
    let stub = two_mounts();
    let client = QuotaClient::new(stub.clone());
    let mut mounts = client.mounts().unwrap();
    while mounts.next_entry().unwrap().is_some() {}
    assert!(!mounts.is_valid());

    mounts.rewind();
    assert!(mounts.is_valid());
    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&home())));
    assert!(!mounts.is_valid());
    assert_eq!(mounts.cached().len(), 2);
    assert_eq!(stub.stats().setmntent_calls, 1);
}

// ============================================================================
// Cursor ownership
// ============================================================================

#[test]
fn test_second_enumerator_is_busy() {
    let client = QuotaClient::new(two_mounts());
    let first = client.mounts().unwrap();
    assert_eq!(client.mounts().unwrap_err(), QuotaError::CursorBusy);
    assert_eq!(client.clone().mounts().unwrap_err(), QuotaError::CursorBusy);

    drop(first);
    assert!(client.mounts().is_ok());
}

#[test]
fn test_exhausted_enumerator_frees_the_cursor() {
    let client = QuotaClient::new(two_mounts());
    let mut first = client.mounts().unwrap();
    while first.next_entry().unwrap().is_some() {}

    // `first` is still alive but no longer holds the cursor.
    let second = client.mounts().unwrap();
    assert_eq!(second.cached().len(), 1);
}

#[test]
fn test_drop_mid_iteration_closes_once() {
    let stub = two_mounts().with_mount(run().owned(0b1111));
    let client = QuotaClient::new(stub.clone());
    {
        let mut mounts = client.mounts().unwrap();
        mounts.next_entry().unwrap();
        assert!(stub.cursor_open());
    }
    assert_eq!(stub.stats().endmntent_calls, 1);
    assert_cursor_released(&stub, "drop");
}

#[test]
fn test_explicit_close_then_drop_closes_once() {
    let stub = two_mounts();
    let client = QuotaClient::new(stub.clone());
    let mounts = client.mounts().unwrap();
    mounts.close().unwrap();
    assert_eq!(stub.stats().endmntent_calls, 1);
    assert_cursor_released(&stub, "close");
}

#[test]
fn test_close_failure_still_releases_session_cursor() {
    let stub = two_mounts();
    let client = QuotaClient::new(stub.clone());
    let mounts = client.mounts().unwrap();
    stub.fail_next(StubOp::EndMntEnt, "Input/output error");

    assert_backend_error(mounts.close(), "Input/output error", "close");
    assert!(client.mounts().is_ok());
}

#[test]
fn test_open_failure_releases_session_cursor() {
    let stub = two_mounts();
    stub.fail_next(StubOp::SetMntEnt, "No such file or directory");
    let client = QuotaClient::new(stub.clone());

    assert_backend_error(client.mounts(), "No such file or directory", "open");
    assert_eq!(stub.stats().getmntent_calls, 0);

    let entries: Vec<_> = client.mounts().unwrap().collect();
    assert_eq!(entries.len(), 2);
}

// ============================================================================
// Fetch errors and owned strings
// ============================================================================

#[test]
fn test_owned_strings_freed_exactly_once() {
    let stub = StubBackend::new()
        .with_mount(root().owned(0b1111))
        .with_mount(home().owned(0b0101))
        .with_mount(run());
    let client = QuotaClient::new(stub.clone());

    assert_eq!(client.mounts().unwrap().count(), 3);

    let stats = stub.stats();
    assert_eq!(stats.owned_allocated, 6);
    assert_eq!(stats.owned_freed, 6);
    // One free per row; the end marker is not freed.
    assert_eq!(stats.free_calls, 3);
    assert_eq!(stats.getmntent_calls, 4);
}

#[test]
fn test_read_ahead_error_is_reported_after_cached_entry() {
    let stub = StubBackend::new()
        .with_mount(root())
        .with_mount(home().owned(0b1111))
        .with_mount(run());
    let client = QuotaClient::new(stub.clone());
    let mut mounts = client.mounts().unwrap();

    // The read-ahead for the second row reports an error. The cached row is
    // still handed out; the error surfaces on the next call.
    stub.fail_next(StubOp::GetMntEnt, "Input/output error");
    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&root())));
    assert_eq!(mounts.position(), 1);
    assert_eq!(stub.stats().owned_outstanding(), 0);
    assert!(mounts.is_valid());

    assert_backend_error(mounts.next_entry(), "Input/output error", "read-ahead");
    assert_eq!(mounts.position(), 1);

    // The failed row is gone, but iteration resumes where the backend is.
    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&run())));
    assert_eq!(mounts.next_entry().unwrap(), None);
    drop(mounts);
    assert_cursor_released(&stub, "fetch error");
}

#[test]
fn test_cached_entry_needs_no_backend_call() {
    let stub = two_mounts();
    let client = QuotaClient::new(stub.clone());
    let mut mounts = client.mounts().unwrap();
    let calls_after_open = stub.stats().getmntent_calls;
    assert_eq!(calls_after_open, 1);

    // A failure armed for the read-ahead cannot hide the prefetched row.
    stub.fail_next(StubOp::GetMntEnt, "Stale file handle");
    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&root())));
    assert_eq!(mounts.current(), Some(&expected(&root())));
}

#[test]
fn test_error_message_at_end_of_table_is_not_a_failure() {
    // errno survives a clean end of file, so the channel may still hold a
    // message when the end marker arrives.
    let stub = StubBackend::new().with_mount(root());
    let client = QuotaClient::new(stub.clone());
    let mut mounts = client.mounts().unwrap();

    stub.fail_next(StubOp::GetMntEnt, "No such file or directory");
    assert_eq!(mounts.next_entry().unwrap(), Some(expected(&root())));
    assert_eq!(mounts.state(), EnumState::Exhausted);
    assert!(!mounts.is_valid());
    assert_eq!(stub.stats().endmntent_calls, 1);
    assert_eq!(mounts.next_entry().unwrap(), None);
    drop(mounts);
    assert_cursor_released(&stub, "end marker with message");
}

#[test]
fn test_error_message_with_empty_table_opens_exhausted() {
    let stub = StubBackend::new();
    stub.fail_next(StubOp::GetMntEnt, "No such file or directory");
    let client = QuotaClient::new(stub.clone());

    let mut mounts = client.mounts().unwrap();
    assert_eq!(mounts.state(), EnumState::Exhausted);
    assert_eq!(mounts.next_entry().unwrap(), None);
    assert_cursor_released(&stub, "empty table with message");
}

#[test]
fn test_prefetch_error_fails_open_and_closes_cursor() {
    let stub = two_mounts();
    stub.fail_next(StubOp::GetMntEnt, "Stale file handle");
    let client = QuotaClient::new(stub.clone());

    assert_backend_error(client.mounts(), "Stale file handle", "prefetch");
    assert_cursor_released(&stub, "prefetch");
    assert!(client.mounts().is_ok());
}
