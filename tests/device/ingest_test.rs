//! Tests for `Device::ingest_record`, the records-only side channel.

use std::sync::Arc;

use straylight::device::{Device, Errno, MAX_RECORD_INPUT_LEN};
use straylight::registry::{Entry, EntryKind, Registry, CAPACITY, MAX_PATH_LEN};

fn device() -> Device {
    let registry = Arc::new(Registry::new());
    registry.init();
    Device::new(registry)
}

#[test]
fn data_records_are_added() {
    let device = device();

    assert_eq!(
        device.ingest_record(b"MAP:1000:/sdcard/a:/sdcard/b\n"),
        Ok((0, EntryKind::PathMapping))
    );
    assert_eq!(
        device.ingest_record(b"PATH:/data/x"),
        Ok((1, EntryKind::SinglePath))
    );
    assert_eq!(
        device.ingest_record(b"PTRACE:42"),
        Ok((2, EntryKind::PtraceTarget))
    );
    assert_eq!(
        device.registry().find_path_mapping(1000, "/sdcard/a"),
        Some(0)
    );
}

#[test]
fn commands_are_never_dispatched() {
    let device = device();
    device.ingest_record(b"PATH:/keep").expect("accepted");

    assert_eq!(device.ingest_record(b"CMD:CLEAR"), Err(Errno::Invalid));
    assert_eq!(device.ingest_record(b"CMD:STATUS"), Err(Errno::Invalid));
    assert_eq!(device.registry().count(), 1);
}

#[test]
fn input_ends_at_first_nul() {
    let device = device();

    assert_eq!(
        device.ingest_record(b"PATH:/cwd\0garbage after terminator"),
        Ok((0, EntryKind::SinglePath))
    );
    assert_eq!(device.registry().find_single_path("/cwd"), Some(0));
}

#[test]
fn overlong_path_is_too_big() {
    let device = device();
    let line = format!("PATH:{}", "p".repeat(MAX_PATH_LEN + 10));
    assert!(line.len() <= MAX_RECORD_INPUT_LEN);

    assert_eq!(device.ingest_record(line.as_bytes()), Err(Errno::TooBig));
    assert_eq!(device.registry().count(), 0);
}

#[test]
fn bad_bytes_and_malformed_records_are_rejected() {
    let device = device();

    assert_eq!(device.ingest_record(b"PATH:/a\xff"), Err(Errno::Fault));
    assert_eq!(device.ingest_record(b"/not/a/record"), Err(Errno::Invalid));
    assert_eq!(device.ingest_record(b"PTRACE:abc"), Err(Errno::Invalid));
    assert_eq!(device.registry().count(), 0);
}

#[test]
fn full_registry_is_no_space() {
    let device = device();
    for id in 0..CAPACITY {
        let id = u32::try_from(id).expect("fits");
        device
            .registry()
            .add(Entry::ptrace_target(id))
            .expect("capacity available");
    }

    assert_eq!(device.ingest_record(b"PTRACE:99999"), Err(Errno::NoSpace));
}

#[test]
fn uninitialized_registry_rejects_records() {
    let device = Device::new(Arc::new(Registry::new()));
    assert_eq!(device.ingest_record(b"PATH:/a"), Err(Errno::Invalid));
}
