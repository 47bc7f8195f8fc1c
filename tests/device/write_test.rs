//! Tests for `DeviceHandle::write` and errno mapping.

use std::sync::Arc;

use straylight::device::{Device, Errno};
use straylight::protocol::ProtocolError;
use straylight::registry::{Entry, EntryKind, Registry, RegistryError, CAPACITY};

fn device() -> Device {
    let registry = Arc::new(Registry::new());
    registry.init();
    Device::new(registry)
}

#[test]
fn write_returns_full_input_length() {
    let device = device();
    let handle = device.open();
    assert_eq!(handle.write(b"PATH:/etc/hosts\n"), Ok(16));
    assert_eq!(device.registry().find_single_path("/etc/hosts"), Some(0));
}

#[test]
fn only_one_trailing_newline_is_stripped() {
    let device = device();
    let handle = device.open();
    handle.write(b"PATH:/a\n\n").expect("accepted");
    assert_eq!(device.registry().find_single_path("/a\n"), Some(0));
}

#[test]
fn input_past_limit_is_ignored_but_counted() {
    let device = device();
    let handle = device.open();
    let path = "x".repeat(300);
    let line = format!("PATH:{path}");

    assert_eq!(handle.write(line.as_bytes()), Ok(line.len()));
    let (_, stored) = device
        .registry()
        .get_by_type_index(EntryKind::SinglePath, 0)
        .expect("stored");
    assert_eq!(stored.to_string().len(), 250);
}

#[test]
fn errno_codes_match_linux() {
    let cases = [
        (Errno::NoEntry, 2, "ENOENT"),
        (Errno::Io, 5, "EIO"),
        (Errno::TooBig, 7, "E2BIG"),
        (Errno::Again, 11, "EAGAIN"),
        (Errno::NoMemory, 12, "ENOMEM"),
        (Errno::Fault, 14, "EFAULT"),
        (Errno::Invalid, 22, "EINVAL"),
        (Errno::NoSpace, 28, "ENOSPC"),
    ];
    for (errno, code, name) in cases {
        assert_eq!(errno.code(), code);
        assert_eq!(errno.name(), name);
        assert_eq!(errno.status(), -i64::from(code));
    }
}

#[test]
fn each_error_category_maps_to_one_errno() {
    let device = device();
    let handle = device.open();

    assert_eq!(handle.write(b"CMD:FROB"), Err(Errno::NoEntry));
    assert_eq!(handle.write(b"CMD:"), Err(Errno::Invalid));
    assert_eq!(handle.write(b"CMD:LIST:TYPE:9"), Err(Errno::Invalid));
    assert_eq!(handle.write(b"CMD:REMOVE:INDEX:5"), Err(Errno::Io));
    assert_eq!(handle.write(b"MAP:x:/a:/b"), Err(Errno::Invalid));
    assert_eq!(handle.write(b"PATH:"), Err(Errno::Invalid));
    assert_eq!(handle.write(&[b'P', 0xff, 0xfe]), Err(Errno::Fault));
}

#[test]
fn record_errors_map_by_registry_cause() {
    let too_long = ProtocolError::Record(RegistryError::TooLong {
        field: "dest_path",
        len: 300,
        max: 255,
    });
    let full = ProtocolError::Record(RegistryError::Full { capacity: CAPACITY });
    let missing = ProtocolError::Record(RegistryError::NotInitialized);

    assert_eq!(Errno::from(&too_long), Errno::TooBig);
    assert_eq!(Errno::from(&full), Errno::NoSpace);
    assert_eq!(Errno::from(&missing), Errno::Invalid);
}

#[test]
fn full_registry_is_enospc() {
    let device = device();
    let registry = device.registry();
    for owner in 0..CAPACITY {
        registry
            .add(Entry::ptrace_target(u32::try_from(owner).expect("small")))
            .expect("below capacity");
    }
    let handle = device.open();
    assert_eq!(handle.write(b"PTRACE:1"), Err(Errno::NoSpace));
}

#[test]
fn write_before_init_is_einval() {
    let device = Device::new(Arc::new(Registry::new()));
    let handle = device.open();
    assert_eq!(handle.write(b"PATH:/a"), Err(Errno::Invalid));
}
