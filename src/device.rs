//! Device channel: the write/read boundary in front of the protocol.
//!
//! A [`Device`] plays the role of a character device node. Each
//! [`DeviceHandle`] is one open file: writes feed a single protocol line,
//! and the first read returns a full registry snapshot while later reads
//! return end-of-file.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::protocol::{self, ProtocolError, Response};
use crate::registry::{EntryKind, Registry, RegistryError};
use crate::text;

/// Most bytes a single write consumes; the rest of the input is ignored.
pub const MAX_WRITE_LEN: usize = text::MAX_LINE_LEN - 1;

/// Most bytes the records-only channel reads from one submission.
pub const MAX_RECORD_INPUT_LEN: usize = 1023;

/// Listing produced when the registry is empty or nothing else fits.
pub const EMPTY_SNAPSHOT: &str = "[MAPPINGS:0]\n[PATHS:0]\n[PTRACE:0]\n[END]\n";

const END_MARKER: &str = "[END]\n";

// ---------------------------------------------------------------------------
// Errno
// ---------------------------------------------------------------------------

/// Externally visible status codes (Linux errno values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Errno {
    /// Input could not be copied in.
    #[error("bad address")]
    Fault,
    /// Registry is full.
    #[error("no space left on device")]
    NoSpace,
    /// Staging buffer allocation failed.
    #[error("out of memory")]
    NoMemory,
    /// A string exceeds its fixed bound.
    #[error("argument list too long")]
    TooBig,
    /// Parse or parameter error.
    #[error("invalid argument")]
    Invalid,
    /// Registry operation failed.
    #[error("input/output error")]
    Io,
    /// Unknown command.
    #[error("no such file or directory")]
    NoEntry,
    /// Registry not yet initialized.
    #[error("resource temporarily unavailable")]
    Again,
}

impl Errno {
    /// Positive errno value.
    pub fn code(self) -> i32 {
        match self {
            Self::NoEntry => 2,
            Self::Io => 5,
            Self::TooBig => 7,
            Self::Again => 11,
            Self::NoMemory => 12,
            Self::Fault => 14,
            Self::Invalid => 22,
            Self::NoSpace => 28,
        }
    }

    /// Symbolic name, e.g. `"ENOSPC"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Fault => "EFAULT",
            Self::NoSpace => "ENOSPC",
            Self::NoMemory => "ENOMEM",
            Self::TooBig => "E2BIG",
            Self::Invalid => "EINVAL",
            Self::Io => "EIO",
            Self::NoEntry => "ENOENT",
            Self::Again => "EAGAIN",
        }
    }

    /// Negated code, as a syscall would return it.
    pub fn status(self) -> i64 {
        i64::from(self.code()).saturating_neg()
    }
}

impl From<&ProtocolError> for Errno {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::Invalid(_) | ProtocolError::Param(_) => Self::Invalid,
            ProtocolError::Unknown(_) => Self::NoEntry,
            ProtocolError::Operation(_) => Self::Io,
            ProtocolError::Record(e) => Self::from(e),
        }
    }
}

impl From<&RegistryError> for Errno {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::Full { .. } => Self::NoSpace,
            RegistryError::TooLong { .. } => Self::TooBig,
            _ => Self::Invalid,
        }
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// The device node. Cheap to share; every [`open`](Self::open) gets its own position.
#[derive(Debug, Clone)]
pub struct Device {
    registry: Arc<Registry>,
}

impl Device {
    /// Front `registry` with a device channel.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Open a new handle with its read position at zero.
    pub fn open(&self) -> DeviceHandle {
        DeviceHandle {
            registry: Arc::clone(&self.registry),
            position: 0,
        }
    }

    /// The registry behind this device.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Add one data record submitted outside the device node.
    ///
    /// This is the side channel for callers that cannot open the device:
    /// only `MAP:`, `PATH:` and `PTRACE:` records are accepted and `CMD:`
    /// lines are never dispatched. Input is read as a C string of at most
    /// [`MAX_RECORD_INPUT_LEN`] bytes, so it ends at the first NUL, and one
    /// trailing newline is stripped.
    ///
    /// # Errors
    ///
    /// [`Errno::Fault`] for non-UTF-8 input, [`Errno::Invalid`] for `CMD:`
    /// lines and malformed records, and the registry mapping otherwise
    /// ([`Errno::NoSpace`], [`Errno::TooBig`]).
    pub fn ingest_record(&self, input: &[u8]) -> Result<(usize, EntryKind), Errno> {
        let end = input.iter().position(|&b| b == 0).unwrap_or(input.len());
        let bytes = input.get(..end).unwrap_or(input);
        let decoded = text::utf8_prefix(bytes, MAX_RECORD_INPUT_LEN).map_err(|e| {
            warn!(error = %e, "record input is not valid UTF-8");
            Errno::Fault
        })?;
        let line = text::strip_newline(decoded);

        if protocol::is_command(line) {
            warn!(line, "command rejected on records-only channel");
            return Err(Errno::Invalid);
        }

        self.registry.add_parsed(line).map_err(|e| {
            let errno = Errno::from(&e);
            warn!(error = %e, errno = errno.name(), "record rejected");
            errno
        })
    }
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Bytes reported as accepted (the full input length).
    pub accepted: usize,
    /// What the protocol did with the line.
    pub response: Response,
}

/// One open file on the [`Device`].
#[derive(Debug)]
pub struct DeviceHandle {
    registry: Arc<Registry>,
    position: usize,
}

impl DeviceHandle {
    /// Write one protocol line; returns the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// See [`write_line`](Self::write_line).
    pub fn write(&self, input: &[u8]) -> Result<usize, Errno> {
        self.write_line(input).map(|outcome| outcome.accepted)
    }

    /// Write one protocol line and keep the protocol's response.
    ///
    /// At most [`MAX_WRITE_LEN`] bytes are consumed and one trailing newline
    /// is stripped; the full input length is reported as accepted.
    ///
    /// # Errors
    ///
    /// [`Errno::Fault`] when the bytes are not UTF-8; otherwise the mapping
    /// of the [`ProtocolError`] (see `From<&ProtocolError> for Errno`).
    pub fn write_line(&self, input: &[u8]) -> Result<WriteOutcome, Errno> {
        let decoded = text::utf8_prefix(input, MAX_WRITE_LEN).map_err(|e| {
            warn!(error = %e, "write input is not valid UTF-8");
            Errno::Fault
        })?;
        let line = text::strip_newline(decoded);
        debug!(line, len = input.len(), "device write");

        match protocol::process_line(&self.registry, line) {
            Ok(response) => {
                if let Response::Added { index, kind } = &response {
                    let status = self.registry.status();
                    info!(
                        index,
                        %kind,
                        total = status.total,
                        mappings = status.path_mappings,
                        paths = status.single_paths,
                        ptrace = status.ptrace_targets,
                        "record added"
                    );
                }
                Ok(WriteOutcome {
                    accepted: input.len(),
                    response,
                })
            }
            Err(e) => {
                let errno = Errno::from(&e);
                warn!(error = %e, errno = errno.name(), "write rejected");
                Err(errno)
            }
        }
    }

    /// Fill `buf` with the registry snapshot.
    ///
    /// Returns the bytes written; once anything has been read from this
    /// handle, further reads return 0.
    ///
    /// # Errors
    ///
    /// [`Errno::Again`] before the registry is initialized and
    /// [`Errno::NoMemory`] if the staging buffer cannot be allocated.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Errno> {
        if self.position > 0 {
            return Ok(0);
        }
        if !self.registry.is_initialized() {
            warn!("read before registry initialization");
            return Err(Errno::Again);
        }

        let snapshot = render_snapshot(&self.registry, buf.len())?;
        let n = snapshot.len().min(buf.len());
        if let (Some(dst), Some(src)) = (buf.get_mut(..n), snapshot.as_bytes().get(..n)) {
            dst.copy_from_slice(src);
        }
        self.position = self.position.saturating_add(n);

        debug!(bytes = n, "device read");
        Ok(n)
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.position
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Appends whole records while they fit in a fixed budget.
struct BoundedWriter {
    out: String,
    limit: usize,
    full: bool,
}

impl BoundedWriter {
    fn new(limit: usize) -> Result<Self, Errno> {
        let mut out = String::new();
        out.try_reserve_exact(limit).map_err(|_| Errno::NoMemory)?;
        Ok(Self {
            out,
            limit,
            full: false,
        })
    }

    /// Append `record` if it fits entirely; otherwise stop all further appends.
    fn push(&mut self, record: &str) -> bool {
        if self.full {
            return false;
        }
        let fits = self
            .out
            .len()
            .checked_add(record.len())
            .is_some_and(|end| end <= self.limit);
        if fits {
            self.out.push_str(record);
        } else {
            self.full = true;
        }
        fits
    }
}

/// Serialize the registry into at most `limit` bytes.
///
/// Records are never split. If nothing fits, or the registry holds no
/// entries, the output is [`EMPTY_SNAPSHOT`] (cut on a line boundary when
/// even that does not fit).
///
/// # Errors
///
/// [`Errno::NoMemory`] when the staging buffer cannot be reserved.
pub fn render_snapshot(registry: &Registry, limit: usize) -> Result<String, Errno> {
    let status = registry.status();
    let mut writer = BoundedWriter::new(limit)?;

    'sections: for kind in EntryKind::ALL {
        let header = format!("[{}:{}]\n", kind.section(), status.count_of(kind));
        if !writer.push(&header) {
            break;
        }

        // A racing teardown ends the listing early.
        let Ok(entries) = registry.entries_of(kind) else {
            break;
        };
        for (_, entry) in entries {
            if !writer.push(&format!("{entry}\n")) {
                break 'sections;
            }
        }
    }
    writer.push(END_MARKER);

    if writer.out.is_empty() || status.total == 0 {
        writer.out.clear();
        writer.full = false;
        for line in EMPTY_SNAPSHOT.split_inclusive('\n') {
            if !writer.push(line) {
                break;
            }
        }
    }

    Ok(writer.out)
}
