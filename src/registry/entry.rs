//! Registry entry types.
//!
//! Entries are plain `Copy` values with inline, fixed-size string storage so
//! that moving one in or out of the slot table never allocates.

use std::fmt;

use serde::{Serialize, Serializer};

use super::RegistryError;

/// Size of the inline path buffer. Stored strings must be strictly shorter.
pub const MAX_PATH_LEN: usize = 256;

// ---------------------------------------------------------------------------
// EntryKind
// ---------------------------------------------------------------------------

/// The three kinds of policy fact the registry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Owner id plus source and destination path (wire type 1).
    PathMapping,
    /// A single path (wire type 2).
    SinglePath,
    /// An owner id whose trace state is of interest (wire type 3).
    PtraceTarget,
}

impl EntryKind {
    /// All kinds in wire-id order.
    pub const ALL: [EntryKind; 3] = [Self::PathMapping, Self::SinglePath, Self::PtraceTarget];

    /// Decode a wire type id (1–3).
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::PathMapping),
            2 => Some(Self::SinglePath),
            3 => Some(Self::PtraceTarget),
            _ => None,
        }
    }

    /// Wire type id.
    pub fn id(self) -> u32 {
        match self {
            Self::PathMapping => 1,
            Self::SinglePath => 2,
            Self::PtraceTarget => 3,
        }
    }

    /// Record prefix used on the wire (`MAP`, `PATH`, `PTRACE`).
    pub fn label(self) -> &'static str {
        match self {
            Self::PathMapping => "MAP",
            Self::SinglePath => "PATH",
            Self::PtraceTarget => "PTRACE",
        }
    }

    /// Section name used in the snapshot listing.
    pub fn section(self) -> &'static str {
        match self {
            Self::PathMapping => "MAPPINGS",
            Self::SinglePath => "PATHS",
            Self::PtraceTarget => "PTRACE",
        }
    }

    /// Position in per-kind counter arrays.
    pub(crate) fn slot(self) -> usize {
        match self {
            Self::PathMapping => 0,
            Self::SinglePath => 1,
            Self::PtraceTarget => 2,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// BoundedStr
// ---------------------------------------------------------------------------

/// A non-empty UTF-8 string of at most `MAX_PATH_LEN - 1` bytes, stored inline.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BoundedStr {
    buf: [u8; MAX_PATH_LEN],
    len: u8,
}

impl BoundedStr {
    /// Copy `value` into inline storage.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] when `value` is empty and
    /// [`RegistryError::TooLong`] when it is `MAX_PATH_LEN` bytes or longer.
    pub fn new(field: &'static str, value: &str) -> Result<Self, RegistryError> {
        if value.is_empty() {
            return Err(RegistryError::InvalidArgument(field));
        }
        let len = u8::try_from(value.len())
            .ok()
            .filter(|n| usize::from(*n) < MAX_PATH_LEN)
            .ok_or(RegistryError::TooLong {
                field,
                len: value.len(),
                max: MAX_PATH_LEN.saturating_sub(1),
            })?;

        let mut buf = [0u8; MAX_PATH_LEN];
        if let Some(dst) = buf.get_mut(..value.len()) {
            dst.copy_from_slice(value.as_bytes());
        }
        Ok(Self { buf, len })
    }

    /// View as `&str`.
    pub fn as_str(&self) -> &str {
        let bytes = self.buf.get(..usize::from(self.len)).unwrap_or_default();
        std::str::from_utf8(bytes).unwrap_or_default()
    }

    /// Zero the whole buffer.
    pub(crate) fn scrub(&mut self) {
        self.buf.fill(0);
        self.len = 0;
    }
}

impl fmt::Debug for BoundedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for BoundedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for BoundedStr {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for BoundedStr {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Serialize for BoundedStr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One policy fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    /// Redirect `source_path` to `dest_path` for `owner_id`.
    PathMapping {
        /// Owning user id.
        owner_id: u32,
        /// Path as requested.
        source_path: BoundedStr,
        /// Path to substitute.
        dest_path: BoundedStr,
    },
    /// A single path keyword.
    SinglePath {
        /// The path.
        path: BoundedStr,
    },
    /// A trace-target owner id.
    PtraceTarget {
        /// Owning user id.
        owner_id: u32,
    },
}

impl Entry {
    /// Build a path mapping, validating both paths.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` or `TooLong` per [`BoundedStr::new`].
    pub fn path_mapping(
        owner_id: u32,
        source_path: &str,
        dest_path: &str,
    ) -> Result<Self, RegistryError> {
        Ok(Self::PathMapping {
            owner_id,
            source_path: BoundedStr::new("source_path", source_path)?,
            dest_path: BoundedStr::new("dest_path", dest_path)?,
        })
    }

    /// Build a single-path entry.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` or `TooLong` per [`BoundedStr::new`].
    pub fn single_path(path: &str) -> Result<Self, RegistryError> {
        Ok(Self::SinglePath {
            path: BoundedStr::new("path", path)?,
        })
    }

    /// Build a trace-target entry.
    pub fn ptrace_target(owner_id: u32) -> Self {
        Self::PtraceTarget { owner_id }
    }

    /// The entry's kind.
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::PathMapping { .. } => EntryKind::PathMapping,
            Self::SinglePath { .. } => EntryKind::SinglePath,
            Self::PtraceTarget { .. } => EntryKind::PtraceTarget,
        }
    }

    /// Zero all inline string storage.
    pub(crate) fn scrub(&mut self) {
        match self {
            Self::PathMapping {
                owner_id,
                source_path,
                dest_path,
            } => {
                *owner_id = 0;
                source_path.scrub();
                dest_path.scrub();
            }
            Self::SinglePath { path } => path.scrub(),
            Self::PtraceTarget { owner_id } => *owner_id = 0,
        }
    }
}

/// Renders the snapshot line body (no trailing newline).
impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathMapping {
                owner_id,
                source_path,
                dest_path,
            } => write!(f, "{owner_id}:{source_path}:{dest_path}"),
            Self::SinglePath { path } => write!(f, "{path}"),
            Self::PtraceTarget { owner_id } => write!(f, "{owner_id}"),
        }
    }
}
