//! Concurrent, capacity-bounded, type-tagged fact store.
//!
//! The [`Registry`] owns a fixed table of [`CAPACITY`] slots behind a single
//! lock. Every read and write goes through that lock, so all mutations are
//! linearized; nothing inside the critical section allocates, logs, or blocks.
//!
//! Global indices are stable for the lifetime of an entry. Type indices are
//! recomputed on every call and are only meaningful for that call: a
//! concurrent writer can shift them between two calls.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

pub mod entry;
pub mod record;
mod table;

pub use entry::{BoundedStr, Entry, EntryKind, MAX_PATH_LEN};
pub use table::CAPACITY;

use table::SlotTable;

// ---------------------------------------------------------------------------
// Errors and status
// ---------------------------------------------------------------------------

/// Errors produced by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The registry has not been initialized, or was torn down.
    #[error("registry is not initialized")]
    NotInitialized,

    /// A required field was empty.
    #[error("invalid argument: {0} must not be empty")]
    InvalidArgument(&'static str),

    /// A string field exceeds its fixed bound.
    #[error("{field} is {len} bytes; limit is {max}")]
    TooLong {
        /// Offending field.
        field: &'static str,
        /// Actual length in bytes.
        len: usize,
        /// Maximum accepted length in bytes.
        max: usize,
    },

    /// Every slot is occupied.
    #[error("registry is full ({capacity} entries)")]
    Full {
        /// Table capacity.
        capacity: usize,
    },

    /// Index or type index does not name an occupied slot.
    #[error("no such entry")]
    NotFound,

    /// A data record violated the wire format.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Point-in-time counters, read in one critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RegistryStatus {
    /// Whether the registry is initialized.
    pub initialized: bool,
    /// Total occupied slots.
    pub total: usize,
    /// Path mappings.
    pub path_mappings: usize,
    /// Single paths.
    pub single_paths: usize,
    /// Trace targets.
    pub ptrace_targets: usize,
}

impl RegistryStatus {
    /// Count for one kind.
    pub fn count_of(&self, kind: EntryKind) -> usize {
        match kind {
            EntryKind::PathMapping => self.path_mappings,
            EntryKind::SinglePath => self.single_paths,
            EntryKind::PtraceTarget => self.ptrace_targets,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The fact store. Construct, [`init`](Self::init), share as `Arc<Registry>`.
pub struct Registry {
    table: Mutex<Option<SlotTable>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Registry")
            .field("initialized", &status.initialized)
            .field("total", &status.total)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an uninitialized registry. Every operation fails until [`init`](Self::init).
    pub fn new() -> Self {
        Self {
            table: Mutex::new(None),
        }
    }

    /// Allocate the slot table. Calling this on an initialized registry is a no-op.
    pub fn init(&self) {
        // Allocate outside the lock; a racing init drops ours afterwards.
        let mut fresh = Some(SlotTable::new());
        {
            let mut guard = self.table.lock();
            if guard.is_none() {
                *guard = fresh.take();
            }
        }

        if fresh.is_some() {
            warn!("registry already initialized");
        } else {
            info!(capacity = CAPACITY, "registry initialized");
        }
    }

    /// Zero and release every slot. Afterwards the registry is uninitialized.
    pub fn teardown(&self) {
        let old = {
            let mut guard = self.table.lock();
            if let Some(table) = guard.as_mut() {
                table.clear(None);
            }
            guard.take()
        };

        if old.is_some() {
            info!("registry torn down");
        }
    }

    /// Whether [`init`](Self::init) has run and [`teardown`](Self::teardown) has not.
    pub fn is_initialized(&self) -> bool {
        self.table.lock().is_some()
    }

    fn with_table<R>(&self, f: impl FnOnce(&mut SlotTable) -> R) -> Result<R, RegistryError> {
        let mut guard = self.table.lock();
        let table = guard.as_mut().ok_or(RegistryError::NotInitialized)?;
        Ok(f(table))
    }

    /// Store `entry` in the lowest free slot and return its global index.
    ///
    /// Duplicates are not detected; callers that need idempotence should
    /// `find_*` first.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotInitialized`] or [`RegistryError::Full`].
    pub fn add(&self, entry: Entry) -> Result<usize, RegistryError> {
        let index = self.with_table(|t| t.insert(entry))??;
        info!(index, kind = %entry.kind(), entry = %entry, "registry entry added");
        Ok(index)
    }

    /// Parse a `MAP:`/`PATH:`/`PTRACE:` record and add it.
    ///
    /// Returns the new global index and the kind that was stored.
    ///
    /// # Errors
    ///
    /// Parse and validation errors from [`record::parse_record`], then the
    /// errors of [`add`](Self::add).
    pub fn add_parsed(&self, line: &str) -> Result<(usize, EntryKind), RegistryError> {
        if !self.is_initialized() {
            return Err(RegistryError::NotInitialized);
        }
        let entry = record::parse_record(line)?;
        self.add(entry).map(|index| (index, entry.kind()))
    }

    /// Copy the entry at `index`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotInitialized`] or [`RegistryError::NotFound`].
    pub fn get(&self, index: usize) -> Result<Entry, RegistryError> {
        self.with_table(|t| t.get(index))?
            .ok_or(RegistryError::NotFound)
    }

    /// Free the slot at `index`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] when the slot is free or out of range.
    pub fn remove_by_global_index(&self, index: usize) -> Result<(), RegistryError> {
        let kind = self.with_table(|t| t.remove(index))??;
        info!(index, %kind, "registry entry removed");
        Ok(())
    }

    /// Free the `type_index`-th occupied slot of `kind`, in array order.
    ///
    /// Returns the global index that was freed.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] when fewer than `type_index + 1` entries of
    /// `kind` exist.
    pub fn remove_by_type_index(
        &self,
        kind: EntryKind,
        type_index: usize,
    ) -> Result<usize, RegistryError> {
        let index = self.with_table(|t| {
            let index = t
                .nth_of_kind(kind, type_index)
                .ok_or(RegistryError::NotFound)?;
            t.remove(index).map(|_| index)
        })??;
        info!(%kind, type_index, index, "registry entry removed by type index");
        Ok(index)
    }

    /// Find the `type_index`-th occupied slot of `kind` and copy it out.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] when out of range.
    pub fn get_by_type_index(
        &self,
        kind: EntryKind,
        type_index: usize,
    ) -> Result<(usize, Entry), RegistryError> {
        self.with_table(|t| {
            t.nth_of_kind(kind, type_index)
                .and_then(|index| t.get(index).map(|e| (index, e)))
        })?
        .ok_or(RegistryError::NotFound)
    }

    /// Global indices of every entry of `kind`, in array order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotInitialized`].
    pub fn indices_by_type(&self, kind: EntryKind) -> Result<Vec<usize>, RegistryError> {
        Ok(self
            .entries_of(kind)?
            .into_iter()
            .map(|(index, _)| index)
            .collect())
    }

    /// Copy every occupied slot as `(global_index, entry)`, in array order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotInitialized`].
    pub fn entries(&self) -> Result<Vec<(usize, Entry)>, RegistryError> {
        self.collect(None)
    }

    /// Copy every entry of `kind` as `(global_index, entry)`, in array order.
    ///
    /// Position in the returned vector is the entry's type index at the time
    /// of the call.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotInitialized`].
    pub fn entries_of(&self, kind: EntryKind) -> Result<Vec<(usize, Entry)>, RegistryError> {
        self.collect(Some(kind))
    }

    fn collect(&self, filter: Option<EntryKind>) -> Result<Vec<(usize, Entry)>, RegistryError> {
        // Reserve before locking so the copy never allocates under the lock.
        let mut out = Vec::with_capacity(CAPACITY);
        self.with_table(|t| t.copy_into(&mut out, filter))?;
        Ok(out)
    }

    /// Total occupied slots; 0 when uninitialized.
    pub fn count(&self) -> usize {
        self.with_table(|t| t.total()).unwrap_or(0)
    }

    /// Occupied slots of `kind`; 0 when uninitialized.
    pub fn count_by_type(&self, kind: EntryKind) -> usize {
        self.with_table(|t| t.count_of(kind)).unwrap_or(0)
    }

    /// All counters in one critical section.
    pub fn status(&self) -> RegistryStatus {
        self.with_table(|t| {
            let [path_mappings, single_paths, ptrace_targets] = t.per_kind();
            RegistryStatus {
                initialized: true,
                total: t.total(),
                path_mappings,
                single_paths,
                ptrace_targets,
            }
        })
        .unwrap_or_default()
    }

    /// Remove every entry. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotInitialized`].
    pub fn clear(&self) -> Result<usize, RegistryError> {
        let freed = self.with_table(|t| t.clear(None))?;
        info!(freed, "registry cleared");
        Ok(freed)
    }

    /// Remove every entry of `kind`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotInitialized`].
    pub fn clear_by_type(&self, kind: EntryKind) -> Result<usize, RegistryError> {
        let freed = self.with_table(|t| t.clear(Some(kind)))?;
        info!(%kind, freed, "registry cleared by type");
        Ok(freed)
    }

    /// First path mapping with this owner and source path.
    pub fn find_path_mapping(&self, owner: u32, source: &str) -> Option<usize> {
        let found = self
            .with_table(|t| {
                t.find(|e| {
                    matches!(e, Entry::PathMapping { owner_id, source_path, .. }
                        if *owner_id == owner && *source_path == source)
                })
            })
            .ok()
            .flatten();
        debug!(owner, source, ?found, "find path mapping");
        found
    }

    /// First single path equal to `path`.
    pub fn find_single_path(&self, path: &str) -> Option<usize> {
        self.with_table(|t| t.find(|e| matches!(e, Entry::SinglePath { path: p } if *p == path)))
            .ok()
            .flatten()
    }

    /// First trace target with this owner.
    pub fn find_ptrace_target(&self, owner: u32) -> Option<usize> {
        self.with_table(|t| {
            t.find(|e| matches!(e, Entry::PtraceTarget { owner_id } if *owner_id == owner))
        })
        .ok()
        .flatten()
    }
}
