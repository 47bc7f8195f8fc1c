//! Command handlers.
//!
//! Each handler runs one [`Command`] against the registry and returns the
//! lines it emits. Lines are also logged, so a writer that cannot read the
//! response still leaves a trace in the agent log.

use tracing::{error, info};

use crate::registry::{Entry, EntryKind, Registry, RegistryError};

use super::{Command, ProtocolError, Response};

/// Execute a parsed command.
///
/// # Errors
///
/// [`ProtocolError::Operation`] when the registry call fails, and
/// [`ProtocolError::Param`] when `REMOVE:TYPE` names a type index past the end.
pub fn execute(registry: &Registry, command: Command) -> Result<Response, ProtocolError> {
    let lines = match command {
        Command::Status => handle_status(registry),
        Command::Dump(None) => handle_dump(registry)?,
        Command::Dump(Some(kind)) => handle_dump_by_type(registry, kind)?,
        Command::List(kind) => handle_list(registry, kind)?,
        Command::Clear(filter) => handle_clear(registry, filter)?,
        Command::RemoveIndex(index) => handle_remove_index(registry, index)?,
        Command::RemoveTyped { kind, type_index } => {
            handle_remove_typed(registry, kind, type_index)?
        }
        Command::Help => handle_help(),
    };

    for line in &lines {
        info!(target: "straylight::report", "{line}");
    }
    Ok(Response::Report(lines))
}

/// Command summary.
pub fn handle_help() -> Vec<String> {
    [
        "Available commands:",
        "CMD:STATUS - show counts",
        "CMD:DUMP - list all entries",
        "CMD:DUMP:TYPE:N - list entries of type N (1=MAP, 2=PATH, 3=PTRACE)",
        "CMD:LIST:TYPE:N - list type N entries with type and global indices",
        "CMD:CLEAR - remove all entries",
        "CMD:CLEAR:TYPE:N - remove all entries of type N",
        "CMD:REMOVE:INDEX:I - remove the entry at global index I",
        "CMD:REMOVE:TYPE:N:K - remove the K-th entry of type N",
        "CMD:HELP - show this help",
        "Data formats:",
        "MAP:uid:src_path:dst_path - add a path mapping",
        "PATH:path - add a single path",
        "PTRACE:uid - add a trace target",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

/// Total and per-type counts.
pub fn handle_status(registry: &Registry) -> Vec<String> {
    let status = registry.status();
    vec![
        format!("Total entries: {}", status.total),
        format!("Path mappings: {}", status.path_mappings),
        format!("Single paths: {}", status.single_paths),
        format!("Ptrace targets: {}", status.ptrace_targets),
    ]
}

fn handle_dump(registry: &Registry) -> Result<Vec<String>, ProtocolError> {
    let entries = registry.entries().map_err(ProtocolError::Operation)?;
    let status = registry.status();

    let mut lines = Vec::with_capacity(entries.len().saturating_add(4));
    lines.push(format!("Total entries: {}", status.total));
    for kind in EntryKind::ALL {
        lines.push(format!("{}: {}", kind.section(), status.count_of(kind)));
    }
    lines.extend(
        entries
            .iter()
            .map(|(index, entry)| format!("[{index}] {}", describe(entry))),
    );
    Ok(lines)
}

fn handle_dump_by_type(registry: &Registry, kind: EntryKind) -> Result<Vec<String>, ProtocolError> {
    let entries = registry.entries_of(kind).map_err(ProtocolError::Operation)?;
    let mut lines: Vec<String> = entries
        .iter()
        .map(|(index, entry)| format!("[{index}] {}", describe(entry)))
        .collect();
    lines.push(format!("Total of type {}: {}", kind.id(), entries.len()));
    Ok(lines)
}

fn handle_list(registry: &Registry, kind: EntryKind) -> Result<Vec<String>, ProtocolError> {
    let entries = registry.entries_of(kind).map_err(ProtocolError::Operation)?;
    let mut lines = Vec::with_capacity(entries.len().saturating_add(1));
    lines.push(format!(
        "Type {} entries ({} total)",
        kind.id(),
        entries.len()
    ));
    lines.extend(
        entries
            .iter()
            .enumerate()
            .map(|(type_index, (index, entry))| {
                format!(
                    "Type-index {type_index} (global {index}): {}",
                    describe(entry)
                )
            }),
    );
    Ok(lines)
}

fn handle_clear(
    registry: &Registry,
    filter: Option<EntryKind>,
) -> Result<Vec<String>, ProtocolError> {
    let line = match filter {
        None => {
            let freed = registry.clear().map_err(ProtocolError::Operation)?;
            format!("Cleared all entries ({freed} removed)")
        }
        Some(kind) => {
            let freed = registry
                .clear_by_type(kind)
                .map_err(ProtocolError::Operation)?;
            format!("Cleared type {} ({freed} removed)", kind.id())
        }
    };
    Ok(vec![line])
}

fn handle_remove_index(registry: &Registry, index: usize) -> Result<Vec<String>, ProtocolError> {
    registry.remove_by_global_index(index).map_err(|e| {
        error!(index, error = %e, "remove by global index failed");
        ProtocolError::Operation(e)
    })?;
    Ok(vec![format!("Removed entry at global index {index}")])
}

fn handle_remove_typed(
    registry: &Registry,
    kind: EntryKind,
    type_index: usize,
) -> Result<Vec<String>, ProtocolError> {
    match registry.remove_by_type_index(kind, type_index) {
        Ok(index) => Ok(vec![format!(
            "Removed type {} entry at type-index {type_index} (global {index})",
            kind.id()
        )]),
        Err(RegistryError::NotFound) => {
            let count = registry.count_by_type(kind);
            Err(ProtocolError::Param(format!(
                "type {} only has {count} entries, index {type_index} is out of range",
                kind.id()
            )))
        }
        Err(e) => Err(ProtocolError::Operation(e)),
    }
}

fn describe(entry: &Entry) -> String {
    match entry {
        Entry::PathMapping {
            owner_id,
            source_path,
            dest_path,
        } => format!("MAP: {owner_id}:{source_path}->{dest_path}"),
        Entry::SinglePath { path } => format!("PATH: {path}"),
        Entry::PtraceTarget { owner_id } => format!("PTRACE: {owner_id}"),
    }
}
