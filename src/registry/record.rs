//! Data-record wire format: `MAP:`, `PATH:` and `PTRACE:` lines.

use crate::text;

use super::entry::Entry;
use super::RegistryError;

/// Prefix of a path-mapping record: `MAP:owner_id:source_path:dest_path`.
pub const MAP_PREFIX: &str = "MAP:";
/// Prefix of a single-path record: `PATH:path`.
pub const PATH_PREFIX: &str = "PATH:";
/// Prefix of a trace-target record: `PTRACE:owner_id`.
pub const PTRACE_PREFIX: &str = "PTRACE:";

/// Parse one data record into an [`Entry`].
///
/// MAP fields are split with empty fields skipped and each field trimmed;
/// anything after the destination path is ignored. The PATH payload is
/// taken verbatim.
///
/// # Errors
///
/// [`RegistryError::Parse`] for an unknown prefix or a malformed field,
/// and the validation errors of [`Entry`]'s constructors for bad paths.
pub fn parse_record(line: &str) -> Result<Entry, RegistryError> {
    if let Some(rest) = line.strip_prefix(MAP_PREFIX) {
        return parse_mapping(rest);
    }
    if let Some(rest) = line.strip_prefix(PATH_PREFIX) {
        return Entry::single_path(rest);
    }
    if let Some(rest) = line.strip_prefix(PTRACE_PREFIX) {
        let owner_id = text::parse_u32(rest)
            .map_err(|e| RegistryError::Parse(format!("ptrace owner id: {e}")))?;
        return Ok(Entry::ptrace_target(owner_id));
    }
    Err(RegistryError::Parse(
        "unsupported format; use MAP:uid:src:dst, PATH:path, or PTRACE:uid".to_owned(),
    ))
}

fn parse_mapping(rest: &str) -> Result<Entry, RegistryError> {
    let mut fields = text::tokens(rest, ':').map(text::trim);

    let owner = fields
        .next()
        .ok_or_else(|| RegistryError::Parse("mapping is missing owner id".to_owned()))?;
    let owner_id = text::parse_u32(owner)
        .map_err(|e| RegistryError::Parse(format!("mapping owner id: {e}")))?;

    let source = fields
        .next()
        .ok_or_else(|| RegistryError::Parse("mapping is missing source path".to_owned()))?;
    let dest = fields
        .next()
        .ok_or_else(|| RegistryError::Parse("mapping is missing destination path".to_owned()))?;

    Entry::path_mapping(owner_id, source, dest)
}
