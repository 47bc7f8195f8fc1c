//! Line-oriented command protocol over the [`Registry`].
//!
//! A line starting with `CMD:` is a control command; anything else is a data
//! record handed to [`Registry::add_parsed`]. See [`parser`] for the command
//! grammar and [`handlers`] for what each command does.

use tracing::{debug, warn};

use crate::registry::{EntryKind, Registry, RegistryError};

pub mod handlers;
pub mod parser;

pub use parser::{is_command, parse_command, Command, COMMAND_PREFIX};

/// Protocol-level error categories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Structurally malformed command line.
    #[error("invalid command: {0}")]
    Invalid(String),

    /// Missing or out-of-range argument.
    #[error("bad parameter: {0}")]
    Param(String),

    /// The registry rejected a command's operation.
    #[error("operation failed: {0}")]
    Operation(RegistryError),

    /// Unrecognized command name.
    #[error("unknown command `{0}`")]
    Unknown(String),

    /// A data record was rejected by the registry (parse, capacity, length).
    #[error("record rejected: {0}")]
    Record(RegistryError),
}

/// Successful outcome of one protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A data record was stored.
    Added {
        /// Global index of the new entry.
        index: usize,
        /// Kind of the new entry.
        kind: EntryKind,
    },
    /// A command ran; these are the lines it emitted.
    Report(Vec<String>),
}

impl Response {
    /// Emitted lines, if any.
    pub fn lines(&self) -> &[String] {
        match self {
            Self::Added { .. } => &[],
            Self::Report(lines) => lines,
        }
    }
}

/// Parse and execute one line against `registry`.
///
/// # Errors
///
/// Returns the [`ProtocolError`] category of whatever failed; the registry
/// is left untouched on every parse or parameter error.
pub fn process_line(registry: &Registry, line: &str) -> Result<Response, ProtocolError> {
    if is_command(line) {
        let command = parse_command(line).inspect_err(|e| {
            warn!(error = %e, line, "command rejected");
        })?;
        debug!(?command, "dispatching command");
        return handlers::execute(registry, command);
    }

    match registry.add_parsed(line) {
        Ok((index, kind)) => Ok(Response::Added { index, kind }),
        Err(e) => {
            warn!(error = %e, line, "data record rejected");
            Err(ProtocolError::Record(e))
        }
    }
}
