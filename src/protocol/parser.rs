//! Recursive-descent parser for `CMD:` lines.
//!
//! ```text
//! command   := "CMD:" name [":" arg1 [":" rest]]
//! selector  := "TYPE" ":" type_id
//! remove    := "INDEX" ":" global_index
//!            | "TYPE" ":" type_id ":" type_index
//! ```
//!
//! Fields are split with strsep semantics (empty fields are kept), and the
//! third field is the verbatim remainder of the line.

use crate::registry::EntryKind;
use crate::text;

use super::ProtocolError;

/// Prefix that marks a line as a control command.
pub const COMMAND_PREFIX: &str = "CMD:";

/// A parsed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `STATUS`: report total and per-type counts.
    Status,
    /// `DUMP` or `DUMP:TYPE:n`.
    Dump(Option<EntryKind>),
    /// `LIST:TYPE:n`.
    List(EntryKind),
    /// `CLEAR` or `CLEAR:TYPE:n`.
    Clear(Option<EntryKind>),
    /// `REMOVE:INDEX:i`.
    RemoveIndex(usize),
    /// `REMOVE:TYPE:n:k`.
    RemoveTyped {
        /// Entry kind.
        kind: EntryKind,
        /// Ordinal among entries of `kind`.
        type_index: usize,
    },
    /// `HELP`.
    Help,
}

/// Returns `true` when `line` should be dispatched as a command.
pub fn is_command(line: &str) -> bool {
    line.starts_with(COMMAND_PREFIX)
}

/// Colon-separated field cursor.
struct Fields<'a> {
    rest: Option<&'a str>,
}

impl<'a> Fields<'a> {
    fn new(body: &'a str) -> Self {
        Self { rest: Some(body) }
    }

    /// Next field up to the following colon; `None` once exhausted.
    fn field(&mut self) -> Option<&'a str> {
        let current = self.rest?;
        match current.split_once(':') {
            Some((head, tail)) => {
                self.rest = Some(tail);
                Some(head)
            }
            None => {
                self.rest = None;
                Some(current)
            }
        }
    }

    /// Everything not yet consumed, verbatim.
    fn remainder(&mut self) -> Option<&'a str> {
        self.rest.take()
    }
}

/// Parse a full `CMD:` line.
///
/// # Errors
///
/// [`ProtocolError::Invalid`] for a missing prefix or name,
/// [`ProtocolError::Unknown`] for an unrecognized name, and
/// [`ProtocolError::Param`] for missing or malformed arguments.
pub fn parse_command(line: &str) -> Result<Command, ProtocolError> {
    let body = line
        .strip_prefix(COMMAND_PREFIX)
        .ok_or_else(|| ProtocolError::Invalid("missing CMD: prefix".to_owned()))?;

    let mut fields = Fields::new(body);
    let name = fields.field().unwrap_or_default();
    if name.is_empty() {
        return Err(ProtocolError::Invalid("missing command name".to_owned()));
    }

    let arg1 = fields.field().unwrap_or_default();
    let arg2 = fields.remainder().unwrap_or_default();

    match name {
        "STATUS" => Ok(Command::Status),
        "HELP" => Ok(Command::Help),
        "DUMP" => optional_selector("DUMP", arg1, arg2).map(Command::Dump),
        "LIST" => selector("LIST", arg1, arg2).map(Command::List),
        "CLEAR" => optional_selector("CLEAR", arg1, arg2).map(Command::Clear),
        "REMOVE" => remove(arg1, arg2),
        other => Err(ProtocolError::Unknown(other.to_owned())),
    }
}

/// Empty `arg1` selects everything; otherwise `TYPE:n` is required.
fn optional_selector(
    command: &str,
    arg1: &str,
    arg2: &str,
) -> Result<Option<EntryKind>, ProtocolError> {
    if arg1.is_empty() {
        return Ok(None);
    }
    selector(command, arg1, arg2).map(Some)
}

fn selector(command: &str, arg1: &str, arg2: &str) -> Result<EntryKind, ProtocolError> {
    if arg1 != "TYPE" || arg2.is_empty() {
        return Err(ProtocolError::Param(format!(
            "invalid {command} format; expected {command}:TYPE:<1|2|3>"
        )));
    }
    type_id(arg2)
}

fn remove(arg1: &str, arg2: &str) -> Result<Command, ProtocolError> {
    if arg2.is_empty() {
        return Err(ProtocolError::Param(
            "invalid REMOVE format; expected REMOVE:INDEX:<i> or REMOVE:TYPE:<type>:<k>"
                .to_owned(),
        ));
    }

    match arg1 {
        "INDEX" => text::parse_index(arg2)
            .map(Command::RemoveIndex)
            .map_err(|e| ProtocolError::Param(format!("global index `{arg2}`: {e}"))),
        "TYPE" => {
            let (kind, index) = arg2.split_once(':').ok_or_else(|| {
                ProtocolError::Param(
                    "invalid REMOVE:TYPE format; expected REMOVE:TYPE:<type>:<k>".to_owned(),
                )
            })?;
            let kind = type_id(kind)?;
            let type_index = text::parse_index(index)
                .map_err(|e| ProtocolError::Param(format!("type index `{index}`: {e}")))?;
            Ok(Command::RemoveTyped { kind, type_index })
        }
        _ => Err(ProtocolError::Param(format!(
            "invalid REMOVE selector `{arg1}`"
        ))),
    }
}

fn type_id(raw: &str) -> Result<EntryKind, ProtocolError> {
    text::parse_u32(raw)
        .ok()
        .and_then(EntryKind::from_id)
        .ok_or_else(|| ProtocolError::Param(format!("invalid type `{raw}`; expected 1, 2 or 3")))
}
