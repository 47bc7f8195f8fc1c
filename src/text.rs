//! Locale-free text helpers shared by the registry and the command protocol.
//!
//! "Whitespace" here is always the six ASCII C-locale space characters;
//! Unicode whitespace is never trimmed, and numbers are base 10 only.

/// Maximum length of one protocol line, counting the terminator slot.
pub const MAX_LINE_LEN: usize = 256;

/// Errors from strict unsigned parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NumError {
    /// Field was empty or whitespace only.
    #[error("empty numeric field")]
    Empty,
    /// Field contained something other than ASCII digits.
    #[error("invalid digit in numeric field")]
    InvalidDigit,
    /// Value does not fit the target type.
    #[error("numeric value out of range")]
    Overflow,
}

/// Returns `true` for the ASCII space class: space, `\t`, `\n`, `\r`, `\v`, `\f`.
pub fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Trim ASCII whitespace from both ends.
pub fn trim(s: &str) -> &str {
    s.trim_matches(is_space)
}

/// Remove a single trailing `\n`, if present.
pub fn strip_newline(s: &str) -> &str {
    s.strip_suffix('\n').unwrap_or(s)
}

/// Split on `delim`, skipping empty tokens (strtok semantics).
///
/// `"::a::b:"` yields `["a", "b"]`.
pub fn tokens(s: &str, delim: char) -> impl Iterator<Item = &str> {
    s.split(delim).filter(|t| !t.is_empty())
}

/// Parse a base-10 `u64`.
///
/// Leading and trailing ASCII whitespace is accepted; anything else,
/// including a sign or interior whitespace, is rejected.
///
/// # Errors
///
/// Returns [`NumError`] when the field is empty, malformed, or overflows.
pub fn parse_u64(s: &str) -> Result<u64, NumError> {
    let body = trim(s);
    if body.is_empty() {
        return Err(NumError::Empty);
    }

    body.bytes().try_fold(0u64, |acc, b| {
        if !b.is_ascii_digit() {
            return Err(NumError::InvalidDigit);
        }
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b.wrapping_sub(b'0'))))
            .ok_or(NumError::Overflow)
    })
}

/// Parse a base-10 `u32` with the same rules as [`parse_u64`].
///
/// # Errors
///
/// Returns [`NumError`] when the field is empty, malformed, or exceeds `u32::MAX`.
pub fn parse_u32(s: &str) -> Result<u32, NumError> {
    let wide = parse_u64(s)?;
    u32::try_from(wide).map_err(|_| NumError::Overflow)
}

/// Parse a base-10 index with the same rules as [`parse_u64`].
///
/// # Errors
///
/// Returns [`NumError`] when the field is empty, malformed, or exceeds `usize::MAX`.
pub fn parse_index(s: &str) -> Result<usize, NumError> {
    let wide = parse_u64(s)?;
    usize::try_from(wide).map_err(|_| NumError::Overflow)
}

/// Decode at most `max` leading bytes as UTF-8.
///
/// A multi-byte character cut by the `max` boundary is dropped rather than
/// treated as an error; any other invalid sequence is an error.
///
/// # Errors
///
/// Returns the decoder error when the prefix contains an invalid sequence.
pub fn utf8_prefix(bytes: &[u8], max: usize) -> Result<&str, std::str::Utf8Error> {
    let head = bytes.get(..max).unwrap_or(bytes);
    match std::str::from_utf8(head) {
        Ok(s) => Ok(s),
        Err(e) if e.error_len().is_none() && head.len() < bytes.len() => {
            let valid = head.get(..e.valid_up_to()).unwrap_or_default();
            std::str::from_utf8(valid)
        }
        Err(e) => Err(e),
    }
}
