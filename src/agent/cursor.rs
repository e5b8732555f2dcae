//! Opaque `session/list` cursors.
//!
//! A cursor is the base64 encoding of `v1:<offset>`. Anything else, or an
//! offset past the end of the listing, is rejected as invalid params.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::{AppError, Result};

const PREFIX: &str = "v1:";

/// Cursor pointing at `offset`.
#[must_use]
pub fn encode(offset: usize) -> String {
    STANDARD.encode(format!("{PREFIX}{offset}"))
}

/// Offset named by `cursor`, checked against a listing of `total` entries.
///
/// # Errors
///
/// Returns [`AppError::InvalidParams`] for malformed cursors and for offsets
/// greater than `total`.
pub fn decode(cursor: &str, total: usize) -> Result<usize> {
    let invalid = || AppError::InvalidParams(format!("invalid cursor: {cursor}"));

    let raw = STANDARD.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(raw).map_err(|_| invalid())?;
    let digits = text.strip_prefix(PREFIX).ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let offset: usize = digits.parse().map_err(|_| invalid())?;
    if offset > total {
        return Err(AppError::InvalidParams(format!(
            "cursor offset {offset} is beyond the {total} listed sessions"
        )));
    }
    Ok(offset)
}
