//! Normalization of record identifiers.
//!
//! Identifiers stored on the server may carry a legacy decoration: a path-like
//! prefix (`http://id.example.org/images/`) and/or a fragment (`#1`). Only the
//! bare part in between is valid as an `xs:ID`.

use crate::{Result, error::DamError};

/// Extracts the canonical identifier from a decorated identifier string.
///
/// Keeps the text after the last `/`, then the text before the first `#`.
///
/// # Errors
/// Returns [`DamError::InvalidArgument`] when `raw` is empty.
///
/// # Example
/// ```rust
/// use damkit_core::guid::extract_guid;
///
/// assert_eq!(extract_guid("uid:example/images/0a1b#2").unwrap(), "0a1b");
/// assert_eq!(extract_guid("0a1b").unwrap(), "0a1b");
/// ```
pub fn extract_guid(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(DamError::invalid_argument("A GUID must be defined"));
    }

    let tail = raw.rsplit('/').next().unwrap_or(raw);
    let head = tail.split('#').next().unwrap_or(tail);

    Ok(head.to_string())
}
