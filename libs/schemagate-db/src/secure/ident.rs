//! Identifier validation for names that end up in SQL as identifiers.
//!
//! Values are always bound as parameters; identifiers cannot be, so schema
//! codes, field codes and configured table names are restricted to
//! `[A-Za-z_][A-Za-z0-9_]*`.

use crate::SecureQueryError;

#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// # Errors
/// Returns [`SecureQueryError::InvalidIdentifier`] when `name` is not a plain
/// identifier.
pub fn ensure_identifier(name: &str) -> Result<(), SecureQueryError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(SecureQueryError::InvalidIdentifier(name.to_owned()))
    }
}
