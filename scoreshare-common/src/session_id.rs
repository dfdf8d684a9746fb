//! Upload session id utilities
//!
//! Session ids are generated by the client and used verbatim as staging
//! directory names on the server.

use uuid::Uuid;

use crate::{Error, Result};

/// Maximum accepted session id length
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Generate a new session id (simple-format UUIDv4, 32 hex chars)
pub fn generate() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Check that a client-supplied session id is safe to use as a path component
///
/// Accepts 1..=128 characters from `[A-Za-z0-9_-]`.
pub fn validate(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidInput("session id must not be empty".to_string()));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "session id too long: {} chars (max {})",
            id.len(),
            MAX_SESSION_ID_LEN
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidInput(format!(
            "session id contains invalid characters: {:?}",
            id
        )));
    }
    Ok(())
}

/// Returns true if `id` passes [`validate`]
pub fn is_valid(id: &str) -> bool {
    validate(id).is_ok()
}
