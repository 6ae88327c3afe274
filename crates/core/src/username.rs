//! Username canonicalization for case- and symbol-insensitive lookup.

use crate::document::{Fields, value_kind};
use serde_json::Value;

/// Prefix characters users type in front of handles.
const HANDLE_PREFIXES: [char; 2] = ['@', '/'];

/// Canonical lookup form of a username.
///
/// Strips a single leading `@` or `/` and lowercases the rest.
pub fn canonicalize(username: &str) -> String {
    let stripped = username
        .strip_prefix(HANDLE_PREFIXES)
        .unwrap_or(username);
    stripped.to_lowercase()
}

/// Derive the canonical username from a document's source fields.
///
/// The first non-empty string among `source_fields` wins; absent, null, or
/// empty fields fall through to the next one. A present field holding a
/// non-string value is an error, since the document is malformed.
pub fn derive_from_fields(data: &Fields, source_fields: &[String]) -> crate::Result<String> {
    for field in source_fields {
        match data.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.is_empty() => continue,
            Some(Value::String(s)) => return Ok(canonicalize(s)),
            Some(other) => {
                return Err(crate::Error::FieldType {
                    field: field.clone(),
                    expected: "string",
                    found: value_kind(other),
                });
            }
        }
    }
    Ok(String::new())
}
