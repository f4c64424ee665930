//! Content fingerprints for change detection
//!
//! A fingerprint is the hex SHA-256 of a canonical serialization of a JSON
//! document: object keys sorted recursively, no whitespace, no separators
//! beyond the ones JSON itself requires. Two documents that differ only in key
//! order produce the same fingerprint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest of a canonicalized document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a digest previously produced by [`fingerprint`] (e.g. read back
    /// from the state index).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a structured document
pub fn fingerprint(document: &Value) -> Fingerprint {
    let mut canonical = String::new();
    write_canonical(document, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}

/// Fingerprint anything serializable by first converting it to a JSON value
pub fn fingerprint_of<T: Serialize>(value: &T) -> crate::Result<Fingerprint> {
    Ok(fingerprint(&serde_json::to_value(value)?))
}

/// Canonical, whitespace-free serialization with recursively sorted keys
pub fn canonical_json(document: &Value) -> String {
    let mut out = String::new();
    write_canonical(document, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        Value::String(s) => write_string(s, out),
        // Null, Bool and Number already have a single compact rendering
        other => out.push_str(&other.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail; fall back to Debug quoting just in case.
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str(&format!("{:?}", s)),
    }
}
