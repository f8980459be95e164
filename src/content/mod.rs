//! Versioned lesson content: seed packs, flows and their loader.
//!
//! Raw descriptor documents are JSON objects supplied by a
//! [`ContentSource`]. The [`SeedLoader`] checks their shape, rejects expired
//! content, and caches the resulting immutable records.

mod flow;
mod loader;
mod pack;
mod source;

pub use flow::{CardSpec, Condition, Flow, GuardRule, VariantOverride};
pub use loader::{LoaderConfig, ModuleSeeds, SeedLoader};
pub use pack::{SeedPack, SeedPackSet};
pub use source::{ContentSource, DirectorySource, MemorySource};

use serde_json::{Map, Value};

use crate::error::ContentError;

/// Reads a required non-empty scalar field as a string.
///
/// Numbers are accepted and rendered as text; anything else is a shape error.
pub(crate) fn required_text(
    kind: &'static str,
    name: &str,
    doc: &Map<String, Value>,
    field: &'static str,
) -> Result<String, ContentError> {
    let text = match doc.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(ContentError::InvalidShape {
                kind,
                name: name.to_string(),
                field: field.to_string(),
                expected: "a string",
            })
        }
    };
    if text.is_empty() {
        return Err(ContentError::MissingField {
            kind,
            name: name.to_string(),
            field,
        });
    }
    Ok(text)
}

/// Reads an optional string field; null and empty strings count as absent.
pub(crate) fn optional_text<'a>(
    kind: &'static str,
    name: &str,
    doc: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, ContentError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ContentError::InvalidShape {
            kind,
            name: name.to_string(),
            field: field.to_string(),
            expected: "a string",
        }),
    }
}

/// Reads an optional list field; absent, null or empty means an empty list.
pub(crate) fn list_field<'a>(
    kind: &'static str,
    name: &str,
    doc: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a [Value], ContentError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(ContentError::InvalidShape {
            kind,
            name: name.to_string(),
            field: field.to_string(),
            expected: "a list",
        }),
    }
}

/// Requires the document root to be a JSON object.
pub(crate) fn document_object<'a>(
    kind: &'static str,
    name: &str,
    doc: &'a Value,
) -> Result<&'a Map<String, Value>, ContentError> {
    doc.as_object().ok_or_else(|| ContentError::InvalidShape {
        kind,
        name: name.to_string(),
        field: "document".to_string(),
        expected: "an object",
    })
}

/// blake3 digest of a document's canonical JSON rendering.
pub(crate) fn digest_value(doc: &Value) -> blake3::Hash {
    blake3::hash(doc.to_string().as_bytes())
}
