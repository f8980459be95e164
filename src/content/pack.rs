use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::card::Props;
use crate::error::ContentError;
use crate::time::Expiry;

use super::{digest_value, document_object, optional_text, required_text};

const KIND: &str = "Seed pack";

/// A versioned, module-scoped list of content items.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedPack {
    name: String,
    version: String,
    module_code: String,
    expiry: Expiry,
    items: Vec<Props>,
    digest: blake3::Hash,
}

impl SeedPack {
    /// Builds a pack from a parsed descriptor document.
    ///
    /// The payload is read from `items`, or from `payload` when `items` is
    /// absent or empty. Every entry must be an object.
    ///
    /// # Errors
    ///
    /// Returns a field-specific `ContentError` for missing or malformed fields.
    pub fn from_document(name: impl Into<String>, doc: &Value) -> Result<Self, ContentError> {
        let name = name.into();
        let obj = document_object(KIND, &name, doc)?;
        let version = required_text(KIND, &name, obj, "version")?;
        let module_code = required_text(KIND, &name, obj, "module_code")?;
        let expiry = Expiry::parse(optional_text(KIND, &name, obj, "deprecated_after")?)?;

        let payload_key = ["items", "payload"]
            .into_iter()
            .find(|key| obj.get(*key).is_some_and(crate::session::is_truthy));
        let raw_items = match payload_key.and_then(|key| obj.get(key).map(|v| (key, v))) {
            None => &[][..],
            Some((_, Value::Array(items))) => items.as_slice(),
            Some((key, _)) => {
                return Err(ContentError::InvalidShape {
                    kind: KIND,
                    name,
                    field: key.to_string(),
                    expected: "a list",
                })
            }
        };

        let mut items = Vec::with_capacity(raw_items.len());
        for (index, item) in raw_items.iter().enumerate() {
            let Some(entry) = item.as_object() else {
                return Err(ContentError::InvalidEntry {
                    kind: KIND,
                    name,
                    field: format!("payload[{index}]"),
                    reason: "must be an object".to_string(),
                });
            };
            items.push(entry.clone());
        }

        Ok(Self {
            name,
            version,
            module_code,
            expiry,
            items,
            digest: digest_value(doc),
        })
    }

    /// Fails if `reference` is past the pack's expiry.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Expired`.
    pub fn ensure_active(&self, reference: DateTime<Utc>) -> Result<(), ContentError> {
        match self.expiry.deadline() {
            Some(expired_at) if self.expiry.is_expired_at(reference) => Err(ContentError::Expired {
                kind: KIND,
                name: self.name.clone(),
                version: self.version.clone(),
                expired_at,
            }),
            _ => Ok(()),
        }
    }

    /// Name the pack was loaded under (its relative path).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn module_code(&self) -> &str {
        &self.module_code
    }

    #[must_use]
    pub const fn expiry(&self) -> Expiry {
        self.expiry
    }

    /// Content items in authored order.
    #[must_use]
    pub fn items(&self) -> &[Props] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// blake3 digest of the source document.
    #[must_use]
    pub const fn digest(&self) -> &blake3::Hash {
        &self.digest
    }

    /// First item whose `field` equals `value`.
    #[must_use]
    pub fn find_by(&self, field: &str, value: &Value) -> Option<&Props> {
        self.items.iter().find(|item| item.get(field) == Some(value))
    }

    /// Items as a JSON list.
    #[must_use]
    pub fn items_value(&self) -> Value {
        Value::Array(self.items.iter().cloned().map(Value::Object).collect())
    }
}

/// Loaded seed packs keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SeedPackSet {
    packs: BTreeMap<String, Arc<SeedPack>>,
}

impl SeedPackSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pack under its own name, replacing any previous entry.
    pub fn insert(&mut self, pack: impl Into<Arc<SeedPack>>) {
        let pack = pack.into();
        self.packs.insert(pack.name().to_string(), pack);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SeedPack> {
        self.packs.get(name).map(Arc::as_ref)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.packs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeedPack> {
        self.packs.values().map(Arc::as_ref)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packs.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }
}

impl FromIterator<SeedPack> for SeedPackSet {
    fn from_iter<I: IntoIterator<Item = SeedPack>>(iter: I) -> Self {
        let mut set = Self::new();
        for pack in iter {
            set.insert(pack);
        }
        set
    }
}
