use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::card::Props;
use crate::error::ContentError;
use crate::time::Expiry;

use super::{digest_value, document_object, list_field, optional_text, required_text};

const KIND: &str = "Flow";

const fn default_repeat() -> u32 {
    1
}

/// Accepts an integer or an integer string; negative counts expand to nothing.
fn repeat_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    let count = match &raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    count
        .and_then(|n| u32::try_from(n.max(0)).ok())
        .ok_or_else(|| D::Error::custom(format!("repeat must be a whole number, got {raw}")))
}

/// One authored entry of a flow's card sequence (or a guard insert).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSpec {
    /// Exercise identifier; combined with the iteration into the card key.
    pub exercise_id: String,

    /// Template that renders the card.
    pub template_id: String,

    /// How many cards this entry expands into.
    #[serde(default = "default_repeat", deserialize_with = "repeat_count")]
    pub repeat: u32,

    /// Named alternate overrides, selected per learner.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: BTreeMap<String, VariantOverride>,

    /// Variant used when the learner has no assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_variant: Option<String>,

    /// Seed pack rotated through on each visit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_sequence: Option<String>,

    /// Card requires the session's current scenario reference.
    #[serde(default)]
    pub needs_scenario_ref: bool,

    /// Static author-declared properties.
    #[serde(default)]
    pub props: Props,

    /// Any other authored fields, carried as card metadata.
    #[serde(flatten)]
    pub meta: Props,
}

impl CardSpec {
    /// Minimal spec for `exercise_id` rendered by `template_id`.
    pub fn new(exercise_id: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            template_id: template_id.into(),
            repeat: 1,
            variants: BTreeMap::new(),
            default_variant: None,
            seed_sequence: None,
            needs_scenario_ref: false,
            props: Props::new(),
            meta: Props::new(),
        }
    }

    /// Merges a variant's overrides into this spec.
    pub fn apply_override(&mut self, overrides: &VariantOverride) {
        if let Some(template_id) = &overrides.template_id {
            self.template_id.clone_from(template_id);
        }
        if let Some(seed_sequence) = &overrides.seed_sequence {
            self.seed_sequence = Some(seed_sequence.clone());
        }
        if let Some(needs) = overrides.needs_scenario_ref {
            self.needs_scenario_ref = needs;
        }
        if let Some(props) = &overrides.props {
            self.props.clone_from(props);
        }
        for (key, value) in &overrides.meta {
            self.meta.insert(key.clone(), value.clone());
        }
    }
}

/// Field overrides applied when a variant is selected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariantOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_sequence: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_scenario_ref: Option<bool>,

    /// Replaces the static properties wholesale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Props>,

    #[serde(flatten)]
    pub meta: Props,
}

/// Predicate over session state evaluated by a guard.
///
/// Unrecognised condition types load as [`Condition::Unknown`] and never hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// A numeric session value is at least `value`.
    ///
    /// The threshold may be a number or a numeric string; anything else
    /// makes the condition false.
    MetricGte {
        metric: String,
        #[serde(default)]
        value: Value,
    },

    /// A recent signal exactly equals `value`.
    SignalEquals {
        signal: String,
        value: Value,
    },

    /// A session key is absent or falsy.
    MissingContext {
        key: String,
    },

    /// A condition type this version does not recognise.
    #[serde(other)]
    Unknown,
}

/// Conditional injection rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardRule {
    /// Guard identifier, recorded as provenance on injected cards.
    pub id: String,

    /// Template id of the cards this guard runs in front of. None means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Session latch; defaults to the guard id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_key: Option<String>,

    /// All must hold for the guard to fire.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Cards injected when the guard fires.
    #[serde(default)]
    pub inserts: Vec<CardSpec>,
}

impl GuardRule {
    /// Effective cooldown key.
    #[must_use]
    pub fn cooldown(&self) -> &str {
        self.cooldown_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .unwrap_or(&self.id)
    }

    /// Returns true if the guard runs in front of `template_id`.
    #[must_use]
    pub fn applies_to(&self, template_id: &str) -> bool {
        self.target.as_deref().map_or(true, |t| t.is_empty() || t == template_id)
    }
}

/// A versioned, module-scoped lesson definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    name: String,
    version: String,
    module_code: String,
    expiry: Expiry,
    sequence: Vec<CardSpec>,
    guards: Vec<GuardRule>,
    scoring: Props,
    digest: blake3::Hash,
}

impl Flow {
    /// Builds a flow from a parsed descriptor document.
    ///
    /// # Errors
    ///
    /// Returns a field-specific `ContentError` for missing or malformed
    /// fields, naming the index of a bad sequence entry or guard.
    pub fn from_document(name: impl Into<String>, doc: &Value) -> Result<Self, ContentError> {
        let name = name.into();
        let obj = document_object(KIND, &name, doc)?;
        let version = required_text(KIND, &name, obj, "version")?;
        let module_code = required_text(KIND, &name, obj, "module_code")?;
        let expiry = Expiry::parse(optional_text(KIND, &name, obj, "deprecated_after")?)?;

        let sequence = typed_entries(&name, "sequence", list_field(KIND, &name, obj, "sequence")?)?;
        let guards: Vec<GuardRule> =
            typed_entries(&name, "guards", list_field(KIND, &name, obj, "guards")?)?;

        let scoring = match obj.get("scoring") {
            None | Some(Value::Null) => Props::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(ContentError::InvalidShape {
                    kind: KIND,
                    name,
                    field: "scoring".to_string(),
                    expected: "an object",
                })
            }
        };

        Ok(Self {
            name,
            version,
            module_code,
            expiry,
            sequence,
            guards,
            scoring,
            digest: digest_value(doc),
        })
    }

    /// Fails if `reference` is past the flow's expiry.
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

    #[must_use]
    pub fn sequence(&self) -> &[CardSpec] {
        &self.sequence
    }

    #[must_use]
    pub fn guards(&self) -> &[GuardRule] {
        &self.guards
    }

    /// Raw scoring-weight map.
    #[must_use]
    pub const fn scoring(&self) -> &Props {
        &self.scoring
    }

    /// Numeric weight for `key`, if present and numeric.
    #[must_use]
    pub fn scoring_weight(&self, key: &str) -> Option<f64> {
        self.scoring.get(key).and_then(Value::as_f64)
    }

    #[must_use]
    pub const fn digest(&self) -> &blake3::Hash {
        &self.digest
    }

    /// Every card spec the flow can produce: sequence entries and guard inserts.
    pub fn all_specs(&self) -> impl Iterator<Item = &CardSpec> {
        self.sequence
            .iter()
            .chain(self.guards.iter().flat_map(|g| g.inserts.iter()))
    }

    /// Every template id the flow can render, including variant overrides.
    #[must_use]
    pub fn template_ids(&self) -> BTreeSet<&str> {
        let mut ids = BTreeSet::new();
        for spec in self.all_specs() {
            ids.insert(spec.template_id.as_str());
            for variant in spec.variants.values() {
                if let Some(id) = &variant.template_id {
                    ids.insert(id.as_str());
                }
            }
        }
        ids
    }
}

fn typed_entries<T: DeserializeOwned>(
    name: &str,
    field: &'static str,
    raw: &[Value],
) -> Result<Vec<T>, ContentError> {
    raw.iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value(entry.clone()).map_err(|e| ContentError::InvalidEntry {
                kind: KIND,
                name: name.to_string(),
                field: format!("{field}[{index}]"),
                reason: e.to_string(),
            })
        })
        .collect()
}
