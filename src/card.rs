//! Cards produced by the sequencing engine.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Card input properties keyed by property name.
pub type Props = serde_json::Map<String, Value>;

/// Formats the card key for one iteration of an exercise.
#[must_use]
pub fn card_key(exercise_id: &str, iteration: u32) -> String {
    format!("{exercise_id}::{iteration}")
}

/// One unit of interactive content, ready for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Template that renders this card.
    pub template_id: String,

    /// Exercise the card belongs to.
    pub exercise_id: String,

    /// Zero-based repetition index within the exercise.
    pub iteration: u32,

    /// `"<exercise_id>::<iteration>"`; unique within one stack.
    pub card_key: String,

    /// Selected variant name, when the exercise declares variants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// `"<pack>:<item id>"` of the assigned seed item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_key: Option<String>,

    /// Raw seed item the card was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_item: Option<Value>,

    /// Guard that injected this card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injected_by: Option<String>,

    /// Validated input properties.
    #[serde(default)]
    pub props: Props,

    /// Author metadata carried through to the presentation layer.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: Props,
}

impl Card {
    /// Returns true if this card was injected by a guard.
    #[must_use]
    pub const fn is_injected(&self) -> bool {
        self.injected_by.is_some()
    }

    /// Returns true if this card is a fallback substitute.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.meta.get("fallback_for").is_some()
    }
}

/// Presentation settings for fallback cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackConfig {
    /// Informational template used for the substitute card.
    pub template_id: String,
    /// Card title.
    pub title: String,
    /// Severity recorded in card metadata.
    pub severity: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            template_id: "CoachSheetTip".to_string(),
            title: "Let's pause for a quick tip".to_string(),
            severity: "info".to_string(),
        }
    }
}

impl FallbackConfig {
    /// Builds the informational card substituted for `failed`.
    #[must_use]
    pub fn build(&self, failed: &Card, errors: &[String]) -> Card {
        let mut props = Props::new();
        props.insert("title".to_string(), json!(self.title));
        props.insert(
            "body".to_string(),
            json!(format!(
                "We hit a snag loading the next activity ({}). Our coach tip keeps you moving.",
                failed.template_id
            )),
        );
        props.insert("details".to_string(), json!(errors));

        let mut meta = Props::new();
        meta.insert("severity".to_string(), json!(self.severity));
        meta.insert("fallback_for".to_string(), json!(failed.template_id));
        meta.insert("failed_card_key".to_string(), json!(failed.card_key));

        Card {
            template_id: self.template_id.clone(),
            exercise_id: failed.exercise_id.clone(),
            iteration: failed.iteration,
            card_key: format!("fallback::{}", failed.card_key),
            variant: None,
            seed_key: None,
            seed_item: None,
            injected_by: failed.injected_by.clone(),
            props,
            meta,
        }
    }
}
