//! Explicit, versioned session state.
//!
//! The engine reads and mutates a handful of named fields (cooldowns, seed
//! cursors, completed card keys, the current scenario, the last lever choice)
//! plus free-form values such as metrics. The caller persists the whole
//! structure after a successful build and restores it at the next visit.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;

/// Schema version written by this crate.
pub const SESSION_STATE_VERSION: u32 = 1;

const fn current_version() -> u32 {
    SESSION_STATE_VERSION
}

/// Session key/value store for one learner and module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Schema version of this snapshot.
    #[serde(default = "current_version")]
    pub schema_version: u32,

    /// Scenario the learner is currently working through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_scenario_ref: Option<String>,

    /// Lever chosen on the most recent lever card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_lever_choice: Option<String>,

    /// Guard cooldown keys that already fired this session.
    #[serde(default)]
    pub cooldowns: BTreeSet<String>,

    /// Per-exercise seed rotation cursor.
    #[serde(default)]
    pub seed_cursors: BTreeMap<String, usize>,

    /// Card keys the learner already completed.
    #[serde(default)]
    pub completed_cards: BTreeSet<String>,

    /// Latest value of each named learner signal.
    #[serde(default)]
    pub recent_signals: BTreeMap<String, Value>,

    /// Free-form session values (metrics, flags).
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            schema_version: SESSION_STATE_VERSION,
            current_scenario_ref: None,
            last_lever_choice: None,
            cooldowns: BTreeSet::new(),
            seed_cursors: BTreeMap::new(),
            completed_cards: BTreeSet::new(),
            recent_signals: BTreeMap::new(),
            values: BTreeMap::new(),
        }
    }
}

impl SessionState {
    /// Creates an empty session state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Malformed` if the value does not have the
    /// expected shape, or `SessionError::UnsupportedVersion` if it was written
    /// by a newer schema.
    pub fn from_json(value: Value) -> Result<Self, SessionError> {
        let state: Self = serde_json::from_value(value).map_err(|e| SessionError::Malformed {
            message: e.to_string(),
        })?;
        if state.schema_version > SESSION_STATE_VERSION {
            return Err(SessionError::UnsupportedVersion {
                found: state.schema_version,
                supported: SESSION_STATE_VERSION,
            });
        }
        Ok(state)
    }

    /// Serializes the snapshot for persistence.
    #[must_use]
    pub fn to_json(&self) -> Value {
        // Every field is a plain map, set or string; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Looks up a session key by name.
    ///
    /// Named fields are visible under their field names; everything else is
    /// read from the free-form values.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<Value> {
        match key {
            "current_scenario_ref" => self.current_scenario_ref.clone().map(Value::String),
            "last_lever_choice" => self.last_lever_choice.clone().map(Value::String),
            _ => self.values.get(key).cloned(),
        }
    }

    /// Reads a session value as a number. Numeric strings are accepted.
    #[must_use]
    pub fn numeric(&self, key: &str) -> Option<f64> {
        as_number(&self.lookup(key)?)
    }

    /// True when `key` is absent or holds a falsy value.
    #[must_use]
    pub fn is_missing(&self, key: &str) -> bool {
        self.lookup(key).map_or(true, |v| !is_truthy(&v))
    }

    /// Latest value of a named signal.
    #[must_use]
    pub fn signal(&self, name: &str) -> Option<&Value> {
        self.recent_signals.get(name)
    }

    #[must_use]
    pub fn has_fired(&self, cooldown_key: &str) -> bool {
        self.cooldowns.contains(cooldown_key)
    }

    /// Latches a cooldown key. Returns false if it had already fired.
    pub fn fire(&mut self, cooldown_key: &str) -> bool {
        self.cooldowns.insert(cooldown_key.to_string())
    }

    #[must_use]
    pub fn is_completed(&self, card_key: &str) -> bool {
        self.completed_cards.contains(card_key)
    }

    /// Takes the next seed index for `key` from a pack of `len` items and
    /// advances the cursor, wrapping at `len`.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    pub fn advance_cursor(&mut self, key: &str, len: usize) -> usize {
        assert!(len > 0, "seed pack length must be positive");
        let cursor = self.seed_cursors.entry(key.to_string()).or_insert(0);
        let index = *cursor % len;
        *cursor = (index + 1) % len;
        index
    }
}

/// Reads a JSON number or a numeric string as `f64`.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Truthiness of a session value: null, false, zero, and empty strings,
/// lists and objects are falsy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_wraps() {
        let mut state = SessionState::new();
        let seen: Vec<usize> = (0..7).map(|_| state.advance_cursor("x1", 4)).collect();
        assert_eq!(seen, [0, 1, 2, 3, 0, 1, 2]);
        assert_eq!(state.seed_cursors["x1"], 3);
    }

    #[test]
    fn test_cursor_tolerates_shrunk_pack() {
        let mut state = SessionState::new();
        state.seed_cursors.insert("x1".to_string(), 9);
        assert_eq!(state.advance_cursor("x1", 4), 1);
        assert_eq!(state.seed_cursors["x1"], 2);
    }

    #[test]
    fn test_numeric_lookup() {
        let mut state = SessionState::new();
        state.values.insert("stress".to_string(), json!(7));
        state.values.insert("focus".to_string(), json!("3.5"));
        state.values.insert("mood".to_string(), json!("calm"));
        assert_eq!(state.numeric("stress"), Some(7.0));
        assert_eq!(state.numeric("focus"), Some(3.5));
        assert_eq!(state.numeric("mood"), None);
        assert_eq!(state.numeric("absent"), None);
    }

    #[test]
    fn test_missing_context() {
        let mut state = SessionState::new();
        assert!(state.is_missing("current_scenario_ref"));
        state.current_scenario_ref = Some("s1".to_string());
        assert!(!state.is_missing("current_scenario_ref"));

        state.values.insert("baseline".to_string(), json!(""));
        assert!(state.is_missing("baseline"));
        state.values.insert("baseline".to_string(), json!(0));
        assert!(state.is_missing("baseline"));
        state.values.insert("baseline".to_string(), json!(4));
        assert!(!state.is_missing("baseline"));
    }

    #[test]
    fn test_fire_is_one_way() {
        let mut state = SessionState::new();
        assert!(state.fire("k"));
        assert!(!state.fire("k"));
        assert!(state.has_fired("k"));
    }

    #[test]
    fn test_json_roundtrip_defaults() {
        let state = SessionState::from_json(json!({"completed_cards": ["x1::0"]})).unwrap();
        assert_eq!(state.schema_version, SESSION_STATE_VERSION);
        assert!(state.is_completed("x1::0"));
        assert!(state.cooldowns.is_empty());
    }

    #[test]
    fn test_newer_schema_rejected() {
        let err = SessionState::from_json(json!({"schema_version": 99})).unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn test_malformed_rejected() {
        let err = SessionState::from_json(json!({"cooldowns": "k"})).unwrap_err();
        assert!(matches!(err, SessionError::Malformed { .. }));
    }
}
