//! Template contracts: the schema a card's properties must satisfy.
//!
//! A contract lists required and optional property names plus an ordered set
//! of custom validators. Validation never short-circuits: every problem is
//! collected into one [`ValidationReport`] so authors get the full picture in
//! a single pass.

use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::card::Props;
use crate::error::ContractError;

/// How a card built from a template is scored by the surrounding system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Credit for finishing the card.
    #[default]
    Completion,
    /// Right/wrong answers.
    Correctness,
    /// Partial credit tiers.
    TieredAccuracy,
    /// Not scored.
    Informational,
}

impl ScoringMode {
    /// Returns a short stable identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Correctness => "correctness",
            Self::TieredAccuracy => "tiered_accuracy",
            Self::Informational => "informational",
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A custom contract rule. Returns `Err(message)` when the properties break it.
#[derive(Clone)]
pub struct Validator {
    name: String,
    check: Arc<dyn Fn(&Props) -> Result<(), String> + Send + Sync>,
}

impl Validator {
    /// Wraps a closure as a named validator.
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Props) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Validator name, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, props: &Props) -> Result<(), String> {
        (self.check)(props)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("name", &self.name).finish()
    }
}

/// Requires `field`, when present, to be a non-empty JSON array.
#[must_use]
pub fn non_empty_array(field: &str) -> Validator {
    let field = field.to_string();
    Validator::new(format!("non_empty_array:{field}"), move |props| {
        match props.get(&field) {
            None => Ok(()),
            Some(Value::Array(items)) if !items.is_empty() => Ok(()),
            Some(Value::Array(_)) => Err(format!("{field} must not be empty")),
            Some(_) => Err(format!("{field} must be a list")),
        }
    })
}

/// Requires `field`, when present, to be a string matching `pattern`.
///
/// # Errors
///
/// Returns `ContractError::InvalidPattern` if `pattern` does not compile.
pub fn string_matches(field: &str, pattern: &str) -> Result<Validator, ContractError> {
    let re = Regex::new(pattern).map_err(|e| ContractError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    let field = field.to_string();
    Ok(Validator::new(format!("string_matches:{field}"), move |props| {
        match props.get(&field) {
            None => Ok(()),
            Some(Value::String(s)) if re.is_match(s) => Ok(()),
            Some(Value::String(s)) => Err(format!("{field} '{s}' does not match {}", re.as_str())),
            Some(_) => Err(format!("{field} must be a string")),
        }
    }))
}

/// Requires `field`, when present, to be a number within `[min, max]`.
#[must_use]
pub fn numeric_range(field: &str, min: f64, max: f64) -> Validator {
    let field = field.to_string();
    Validator::new(format!("numeric_range:{field}"), move |props| {
        let Some(value) = props.get(&field) else {
            return Ok(());
        };
        match value.as_f64() {
            Some(n) if (min..=max).contains(&n) => Ok(()),
            Some(n) => Err(format!("{field} {n} is outside [{min}, {max}]")),
            None => Err(format!("{field} must be a number")),
        }
    })
}

/// Outcome of checking properties against a contract.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    errors: Vec<String>,
}

impl ValidationReport {
    /// Returns true if no rule was broken.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Aggregated error messages, in check order.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Consumes the report, returning its messages.
    #[must_use]
    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }

    fn push(&mut self, message: String) {
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }
    }
}

/// Schema for one card template.
#[derive(Debug, Clone)]
pub struct TemplateContract {
    template_id: String,
    required: BTreeSet<String>,
    optional: BTreeSet<String>,
    validators: Vec<Validator>,
    scoring_mode: ScoringMode,
}

impl TemplateContract {
    /// Creates a contract with no properties and `completion` scoring.
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            required: BTreeSet::new(),
            optional: BTreeSet::new(),
            validators: Vec::new(),
            scoring_mode: ScoringMode::default(),
        }
    }

    /// Adds required property names.
    #[must_use]
    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds optional property names.
    #[must_use]
    pub fn optional<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(names.into_iter().map(Into::into));
        self
    }

    /// Appends a custom validator.
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Sets the scoring mode.
    #[must_use]
    pub const fn scoring(mut self, mode: ScoringMode) -> Self {
        self.scoring_mode = mode;
        self
    }

    #[must_use]
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    #[must_use]
    pub const fn scoring_mode(&self) -> ScoringMode {
        self.scoring_mode
    }

    #[must_use]
    pub const fn required_props(&self) -> &BTreeSet<String> {
        &self.required
    }

    #[must_use]
    pub const fn optional_props(&self) -> &BTreeSet<String> {
        &self.optional
    }

    /// Returns true if `name` is required or optional.
    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        self.required.contains(name) || self.optional.contains(name)
    }

    /// Checks `props` against every rule of this contract.
    #[must_use]
    pub fn validate(&self, props: &Props) -> ValidationReport {
        let mut report = ValidationReport::default();

        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|name| !props.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            report.push(format!(
                "{} missing required props: {}",
                self.template_id,
                missing.join(", ")
            ));
        }

        let mut extras: Vec<&str> = props
            .keys()
            .filter(|name| !self.allows(name))
            .map(String::as_str)
            .collect();
        extras.sort_unstable();
        if !extras.is_empty() {
            report.push(format!(
                "{} received unexpected props: {}",
                self.template_id,
                extras.join(", ")
            ));
        }

        for validator in &self.validators {
            match panic::catch_unwind(AssertUnwindSafe(|| validator.run(props))) {
                Ok(Ok(())) => {}
                Ok(Err(message)) => report.push(message),
                Err(payload) => report.push(format!(
                    "{} validator error: {}",
                    self.template_id,
                    panic_message(payload.as_ref(), validator.name())
                )),
            }
        }

        report
    }

    /// Like [`validate`](Self::validate) but fails with the aggregated messages.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::Invalid` if any rule is broken.
    pub fn ensure(&self, props: &Props) -> Result<(), ContractError> {
        let report = self.validate(props);
        if report.is_ok() {
            Ok(())
        } else {
            Err(ContractError::Invalid {
                template_id: self.template_id.clone(),
                errors: report.into_errors(),
            })
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send), validator: &str) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("{validator} panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Props {
        value.as_object().cloned().unwrap()
    }

    fn ab_contract() -> TemplateContract {
        TemplateContract::new("Tpl").required(["a", "b"]).optional(["c"])
    }

    #[test]
    fn test_missing_required_reported_together() {
        let contract = TemplateContract::new("Tpl").required(["a", "b", "c"]);
        let report = contract.validate(&props(json!({"b": 1})));
        assert_eq!(report.errors(), ["Tpl missing required props: a, c"]);
    }

    #[test]
    fn test_extras_reported_sorted() {
        let report = ab_contract().validate(&props(json!({"a": 1, "b": 2, "z": 3, "y": 4})));
        assert_eq!(report.errors(), ["Tpl received unexpected props: y, z"]);
    }

    #[test]
    fn test_optional_allowed() {
        let report = ab_contract().validate(&props(json!({"a": 1, "b": 2, "c": 3})));
        assert!(report.is_ok());
    }

    #[test]
    fn test_all_failures_aggregated() {
        let contract = ab_contract()
            .validator(Validator::new("always", |_| Err("first rule".to_string())))
            .validator(Validator::new("also", |_| Err("second rule".to_string())));
        let report = contract.validate(&props(json!({"z": 1})));
        assert_eq!(report.errors().len(), 4);
        assert_eq!(report.errors()[2], "first rule");
        assert_eq!(report.errors()[3], "second rule");
    }

    #[test]
    fn test_panicking_validator_is_captured() {
        let contract = ab_contract()
            .validator(Validator::new("boom", |_| panic!("exploded")))
            .validator(Validator::new("after", |_| Err("still ran".to_string())));
        let report = contract.validate(&props(json!({"a": 1, "b": 2})));
        assert_eq!(report.errors(), ["Tpl validator error: exploded", "still ran"]);
    }

    #[test]
    fn test_ensure_returns_aggregated_error() {
        let err = ab_contract().ensure(&props(json!({"a": 1}))).unwrap_err();
        let ContractError::Invalid { template_id, errors } = err else {
            panic!("expected invalid error");
        };
        assert_eq!(template_id, "Tpl");
        assert!(errors[0].contains('b'));
    }

    #[test]
    fn test_non_empty_array() {
        let contract = TemplateContract::new("List")
            .optional(["items"])
            .validator(non_empty_array("items"));
        assert!(contract.validate(&props(json!({}))).is_ok());
        assert!(contract.validate(&props(json!({"items": [1]}))).is_ok());
        assert_eq!(
            contract.validate(&props(json!({"items": []}))).errors(),
            ["items must not be empty"]
        );
        assert_eq!(
            contract.validate(&props(json!({"items": "x"}))).errors(),
            ["items must be a list"]
        );
    }

    #[test]
    fn test_string_matches() {
        let contract = TemplateContract::new("Lever")
            .required(["lever"])
            .validator(string_matches("lever", "^(pause|plan|point)$").unwrap());
        assert!(contract.validate(&props(json!({"lever": "plan"}))).is_ok());
        assert_eq!(contract.validate(&props(json!({"lever": "push"}))).errors().len(), 1);
        assert!(string_matches("lever", "(").is_err());
    }

    #[test]
    fn test_numeric_range() {
        let contract = TemplateContract::new("Breath")
            .required(["duration_s"])
            .validator(numeric_range("duration_s", 10.0, 600.0));
        assert!(contract.validate(&props(json!({"duration_s": 90}))).is_ok());
        assert_eq!(contract.validate(&props(json!({"duration_s": 5}))).errors().len(), 1);
        assert_eq!(
            contract.validate(&props(json!({"duration_s": "long"}))).errors(),
            ["duration_s must be a number"]
        );
    }

    #[test]
    fn test_scoring_mode_serde() {
        let mode: ScoringMode = serde_json::from_value(json!("tiered_accuracy")).unwrap();
        assert_eq!(mode, ScoringMode::TieredAccuracy);
        assert_eq!(mode.to_string(), "tiered_accuracy");
    }
}
