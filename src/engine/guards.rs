//! Guard condition evaluation.
//!
//! Conditions are pure predicates over session state. A condition that
//! cannot be evaluated (missing key, non-numeric value) is simply false.

use serde_json::Value;

use crate::content::{Condition, GuardRule};
use crate::session::{as_number, SessionState};

/// Evaluates one condition against the session.
#[must_use]
pub fn condition_holds(condition: &Condition, session: &SessionState) -> bool {
    match condition {
        Condition::MetricGte { metric, value } => match (session.numeric(metric), as_number(value)) {
            (Some(current), Some(threshold)) => current >= threshold,
            _ => false,
        },
        Condition::SignalEquals { signal, value } => {
            session.signal(signal).is_some_and(|current| same_value(current, value))
        }
        Condition::MissingContext { key } => session.is_missing(key),
        Condition::Unknown => false,
    }
}

// Numbers compare by value, so `1` equals `1.0`.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// True when the guard's cooldown has not fired and all its conditions hold.
#[must_use]
pub fn guard_allows(guard: &GuardRule, session: &SessionState) -> bool {
    if session.has_fired(guard.cooldown()) {
        return false;
    }
    guard
        .conditions
        .iter()
        .all(|condition| condition_holds(condition, session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metric(name: &str, value: f64) -> Condition {
        Condition::MetricGte {
            metric: name.to_string(),
            value: json!(value),
        }
    }

    #[test]
    fn test_metric_gte() {
        let mut session = SessionState::new();
        assert!(!condition_holds(&metric("stress", 5.0), &session));

        session.values.insert("stress".to_string(), json!(5));
        assert!(condition_holds(&metric("stress", 5.0), &session));
        assert!(!condition_holds(&metric("stress", 5.5), &session));

        session.values.insert("stress".to_string(), json!({"level": 9}));
        assert!(!condition_holds(&metric("stress", 1.0), &session));
    }

    #[test]
    fn test_metric_threshold_coercion() {
        let mut session = SessionState::new();
        session.values.insert("stress".to_string(), json!(8));
        let with = |value: Value| Condition::MetricGte {
            metric: "stress".to_string(),
            value,
        };
        assert!(condition_holds(&with(json!("7")), &session));
        assert!(condition_holds(&with(json!(" 8.0 ")), &session));
        assert!(!condition_holds(&with(json!("9")), &session));
        assert!(!condition_holds(&with(json!("high")), &session));
        assert!(!condition_holds(&with(Value::Null), &session));
        assert!(!condition_holds(&with(json!([7])), &session));
    }

    #[test]
    fn test_unknown_condition_never_holds() {
        assert!(!condition_holds(&Condition::Unknown, &SessionState::new()));
        let guard: GuardRule = serde_json::from_value(json!({
            "id": "g",
            "conditions": [{"type": "moon_phase", "phase": "full"}]
        }))
        .unwrap();
        assert!(!guard_allows(&guard, &SessionState::new()));
    }

    #[test]
    fn test_signal_equals_numbers_by_value() {
        let mut session = SessionState::new();
        session.recent_signals.insert("streak".to_string(), json!(1));
        let cond = |value: Value| Condition::SignalEquals {
            signal: "streak".to_string(),
            value,
        };
        assert!(condition_holds(&cond(json!(1.0)), &session));
        assert!(condition_holds(&cond(json!(1)), &session));
        assert!(!condition_holds(&cond(json!("1")), &session));
        assert!(!condition_holds(&cond(json!(2)), &session));
    }

    #[test]
    fn test_signal_equals_is_exact() {
        let mut session = SessionState::new();
        let cond = Condition::SignalEquals {
            signal: "mood".to_string(),
            value: json!("tense"),
        };
        assert!(!condition_holds(&cond, &session));
        session.recent_signals.insert("mood".to_string(), json!("Tense"));
        assert!(!condition_holds(&cond, &session));
        session.recent_signals.insert("mood".to_string(), json!("tense"));
        assert!(condition_holds(&cond, &session));
    }

    #[test]
    fn test_missing_context() {
        let mut session = SessionState::new();
        let cond = Condition::MissingContext {
            key: "current_scenario_ref".to_string(),
        };
        assert!(condition_holds(&cond, &session));
        session.current_scenario_ref = Some("s1".to_string());
        assert!(!condition_holds(&cond, &session));
    }

    #[test]
    fn test_guard_requires_all_conditions_and_open_cooldown() {
        let mut session = SessionState::new();
        session.values.insert("stress".to_string(), json!(8));
        let guard: GuardRule = serde_json::from_value(json!({
            "id": "g",
            "cooldown_key": "k",
            "conditions": [
                {"type": "metric_gte", "metric": "stress", "value": 7},
                {"type": "missing_context", "key": "baseline"}
            ]
        }))
        .unwrap();
        assert!(guard_allows(&guard, &session));

        session.values.insert("baseline".to_string(), json!(true));
        assert!(!guard_allows(&guard, &session));

        session.values.remove("baseline");
        session.fire("k");
        assert!(!guard_allows(&guard, &session));
    }

    #[test]
    fn test_guard_without_conditions_allows() {
        let guard: GuardRule = serde_json::from_value(json!({"id": "always"})).unwrap();
        assert!(guard_allows(&guard, &SessionState::new()));
    }
}
