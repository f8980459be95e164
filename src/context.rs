//! Per-session scratch state handed to the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::card::{Card, Props};
use crate::session::SessionState;

/// Read-only learner snapshot taken at session start.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserSnapshot {
    /// Assigned A/B variant, if the learner is in an experiment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ab_variant: Option<String>,
    /// How many times the learner looped through the module.
    #[serde(default)]
    pub loop_index: u32,
    /// How many passes of the current loop were completed.
    #[serde(default)]
    pub pass_count: u32,
}

impl UserSnapshot {
    /// Snapshot with an A/B variant assignment.
    pub fn with_variant(variant: impl Into<String>) -> Self {
        Self {
            ab_variant: Some(variant.into()),
            ..Self::default()
        }
    }
}

/// Mutable state for one learner session.
///
/// A context must not be shared between two concurrent builds; distinct
/// contexts are fully independent.
#[derive(Debug, Clone, Default)]
pub struct LessonContext {
    /// Module the session belongs to.
    pub module_code: String,
    /// Learner snapshot.
    pub user: UserSnapshot,
    /// Session store, persisted by the caller after a successful build.
    pub session: SessionState,
    /// Accumulated output cards. Fallback cards are appended here.
    pub cards: Vec<Card>,
    /// The stack returned by the most recent build.
    pub stack: Vec<Card>,
    /// Accumulated analytics events.
    pub analytics: Vec<AnalyticsEvent>,
}

impl LessonContext {
    /// Creates a context for `module_code` with fresh session state.
    pub fn new(module_code: impl Into<String>, user: UserSnapshot) -> Self {
        Self::resume(module_code, user, SessionState::new())
    }

    /// Creates a context over previously persisted session state.
    pub fn resume(module_code: impl Into<String>, user: UserSnapshot, session: SessionState) -> Self {
        Self {
            module_code: module_code.into(),
            user,
            session,
            cards: Vec::new(),
            stack: Vec::new(),
            analytics: Vec::new(),
        }
    }

    /// Records the latest value of a learner signal.
    pub fn register_signal(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.session.recent_signals.insert(name.into(), value.into());
    }

    /// Sets a free-form session value.
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.session.values.insert(key.into(), value.into());
    }

    pub fn set_scenario_ref(&mut self, scenario_ref: impl Into<String>) {
        self.session.current_scenario_ref = Some(scenario_ref.into());
    }

    pub fn set_lever_choice(&mut self, lever: impl Into<String>) {
        self.session.last_lever_choice = Some(lever.into());
    }

    /// Marks a card key as completed so later builds skip it.
    pub fn mark_completed(&mut self, card_key: impl Into<String>) {
        self.session.completed_cards.insert(card_key.into());
    }

    /// Fallback cards accumulated so far.
    pub fn fallbacks(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter().filter(|c| c.is_fallback())
    }

    pub(crate) fn record(&mut self, name: &str, properties: Props) {
        self.analytics
            .push(AnalyticsEvent::new(name, self.module_code.clone(), properties));
    }

    /// Publishes accumulated events to `sink`.
    ///
    /// Delivered events are removed; events the sink rejected stay queued for
    /// the next drain. Returns the number delivered.
    pub fn drain_analytics(&mut self, sink: &dyn AnalyticsSink) -> usize {
        let pending = std::mem::take(&mut self.analytics);
        let mut delivered = 0;
        for event in pending {
            if sink.publish(&event).is_ok() {
                delivered += 1;
            } else {
                self.analytics.push(event);
            }
        }
        delivered
    }
}
