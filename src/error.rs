//! Error types for lessonflow.
//!
//! All errors are strongly typed using thiserror so callers can tell a
//! content-authoring defect (recoverable, or fatal at load time) apart from an
//! orchestration defect that aborts a whole build.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while loading seed packs and flows.
///
/// Every variant is a configuration error: it aborts before any card
/// sequencing begins.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Content file not found: {path}")]
    NotFound {
        path: String,
    },

    #[error("Failed to read content file '{path}': {message}")]
    Io {
        path: String,
        message: String,
    },

    #[error("Invalid JSON in '{path}': {message}")]
    InvalidJson {
        path: String,
        message: String,
    },

    #[error("{kind} '{name}' missing {field}")]
    MissingField {
        kind: &'static str,
        name: String,
        field: &'static str,
    },

    #[error("{kind} '{name}' {field} must be {expected}")]
    InvalidShape {
        kind: &'static str,
        name: String,
        field: String,
        expected: &'static str,
    },

    #[error("{kind} '{name}' {field}: {reason}")]
    InvalidEntry {
        kind: &'static str,
        name: String,
        field: String,
        reason: String,
    },

    #[error("Invalid ISO8601 date: {value}")]
    InvalidTimestamp {
        value: String,
    },

    #[error("{kind} '{name}' version {version} expired on {expired_at}")]
    Expired {
        kind: &'static str,
        name: String,
        version: String,
        expired_at: DateTime<Utc>,
    },

    #[error("{kind} '{name}' module mismatch (expected {expected}, got {actual})")]
    ModuleMismatch {
        kind: &'static str,
        name: String,
        expected: String,
        actual: String,
    },
}

/// Errors raised by template contracts and the registry.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Contract already registered for {template_id}")]
    DuplicateTemplate {
        template_id: String,
    },

    #[error("No contract found for template '{template_id}'")]
    UnknownTemplate {
        template_id: String,
    },

    #[error("{}", .errors.join("; "))]
    Invalid {
        template_id: String,
        errors: Vec<String>,
    },

    #[error("Invalid validator pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },
}

/// Errors raised while building a session stack.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{template_id} ({card_key}) requires current_scenario_ref but none is set")]
    MissingScenarioRef {
        template_id: String,
        card_key: String,
    },

    #[error("Missing seed pack '{pack}' referenced by exercise '{exercise_id}'")]
    UnknownSeedPack {
        pack: String,
        exercise_id: String,
    },

    #[error("Flow '{flow}' references unregistered template '{template_id}'")]
    UnknownTemplate {
        flow: String,
        template_id: String,
    },
}

/// Errors raised when restoring persisted session state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session state schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        found: u32,
        supported: u32,
    },

    #[error("Malformed session state: {message}")]
    Malformed {
        message: String,
    },
}

/// Errors published by analytics sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Analytics sink is full")]
    Full,

    #[error("Analytics sink is disconnected")]
    Disconnected,
}

/// Top-level error type for lessonflow.
#[derive(Debug, Error)]
pub enum LessonError {
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl LessonError {
    /// Returns true if this is a content (load-time) error.
    #[must_use]
    pub const fn is_content(&self) -> bool {
        matches!(self, Self::Content(_))
    }

    /// Returns true if this is a contract error.
    #[must_use]
    pub const fn is_contract(&self) -> bool {
        matches!(self, Self::Contract(_))
    }

    /// Returns true if this is an engine error.
    #[must_use]
    pub const fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_))
    }

    /// Returns true if this is a session restore error.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Returns true for errors that point at broken content or wiring rather
    /// than at the state of one session.
    #[must_use]
    pub const fn is_fatal_config(&self) -> bool {
        match self {
            Self::Content(_) => true,
            Self::Contract(e) => !matches!(e, ContractError::Invalid { .. }),
            Self::Engine(e) => !matches!(e, EngineError::MissingScenarioRef { .. }),
            Self::Session(_) => false,
        }
    }

    /// Returns true if this error is the expiry of a pack or flow.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Content(ContentError::Expired { .. }))
    }
}

/// Result type alias for lessonflow operations.
pub type LessonResult<T> = Result<T, LessonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_contract_joins_messages() {
        let err = ContractError::Invalid {
            template_id: "Tpl".to_string(),
            errors: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(format!("{err}"), "first; second");
    }

    #[test]
    fn test_missing_field_message() {
        let err = ContentError::MissingField {
            kind: "Seed pack",
            name: "moduleA/pack.json".to_string(),
            field: "version",
        };
        assert_eq!(format!("{err}"), "Seed pack 'moduleA/pack.json' missing version");
    }

    #[test]
    fn test_expired_is_fatal_config() {
        let err: LessonError = ContentError::Expired {
            kind: "Flow",
            name: "f".to_string(),
            version: "1.0.0".to_string(),
            expired_at: Utc::now(),
        }
        .into();
        assert!(err.is_content());
        assert!(err.is_expired());
        assert!(err.is_fatal_config());
    }

    #[test]
    fn test_missing_scenario_ref_is_not_config() {
        let err: LessonError = EngineError::MissingScenarioRef {
            template_id: "TernaryRatingCard".to_string(),
            card_key: "b1::0".to_string(),
        }
        .into();
        assert!(err.is_engine());
        assert!(!err.is_fatal_config());
        assert!(format!("{err}").contains("current_scenario_ref"));
    }

    #[test]
    fn test_unknown_template_is_fatal_config() {
        let err: LessonError = ContractError::UnknownTemplate {
            template_id: "Nope".to_string(),
        }
        .into();
        assert!(err.is_contract());
        assert!(err.is_fatal_config());
    }
}
