//! # lessonflow - adaptive lesson card sequencing
//!
//! lessonflow turns versioned lesson content into an ordered stack of
//! interactive cards for one learner session. It adapts the stack to the
//! learner's A/B variant, rotates through seed content across visits, and
//! injects guard cards when session signals call for them.
//!
//! ## Core Concepts
//!
//! - **Template Contract**: the required and optional properties a card
//!   template accepts, plus custom validators
//! - **Seed Pack**: a versioned, module-scoped list of content items
//! - **Flow**: a versioned card sequence with guard rules and scoring weights
//! - **Lesson Context**: per-session mutable state the engine reads and updates
//! - **Fallback Card**: an informational card substituted for one that failed
//!   validation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lessonflow::{catalog, LessonContext, LessonEngine, SeedLoader, UserSnapshot};
//!
//! let loader = SeedLoader::from_directory("content");
//! let seeds = loader.resolve_module_seeds(
//!     "moduleA",
//!     ["moduleA/scenarios.json", "moduleA/lever_cards.json"],
//!     "moduleA/flow.json",
//! )?;
//! let engine = LessonEngine::from_module(Arc::new(catalog::default_registry()?), seeds)?;
//!
//! let mut ctx = LessonContext::new("moduleA", UserSnapshot::with_variant("B"));
//! ctx.set_scenario_ref("s1");
//! let stack = engine.build_session_stack(&mut ctx)?;
//! persist(ctx.session.to_json());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod card;
pub mod error;
pub mod session;
pub mod time;

// Contracts and content
pub mod catalog;
pub mod content;
pub mod contract;
pub mod registry;

// Sequencing
pub mod analytics;
pub mod context;
pub mod engine;

pub use analytics::{AnalyticsEvent, AnalyticsSink, ChannelSink};
pub use card::{Card, FallbackConfig, Props};
pub use content::{
    CardSpec, Condition, ContentSource, DirectorySource, Flow, GuardRule, LoaderConfig,
    MemorySource, ModuleSeeds, SeedLoader, SeedPack, SeedPackSet, VariantOverride,
};
pub use context::{LessonContext, UserSnapshot};
pub use contract::{ScoringMode, TemplateContract, ValidationReport, Validator};
pub use engine::{EngineConfig, LessonEngine};
pub use error::{
    ContentError, ContractError, EngineError, LessonError, LessonResult, SessionError, SinkError,
};
pub use registry::{PropResolver, ResolveScope, TemplateRegistry};
pub use session::SessionState;
pub use time::Expiry;
