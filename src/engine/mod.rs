//! The lesson sequencing engine.
//!
//! [`LessonEngine::build_session_stack`] turns one flow into an ordered card
//! stack for a learner session:
//!
//! 1. every sequence entry is expanded by its repeat count, with variant
//!    selection and seed rotation applied to each copy;
//! 2. before each expanded card, guards targeting its template are evaluated
//!    and their inserts are placed in front of it;
//! 3. every card (injected or original) is resolved and validated. Cards
//!    that fail validation are replaced by a fallback card appended to the
//!    context's card list, never to the returned stack.
//!
//! The engine is synchronous, performs no I/O and holds no per-session state;
//! one engine may serve many contexts from many threads.

mod expand;
mod guards;
mod resolve;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use crate::analytics::{CARD_FALLBACK, GUARD_FIRED};
use crate::card::{Card, FallbackConfig, Props};
use crate::content::{CardSpec, Flow, ModuleSeeds, SeedPackSet};
use crate::context::LessonContext;
use crate::error::{EngineError, LessonResult};
use crate::registry::TemplateRegistry;

use expand::Draft;

pub use expand::DEFAULT_VARIANT;
pub use guards::{condition_holds, guard_allows};
pub use resolve::SCENARIO_REF;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Presentation of substitute cards.
    pub fallback: FallbackConfig,
    /// Append guard and fallback events to the context's analytics list.
    pub record_analytics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackConfig::default(),
            record_analytics: true,
        }
    }
}

/// Builds card stacks for one module flow.
#[derive(Debug, Clone)]
pub struct LessonEngine {
    registry: Arc<TemplateRegistry>,
    packs: SeedPackSet,
    flow: Arc<Flow>,
    config: EngineConfig,
}

impl LessonEngine {
    /// Creates an engine with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownTemplate` if the flow can render a
    /// template the registry does not know, or `EngineError::UnknownSeedPack`
    /// if it rotates through a pack that was not loaded.
    pub fn new(
        registry: Arc<TemplateRegistry>,
        packs: SeedPackSet,
        flow: Arc<Flow>,
    ) -> LessonResult<Self> {
        Self::with_config(registry, packs, flow, EngineConfig::default())
    }

    /// Creates an engine with an explicit configuration.
    ///
    /// # Errors
    ///
    /// See [`LessonEngine::new`].
    pub fn with_config(
        registry: Arc<TemplateRegistry>,
        packs: SeedPackSet,
        flow: Arc<Flow>,
        config: EngineConfig,
    ) -> LessonResult<Self> {
        check_references(&registry, &packs, &flow)?;
        tracing::debug!(
            flow = flow.name(),
            module = flow.module_code(),
            packs = packs.len(),
            "lesson engine ready"
        );
        Ok(Self {
            registry,
            packs,
            flow,
            config,
        })
    }

    /// Creates an engine over a module's loaded content.
    ///
    /// # Errors
    ///
    /// See [`LessonEngine::new`].
    pub fn from_module(registry: Arc<TemplateRegistry>, seeds: ModuleSeeds) -> LessonResult<Self> {
        Self::new(registry, seeds.packs, seeds.flow)
    }

    #[must_use]
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn packs(&self) -> &SeedPackSet {
        &self.packs
    }

    #[must_use]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds the ordered card stack for `ctx`.
    ///
    /// On success the session's seed cursors and cooldowns advance, fallback
    /// cards are appended to `ctx.cards`, events to `ctx.analytics`, and the
    /// returned stack is stored in `ctx.stack`. Callers should persist the
    /// session only after this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::MissingScenarioRef` if a card needs the current
    /// scenario reference and the session has none. The whole build is
    /// abandoned and `ctx` is left exactly as it was.
    pub fn build_session_stack(&self, ctx: &mut LessonContext) -> LessonResult<Vec<Card>> {
        let mut scratch =
            LessonContext::resume(ctx.module_code.clone(), ctx.user.clone(), ctx.session.clone());
        let stack = self.build_into(&mut scratch)?;

        ctx.session = scratch.session;
        ctx.cards.append(&mut scratch.cards);
        ctx.analytics.append(&mut scratch.analytics);
        ctx.stack.clone_from(&stack);

        tracing::info!(
            flow = self.flow.name(),
            module = %ctx.module_code,
            cards = stack.len(),
            fallbacks = ctx.fallbacks().count(),
            "session stack built"
        );
        Ok(stack)
    }

    fn build_into(&self, ctx: &mut LessonContext) -> LessonResult<Vec<Card>> {
        let mut expanded = Vec::new();
        for spec in self.flow.sequence() {
            expanded.extend(expand::expand(spec, &self.packs, ctx)?);
        }

        let mut stack = Vec::with_capacity(expanded.len());
        let mut keys = HashSet::new();
        for draft in expanded {
            for injected in self.fire_guards(&draft.card, ctx)? {
                if let Some(card) = self.admit(injected, ctx, &mut keys)? {
                    stack.push(card);
                }
            }
            if let Some(card) = self.admit(draft, ctx, &mut keys)? {
                stack.push(card);
            }
        }
        Ok(stack)
    }

    /// Fires every open guard in front of `card`, in declaration order.
    fn fire_guards(&self, card: &Card, ctx: &mut LessonContext) -> LessonResult<Vec<Draft>> {
        let mut injected = Vec::new();
        for guard in self.flow.guards() {
            if !guard.applies_to(&card.template_id) || !guard_allows(guard, &ctx.session) {
                continue;
            }
            ctx.session.fire(guard.cooldown());
            tracing::info!(
                guard = %guard.id,
                cooldown = guard.cooldown(),
                before = %card.card_key,
                inserts = guard.inserts.len(),
                "guard fired"
            );
            if self.config.record_analytics {
                let mut props = Props::new();
                props.insert("guard_id".to_string(), json!(guard.id));
                props.insert("cooldown_key".to_string(), json!(guard.cooldown()));
                props.insert("before_card_key".to_string(), json!(card.card_key));
                props.insert("inserted".to_string(), json!(guard.inserts.len()));
                ctx.record(GUARD_FIRED, props);
            }
            for spec in &guard.inserts {
                injected.push(expand::materialize(spec, 0, Some(&guard.id), &self.packs, ctx)?);
            }
        }
        Ok(injected)
    }

    /// Resolves and validates one draft. Returns the card to keep, if any.
    fn admit(
        &self,
        draft: Draft,
        ctx: &mut LessonContext,
        keys: &mut HashSet<String>,
    ) -> LessonResult<Option<Card>> {
        if ctx.session.is_completed(&draft.card.card_key) {
            tracing::debug!(card = %draft.card.card_key, "skipping completed card");
            return Ok(None);
        }
        if keys.contains(&draft.card.card_key) {
            tracing::warn!(card = %draft.card.card_key, "duplicate card key in stack; skipping");
            return Ok(None);
        }

        let props = resolve::resolve_props(&draft, &self.registry, &self.packs, ctx)?;
        let report = self.registry.validate(&draft.card.template_id, &props)?;
        let mut card = draft.card;

        if report.is_ok() {
            card.props = props;
            keys.insert(card.card_key.clone());
            return Ok(Some(card));
        }

        let errors = report.into_errors();
        tracing::warn!(
            template = %card.template_id,
            card = %card.card_key,
            errors = %errors.join("; "),
            "card failed validation; substituting fallback"
        );
        let fallback = self.config.fallback.build(&card, &errors);
        if self.config.record_analytics {
            let mut props = Props::new();
            props.insert("template_id".to_string(), json!(card.template_id));
            props.insert("card_key".to_string(), json!(card.card_key));
            props.insert("errors".to_string(), json!(errors));
            ctx.record(CARD_FALLBACK, props);
        }
        ctx.cards.push(fallback);
        Ok(None)
    }
}

fn check_references(registry: &TemplateRegistry, packs: &SeedPackSet, flow: &Flow) -> LessonResult<()> {
    if let Some(template_id) = flow.template_ids().into_iter().find(|id| !registry.contains(id)) {
        return Err(EngineError::UnknownTemplate {
            flow: flow.name().to_string(),
            template_id: template_id.to_string(),
        }
        .into());
    }
    for spec in flow.all_specs() {
        for pack in seed_sequences(spec) {
            if !packs.contains(pack) {
                return Err(EngineError::UnknownSeedPack {
                    pack: pack.to_string(),
                    exercise_id: spec.exercise_id.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn seed_sequences(spec: &CardSpec) -> impl Iterator<Item = &str> {
    spec.seed_sequence
        .as_deref()
        .into_iter()
        .chain(spec.variants.values().filter_map(|v| v.seed_sequence.as_deref()))
}
