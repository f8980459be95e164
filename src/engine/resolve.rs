//! Property resolution for drafted cards.

use serde_json::Value;

use crate::card::Props;
use crate::content::SeedPackSet;
use crate::context::LessonContext;
use crate::error::{EngineError, LessonResult};
use crate::registry::{ResolveScope, TemplateRegistry};

use super::expand::Draft;

/// Prop key carrying the session's scenario reference.
pub const SCENARIO_REF: &str = "scenario_ref";

const SEED_ID: &str = "id";

/// Computes the final properties for `draft`.
///
/// Layers, lowest precedence last: static props, the session scenario
/// reference, the seed item's fields, then the template's resolver. Later
/// layers never overwrite earlier ones. Seed fields the contract does not
/// declare are kept, so validation turns them into a fallback.
///
/// # Errors
///
/// Returns `EngineError::MissingScenarioRef` if the card needs a scenario
/// reference and the session has none.
pub(crate) fn resolve_props(
    draft: &Draft,
    registry: &TemplateRegistry,
    packs: &SeedPackSet,
    ctx: &LessonContext,
) -> LessonResult<Props> {
    let card = &draft.card;
    let mut props = card.props.clone();

    if draft.needs_scenario_ref {
        let scenario_ref = ctx
            .session
            .current_scenario_ref
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::MissingScenarioRef {
                template_id: card.template_id.clone(),
                card_key: card.card_key.clone(),
            })?;
        props
            .entry(SCENARIO_REF)
            .or_insert_with(|| Value::String(scenario_ref.to_string()));
    }

    if let Some(Value::Object(seed)) = &card.seed_item {
        merge_seed(&mut props, seed);
    }

    if let Some(resolver) = registry.resolver(&card.template_id) {
        let scope = ResolveScope {
            card,
            session: &ctx.session,
            user: &ctx.user,
            packs,
        };
        let mut enriched = props.clone();
        resolver.resolve(&mut enriched, &scope);
        for (key, value) in enriched {
            props.entry(key).or_insert(value);
        }
    }

    Ok(props)
}

// The item `id` is provenance, carried in the seed key.
fn merge_seed(props: &mut Props, seed: &Props) {
    for (key, value) in seed {
        if key != SEED_ID {
            props.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}
