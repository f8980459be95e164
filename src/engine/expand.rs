//! Turning authored card specs into working drafts.
//!
//! Expansion applies repeat counts, picks a variant, and assigns the next
//! seed item from the entry's rotation. Seed cursors live in session state and
//! wrap at the pack length, so a pack never runs out.

use serde_json::Value;

use crate::card::{card_key, Card};
use crate::content::{CardSpec, SeedPackSet};
use crate::context::LessonContext;
use crate::error::{EngineError, LessonResult};

/// Variant name recorded when no declared variant was selected.
pub const DEFAULT_VARIANT: &str = "default";

/// A card on its way through resolution and validation.
#[derive(Debug, Clone)]
pub(crate) struct Draft {
    pub card: Card,
    pub needs_scenario_ref: bool,
}

/// Materializes one iteration of `spec`.
pub(crate) fn materialize(
    spec: &CardSpec,
    iteration: u32,
    injected_by: Option<&str>,
    packs: &SeedPackSet,
    ctx: &mut LessonContext,
) -> LessonResult<Draft> {
    let mut working = spec.clone();
    let variant = select_variant(&mut working, ctx.user.ab_variant.as_deref());

    let mut card = Card {
        template_id: working.template_id.clone(),
        exercise_id: working.exercise_id.clone(),
        iteration,
        card_key: card_key(&working.exercise_id, iteration),
        variant,
        seed_key: None,
        seed_item: None,
        injected_by: injected_by.map(str::to_string),
        props: working.props,
        meta: working.meta,
    };

    if let Some(pack_name) = working.seed_sequence.as_deref() {
        assign_seed(&mut card, pack_name, packs, ctx)?;
    }

    Ok(Draft {
        card,
        needs_scenario_ref: working.needs_scenario_ref,
    })
}

/// Expands a spec into `repeat` drafts.
pub(crate) fn expand(
    spec: &CardSpec,
    packs: &SeedPackSet,
    ctx: &mut LessonContext,
) -> LessonResult<Vec<Draft>> {
    (0..spec.repeat)
        .map(|iteration| materialize(spec, iteration, None, packs, ctx))
        .collect()
}

/// Picks the learner's variant, else the entry default, and merges it.
///
/// Returns None when the entry declares no variants.
fn select_variant(spec: &mut CardSpec, assigned: Option<&str>) -> Option<String> {
    if spec.variants.is_empty() {
        return None;
    }
    let chosen = [assigned, spec.default_variant.as_deref()]
        .into_iter()
        .flatten()
        .find(|name| spec.variants.contains_key(*name))
        .map(str::to_string);

    match chosen {
        Some(name) => {
            if let Some(overrides) = spec.variants.get(&name).cloned() {
                spec.apply_override(&overrides);
            }
            Some(name)
        }
        None => Some(DEFAULT_VARIANT.to_string()),
    }
}

fn assign_seed(
    card: &mut Card,
    pack_name: &str,
    packs: &SeedPackSet,
    ctx: &mut LessonContext,
) -> LessonResult<()> {
    let pack = packs.get(pack_name).ok_or_else(|| EngineError::UnknownSeedPack {
        pack: pack_name.to_string(),
        exercise_id: card.exercise_id.clone(),
    })?;
    if pack.is_empty() {
        tracing::warn!(pack = pack_name, exercise = %card.exercise_id, "seed pack is empty; no seed assigned");
        return Ok(());
    }

    let index = ctx.session.advance_cursor(&card.exercise_id, pack.len());
    let item = &pack.items()[index];
    let item_id = match item.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => index.to_string(),
    };
    tracing::debug!(
        pack = pack_name,
        exercise = %card.exercise_id,
        index,
        item = %item_id,
        "seed assigned"
    );

    card.seed_key = Some(format!("{pack_name}:{item_id}"));
    card.seed_item = Some(Value::Object(item.clone()));
    Ok(())
}
