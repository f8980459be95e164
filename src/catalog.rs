//! The stock template catalog.
//!
//! [`default_registry`] registers the contract of every card template the
//! lesson runner ships with, plus the resolvers that pull option lists and
//! scenario-linked defaults out of auxiliary seed packs.

use serde_json::{json, Value};

use crate::card::Props;
use crate::contract::{non_empty_array, numeric_range, string_matches, ScoringMode, TemplateContract};
use crate::engine::SCENARIO_REF;
use crate::error::ContractError;
use crate::registry::{ResolveScope, TemplateRegistry};

/// Control-shift actions offered by `SingleSelectActionCard`.
pub const ACTIONS_PACK: &str = "moduleA/actions_control_shift.json";
/// Reframe mantras offered by `MantraSelectOrWrite`.
pub const MANTRAS_PACK: &str = "moduleA/reframe_mantras.json";
/// Load examples classified by `BinaryClassifierCard`.
pub const LOAD_EXAMPLES_PACK: &str = "moduleA/load_examples.json";
/// Key point sets for `PickThreeKeyPoints`.
pub const KEYPOINT_SETS_PACK: &str = "moduleA/d2_keypoint_sets.json";
/// Lever cards for `LeverSelector3P` and `StakesMapBuilder`.
pub const LEVER_CARDS_PACK: &str = "moduleA/lever_cards.json";
/// Stakes map presets for `StakesMapBuilder`.
pub const STAKES_PRESETS_PACK: &str = "moduleA/stakes_map_presets.json";
/// Per-scenario stakes defaults for `TernaryRatingCard`.
pub const PIC_SETS_PACK: &str = "moduleA/pic_sets.json";

/// Scenario references are short slugs.
const SCENARIO_REF_PATTERN: &str = r"^[A-Za-z0-9_.:\-]{1,64}$";

/// Builds the registry of stock templates.
///
/// # Errors
///
/// Returns a `ContractError` if a stock contract fails to build.
pub fn default_registry() -> Result<TemplateRegistry, ContractError> {
    let mut registry = TemplateRegistry::new();

    registry.register_with_resolver(
        TemplateContract::new("ScenarioTaggerCard")
            .required(["scenario_text", "options", "answer_key"])
            .optional(["text", "reflection_prompt", "copy"])
            .validator(non_empty_array("options"))
            .scoring(ScoringMode::TieredAccuracy),
        scenario_tagger,
    )?;
    registry.register(
        TemplateContract::new("PersonalScenarioCapture")
            .required(["examples", "rating_scale"])
            .optional(["helper_text", "character_limit"])
            .validator(numeric_range("character_limit", 1.0, 5000.0)),
    )?;
    registry.register_with_resolver(
        TemplateContract::new("TernaryRatingCard")
            .required([SCENARIO_REF, "explainers"])
            .optional(["stakes_defaults", "reflection_prompt"])
            .validator(string_matches(SCENARIO_REF, SCENARIO_REF_PATTERN)?),
        ternary_rating,
    )?;
    registry.register_with_resolver(
        TemplateContract::new("SingleSelectActionCard")
            .required([SCENARIO_REF, "actions"])
            .optional(["allow_other", "reflection_prompt"])
            .validator(non_empty_array("actions")),
        pack_list("actions", ACTIONS_PACK),
    )?;
    registry.register_with_resolver(
        TemplateContract::new("MantraSelectOrWrite")
            .required(["mantras", "character_limit"])
            .optional(["coach_tip"])
            .validator(numeric_range("character_limit", 1.0, 5000.0)),
        pack_list("mantras", MANTRAS_PACK),
    )?;
    registry.register(
        TemplateContract::new("GuidedBreathDrill")
            .required(["script", "timings"])
            .optional(["baseline_prompt", "reflection_prompt"]),
    )?;
    registry.register_with_resolver(
        TemplateContract::new("BinaryClassifierCard")
            .required(["examples"])
            .optional(["explainers", "reflection_prompt"])
            .validator(non_empty_array("examples"))
            .scoring(ScoringMode::Correctness),
        pack_list("examples", LOAD_EXAMPLES_PACK),
    )?;
    registry.register_with_resolver(
        TemplateContract::new("PickThreeKeyPoints")
            .required(["source_paragraph", "options", "correct_ids"])
            .optional(["free_text_enabled"])
            .scoring(ScoringMode::TieredAccuracy),
        pick_three,
    )?;
    registry.register_with_resolver(
        TemplateContract::new("LeverSelector3P")
            .required([SCENARIO_REF, "lever_cards"])
            .optional(["reflection_prompt", "last_choice"])
            .validator(non_empty_array("lever_cards")),
        lever_selector,
    )?;
    registry.register(
        TemplateContract::new("PresenceRitualQuickStart")
            .required(["script", "duration_s"])
            .optional(["intention_prompt"])
            .validator(numeric_range("duration_s", 1.0, 3600.0)),
    )?;
    registry.register_with_resolver(
        TemplateContract::new("StakesMapBuilder")
            .required([
                SCENARIO_REF,
                "pressure_options",
                "trigger_examples",
                "lever_cards",
                "action_hints",
            ])
            .optional(["prefill"]),
        stakes_map,
    )?;
    registry.register_with_resolver(
        TemplateContract::new("ReflectionRatingCard")
            .required([SCENARIO_REF, "lever", "feedback_rules"])
            .optional(["reflection_prompt"]),
        |props: &mut Props, scope: &ResolveScope<'_>| {
            if let Some(lever) = scope.session.last_lever_choice.as_deref() {
                fill(props, "lever", json!(lever));
            }
        },
    )?;
    registry.register(
        TemplateContract::new("CoachSheetTip")
            .required(["title", "body"])
            .optional(["details", "severity"])
            .scoring(ScoringMode::Informational),
    )?;

    Ok(registry)
}

fn fill(props: &mut Props, key: &str, value: Value) {
    props.entry(key).or_insert(value);
}

fn field_or(item: &Props, key: &str, default: Value) -> Value {
    item.get(key).cloned().unwrap_or(default)
}

/// Resolver that fills `key` with every item of `pack`.
fn pack_list(
    key: &'static str,
    pack: &'static str,
) -> impl Fn(&mut Props, &ResolveScope<'_>) + Send + Sync {
    move |props: &mut Props, scope: &ResolveScope<'_>| {
        if let Some(items) = scope.packs.get(pack) {
            fill(props, key, items.items_value());
        }
    }
}

fn scenario_tagger(props: &mut Props, scope: &ResolveScope<'_>) {
    let seed = scope.card.seed_item.as_ref().and_then(Value::as_object);
    let text = seed.map_or_else(|| json!(""), |s| field_or(s, "text", json!("")));
    let answer_key = seed.map_or_else(|| json!({}), |s| field_or(s, "answer_key", json!({})));

    fill(props, "scenario_text", text);
    fill(
        props,
        "options",
        json!([
            {"id": "pressure", "label": "Pressure"},
            {"id": "visibility", "label": "Visibility"},
            {"id": "irreversibility", "label": "Irreversibility"}
        ]),
    );
    fill(props, "answer_key", answer_key);
}

fn pick_three(props: &mut Props, scope: &ResolveScope<'_>) {
    let Some(first) = scope.packs.get(KEYPOINT_SETS_PACK).and_then(|p| p.items().first()) else {
        return;
    };
    fill(props, "source_paragraph", field_or(first, "source", json!("")));
    fill(props, "options", field_or(first, "options", json!([])));
    fill(props, "correct_ids", field_or(first, "correct_ids", json!([])));
}

fn lever_selector(props: &mut Props, scope: &ResolveScope<'_>) {
    if let Some(levers) = scope.packs.get(LEVER_CARDS_PACK) {
        fill(props, "lever_cards", levers.items_value());
    }
    if let Some(last) = scope.session.last_lever_choice.as_deref().filter(|s| !s.is_empty()) {
        fill(props, "last_choice", json!(last));
    }
}

fn stakes_map(props: &mut Props, scope: &ResolveScope<'_>) {
    let Some(preset) = scope.packs.get(STAKES_PRESETS_PACK).and_then(|p| p.items().first()) else {
        return;
    };
    fill(props, "pressure_options", field_or(preset, "pressure_options", json!([])));
    fill(props, "trigger_examples", field_or(preset, "trigger_examples", json!([])));
    fill(props, "action_hints", field_or(preset, "action_hints", json!([])));
    if let Some(levers) = scope.packs.get(LEVER_CARDS_PACK) {
        fill(props, "lever_cards", levers.items_value());
    }
}

fn ternary_rating(props: &mut Props, scope: &ResolveScope<'_>) {
    let Some(scenario_ref) = props.get(SCENARIO_REF).cloned() else {
        return;
    };
    let defaults = scope
        .packs
        .get(PIC_SETS_PACK)
        .and_then(|pack| pack.find_by("scenario_id", &scenario_ref))
        .and_then(|item| item.get("recommended_default"))
        .filter(|value| crate::session::is_truthy(value))
        .cloned();
    if let Some(defaults) = defaults {
        fill(props, "stakes_defaults", defaults);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{card_key, Card};
    use crate::content::{SeedPack, SeedPackSet};
    use crate::context::UserSnapshot;
    use crate::session::SessionState;

    fn pack(name: &str, items: Value) -> SeedPack {
        SeedPack::from_document(name, &json!({"version": "1", "module_code": "moduleA", "items": items}))
            .unwrap()
    }

    fn card(template_id: &str, seed_item: Option<Value>) -> Card {
        Card {
            template_id: template_id.to_string(),
            exercise_id: "x".to_string(),
            iteration: 0,
            card_key: card_key("x", 0),
            variant: None,
            seed_key: None,
            seed_item,
            injected_by: None,
            props: Props::new(),
            meta: Props::new(),
        }
    }

    fn run(registry: &TemplateRegistry, card: &Card, session: &SessionState, packs: &SeedPackSet, props: &mut Props) {
        let user = UserSnapshot::default();
        let scope = ResolveScope {
            card,
            session,
            user: &user,
            packs,
        };
        registry
            .resolver(&card.template_id)
            .expect("resolver registered")
            .resolve(props, &scope);
    }

    #[test]
    fn test_catalog_has_every_template() {
        let registry = default_registry().unwrap();
        assert_eq!(registry.len(), 13);
        assert_eq!(
            registry.get("CoachSheetTip").unwrap().scoring_mode(),
            ScoringMode::Informational
        );
        assert_eq!(
            registry.get("BinaryClassifierCard").unwrap().scoring_mode(),
            ScoringMode::Correctness
        );
        assert!(registry.resolver("GuidedBreathDrill").is_none());
    }

    #[test]
    fn test_fallback_card_satisfies_coach_tip() {
        let registry = default_registry().unwrap();
        let fallback = crate::card::FallbackConfig::default()
            .build(&card("PickThreeKeyPoints", None), &["broken".to_string()]);
        assert!(registry.validate(&fallback.template_id, &fallback.props).unwrap().is_ok());
    }

    #[test]
    fn test_scenario_tagger_reads_seed() {
        let registry = default_registry().unwrap();
        let card = card(
            "ScenarioTaggerCard",
            Some(json!({"id": "s1", "text": "Board meeting", "answer_key": {"pressure": "high"}})),
        );
        let mut props = Props::new();
        run(&registry, &card, &SessionState::new(), &SeedPackSet::new(), &mut props);
        assert_eq!(props["scenario_text"], json!("Board meeting"));
        assert_eq!(props["answer_key"]["pressure"], json!("high"));
        assert_eq!(props["options"].as_array().unwrap().len(), 3);
        assert!(registry.validate("ScenarioTaggerCard", &props).unwrap().is_ok());
    }

    #[test]
    fn test_lever_selector_carries_last_choice() {
        let registry = default_registry().unwrap();
        let packs: SeedPackSet = [pack(LEVER_CARDS_PACK, json!([{"id": "pace"}, {"id": "people"}]))]
            .into_iter()
            .collect();
        let mut session = SessionState::new();
        session.last_lever_choice = Some("pace".to_string());

        let mut props = Props::new();
        run(&registry, &card("LeverSelector3P", None), &session, &packs, &mut props);
        assert_eq!(props["lever_cards"].as_array().unwrap().len(), 2);
        assert_eq!(props["last_choice"], json!("pace"));
    }

    #[test]
    fn test_ternary_rating_matches_scenario() {
        let registry = default_registry().unwrap();
        let packs: SeedPackSet = [pack(
            PIC_SETS_PACK,
            json!([
                {"scenario_id": "s1", "recommended_default": {"pressure": 2}},
                {"scenario_id": "s2", "recommended_default": {"pressure": 0}}
            ]),
        )]
        .into_iter()
        .collect();

        let mut props = Props::new();
        props.insert(SCENARIO_REF.to_string(), json!("s2"));
        run(&registry, &card("TernaryRatingCard", None), &SessionState::new(), &packs, &mut props);
        assert_eq!(props["stakes_defaults"], json!({"pressure": 0}));

        let mut props = Props::new();
        props.insert(SCENARIO_REF.to_string(), json!("s9"));
        run(&registry, &card("TernaryRatingCard", None), &SessionState::new(), &packs, &mut props);
        assert!(!props.contains_key("stakes_defaults"));
    }

    #[test]
    fn test_pick_three_tolerates_empty_pack() {
        let registry = default_registry().unwrap();
        let packs: SeedPackSet = [pack(KEYPOINT_SETS_PACK, json!([]))].into_iter().collect();
        let mut props = Props::new();
        run(&registry, &card("PickThreeKeyPoints", None), &SessionState::new(), &packs, &mut props);
        assert!(props.is_empty());
    }

    #[test]
    fn test_reflection_without_lever_fails_contract() {
        let registry = default_registry().unwrap();
        let mut props = Props::new();
        props.insert(SCENARIO_REF.to_string(), json!("s1"));
        props.insert("feedback_rules".to_string(), json!([]));
        run(&registry, &card("ReflectionRatingCard", None), &SessionState::new(), &SeedPackSet::new(), &mut props);
        let report = registry.validate("ReflectionRatingCard", &props).unwrap();
        assert_eq!(report.errors(), ["ReflectionRatingCard missing required props: lever"]);
    }

    #[test]
    fn test_bad_scenario_ref_rejected() {
        let registry = default_registry().unwrap();
        let mut props = Props::new();
        props.insert(SCENARIO_REF.to_string(), json!("has spaces"));
        props.insert("explainers".to_string(), json!([]));
        assert!(!registry.validate("TernaryRatingCard", &props).unwrap().is_ok());
    }
}
