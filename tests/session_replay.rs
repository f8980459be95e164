use std::sync::Arc;

use serde_json::json;

use lessonflow::session::SESSION_STATE_VERSION;
use lessonflow::{
    Flow, LessonContext, LessonEngine, SeedPack, SeedPackSet, SessionError, SessionState,
    TemplateContract, TemplateRegistry, UserSnapshot,
};

const PACK: &str = "moduleA/scenarios.json";

fn engine(items: usize) -> LessonEngine {
    let mut registry = TemplateRegistry::new();
    registry
        .register(TemplateContract::new("Prompt").optional(["text"]))
        .unwrap();

    let items: Vec<_> = (0..items).map(|i| json!({"id": i, "text": format!("scenario {i}")})).collect();
    let pack = SeedPack::from_document(
        PACK,
        &json!({"version": "1", "module_code": "moduleA", "items": items}),
    )
    .unwrap();
    let flow = Flow::from_document(
        "moduleA/flow.json",
        &json!({
            "version": "1", "module_code": "moduleA",
            "sequence": [{"exercise_id": "prompt", "template_id": "Prompt", "seed_sequence": PACK}]
        }),
    )
    .unwrap();

    let packs: SeedPackSet = [pack].into_iter().collect();
    LessonEngine::new(Arc::new(registry), packs, Arc::new(flow)).unwrap()
}

/// One visit: restore the persisted session, build, persist again.
fn visit(engine: &LessonEngine, persisted: serde_json::Value) -> (String, serde_json::Value) {
    let session = SessionState::from_json(persisted).unwrap();
    let mut ctx = LessonContext::resume("moduleA", UserSnapshot::default(), session);
    let stack = engine.build_session_stack(&mut ctx).unwrap();
    let seed_key = stack[0].seed_key.clone().unwrap();
    (seed_key, ctx.session.to_json())
}

#[test]
fn seed_rotation_wraps_across_visits() {
    const N: usize = 4;
    let engine = engine(N);

    let mut persisted = SessionState::new().to_json();
    let mut indices = Vec::new();
    for _ in 0..N + 3 {
        let (seed_key, next) = visit(&engine, persisted);
        let index: usize = seed_key.rsplit(':').next().unwrap().parse().unwrap();
        indices.push(index);
        persisted = next;
    }
    assert_eq!(indices, [0, 1, 2, 3, 0, 1, 2]);
}

#[test]
fn single_item_pack_always_repeats() {
    let engine = engine(1);
    let mut persisted = SessionState::new().to_json();
    for _ in 0..3 {
        let (seed_key, next) = visit(&engine, persisted);
        assert_eq!(seed_key, "moduleA/scenarios.json:0");
        persisted = next;
    }
}

#[test]
fn replay_without_persisting_repeats_the_same_seed() {
    let engine = engine(3);
    let persisted = SessionState::new().to_json();
    let (first, _) = visit(&engine, persisted.clone());
    let (retry, _) = visit(&engine, persisted);
    assert_eq!(first, retry);
}

#[test]
fn completed_cards_survive_persistence() {
    let engine = engine(2);
    let mut ctx = LessonContext::new("moduleA", UserSnapshot::default());
    assert_eq!(engine.build_session_stack(&mut ctx).unwrap().len(), 1);
    ctx.mark_completed("prompt::0");

    let restored = SessionState::from_json(ctx.session.to_json()).unwrap();
    assert_eq!(restored, ctx.session);

    let mut resumed = LessonContext::resume("moduleA", UserSnapshot::default(), restored);
    assert!(engine.build_session_stack(&mut resumed).unwrap().is_empty());
}

#[test]
fn session_schema_is_versioned() {
    let mut ctx = LessonContext::new("moduleA", UserSnapshot::default());
    ctx.set_scenario_ref("s1");
    ctx.set_lever_choice("pace");
    ctx.register_signal("mood", "calm");
    ctx.session.fire("calm_down");

    let persisted = ctx.session.to_json();
    assert_eq!(persisted["schema_version"], json!(SESSION_STATE_VERSION));
    assert_eq!(persisted["current_scenario_ref"], json!("s1"));
    assert_eq!(persisted["cooldowns"], json!(["calm_down"]));

    let newer = json!({"schema_version": SESSION_STATE_VERSION + 1});
    assert!(matches!(
        SessionState::from_json(newer),
        Err(SessionError::UnsupportedVersion { .. })
    ));
    assert!(matches!(
        SessionState::from_json(json!({"seed_cursors": "nope"})),
        Err(SessionError::Malformed { .. })
    ));

    let legacy = SessionState::from_json(json!({"completed_cards": ["x::0"]})).unwrap();
    assert_eq!(legacy.schema_version, SESSION_STATE_VERSION);
    assert!(legacy.is_completed("x::0"));
}
