use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use serde_json::json;

use lessonflow::{
    Flow, LessonContext, LessonEngine, SeedPack, SeedPackSet, TemplateContract, TemplateRegistry,
    UserSnapshot,
};

const EXERCISES: usize = 64;

fn make_engine() -> LessonEngine {
    let mut registry = TemplateRegistry::new();
    registry
        .register_many([
            TemplateContract::new("Prompt").required(["prompt", "scenario_ref"]).optional(["text"]),
            TemplateContract::new("Breath").optional(["script"]),
        ])
        .unwrap();

    let items: Vec<_> = (0..16).map(|i| json!({"id": format!("s{i}"), "text": format!("scenario {i}")})).collect();
    let pack = SeedPack::from_document(
        "bench/scenarios.json",
        &json!({"version": "1", "module_code": "bench", "items": items}),
    )
    .unwrap();

    let sequence: Vec<_> = (0..EXERCISES)
        .map(|i| {
            json!({
                "exercise_id": format!("ex{i}"),
                "template_id": "Prompt",
                "repeat": 2,
                "seed_sequence": "bench/scenarios.json",
                "needs_scenario_ref": true,
                "default_variant": "A",
                "variants": {"A": {"props": {"prompt": "a"}}, "B": {"props": {"prompt": "b"}}}
            })
        })
        .collect();
    let flow = Flow::from_document(
        "bench/flow.json",
        &json!({
            "version": "1",
            "module_code": "bench",
            "sequence": sequence,
            "guards": [{
                "id": "calm",
                "target": "Prompt",
                "conditions": [{"type": "metric_gte", "metric": "stress", "value": 5}],
                "inserts": [{"exercise_id": "breath", "template_id": "Breath"}]
            }]
        }),
    )
    .unwrap();

    let packs: SeedPackSet = [pack].into_iter().collect();
    LessonEngine::new(Arc::new(registry), packs, Arc::new(flow)).unwrap()
}

fn fresh_context() -> LessonContext {
    let mut ctx = LessonContext::new("bench", UserSnapshot::with_variant("B"));
    ctx.set_scenario_ref("s1");
    ctx.set_value("stress", 7);
    ctx
}

fn bench_build_session_stack(c: &mut Criterion) {
    let engine = make_engine();
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements((EXERCISES * 2) as u64));

    group.bench_function("build_session_stack/fresh", |b| {
        b.iter_batched(
            fresh_context,
            |mut ctx| engine.build_session_stack(&mut ctx).unwrap(),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("build_session_stack/half_completed", |b| {
        b.iter_batched(
            || {
                let mut ctx = fresh_context();
                for i in (0..EXERCISES).step_by(2) {
                    ctx.mark_completed(format!("ex{i}::0"));
                    ctx.mark_completed(format!("ex{i}::1"));
                }
                ctx
            },
            |mut ctx| engine.build_session_stack(&mut ctx).unwrap(),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_build_session_stack);
criterion_main!(benches);
