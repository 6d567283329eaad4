//! Benchmarks for pipeline execution.

use campaignflow::config::RunConfig;
use campaignflow::pipeline::{run_pipeline, Plan, PlanBuilder, StageDescriptor};
use campaignflow::testing::StaticStage;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;

fn three_phase_plan() -> Plan {
    PlanBuilder::new("bench")
        .phase(vec![
            StageDescriptor::new("ReviewsResearch", Arc::new(StaticStage::new(json!({"a": 1})))),
            StageDescriptor::new("TrendsResearch", Arc::new(StaticStage::new(json!({"b": 2})))),
        ])
        .expect("valid phase")
        .phase(vec![StageDescriptor::new(
            "ScriptWriter",
            Arc::new(StaticStage::new(json!({"scenes": [1, 2]}))),
        )
        .with_requires(["ReviewsResearch", "TrendsResearch"])])
        .expect("valid phase")
        .phase(vec![StageDescriptor::new(
            "VideoGen",
            Arc::new(StaticStage::new(json!({"video": "out.mp4"}))),
        )
        .with_require("ScriptWriter")])
        .expect("valid phase")
        .build()
        .expect("valid plan")
}

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");

    c.bench_function("plan_build", |b| {
        b.iter(|| black_box(three_phase_plan()));
    });

    c.bench_function("three_phase_run", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let report = run_pipeline(three_phase_plan(), RunConfig::new("bench product"))
                    .await
                    .expect("run succeeds");
                black_box(report)
            })
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
