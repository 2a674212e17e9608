//! Benchmarks the priority-queue dispatch path of the agent coordinator
//! (§4.8): submission-to-completion latency for a batch of jobs at a
//! fixed pool size, across a few queue depths and priority distributions.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use orchestrator_core::services::{job, AgentCoordinator, ScalingConfig};

async fn drain_batch(pool_size: usize, batch_size: usize) {
    let config = ScalingConfig {
        min_agents: pool_size,
        max_agents: pool_size,
        monitoring_interval: Duration::from_secs(3600),
        ..ScalingConfig::default()
    };
    let coordinator = AgentCoordinator::start(config);

    let mut handles = Vec::with_capacity(batch_size);
    for i in 0..batch_size {
        let priority = (i % 5) as i32;
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .run(
                    format!("bench-job-{i}"),
                    priority,
                    Duration::from_secs(5),
                    job(|_cancel| async { Ok(serde_json::json!({ "i": i })) }),
                )
                .await
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

fn bench_drain_batch(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("coordinator_drain_batch");
    for (pool_size, batch_size) in [(2usize, 20usize), (4, 50), (8, 100)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{pool_size}workers_{batch_size}jobs")),
            &(pool_size, batch_size),
            |b, &(pool_size, batch_size)| {
                b.to_async(&runtime).iter(|| drain_batch(pool_size, batch_size));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_drain_batch);
criterion_main!(benches);
