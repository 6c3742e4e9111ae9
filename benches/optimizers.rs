//! Optimizer benchmarks for glmix.
//!
//! Benchmarks cover:
//! - LBFGS vs TRON on the same GLM problem
//! - Partitioned vs single-node objectives
//! - Sequential vs parallel partition aggregation
//!
//! # Running benchmarks
//!
//! ```bash
//! cargo bench --bench optimizers
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use glmix::data::{FixedEffectDataset, NormalizationContext, Scores, TrainingData};
use glmix::optimization::{
    DistributedOptimizationProblem, GlmOptimizationConfig, OptimizerConfig, OptimizerType,
    SingleNodeOptimizationProblem, VarianceComputationType,
};
use glmix::function::RegularizationContext;
use glmix::testing::{fixed_effect_dataset, GLOBAL_SHARD};
use glmix::{Parallelism, TaskType};

// =============================================================================
// Benchmark Data Setup
// =============================================================================

fn training_data(task: TaskType, n: usize, dimension: usize) -> TrainingData {
    let dataset = fixed_effect_dataset(task, n, dimension, 42).unwrap();
    let fixed = FixedEffectDataset::new(&dataset, GLOBAL_SHARD).unwrap();
    fixed.with_residual(&Scores::zeros(n)).unwrap()
}

fn glm_config(optimizer_type: OptimizerType) -> GlmOptimizationConfig {
    GlmOptimizationConfig::builder()
        .optimizer(
            OptimizerConfig::builder()
                .optimizer_type(optimizer_type)
                .tolerance(1e-6)
                .max_iterations(50)
                .build()
                .unwrap(),
        )
        .regularization(RegularizationContext::l2())
        .regularization_weight(1.0)
        .build()
        .unwrap()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_optimizer_types(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizers/single_node");
    group.sample_size(20);

    for n in [1_000usize, 10_000] {
        let data = training_data(TaskType::LogisticRegression, n, 20);
        group.throughput(Throughput::Elements(n as u64));
        for optimizer_type in [OptimizerType::Lbfgs, OptimizerType::Tron] {
            let config = glm_config(optimizer_type);
            group.bench_with_input(BenchmarkId::new(optimizer_type.to_string(), n), &data, |b, data| {
                b.iter(|| {
                    let mut problem = SingleNodeOptimizationProblem::single_node(
                        &config,
                        TaskType::LogisticRegression,
                        VarianceComputationType::None,
                    )
                    .unwrap();
                    black_box(problem.run(data, 0).unwrap())
                })
            });
        }
    }
    group.finish();
}

fn bench_partitioned_objective(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimizers/partitioned");
    group.sample_size(20);

    let n = 20_000;
    let data = training_data(TaskType::LogisticRegression, n, 50);
    let config = glm_config(OptimizerType::Lbfgs);
    group.throughput(Throughput::Elements(n as u64));

    for (name, parallelism) in [("sequential", Parallelism::Sequential), ("parallel", Parallelism::Parallel)] {
        for n_partitions in [1usize, 8, 32] {
            group.bench_with_input(BenchmarkId::new(name, n_partitions), &data, |b, data| {
                b.iter(|| {
                    let mut problem = DistributedOptimizationProblem::distributed(
                        &config,
                        TaskType::LogisticRegression,
                        VarianceComputationType::None,
                        Arc::new(NormalizationContext::identity()),
                        Some(n_partitions),
                        2,
                        parallelism,
                    )
                    .unwrap();
                    black_box(problem.run(data, 0).unwrap())
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_optimizer_types, bench_partitioned_objective);
criterion_main!(benches);
