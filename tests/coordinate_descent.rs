//! End-to-end coordinate descent over fixed, random and factored coordinates.

use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;

use glmix::coordinate::{
    Coordinate, CoordinateConfig, FactoredRandomEffectConfig, FixedEffectConfig, RandomEffectConfig,
};
use glmix::data::ShardInfo;
use glmix::evaluation::EvaluatorType;
use glmix::function::RegularizationContext;
use glmix::optimization::{GlmOptimizationConfig, OptimizerConfig};
use glmix::testing::{assert_slice_approx_eq, mixed_effect_dataset, ENTITY_ID_TYPE, ENTITY_SHARD, GLOBAL_SHARD};
use glmix::training::{CoordinateDescent, CoordinateDescentState, GameEstimator, GameTrainingConfig, Verbosity};
use glmix::{GameDataset, GameDatum, Parallelism, SparseVector, TaskType};

fn l2(weight: f64) -> GlmOptimizationConfig {
    GlmOptimizationConfig::builder()
        .optimizer(OptimizerConfig::builder().tolerance(1e-9).build().unwrap())
        .regularization(RegularizationContext::l2())
        .regularization_weight(weight)
        .build()
        .unwrap()
}

fn fixed(weight: f64) -> CoordinateConfig {
    FixedEffectConfig::builder()
        .feature_shard_id(GLOBAL_SHARD)
        .optimization(l2(weight))
        .build()
        .unwrap()
        .into()
}

fn random(weight: f64) -> RandomEffectConfig {
    RandomEffectConfig::builder()
        .random_effect_type(ENTITY_ID_TYPE)
        .feature_shard_id(ENTITY_SHARD)
        .optimization(l2(weight))
        .build()
        .unwrap()
}

fn mixed_config(task: TaskType, n_rounds: usize) -> GameTrainingConfig {
    GameTrainingConfig::builder()
        .task(task)
        .coordinates(BTreeMap::from([
            ("global".to_string(), fixed(0.1)),
            ("per-user".to_string(), random(1.0).into()),
        ]))
        .update_sequence(vec!["global".into(), "per-user".into()])
        .n_rounds(n_rounds)
        .tolerance(1e-9)
        .build()
        .unwrap()
}

#[test]
fn separable_logistic_fixed_effect_converges() {
    let shard = "x";
    let data = GameDataset::new(
        vec![
            GameDatum::new(1.0).with_features(shard, SparseVector::new([(0, 1.0)]).unwrap()),
            GameDatum::new(0.0).with_features(shard, SparseVector::new([(0, -1.0)]).unwrap()),
        ],
        BTreeMap::from([(shard.to_string(), ShardInfo::new(1))]),
    )
    .unwrap();

    let optimization = GlmOptimizationConfig::builder()
        .optimizer(OptimizerConfig::builder().tolerance(1e-9).max_iterations(1000).build().unwrap())
        .build()
        .unwrap();
    let config = GameTrainingConfig::builder()
        .task(TaskType::LogisticRegression)
        .coordinates(BTreeMap::from([(
            "fixed".to_string(),
            FixedEffectConfig::builder()
                .feature_shard_id(shard)
                .optimization(optimization)
                .build()
                .unwrap()
                .into(),
        )]))
        .update_sequence(vec!["fixed".into()])
        .evaluators(vec![EvaluatorType::LogisticLoss])
        .build()
        .unwrap();

    let mut driver = CoordinateDescent::new(config, &data, Parallelism::Sequential).unwrap();
    let result = driver.run(&data, None).unwrap();

    let log_loss = result.history[0].training.primary().value;
    assert!(log_loss < 1e-6, "log-loss {log_loss}");

    let Some(Coordinate::FixedEffect(coordinate)) = driver.coordinate("fixed") else {
        panic!("fixed coordinate missing");
    };
    let tracker = coordinate.problem().states_tracker().unwrap();
    assert!(tracker.converged());
    assert!(tracker.iterations() <= 1000);
}

#[test]
fn random_effect_sees_this_rounds_fixed_effect() {
    let data = mixed_effect_dataset(TaskType::LinearRegression, 4, 25, 2, 17).unwrap();
    let config = mixed_config(TaskType::LinearRegression, 1);
    let settings = config.coordinate_settings(Parallelism::Sequential);

    let mut driver = CoordinateDescent::new(config.clone(), &data, Parallelism::Sequential).unwrap();
    let result = driver.run(&data, None).unwrap();
    let trained_random = result.model.get("per-user").unwrap();

    // Replay the random-effect update against the updated fixed-effect scores.
    let fixed_scores = result.model.get("global").unwrap().score(&data).unwrap();
    let mut replay = Coordinate::from_dataset("per-user", &data, &config.coordinates["per-user"], &settings).unwrap();
    let initial = replay.initial_model();
    let (replayed, _) = replay.update_model(&initial, &fixed_scores, 0).unwrap();
    let expected = replay.score(&replayed).unwrap();
    let actual = replay.score(trained_random).unwrap();
    assert_slice_approx_eq(actual.view(), expected.view(), 1e-6, "random-effect scores");

    // Against the pre-round (zero) fixed effect the update would differ.
    let mut stale = Coordinate::from_dataset("per-user", &data, &config.coordinates["per-user"], &settings).unwrap();
    let zeros = glmix::Scores::zeros(data.len());
    let (stale_model, stale_scores) = stale.update_model(&initial, &zeros, 0).unwrap();
    assert_ne!(&stale_model, trained_random);
    let max_gap = stale_scores
        .view()
        .iter()
        .zip(actual.view().iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(max_gap > 1e-6);
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn mixed_logistic_model_trains_and_validates() {
    init_logging();
    let train = mixed_effect_dataset(TaskType::LogisticRegression, 8, 60, 3, 5).unwrap();
    let valid = mixed_effect_dataset(TaskType::LogisticRegression, 8, 60, 3, 5).unwrap();
    let mut config = mixed_config(TaskType::LogisticRegression, 3);
    config.verbosity = Verbosity::Debug;
    config.evaluators = vec![
        EvaluatorType::Auc,
        EvaluatorType::LogisticLoss,
        EvaluatorType::ShardedAuc {
            id_type: ENTITY_ID_TYPE.into(),
        },
    ];

    let mut driver = CoordinateDescent::new(config, &train, Parallelism::Parallel).unwrap();
    let result = driver.run(&train, Some(&valid)).unwrap();

    assert!(result.state.is_terminal());
    assert_eq!(driver.state(), result.state);
    assert!(!result.history.is_empty());
    let best = result.best_summary().unwrap();
    let auc = best.validation.as_ref().unwrap().primary().value;
    assert!(auc > 0.6, "validation AUC {auc}");
    for summary in &result.history {
        assert_eq!(summary.training.values().len(), 3);
        assert!(summary.training_objective.is_finite());
    }
    assert_eq!(result.best_model, best.model);
}

#[test]
fn factored_random_effect_trains_alongside_fixed_effect() {
    let data = mixed_effect_dataset(TaskType::LinearRegression, 5, 30, 2, 23).unwrap();
    let factored = FactoredRandomEffectConfig::builder()
        .random_effect(random(1.0))
        .latent_factor(l2(1.0))
        .latent_dim(1)
        .inner_iterations(2)
        .build()
        .unwrap();
    let config = GameTrainingConfig::builder()
        .task(TaskType::LinearRegression)
        .coordinates(BTreeMap::from([
            ("global".to_string(), fixed(0.1)),
            ("factored".to_string(), factored.into()),
        ]))
        .update_sequence(vec!["global".into(), "factored".into()])
        .n_rounds(2)
        .tolerance(1e-9)
        .build()
        .unwrap();

    let mut driver = CoordinateDescent::new(config, &data, Parallelism::Parallel).unwrap();
    let result = driver.run(&data, None).unwrap();
    assert_eq!(result.model.len(), 2);

    let scores = result.model.score(&data).unwrap();
    assert_eq!(scores.len(), data.len());
    assert!(scores.view().iter().all(|s| s.is_finite()));
}

#[test]
fn stopping_early_ends_in_converged_state() {
    let train = mixed_effect_dataset(TaskType::LinearRegression, 4, 20, 2, 31).unwrap();
    let valid = mixed_effect_dataset(TaskType::LinearRegression, 4, 20, 2, 32).unwrap();
    init_logging();
    let mut config = mixed_config(TaskType::LinearRegression, 30);
    config.verbosity = Verbosity::Info;
    config.early_stopping_rounds = Some(1);
    config.tolerance = 1e-4;

    let result = CoordinateDescent::new(config, &train, Parallelism::Parallel)
        .unwrap()
        .run(&train, Some(&valid))
        .unwrap();
    match result.state {
        CoordinateDescentState::Converged { round } => assert_eq!(round + 1, result.rounds_run()),
        other => panic!("expected convergence, got {other:?}"),
    }
    assert!(result.rounds_run() < 30);
}

#[test]
fn estimator_returns_one_result_per_config() {
    let train = mixed_effect_dataset(TaskType::LinearRegression, 4, 30, 2, 41).unwrap();
    let mut fixed_only = mixed_config(TaskType::LinearRegression, 1);
    fixed_only.update_sequence = vec!["global".into()];
    let configs = [fixed_only, mixed_config(TaskType::LinearRegression, 2)];

    let results = GameEstimator::new().fit(&train, Some(&train), &configs).unwrap();
    assert_eq!(results.len(), 2);
    for result in &results {
        assert!(result.evaluation.is_some());
    }
    let best = GameEstimator::select_best(&results).unwrap();
    assert_eq!(best.model.len(), 2);
    let rmse = best.evaluation.as_ref().unwrap().primary().value;
    assert_abs_diff_eq!(rmse, best.training.best_summary().unwrap().validation.as_ref().unwrap().primary().value);
}

#[test]
fn convergence_follows_the_training_objective_not_auc() {
    let train = mixed_effect_dataset(TaskType::LogisticRegression, 8, 40, 3, 13).unwrap();
    let mut config = mixed_config(TaskType::LogisticRegression, 10);
    config.tolerance = 1e-5;
    assert_eq!(config.effective_evaluators()[0], EvaluatorType::Auc);

    let result = CoordinateDescent::new(config.clone(), &train, Parallelism::Sequential)
        .unwrap()
        .run(&train, None)
        .unwrap();

    let change = |round: usize| {
        let (previous, current) = (
            result.history[round - 1].training_objective,
            result.history[round].training_objective,
        );
        (previous - current).abs() / previous.abs().max(current.abs()).max(1.0)
    };
    let last = result.history.len() - 1;
    // Every round before the last moved the objective by at least the tolerance.
    for round in 1..last {
        assert!(change(round) >= config.tolerance, "round {round} stalled at {}", change(round));
    }
    if let CoordinateDescentState::Converged { round } = result.state {
        assert_eq!(round, last);
        assert!(change(round) < config.tolerance);
    }
}
