//! Evaluator behavior against GAME datasets.

use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use rstest::rstest;

use glmix::data::ShardInfo;
use glmix::evaluation::{EvaluationData, EvaluationSuite, EvaluatorType};
use glmix::testing::{mixed_effect_dataset, ENTITY_ID_TYPE};
use glmix::{GameDataset, GameDatum, GameError, Scores, SparseVector, TaskType};

fn all_binary_evaluators() -> Vec<EvaluatorType> {
    [
        "AUC",
        "RMSE",
        "LOGISTIC_LOSS",
        "SMOOTHED_HINGE_LOSS",
        "SQUARED_LOSS",
        "AUC:userId",
        "PRECISION@3:userId",
    ]
    .iter()
    .map(|s| s.parse().unwrap())
    .collect()
}

fn wavy_scores(n: usize) -> Scores {
    Scores::from_vec((0..n).map(|i| (i as f64 * 0.7).sin() * 2.0).collect())
}

#[test]
fn repeated_evaluation_is_bit_identical() {
    let data = mixed_effect_dataset(TaskType::LogisticRegression, 6, 20, 2, 3).unwrap();
    let evaluators = all_binary_evaluators();
    let suite = EvaluationSuite::new(evaluators.clone(), &data).unwrap();
    let scores = wavy_scores(data.len());

    let first = suite.evaluate(&scores).unwrap();
    for _ in 0..5 {
        let again = suite.evaluate(&scores).unwrap();
        for (a, b) in first.values().iter().zip(again.values()) {
            assert_eq!(a.value.to_bits(), b.value.to_bits(), "{} changed", a.evaluator);
        }
    }
    assert_eq!(first.values().len(), evaluators.len());
}

#[test]
fn perfect_ranking_has_unit_auc() {
    let data = mixed_effect_dataset(TaskType::LogisticRegression, 3, 30, 1, 11).unwrap();
    let labels = data.responses();
    let scores = Scores::from_vec(labels.iter().map(|&y| if y > 0.5 { 1.0 } else { -1.0 }).collect());
    let evaluation = EvaluationData::from_dataset(&data, &[EvaluatorType::Auc]).unwrap();

    assert_abs_diff_eq!(EvaluatorType::Auc.evaluate(&scores, &evaluation).unwrap(), 1.0);
    let reversed = Scores::from_vec(scores.view().iter().map(|s| -s).collect());
    assert_abs_diff_eq!(EvaluatorType::Auc.evaluate(&reversed, &evaluation).unwrap(), 0.0);
}

#[test]
fn offsets_enter_the_margin() {
    let shard = "x";
    let data = GameDataset::new(
        vec![
            GameDatum::new(1.0)
                .with_offset(0.5)
                .with_features(shard, SparseVector::new([(0, 1.0)]).unwrap()),
            GameDatum::new(3.0).with_features(shard, SparseVector::new([(0, 1.0)]).unwrap()),
        ],
        BTreeMap::from([(shard.to_string(), ShardInfo::new(1))]),
    )
    .unwrap();
    let suite = EvaluationSuite::new(vec![EvaluatorType::Rmse], &data).unwrap();

    // margins 1.0 and 3.0 match the labels exactly
    let results = suite.evaluate(&Scores::from_vec(vec![0.5, 3.0])).unwrap();
    assert_abs_diff_eq!(results.primary().value, 0.0, epsilon = 1e-12);
}

#[test]
fn missing_scores_fall_back_to_default() {
    let data = mixed_effect_dataset(TaskType::LinearRegression, 2, 5, 1, 4).unwrap();
    let suite = EvaluationSuite::new(vec![EvaluatorType::SquaredLoss], &data)
        .unwrap()
        .with_default_score(0.0);
    let mut values = vec![0.0; data.len()];
    values[0] = f64::NAN;

    let with_nan = suite.evaluate(&Scores::from_vec(values)).unwrap();
    let with_zero = suite.evaluate(&Scores::zeros(data.len())).unwrap();
    assert_eq!(with_nan.primary().value, with_zero.primary().value);
}

#[test]
fn sharded_evaluator_needs_its_id_type() {
    let data = mixed_effect_dataset(TaskType::LogisticRegression, 2, 5, 1, 4).unwrap();
    let err = EvaluationSuite::new(
        vec![EvaluatorType::ShardedAuc {
            id_type: "itemId".into(),
        }],
        &data,
    )
    .unwrap_err();
    assert!(matches!(err, GameError::MissingIdType { .. }));

    let ok = EvaluationSuite::new(
        vec![EvaluatorType::ShardedAuc {
            id_type: ENTITY_ID_TYPE.into(),
        }],
        &data,
    );
    assert!(ok.is_ok());
}

#[rstest]
#[case::auc(EvaluatorType::Auc, 0.9, 0.8, true)]
#[case::rmse(EvaluatorType::Rmse, 0.8, 0.9, true)]
#[case::log_loss(EvaluatorType::LogisticLoss, 10.0, 12.0, true)]
#[case::equal(EvaluatorType::Rmse, 0.8, 0.8, false)]
fn better_than_follows_direction(
    #[case] evaluator: EvaluatorType,
    #[case] candidate: f64,
    #[case] incumbent: f64,
    #[case] expected: bool,
) {
    assert_eq!(evaluator.better_than(candidate, incumbent), expected);
}

#[rstest]
#[case(TaskType::LogisticRegression, EvaluatorType::Auc)]
#[case(TaskType::LinearRegression, EvaluatorType::Rmse)]
#[case(TaskType::PoissonRegression, EvaluatorType::PoissonLoss)]
#[case(TaskType::SmoothedHingeLossLinearSvm, EvaluatorType::Auc)]
fn default_evaluator_per_task(#[case] task: TaskType, #[case] expected: EvaluatorType) {
    assert_eq!(task.default_evaluator(), expected);
    assert!(expected.check_task(task).is_ok());
}
