//! Per-round down-sampling of training data.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::TrainingData;
use crate::error::ConfigError;
use crate::model::TaskType;

/// How examples are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownSamplerType {
    /// Keep every example with probability `rate`.
    Default,
    /// Keep every positive; keep negatives with probability `rate` and
    /// up-weight the kept ones by `1 / rate`.
    BinaryClassification,
}

/// A Bernoulli down-sampler that is deterministic per `(seed, round)`.
///
/// Every objective evaluation within one round sees the same sample; the
/// sample changes from one round to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownSampler {
    kind: DownSamplerType,
    rate: f64,
    seed: u64,
}

impl DownSampler {
    pub fn new(kind: DownSamplerType, rate: f64, seed: u64) -> Result<Self, ConfigError> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(ConfigError::InvalidSamplingRate(rate));
        }
        Ok(Self { kind, rate, seed })
    }

    /// Binary tasks keep all positives; regression tasks sample uniformly.
    pub fn for_task(task: TaskType, rate: f64, seed: u64) -> Result<Self, ConfigError> {
        let kind = if task.is_binary_classification() {
            DownSamplerType::BinaryClassification
        } else {
            DownSamplerType::Default
        };
        Self::new(kind, rate, seed)
    }

    pub fn kind(&self) -> DownSamplerType {
        self.kind
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// The sample for `round`.
    pub fn sample(&self, data: &TrainingData, round: usize) -> TrainingData {
        if self.rate >= 1.0 {
            return data.clone();
        }

        let stream = self.seed ^ (round as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(stream);

        let points = data
            .points()
            .iter()
            .filter_map(|p| {
                // Draw for every example so the stream position does not depend on labels.
                let keep = rng.gen::<f64>() < self.rate;
                match self.kind {
                    DownSamplerType::Default => keep.then(|| p.clone()),
                    DownSamplerType::BinaryClassification if p.label() > 0.5 => Some(p.clone()),
                    DownSamplerType::BinaryClassification => keep.then(|| p.reweighted(1.0 / self.rate)),
                }
            })
            .collect();

        TrainingData::new_unchecked(points, data.dimension())
    }
}
