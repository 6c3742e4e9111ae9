//! Early stopping on a validation metric.

/// What the training loop should do after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyStopAction {
    /// New best value.
    Improved,
    /// No improvement, still within patience.
    Continue,
    /// Patience exhausted.
    Stop,
}

/// Tracks the best value of a metric and signals when it stops improving.
///
/// A patience of 0 disables stopping; the best round is still tracked.
///
/// # Example
///
/// ```
/// use glmix::training::{EarlyStopAction, EarlyStopping};
///
/// // lower is better
/// let mut early_stop = EarlyStopping::new(2, false);
/// assert_eq!(early_stop.update(0.5), EarlyStopAction::Improved);
/// assert_eq!(early_stop.update(0.6), EarlyStopAction::Continue);
/// assert_eq!(early_stop.update(0.7), EarlyStopAction::Stop);
/// assert_eq!(early_stop.best_round(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_value: Option<f64>,
    best_round: usize,
    current_round: usize,
    higher_is_better: bool,
}

impl EarlyStopping {
    pub fn new(patience: usize, higher_is_better: bool) -> Self {
        Self {
            patience,
            best_value: None,
            best_round: 0,
            current_round: 0,
            higher_is_better,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.patience > 0
    }

    /// Record the value of the current round.
    ///
    /// `NaN` never counts as an improvement.
    pub fn update(&mut self, value: f64) -> EarlyStopAction {
        let improved = match self.best_value {
            _ if value.is_nan() => false,
            None => true,
            Some(best) if self.higher_is_better => value > best,
            Some(best) => value < best,
        };

        let round = self.current_round;
        self.current_round += 1;

        if improved {
            self.best_value = Some(value);
            self.best_round = round;
            EarlyStopAction::Improved
        } else if self.is_enabled() && self.current_round - self.best_round > self.patience {
            EarlyStopAction::Stop
        } else {
            EarlyStopAction::Continue
        }
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    pub fn best_round(&self) -> usize {
        self.best_round
    }

    pub fn current_round(&self) -> usize {
        self.current_round
    }

    pub fn reset(&mut self) {
        self.best_value = None;
        self.best_round = 0;
        self.current_round = 0;
    }
}
