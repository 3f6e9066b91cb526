//! Early-stopping hooks keyed on intermediate values.
use crate::trial::{Direction, Trial, TrialState};
use ordered_float::OrderedFloat;

/// Decides whether a running trial should be stopped early.
///
/// Pruning is advisory: the caller consults [`Pruner::should_prune`]
/// between intermediate reports and, on `true`, tells the trial as
/// `Pruned`.
pub trait Pruner: Send {
    /// Returns `true` if `trial` looks unpromising given the study history.
    fn should_prune(&self, trial: &Trial, trials: &[Trial], direction: Direction) -> bool;
}

/// A pruner that never prunes.
#[derive(Debug, Default)]
pub struct NopPruner;

impl Pruner for NopPruner {
    fn should_prune(&self, _trial: &Trial, _trials: &[Trial], _direction: Direction) -> bool {
        false
    }
}

/// Prunes trials whose most recent intermediate value is worse than the
/// median of the Complete trials' values at the same step.
#[derive(Debug)]
pub struct MedianPruner {
    min_trials: usize,
}

impl MedianPruner {
    /// Makes a new `MedianPruner` requiring the default of 5 Complete
    /// trials before pruning.
    pub fn new() -> Self {
        Self { min_trials: 5 }
    }

    /// Makes a new `MedianPruner` requiring at least `min_trials` Complete
    /// trials to have reported at the step under comparison.
    pub fn with_min_trials(min_trials: usize) -> Self {
        Self { min_trials }
    }
}

impl Default for MedianPruner {
    fn default() -> Self {
        Self::new()
    }
}

impl Pruner for MedianPruner {
    fn should_prune(&self, trial: &Trial, trials: &[Trial], direction: Direction) -> bool {
        let step = match trial.last_step() {
            Some(step) => step,
            None => return false,
        };
        let current = match trial.intermediate_value_at(step) {
            Some(value) => value,
            None => return false,
        };

        let mut completed_at_step: Vec<f64> = trials
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .filter_map(|t| t.intermediate_value_at(step))
            .collect();
        if completed_at_step.len() < self.min_trials {
            return false;
        }

        completed_at_step.sort_by_key(|&v| OrderedFloat(v));
        let n = completed_at_step.len();
        let median = if n % 2 == 1 {
            completed_at_step[n / 2]
        } else {
            (completed_at_step[n / 2 - 1] + completed_at_step[n / 2]) / 2.0
        };

        direction.key(current) > direction.key(median)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete_with_report(number: u64, step: u64, value: f64) -> Trial {
        let mut trial = Trial::new(number, HashMap::new());
        trial.state = TrialState::Complete;
        trial.value = Some(value);
        trial.report(step, value);
        trial
    }

    #[test]
    fn nop_never_prunes() {
        let trial = Trial::new(0, HashMap::new());
        trial.report(0, 100.0);
        assert!(!NopPruner.should_prune(&trial, &[], Direction::Minimize));
    }

    #[test]
    fn prunes_worse_than_median() {
        let history: Vec<Trial> = (0..5)
            .map(|i| complete_with_report(i, 1, i as f64))
            .collect();

        let bad = Trial::new(10, HashMap::new());
        bad.report(1, 10.0);
        let good = Trial::new(11, HashMap::new());
        good.report(1, 0.5);

        let pruner = MedianPruner::new();
        assert!(pruner.should_prune(&bad, &history, Direction::Minimize));
        assert!(!pruner.should_prune(&good, &history, Direction::Minimize));

        // Worse flips with the direction.
        assert!(!pruner.should_prune(&bad, &history, Direction::Maximize));
        assert!(pruner.should_prune(&good, &history, Direction::Maximize));
    }

    #[test]
    fn requires_enough_history() {
        let history: Vec<Trial> = (0..4)
            .map(|i| complete_with_report(i, 1, i as f64))
            .collect();
        let bad = Trial::new(10, HashMap::new());
        bad.report(1, 10.0);
        assert!(!MedianPruner::new().should_prune(&bad, &history, Direction::Minimize));
        assert!(MedianPruner::with_min_trials(4).should_prune(
            &bad,
            &history,
            Direction::Minimize
        ));
    }

    #[test]
    fn compares_at_the_latest_reported_step() {
        let history: Vec<Trial> = (0..5)
            .map(|i| {
                let t = complete_with_report(i, 1, i as f64);
                t.report(2, 100.0);
                t
            })
            .collect();
        // Worse than the step-1 median but better than the step-2 one; only
        // the trial's own latest step (2) counts.
        let trial = Trial::new(10, HashMap::new());
        trial.report(1, 10.0);
        trial.report(2, 50.0);
        assert!(!MedianPruner::new().should_prune(&trial, &history, Direction::Minimize));
    }

    #[test]
    fn no_reports_means_no_pruning() {
        let trial = Trial::new(0, HashMap::new());
        assert!(!MedianPruner::new().should_prune(&trial, &[], Direction::Minimize));
    }
}
