//! Trial records and their lifecycle.
use crate::search_space::ParamValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Whether the objective is minimized or maximized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Lower objective values are better.
    Minimize,

    /// Higher objective values are better.
    Maximize,
}

impl Direction {
    /// Returns a sort key under which lower is always better.
    pub(crate) fn key(self, value: f64) -> f64 {
        match self {
            Self::Minimize => value,
            Self::Maximize => -value,
        }
    }
}

/// Lifecycle state of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    /// Proposed by ask and not yet told.
    Running,

    /// Told with an objective value.
    Complete,

    /// Told as failed.
    Fail,

    /// Told as pruned after intermediate reports.
    Pruned,
}

impl TrialState {
    /// Returns `true` once a trial can no longer transition.
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

/// One evaluation record of a study.
///
/// Trials are created by ask in the `Running` state and transition exactly
/// once to `Complete`, `Fail` or `Pruned` through tell. Clones share the
/// intermediate-value map, so a worker can keep calling [`Trial::report`]
/// on its copy while the study owns the registered original.
#[derive(Debug, Clone)]
pub struct Trial {
    /// Study-unique, monotonically increasing trial number.
    pub number: u64,

    /// Sampled parameter assignment, keyed by parameter name.
    pub params: HashMap<String, ParamValue>,

    /// Current lifecycle state.
    pub state: TrialState,

    /// Single objective value, if told.
    ///
    /// For multi-objective trials this mirrors `values[0]` for backward
    /// compatibility. Prefer `values` on multi-objective studies.
    pub value: Option<f64>,

    /// Objective vector, if told on a multi-objective study.
    pub values: Option<Vec<f64>>,

    /// Constraint evaluations recorded at tell time, if a constraint
    /// function is set.
    pub constraint_values: Option<Vec<f64>>,

    intermediate: Arc<Mutex<BTreeMap<u64, f64>>>,
}

impl Trial {
    pub(crate) fn new(number: u64, params: HashMap<String, ParamValue>) -> Self {
        Self {
            number,
            params,
            state: TrialState::Running,
            value: None,
            values: None,
            constraint_values: None,
            intermediate: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Records an intermediate objective value at `step`.
    ///
    /// Safe to call from evaluation threads without any study lock;
    /// reporting the same step twice keeps the last value.
    pub fn report(&self, step: u64, value: f64) {
        self.intermediate
            .lock()
            .expect("poisoned intermediate map")
            .insert(step, value);
    }

    /// Returns a snapshot of the reported intermediate values.
    pub fn intermediate_values(&self) -> BTreeMap<u64, f64> {
        self.intermediate
            .lock()
            .expect("poisoned intermediate map")
            .clone()
    }

    /// Returns the intermediate value reported at `step`, if any.
    pub fn intermediate_value_at(&self, step: u64) -> Option<f64> {
        self.intermediate
            .lock()
            .expect("poisoned intermediate map")
            .get(&step)
            .copied()
    }

    /// Returns the highest step reported so far, if any.
    pub fn last_step(&self) -> Option<u64> {
        self.intermediate
            .lock()
            .expect("poisoned intermediate map")
            .keys()
            .next_back()
            .copied()
    }

    pub(crate) fn replay_intermediate(&self, values: &BTreeMap<u64, f64>) {
        let mut map = self.intermediate.lock().expect("poisoned intermediate map");
        for (&step, &value) in values {
            map.insert(step, value);
        }
    }

    /// Returns `true` if the single objective value is present and finite.
    pub(crate) fn has_finite_value(&self) -> bool {
        self.value.map_or(false, f64::is_finite)
    }

    /// Returns `true` if the objective vector is present, has length
    /// `n_objectives` and is entirely finite.
    pub(crate) fn has_finite_values(&self, n_objectives: usize) -> bool {
        self.values
            .as_ref()
            .map_or(false, |vs| vs.len() == n_objectives && vs.iter().all(|v| v.is_finite()))
    }
}

impl PartialEq for Trial {
    fn eq(&self, other: &Self) -> bool {
        let intermediate_eq = Arc::ptr_eq(&self.intermediate, &other.intermediate)
            || self.intermediate_values() == other.intermediate_values();
        self.number == other.number
            && self.params == other.params
            && self.state == other.state
            && self.value == other.value
            && self.values == other.values
            && self.constraint_values == other.constraint_values
            && intermediate_eq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_is_last_writer_wins() {
        let trial = Trial::new(0, HashMap::new());
        trial.report(3, 0.5);
        trial.report(3, 0.25);
        trial.report(1, 1.0);
        assert_eq!(trial.intermediate_value_at(3), Some(0.25));
        assert_eq!(trial.last_step(), Some(3));
        assert_eq!(trial.intermediate_values().len(), 2);
    }

    #[test]
    fn clones_share_the_intermediate_map() {
        let trial = Trial::new(0, HashMap::new());
        let copy = trial.clone();
        copy.report(0, 7.0);
        assert_eq!(trial.intermediate_value_at(0), Some(7.0));
    }

    #[test]
    fn report_works_across_threads() {
        let trial = Trial::new(0, HashMap::new());
        let worker = trial.clone();
        let handle = std::thread::spawn(move || {
            for step in 0..100 {
                worker.report(step, step as f64);
            }
        });
        handle.join().unwrap();
        assert_eq!(trial.intermediate_values().len(), 100);
    }

    #[test]
    fn direction_key_orders_both_ways() {
        assert!(Direction::Minimize.key(1.0) < Direction::Minimize.key(2.0));
        assert!(Direction::Maximize.key(2.0) < Direction::Maximize.key(1.0));
    }
}
