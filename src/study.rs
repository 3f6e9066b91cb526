//! The ask/tell study coordinator.
use crate::pruner::{NopPruner, Pruner};
use crate::sampler::{CmaEsSampler, RandomSampler, Sampler, TpeSampler};
use crate::search_space::{ParamValue, SearchSpace};
use crate::trial::{Direction, Trial, TrialState};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

type ConstraintFunc = Box<dyn Fn(&Trial) -> Vec<f64> + Send>;

/// One entry of a batched tell.
#[derive(Debug, Clone)]
pub enum TellResult {
    /// Complete with a single objective value.
    Complete(f64),

    /// Complete with an objective vector.
    CompleteMulti(Vec<f64>),

    /// The evaluation failed.
    Fail,

    /// The trial was pruned.
    Pruned,
}

struct StudyInner {
    trials: Vec<Trial>,
    index: HashMap<u64, usize>,
    next_number: u64,
    sampler: Box<dyn Sampler>,
    pruner: Box<dyn Pruner>,
    constraint_func: Option<ConstraintFunc>,
}

#[derive(Clone, Copy, PartialEq)]
enum ImportMode {
    /// Warm start: Complete trials only, renumbered from the counter.
    Renumber,

    /// Snapshot load: numbers and terminal states preserved.
    Preserve,
}

/// A named optimization run: the trial registry, its sampler, and the
/// ask/tell state machine.
///
/// All mutating operations and read queries serialize on one internal
/// mutex; read queries return defensive copies. Evaluation workers may
/// share a study across threads and keep calling [`Trial::report`] on
/// their trial copies without taking the study lock.
pub struct Study {
    name: String,
    space: SearchSpace,
    direction: Direction,
    directions: Option<Vec<Direction>>,
    inner: Mutex<StudyInner>,
}

impl Study {
    /// Makes a TPE-backed single-objective study.
    pub fn new(name: &str, space: SearchSpace, direction: Direction) -> Self {
        Self::builder(name, space)
            .direction(direction)
            .build()
            .expect("unreachable")
    }

    /// Makes a random-search study.
    pub fn random(name: &str, space: SearchSpace, direction: Direction) -> Self {
        Self::builder(name, space)
            .direction(direction)
            .sampler(Box::new(RandomSampler::new()))
            .build()
            .expect("unreachable")
    }

    /// Makes a TPE-backed study.
    pub fn tpe(name: &str, space: SearchSpace, direction: Direction) -> Self {
        Self::builder(name, space)
            .direction(direction)
            .sampler(Box::new(TpeSampler::new()))
            .build()
            .expect("unreachable")
    }

    /// Makes a CMA-ES-backed study.
    pub fn cma_es(name: &str, space: SearchSpace, direction: Direction) -> Self {
        Self::builder(name, space)
            .direction(direction)
            .sampler(Box::new(CmaEsSampler::new()))
            .build()
            .expect("unreachable")
    }

    /// Makes a TPE-backed multi-objective study.
    ///
    /// Fails on an empty directions vector.
    pub fn multi_objective(
        name: &str,
        space: SearchSpace,
        directions: Vec<Direction>,
    ) -> Result<Self, StudyError> {
        Self::builder(name, space).directions(directions).build()
    }

    /// Makes a [`StudyBuilder`] for full control over the configuration.
    pub fn builder(name: &str, space: SearchSpace) -> StudyBuilder {
        StudyBuilder::new(name, space)
    }

    /// Returns the study name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the search space.
    pub fn search_space(&self) -> &SearchSpace {
        &self.space
    }

    /// Returns the single-objective direction.
    ///
    /// On multi-objective studies this is the first direction, kept for
    /// backward compatibility with single-objective queries.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the directions vector of a multi-objective study, or `None`.
    pub fn directions(&self) -> Option<&[Direction]> {
        self.directions.as_deref()
    }

    fn lock(&self) -> MutexGuard<StudyInner> {
        self.inner.lock().expect("poisoned study lock")
    }

    /// Proposes a new trial and registers it in state `Running`.
    ///
    /// On an empty search space the trial carries an empty assignment.
    pub fn ask(&self) -> Trial {
        let mut inner = self.lock();
        self.ask_locked(&mut inner)
    }

    /// Proposes `n` trials in a single critical section.
    ///
    /// Samplers with batch support amortize their per-call state over the
    /// whole batch.
    pub fn ask_batch(&self, n: usize) -> Vec<Trial> {
        let mut inner = self.lock();
        let StudyInner {
            trials, sampler, ..
        } = &mut *inner;
        let assignments: Vec<HashMap<String, ParamValue>> = match &self.directions {
            Some(directions) => (0..n)
                .map(|_| sampler.sample_multi_objective(trials, directions, &self.space))
                .collect(),
            None => sampler.sample_batch(trials, self.direction, &self.space, n),
        };
        debug!("ask_batch registered {} trials", assignments.len());
        assignments
            .into_iter()
            .map(|params| Self::register(&mut inner, params))
            .collect()
    }

    fn ask_locked(&self, inner: &mut StudyInner) -> Trial {
        let StudyInner {
            trials, sampler, ..
        } = inner;
        let params = match &self.directions {
            Some(directions) => sampler.sample_multi_objective(trials, directions, &self.space),
            None => sampler.sample(trials, self.direction, &self.space),
        };
        Self::register(inner, params)
    }

    fn register(inner: &mut StudyInner, params: HashMap<String, ParamValue>) -> Trial {
        let number = inner.next_number;
        inner.next_number += 1;
        let trial = Trial::new(number, params);
        inner.index.insert(number, inner.trials.len());
        inner.trials.push(trial.clone());
        trial
    }

    /// Completes a trial with a single objective value.
    ///
    /// Runs the constraint function, if set, and stores its result on the
    /// trial. Unknown numbers and trials already in a terminal state are
    /// errors.
    pub fn tell(&self, number: u64, value: f64) -> Result<(), StudyError> {
        let mut inner = self.lock();
        Self::complete_locked(&mut inner, number, value, None)
    }

    /// Completes a trial with an objective vector.
    ///
    /// Also mirrors `value = values[0]` so single-objective queries keep
    /// working on multi-objective studies; prefer `values` in new code.
    pub fn tell_multi(&self, number: u64, values: Vec<f64>) -> Result<(), StudyError> {
        if values.is_empty() {
            return Err(StudyError::EmptyValues);
        }
        let mut inner = self.lock();
        let value = values[0];
        Self::complete_locked(&mut inner, number, value, Some(values))
    }

    /// Transitions a trial to `Fail` or `Pruned`.
    ///
    /// `Running` and `Complete` are rejected; completing requires a value.
    pub fn tell_state(&self, number: u64, state: TrialState) -> Result<(), StudyError> {
        match state {
            TrialState::Running => return Err(StudyError::TellRunning),
            TrialState::Complete => return Err(StudyError::CompleteWithoutValue),
            TrialState::Fail | TrialState::Pruned => {}
        }
        let mut inner = self.lock();
        let i = Self::running_index(&inner, number)?;
        inner.trials[i].state = state;
        Ok(())
    }

    /// Applies a batch of results in one critical section.
    ///
    /// Entries naming unknown trial numbers or trials already in a
    /// terminal state are silently skipped, which keeps external replay
    /// and re-delivery idempotent. An entry with an empty objective
    /// vector is also skipped (logged at debug level); its trial stays
    /// `Running`.
    pub fn tell_batch(&self, results: &[(u64, TellResult)]) {
        let mut inner = self.lock();
        for (number, result) in results {
            if Self::running_index(&inner, *number).is_err() {
                continue;
            }
            match result {
                TellResult::Complete(value) => {
                    Self::complete_locked(&mut inner, *number, *value, None)
                        .expect("unreachable");
                }
                TellResult::CompleteMulti(values) => match values.first() {
                    Some(&value) => {
                        Self::complete_locked(&mut inner, *number, value, Some(values.clone()))
                            .expect("unreachable");
                    }
                    None => {
                        debug!(
                            "tell_batch skipping trial {}: empty objective vector",
                            number
                        );
                    }
                },
                TellResult::Fail => {
                    let i = Self::running_index(&inner, *number).expect("unreachable");
                    inner.trials[i].state = TrialState::Fail;
                }
                TellResult::Pruned => {
                    let i = Self::running_index(&inner, *number).expect("unreachable");
                    inner.trials[i].state = TrialState::Pruned;
                }
            }
        }
    }

    fn running_index(inner: &StudyInner, number: u64) -> Result<usize, StudyError> {
        let i = *inner
            .index
            .get(&number)
            .ok_or(StudyError::UnknownTrial { number })?;
        let state = inner.trials[i].state;
        if state.is_terminal() {
            return Err(StudyError::NotRunning { number, state });
        }
        Ok(i)
    }

    fn complete_locked(
        inner: &mut StudyInner,
        number: u64,
        value: f64,
        values: Option<Vec<f64>>,
    ) -> Result<(), StudyError> {
        let i = Self::running_index(inner, number)?;
        {
            let trial = &mut inner.trials[i];
            trial.state = TrialState::Complete;
            trial.value = Some(value);
            trial.values = values;
        }
        if let Some(constraint_func) = &inner.constraint_func {
            let constraints = constraint_func(&inner.trials[i]);
            inner.trials[i].constraint_values = Some(constraints);
        }
        Ok(())
    }

    /// Returns the best Complete trial with a finite value.
    ///
    /// Ties keep the earliest trial.
    pub fn best_trial(&self) -> Option<Trial> {
        let inner = self.lock();
        Self::best_of(&inner.trials, self.direction)
    }

    fn best_of(trials: &[Trial], direction: Direction) -> Option<Trial> {
        let mut best: Option<&Trial> = None;
        for trial in trials {
            if trial.state != TrialState::Complete || !trial.has_finite_value() {
                continue;
            }
            let better = best.map_or(true, |b| {
                direction.key(trial.value.expect("unreachable"))
                    < direction.key(b.value.expect("unreachable"))
            });
            if better {
                best = Some(trial);
            }
        }
        best.cloned()
    }

    /// Returns the Pareto front of a multi-objective study.
    ///
    /// On single-objective studies this is the best trial, or empty.
    pub fn pareto_front(&self) -> Vec<Trial> {
        let inner = self.lock();
        match &self.directions {
            Some(directions) => crate::pareto::pareto_front(&inner.trials, directions),
            None => Self::best_of(&inner.trials, self.direction)
                .into_iter()
                .collect(),
        }
    }

    /// Consults the pruner about a running trial, under the study lock.
    pub fn should_prune(&self, trial: &Trial) -> bool {
        let inner = self.lock();
        inner.pruner.should_prune(trial, &inner.trials, self.direction)
    }

    /// Installs a constraint function, invoked synchronously at tell time.
    ///
    /// The returned vector is stored on the completed trial; an entry is
    /// satisfied when it is at most zero.
    pub fn set_constraint_func<F>(&self, constraint_func: F)
    where
        F: Fn(&Trial) -> Vec<f64> + Send + 'static,
    {
        self.lock().constraint_func = Some(Box::new(constraint_func));
    }

    /// Returns `true` if the trial has no constraint vector or every entry
    /// is at most zero.
    ///
    /// An empty constraint vector is feasible.
    pub fn is_feasible(&self, trial: &Trial) -> bool {
        trial
            .constraint_values
            .as_ref()
            .map_or(true, |constraints| constraints.iter().all(|&c| c <= 0.0))
    }

    /// Imports Complete trials from another study or an external source.
    ///
    /// Parameters are deep-copied, numbers reassigned from this study's
    /// counter in input order, and intermediate values replayed. Non-
    /// Complete trials are ignored.
    pub fn pre_populate_warm_trials(&self, warm: &[Trial]) {
        let mut inner = self.lock();
        Self::import_trials(&mut inner, warm, ImportMode::Renumber);
        debug!(
            "study {:?} holds {} trials after warm start",
            self.name,
            inner.trials.len()
        );
    }

    pub(crate) fn import_snapshot_trials(&self, trials: &[Trial]) {
        let mut inner = self.lock();
        Self::import_trials(&mut inner, trials, ImportMode::Preserve);
    }

    fn import_trials(inner: &mut StudyInner, source: &[Trial], mode: ImportMode) {
        for original in source {
            let keep = match mode {
                ImportMode::Renumber => original.state == TrialState::Complete,
                ImportMode::Preserve => original.state.is_terminal(),
            };
            if !keep {
                continue;
            }
            let number = match mode {
                ImportMode::Renumber => {
                    let number = inner.next_number;
                    inner.next_number += 1;
                    number
                }
                ImportMode::Preserve => original.number,
            };
            let mut trial = Trial::new(number, original.params.clone());
            trial.state = original.state;
            trial.value = original.value;
            trial.values = original.values.clone();
            trial.constraint_values = original.constraint_values.clone();
            trial.replay_intermediate(&original.intermediate_values());
            inner.index.insert(number, inner.trials.len());
            inner.trials.push(trial);
            if mode == ImportMode::Preserve && number >= inner.next_number {
                inner.next_number = number + 1;
            }
        }
    }

    /// Returns a copy of every registered trial, in registration order.
    pub fn trials(&self) -> Vec<Trial> {
        self.lock().trials.clone()
    }

    /// Returns the number of registered trials.
    pub fn n_trials(&self) -> usize {
        self.lock().trials.len()
    }

    /// Returns a copy of the trial with the given number, if any.
    pub fn trial(&self, number: u64) -> Option<Trial> {
        let inner = self.lock();
        inner.index.get(&number).map(|&i| inner.trials[i].clone())
    }
}

impl std::fmt::Debug for Study {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Study")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("directions", &self.directions)
            .field("n_trials", &self.n_trials())
            .finish()
    }
}

/// Builder of [`Study`].
pub struct StudyBuilder {
    name: String,
    space: SearchSpace,
    direction: Direction,
    directions: Option<Vec<Direction>>,
    sampler: Option<Box<dyn Sampler>>,
    pruner: Option<Box<dyn Pruner>>,
    warm_start: Option<Vec<Trial>>,
    from_study: Option<Vec<Trial>>,
}

impl StudyBuilder {
    /// Makes a new `StudyBuilder` with direction `Minimize`, a TPE sampler
    /// and no pruner.
    pub fn new(name: &str, space: SearchSpace) -> Self {
        Self {
            name: name.to_owned(),
            space,
            direction: Direction::Minimize,
            directions: None,
            sampler: None,
            pruner: None,
            warm_start: None,
            from_study: None,
        }
    }

    /// Sets the optimization direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Makes the study multi-objective under the given directions.
    pub fn directions(mut self, directions: Vec<Direction>) -> Self {
        self.directions = Some(directions);
        self
    }

    /// Sets the sampler. The default is a TPE sampler.
    pub fn sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Sets the pruner. The default never prunes.
    pub fn pruner(mut self, pruner: Box<dyn Pruner>) -> Self {
        self.pruner = Some(pruner);
        self
    }

    /// Seeds the study with Complete trials from an external source.
    ///
    /// Takes precedence over [`StudyBuilder::from_study`] when both are
    /// given.
    pub fn warm_start(mut self, trials: Vec<Trial>) -> Self {
        self.warm_start = Some(trials);
        self
    }

    /// Seeds the study with the trials of an existing study.
    pub fn from_study(mut self, study: &Study) -> Self {
        self.from_study = Some(study.trials());
        self
    }

    /// Builds the study.
    ///
    /// Fails on an empty directions vector.
    pub fn build(self) -> Result<Study, StudyError> {
        if let Some(directions) = &self.directions {
            if directions.is_empty() {
                return Err(StudyError::EmptyDirections);
            }
        }
        let direction = self
            .directions
            .as_ref()
            .map_or(self.direction, |directions| directions[0]);
        let study = Study {
            name: self.name,
            space: self.space,
            direction,
            directions: self.directions,
            inner: Mutex::new(StudyInner {
                trials: Vec::new(),
                index: HashMap::new(),
                next_number: 0,
                sampler: self
                    .sampler
                    .unwrap_or_else(|| Box::new(TpeSampler::new())),
                pruner: self.pruner.unwrap_or_else(|| Box::new(NopPruner)),
                constraint_func: None,
            }),
        };
        let warm = self.warm_start.or(self.from_study);
        if let Some(warm) = warm {
            study.pre_populate_warm_trials(&warm);
        }
        Ok(study)
    }
}

/// Possible errors from study operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StudyError {
    /// The trial number is not registered in this study.
    #[error("unknown trial number {number}")]
    UnknownTrial {
        /// The offending number.
        number: u64,
    },

    /// The trial already reached a terminal state.
    #[error("trial {number} is already {state:?}")]
    NotRunning {
        /// The offending number.
        number: u64,
        /// The trial's current state.
        state: TrialState,
    },

    /// Completing a trial requires an objective value.
    #[error("telling Complete requires an objective value")]
    CompleteWithoutValue,

    /// A trial cannot be told back to `Running`.
    #[error("cannot tell a trial into the Running state")]
    TellRunning,

    /// A multi-objective study needs at least one direction.
    #[error("the directions vector must not be empty")]
    EmptyDirections,

    /// An objective vector must carry at least one value.
    #[error("the objective values vector must not be empty")]
    EmptyValues,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search_space::ParameterRange;
    use std::sync::Arc;

    fn space_1d() -> SearchSpace {
        SearchSpace::new(vec![ParameterRange::float("x", 0.0, 1.0).unwrap()]).unwrap()
    }

    fn random_study(seed: u64) -> Study {
        Study::builder("test", space_1d())
            .sampler(Box::new(RandomSampler::with_seed(seed)))
            .build()
            .unwrap()
    }

    #[test]
    fn random_study_is_deterministic_and_finds_best() -> anyhow::Result<()> {
        let run = |seed| -> anyhow::Result<(Vec<f64>, f64)> {
            let study = random_study(seed);
            let mut xs = Vec::new();
            for _ in 0..3 {
                let trial = study.ask();
                let x = trial.params["x"].as_float().unwrap();
                xs.push(x);
                study.tell(trial.number, x)?;
            }
            let best = study.best_trial().unwrap();
            Ok((xs, best.value.unwrap()))
        };
        let (xs_a, best_a) = run(42)?;
        let (xs_b, best_b) = run(42)?;
        assert_eq!(xs_a, xs_b);
        assert_eq!(best_a, best_b);
        let min = xs_a.iter().cloned().fold(std::f64::INFINITY, f64::min);
        assert_eq!(best_a, min);
        Ok(())
    }

    #[test]
    fn numbers_are_unique_and_monotone() {
        let study = random_study(0);
        let mut last = None;
        for _ in 0..20 {
            let trial = study.ask();
            if let Some(previous) = last {
                assert!(trial.number > previous);
            }
            last = Some(trial.number);
        }
        let trials = study.trials();
        for (i, a) in trials.iter().enumerate() {
            for b in &trials[i + 1..] {
                assert_ne!(a.number, b.number);
            }
        }
    }

    #[test]
    fn ask_batch_registers_all_trials() {
        let study = random_study(1);
        let batch = study.ask_batch(5);
        assert_eq!(batch.len(), 5);
        assert_eq!(study.n_trials(), 5);
        let numbers: Vec<u64> = batch.iter().map(|t| t.number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn tell_rejects_bad_transitions() -> anyhow::Result<()> {
        let study = random_study(2);
        let trial = study.ask();

        assert!(matches!(
            study.tell(99, 1.0),
            Err(StudyError::UnknownTrial { number: 99 })
        ));
        assert!(matches!(
            study.tell_state(trial.number, TrialState::Running),
            Err(StudyError::TellRunning)
        ));
        assert!(matches!(
            study.tell_state(trial.number, TrialState::Complete),
            Err(StudyError::CompleteWithoutValue)
        ));

        study.tell(trial.number, 0.5)?;
        assert!(matches!(
            study.tell(trial.number, 0.7),
            Err(StudyError::NotRunning { .. })
        ));
        assert!(matches!(
            study.tell_state(trial.number, TrialState::Fail),
            Err(StudyError::NotRunning { .. })
        ));
        Ok(())
    }

    #[test]
    fn fail_and_prune_are_terminal() -> anyhow::Result<()> {
        let study = random_study(3);
        let a = study.ask();
        let b = study.ask();
        study.tell_state(a.number, TrialState::Fail)?;
        study.tell_state(b.number, TrialState::Pruned)?;
        assert_eq!(study.trial(a.number).unwrap().state, TrialState::Fail);
        assert_eq!(study.trial(b.number).unwrap().state, TrialState::Pruned);
        assert!(study.best_trial().is_none());
        Ok(())
    }

    #[test]
    fn tell_batch_skips_unknown_numbers() {
        let study = random_study(4);
        let before = study.trials();
        study.tell_batch(&[(42, TellResult::Complete(0.5))]);
        assert_eq!(study.trials(), before);
    }

    #[test]
    fn tell_batch_skips_terminal_trials() -> anyhow::Result<()> {
        let study = random_study(5);
        let trial = study.ask();
        study.tell(trial.number, 1.0)?;
        study.tell_batch(&[
            (trial.number, TellResult::Complete(9.0)),
            (trial.number, TellResult::Fail),
        ]);
        let stored = study.trial(trial.number).unwrap();
        assert_eq!(stored.state, TrialState::Complete);
        assert_eq!(stored.value, Some(1.0));
        Ok(())
    }

    #[test]
    fn tell_batch_applies_multi_objective_results() -> anyhow::Result<()> {
        let study = Study::builder("mo", space_1d())
            .directions(vec![Direction::Minimize, Direction::Minimize])
            .sampler(Box::new(RandomSampler::with_seed(18)))
            .build()?;
        let a = study.ask();
        let b = study.ask();
        study.tell_batch(&[
            (a.number, TellResult::CompleteMulti(vec![1.0, 2.0])),
            (b.number, TellResult::CompleteMulti(vec![])),
        ]);

        let stored = study.trial(a.number).unwrap();
        assert_eq!(stored.state, TrialState::Complete);
        assert_eq!(stored.value, Some(1.0));
        assert_eq!(stored.values, Some(vec![1.0, 2.0]));

        // An empty objective vector is skipped; its trial keeps running.
        assert_eq!(study.trial(b.number).unwrap().state, TrialState::Running);
        Ok(())
    }

    #[test]
    fn constraints_gate_feasibility() -> anyhow::Result<()> {
        let study = random_study(6);
        study.set_constraint_func(|trial: &Trial| {
            vec![trial.params["x"].as_float().unwrap() - 0.5]
        });

        let trial = study.ask();
        let x = trial.params["x"].as_float().unwrap();
        study.tell(trial.number, x)?;
        let stored = study.trial(trial.number).unwrap();
        let constraint = stored.constraint_values.as_ref().unwrap()[0];
        assert!((constraint - (x - 0.5)).abs() < 1e-12);
        assert_eq!(study.is_feasible(&stored), x <= 0.5);

        // No constraint vector and an empty one are both feasible.
        assert!(study.is_feasible(&Trial::new(99, HashMap::new())));
        let mut empty = Trial::new(100, HashMap::new());
        empty.constraint_values = Some(vec![]);
        assert!(study.is_feasible(&empty));
        Ok(())
    }

    #[test]
    fn best_trial_keeps_the_first_of_ties() -> anyhow::Result<()> {
        let study = random_study(7);
        let a = study.ask();
        let b = study.ask();
        study.tell(a.number, 1.0)?;
        study.tell(b.number, 1.0)?;
        assert_eq!(study.best_trial().unwrap().number, a.number);
        Ok(())
    }

    #[test]
    fn non_finite_values_are_stored_but_not_ranked() -> anyhow::Result<()> {
        let study = random_study(8);
        let a = study.ask();
        let b = study.ask();
        study.tell(a.number, std::f64::NAN)?;
        study.tell(b.number, 2.0)?;
        assert!(study.trial(a.number).unwrap().value.unwrap().is_nan());
        assert_eq!(study.best_trial().unwrap().number, b.number);
        Ok(())
    }

    #[test]
    fn empty_search_space_asks_empty_parameters() {
        let space = SearchSpace::new(vec![]).unwrap();
        let study = Study::random("empty", space, Direction::Minimize);
        let trial = study.ask();
        assert!(trial.params.is_empty());
    }

    #[test]
    fn multi_objective_tell_mirrors_first_value() -> anyhow::Result<()> {
        let study = Study::builder("mo", space_1d())
            .directions(vec![Direction::Minimize, Direction::Minimize])
            .sampler(Box::new(RandomSampler::with_seed(9)))
            .build()?;

        let trial = study.ask();
        study.tell_multi(trial.number, vec![2.0, 3.0])?;
        let stored = study.trial(trial.number).unwrap();
        assert_eq!(stored.value, Some(2.0));
        assert_eq!(stored.values, Some(vec![2.0, 3.0]));
        Ok(())
    }

    #[test]
    fn pareto_front_query_matches_spec_example() -> anyhow::Result<()> {
        let study = Study::builder("mo", space_1d())
            .directions(vec![Direction::Minimize, Direction::Minimize])
            .sampler(Box::new(RandomSampler::with_seed(10)))
            .build()?;

        for values in [[1.0, 2.0], [2.0, 1.0], [2.0, 2.0], [3.0, 3.0]] {
            let trial = study.ask();
            study.tell_multi(trial.number, values.to_vec())?;
        }
        let front: Vec<u64> = study.pareto_front().iter().map(|t| t.number).collect();
        assert_eq!(front, vec![0, 1]);
        Ok(())
    }

    #[test]
    fn single_objective_front_is_the_best_trial() -> anyhow::Result<()> {
        let study = random_study(11);
        assert!(study.pareto_front().is_empty());
        let trial = study.ask();
        study.tell(trial.number, 0.25)?;
        let front = study.pareto_front();
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].number, trial.number);
        Ok(())
    }

    #[test]
    fn empty_directions_are_rejected() {
        assert!(matches!(
            Study::builder("bad", space_1d()).directions(vec![]).build(),
            Err(StudyError::EmptyDirections)
        ));
    }

    #[test]
    fn warm_start_renumbers_complete_trials() -> anyhow::Result<()> {
        let source = random_study(12);
        for i in 0..4 {
            let trial = source.ask();
            if i == 2 {
                source.tell_state(trial.number, TrialState::Fail)?;
            } else {
                let x = trial.params["x"].as_float().unwrap();
                trial.report(0, x);
                source.tell(trial.number, x)?;
            }
        }

        let warmed = Study::builder("warmed", space_1d())
            .sampler(Box::new(RandomSampler::with_seed(13)))
            .warm_start(source.trials())
            .build()?;

        let trials = warmed.trials();
        assert_eq!(trials.len(), 3);
        let numbers: Vec<u64> = trials.iter().map(|t| t.number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert!(trials.iter().all(|t| t.state == TrialState::Complete));
        assert!(trials.iter().all(|t| t.intermediate_values().len() == 1));

        // The counter continues past the imports.
        assert_eq!(warmed.ask().number, 3);
        Ok(())
    }

    #[test]
    fn warm_start_wins_over_from_study() -> anyhow::Result<()> {
        let source = random_study(14);
        let trial = source.ask();
        source.tell(trial.number, 0.1)?;

        let warmed = Study::builder("warmed", space_1d())
            .sampler(Box::new(RandomSampler::with_seed(15)))
            .from_study(&source)
            .warm_start(vec![])
            .build()?;
        assert_eq!(warmed.n_trials(), 0);
        Ok(())
    }

    #[test]
    fn should_prune_delegates_to_the_pruner() -> anyhow::Result<()> {
        let study = Study::builder("pruned", space_1d())
            .sampler(Box::new(RandomSampler::with_seed(16)))
            .pruner(Box::new(crate::pruner::MedianPruner::with_min_trials(2)))
            .build()?;

        for value in [1.0, 2.0] {
            let trial = study.ask();
            trial.report(0, value);
            study.tell(trial.number, value)?;
        }
        let candidate = study.ask();
        candidate.report(0, 100.0);
        assert!(study.should_prune(&candidate));
        Ok(())
    }

    #[test]
    fn parallel_ask_tell_keeps_the_registry_consistent() {
        let study = Arc::new(random_study(17));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let study = Arc::clone(&study);
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    let trial = study.ask();
                    trial.report(0, 1.0);
                    let x = trial.params["x"].as_float().unwrap();
                    study.tell(trial.number, x).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let trials = study.trials();
        assert_eq!(trials.len(), 100);
        assert!(trials.iter().all(|t| t.state == TrialState::Complete));
        assert!(study.best_trial().is_some());
    }
}
