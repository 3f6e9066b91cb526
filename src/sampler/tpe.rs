use crate::density_estimation::{
    BuildDensityEstimator, CategoricalEstimatorBuilder, DefaultEstimator, DefaultEstimatorBuilder,
    DensityEstimator, ParzenEstimatorBuilder,
};
use crate::pareto::{crowding_distances, pareto_front};
use crate::sampler::random::uniform_assignment;
use crate::sampler::{BuildError, Sampler};
use crate::search_space::{ParamValue, ParameterRange, SearchSpace};
use crate::trial::{Direction, Trial, TrialState};
use log::trace;
use ordered_float::OrderedFloat;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

/// Builder of [`TpeSampler`].
#[derive(Debug)]
pub struct TpeSamplerBuilder {
    gamma: f64,
    candidates: usize,
    startup_trials: usize,
    max_good: Option<usize>,
    seed: Option<u64>,
}

impl TpeSamplerBuilder {
    /// Makes a new `TpeSamplerBuilder` instance with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fraction of history treated as the good set.
    ///
    /// The default value is `0.25`.
    pub fn gamma(&mut self, gamma: f64) -> &mut Self {
        self.gamma = gamma;
        self
    }

    /// Sets the number of candidates drawn to decide the next assignment.
    ///
    /// The default value is `24`.
    pub fn candidates(&mut self, candidates: usize) -> &mut Self {
        self.candidates = candidates;
        self
    }

    /// Sets how many Complete trials must exist before TPE takes over from
    /// random sampling.
    ///
    /// The default value is `10`.
    pub fn startup_trials(&mut self, startup_trials: usize) -> &mut Self {
        self.startup_trials = startup_trials;
        self
    }

    /// Caps the size of the good set regardless of `gamma`.
    pub fn max_good(&mut self, max_good: usize) -> &mut Self {
        self.max_good = Some(max_good);
        self
    }

    /// Seeds the sampler's RNG for deterministic proposals.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Builds a `TpeSampler` with the given settings.
    pub fn build(&self) -> Result<TpeSampler, BuildError> {
        if !(0.0 <= self.gamma && self.gamma <= 1.0) {
            return Err(BuildError::GammaOutOfRange);
        }
        let candidates = NonZeroUsize::new(self.candidates).ok_or(BuildError::ZeroCandidates)?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(TpeSampler {
            rng,
            gamma: self.gamma,
            candidates,
            startup_trials: self.startup_trials,
            max_good: self.max_good,
        })
    }
}

impl Default for TpeSamplerBuilder {
    fn default() -> Self {
        Self {
            gamma: 0.25,
            candidates: 24,
            startup_trials: 10,
            max_good: None,
            seed: None,
        }
    }
}

/// Tree-structured Parzen Estimator sampler.
///
/// Splits the Complete history into a good and a bad subset by objective,
/// fits one density per parameter and subset, and proposes the candidate
/// maximizing the density ratio.
#[derive(Debug)]
pub struct TpeSampler {
    rng: StdRng,
    gamma: f64,
    candidates: NonZeroUsize,
    startup_trials: usize,
    max_good: Option<usize>,
}

impl TpeSampler {
    /// Makes a new `TpeSampler` with the default settings.
    ///
    /// If you want to customize the settings, please use
    /// [`TpeSamplerBuilder`] instead.
    pub fn new() -> Self {
        TpeSamplerBuilder::new().build().expect("unreachable")
    }

    /// Makes a new `TpeSampler` with a fixed seed and default settings.
    pub fn with_seed(seed: u64) -> Self {
        TpeSamplerBuilder::new().seed(seed).build().expect("unreachable")
    }

    fn good_set_size(&self, n: usize) -> usize {
        let quota = (n as f64 * self.gamma).ceil() as usize;
        self.max_good.map_or(quota, |cap| quota.min(cap))
    }

    /// Splits the finite Complete history by objective under `direction`.
    fn split_single<'a>(
        &self,
        completes: &[&'a Trial],
        direction: Direction,
    ) -> (Vec<&'a Trial>, Vec<&'a Trial>) {
        let mut sorted: Vec<&Trial> = completes.to_vec();
        sorted.sort_by_key(|t| OrderedFloat(direction.key(t.value.expect("unreachable"))));
        let split_point = self.good_set_size(sorted.len());
        let bad = sorted.split_off(split_point.min(sorted.len()));
        (sorted, bad)
    }

    /// Splits the multi-objective history: the good set is the Pareto front
    /// plus, if the front underfills the quota, the leftover trials with the
    /// largest crowding distances.
    fn split_multi<'a>(
        &self,
        completes: &[&'a Trial],
        directions: &[Direction],
    ) -> (Vec<&'a Trial>, Vec<&'a Trial>) {
        let owned: Vec<Trial> = completes.iter().map(|&t| t.clone()).collect();
        let mut good_numbers: HashSet<u64> =
            pareto_front(&owned, directions).iter().map(|t| t.number).collect();

        let quota = self.good_set_size(completes.len());
        if good_numbers.len() < quota {
            let remainder: Vec<Trial> = owned
                .iter()
                .filter(|t| !good_numbers.contains(&t.number))
                .cloned()
                .collect();
            let distances = crowding_distances(&remainder, directions);
            let mut order: Vec<usize> = (0..remainder.len()).collect();
            order.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(distances[i])));
            for &i in order.iter().take(quota - good_numbers.len()) {
                good_numbers.insert(remainder[i].number);
            }
        }

        completes
            .iter()
            .copied()
            .partition(|t| good_numbers.contains(&t.number))
    }

    /// Fits the per-parameter good/bad density pair.
    fn fit_densities(
        &self,
        space: &SearchSpace,
        good: &[&Trial],
        bad: &[&Trial],
    ) -> Vec<(DefaultEstimator, DefaultEstimator)> {
        space
            .iter()
            .map(|range| {
                let builder = match range {
                    ParameterRange::Categorical { .. } => {
                        DefaultEstimatorBuilder::Categorical(CategoricalEstimatorBuilder::new())
                    }
                    _ => DefaultEstimatorBuilder::Parzen(ParzenEstimatorBuilder::new()),
                };
                let good_estimator = builder
                    .build_density_estimator(
                        observed_values(good, range).iter().copied(),
                        range.internal_interval(),
                    )
                    .expect("unreachable");
                let bad_estimator = builder
                    .build_density_estimator(
                        observed_values(bad, range).iter().copied(),
                        range.internal_interval(),
                    )
                    .expect("unreachable");
                (good_estimator, bad_estimator)
            })
            .collect()
    }

    /// Draws one candidate from the good densities and scores it.
    fn draw_candidate(
        &mut self,
        densities: &[(DefaultEstimator, DefaultEstimator)],
    ) -> (f64, Vec<f64>) {
        let mut acquisition = 0.0;
        let mut candidate = Vec::with_capacity(densities.len());
        for (good, bad) in densities {
            let x = good.sample(&mut self.rng);
            acquisition += good.log_pdf(x) - bad.log_pdf(x);
            candidate.push(x);
        }
        (acquisition, candidate)
    }

    fn propose(
        &mut self,
        densities: &[(DefaultEstimator, DefaultEstimator)],
        space: &SearchSpace,
    ) -> HashMap<String, ParamValue> {
        let mut best: Option<(f64, Vec<f64>)> = None;
        for _ in 0..self.candidates.get() {
            let (score, candidate) = self.draw_candidate(densities);
            // Strictly-greater keeps the first of tied candidates.
            if best.as_ref().map_or(true, |(top, _)| score > *top) {
                best = Some((score, candidate));
            }
        }
        let (_, candidate) = best.expect("unreachable");
        internal_to_assignment(&candidate, space)
    }

    fn split_and_fit<'a>(
        &self,
        completes: &[&'a Trial],
        direction: Direction,
        space: &SearchSpace,
    ) -> Vec<(DefaultEstimator, DefaultEstimator)> {
        let (good, bad) = self.split_single(completes, direction);
        trace!(
            "tpe split: {} good / {} bad of {} complete trials",
            good.len(),
            bad.len(),
            completes.len()
        );
        self.fit_densities(space, &good, &bad)
    }
}

impl Default for TpeSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn observed_values(trials: &[&Trial], range: &ParameterRange) -> Vec<f64> {
    trials
        .iter()
        .filter_map(|t| t.params.get(range.name()))
        .filter_map(|v| range.to_internal(v))
        .collect()
}

fn internal_to_assignment(candidate: &[f64], space: &SearchSpace) -> HashMap<String, ParamValue> {
    space
        .iter()
        .zip(candidate)
        .map(|(range, &x)| (range.name().to_owned(), range.from_internal(x)))
        .collect()
}

fn finite_completes<'a>(history: &'a [Trial]) -> Vec<&'a Trial> {
    history
        .iter()
        .filter(|t| t.state == TrialState::Complete && t.has_finite_value())
        .collect()
}

impl Sampler for TpeSampler {
    fn sample(
        &mut self,
        history: &[Trial],
        direction: Direction,
        space: &SearchSpace,
    ) -> HashMap<String, ParamValue> {
        let completes = finite_completes(history);
        if completes.len() < self.startup_trials || space.is_empty() {
            return uniform_assignment(&mut self.rng, space);
        }

        let densities = self.split_and_fit(&completes, direction, space);
        self.propose(&densities, space)
    }

    fn sample_multi_objective(
        &mut self,
        history: &[Trial],
        directions: &[Direction],
        space: &SearchSpace,
    ) -> HashMap<String, ParamValue> {
        let completes: Vec<&Trial> = history
            .iter()
            .filter(|t| {
                t.state == TrialState::Complete && t.has_finite_values(directions.len())
            })
            .collect();
        if completes.len() < self.startup_trials || space.is_empty() {
            return uniform_assignment(&mut self.rng, space);
        }

        let (good, bad) = self.split_multi(&completes, directions);
        trace!(
            "tpe multi-objective split: {} good / {} bad",
            good.len(),
            bad.len()
        );
        let densities = self.fit_densities(space, &good, &bad);
        self.propose(&densities, space)
    }

    fn sample_batch(
        &mut self,
        history: &[Trial],
        direction: Direction,
        space: &SearchSpace,
        n: usize,
    ) -> Vec<HashMap<String, ParamValue>> {
        let completes = finite_completes(history);
        if completes.len() < self.startup_trials || space.is_empty() {
            return (0..n).map(|_| uniform_assignment(&mut self.rng, space)).collect();
        }

        // One density fit amortized over the whole batch.
        let densities = self.split_and_fit(&completes, direction, space);

        let mut scored: Vec<(f64, Vec<f64>)> = (0..n * self.candidates.get())
            .map(|_| self.draw_candidate(&densities))
            .collect();
        scored.sort_by_key(|(score, _)| std::cmp::Reverse(OrderedFloat(*score)));

        let mut batch: Vec<HashMap<String, ParamValue>> = Vec::with_capacity(n);
        for (_, candidate) in &scored {
            if batch.len() == n {
                break;
            }
            let assignment = internal_to_assignment(candidate, space);
            if !batch.contains(&assignment) {
                batch.push(assignment);
            }
        }
        while batch.len() < n {
            batch.push(uniform_assignment(&mut self.rng, space));
        }
        batch
    }
}
