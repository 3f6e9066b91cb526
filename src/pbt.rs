//! Population-Based Training: exploit/explore over a member population.
use crate::sampler::random::{uniform_assignment, uniform_draw};
use crate::search_space::{ParamValue, ParameterRange, SearchSpace};
use log::debug;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// One member of a PBT population.
///
/// Performance follows the PBT convention: higher is better.
#[derive(Debug, Clone, PartialEq)]
pub struct PbtMember {
    /// Slot id of this member.
    pub id: usize,

    /// Current hyperparameters.
    pub params: HashMap<String, ParamValue>,

    /// Latest reported performance; `-inf` until the first report.
    pub performance: f64,

    /// Latest reported training step.
    pub step: u64,

    /// Every parameter assignment this member has trained under.
    pub history: Vec<HashMap<String, ParamValue>>,
}

/// Coordinator for the PBT exploit/explore loop.
#[derive(Debug)]
pub struct PbtCoordinator {
    space: SearchSpace,
    population_size: usize,
    exploit_fraction: f64,
    perturb_factor: f64,
    rng: StdRng,
}

impl PbtCoordinator {
    /// Makes a new coordinator with an exploit fraction of `0.2`, a
    /// perturbation factor of `0.2` and an entropy-seeded RNG.
    pub fn new(space: SearchSpace, population_size: usize) -> Self {
        Self {
            space,
            population_size,
            exploit_fraction: 0.2,
            perturb_factor: 0.2,
            rng: StdRng::from_entropy(),
        }
    }

    /// Sets the fraction of the population replaced on each evolve.
    pub fn with_exploit_fraction(mut self, exploit_fraction: f64) -> Self {
        self.exploit_fraction = exploit_fraction;
        self
    }

    /// Sets the multiplicative perturbation factor for numeric parameters.
    pub fn with_perturb_factor(mut self, perturb_factor: f64) -> Self {
        self.perturb_factor = perturb_factor;
        self
    }

    /// Seeds the coordinator's RNG for deterministic populations.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Draws the initial population.
    ///
    /// Every member starts at performance `-inf`, step 0, with its initial
    /// parameters as the single history entry.
    pub fn ask_population(&mut self) -> Vec<PbtMember> {
        (0..self.population_size)
            .map(|id| {
                let params = uniform_assignment(&mut self.rng, &self.space);
                PbtMember {
                    id,
                    params: params.clone(),
                    performance: std::f64::NEG_INFINITY,
                    step: 0,
                    history: vec![params],
                }
            })
            .collect()
    }

    /// Returns `member` with its performance and step updated.
    pub fn report(&self, member: &PbtMember, performance: f64, step: u64) -> PbtMember {
        let mut updated = member.clone();
        updated.performance = performance;
        updated.step = step;
        updated
    }

    /// Runs one exploit/explore round.
    ///
    /// The top `max(1, ⌊(1 - exploit_fraction)·N⌋)` members by performance
    /// survive untouched. Each remaining slot receives a perturbed copy of
    /// a random surviving member, reset to performance `-inf` and step 0,
    /// emitted under the replaced slot's id.
    pub fn evolve(&mut self, population: Vec<PbtMember>) -> Vec<PbtMember> {
        let n = population.len();
        if n == 0 {
            return population;
        }

        let mut sorted = population;
        sorted.sort_by_key(|m| std::cmp::Reverse(OrderedFloat(m.performance)));

        let n_keep = (((1.0 - self.exploit_fraction) * n as f64).floor() as usize).max(1);
        let n_keep = n_keep.min(n);
        debug!("pbt evolve: keeping {} of {} members", n_keep, n);

        let mut next = sorted[..n_keep].to_vec();
        for slot in n_keep..n {
            let source = &sorted[self.rng.gen_range(0, n_keep)];
            let params = self.perturb(&source.params);
            let mut history = source.history.clone();
            history.push(params.clone());
            next.push(PbtMember {
                id: sorted[slot].id,
                params,
                performance: std::f64::NEG_INFINITY,
                step: 0,
                history,
            });
        }
        next
    }

    /// Perturbs one parameter assignment.
    ///
    /// Numeric parameters are scaled by `U(1 - factor, 1 + factor)` and
    /// clipped to their bounds (integers also round to the step grid);
    /// categorical parameters are resampled uniformly with probability 0.5.
    pub fn perturb(
        &mut self,
        params: &HashMap<String, ParamValue>,
    ) -> HashMap<String, ParamValue> {
        let mut perturbed = HashMap::with_capacity(params.len());
        for range in self.space.iter() {
            let current = match params.get(range.name()) {
                Some(value) => value,
                None => continue,
            };
            let factor = self.perturb_factor;
            let next = match (range, current) {
                (ParameterRange::Float { low, high, .. }, ParamValue::Float(v)) => {
                    let scaled = v * self.rng.gen_range(1.0 - factor, 1.0 + factor);
                    ParamValue::Float(scaled.max(*low).min(*high))
                }
                (ParameterRange::Int { .. }, ParamValue::Int(v)) => {
                    let scaled = *v as f64 * self.rng.gen_range(1.0 - factor, 1.0 + factor);
                    range.from_internal(scaled)
                }
                (ParameterRange::Categorical { .. }, ParamValue::Categorical(_)) => {
                    if self.rng.gen_bool(0.5) {
                        uniform_draw(&mut self.rng, range)
                    } else {
                        current.clone()
                    }
                }
                _ => current.clone(),
            };
            perturbed.insert(range.name().to_owned(), next);
        }
        perturbed
    }
}
