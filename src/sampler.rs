//! The sampler contract and the bundled sampler implementations.
use crate::search_space::{ParamValue, SearchSpace};
use crate::trial::{Direction, Trial};
use std::collections::HashMap;

pub use self::cmaes::{CmaEsSampler, CmaEsSamplerBuilder};
pub use self::random::RandomSampler;
pub use self::tpe::{TpeSampler, TpeSamplerBuilder};

mod cmaes;
pub(crate) mod random;
mod tpe;

/// Possible errors during sampler builder `build` calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    /// The value of `gamma` must be in the range from `0.0` to `1.0`.
    #[error("the value of `gamma` must be in the range from 0.0 to 1.0")]
    GammaOutOfRange,

    /// The value of `candidates` must be a positive integer.
    #[error("the value of `candidates` must be a positive integer")]
    ZeroCandidates,

    /// The initial step size must be strictly positive.
    #[error("the initial step size must be strictly positive")]
    NonPositiveSigma,

    /// The population size must be a positive integer.
    #[error("the population size must be a positive integer")]
    ZeroPopulation,
}

/// A strategy for proposing parameter assignments.
///
/// Implementations own their RNG and any cached state; they must not
/// mutate `history`. Every returned assignment contains exactly the names
/// of the search space, each value within its range's support.
pub trait Sampler: Send {
    /// Proposes one parameter assignment.
    fn sample(
        &mut self,
        history: &[Trial],
        direction: Direction,
        space: &SearchSpace,
    ) -> HashMap<String, ParamValue>;

    /// Proposes one parameter assignment for a Pareto-directed study.
    ///
    /// Samplers without a multi-objective specialization fall back to
    /// [`Sampler::sample`] under the first direction.
    fn sample_multi_objective(
        &mut self,
        history: &[Trial],
        directions: &[Direction],
        space: &SearchSpace,
    ) -> HashMap<String, ParamValue> {
        self.sample(history, directions[0], space)
    }

    /// Proposes `n` independently drawn assignments.
    ///
    /// The default implementation loops [`Sampler::sample`]; samplers with
    /// per-call setup cost override this to amortize it across the batch.
    fn sample_batch(
        &mut self,
        history: &[Trial],
        direction: Direction,
        space: &SearchSpace,
        n: usize,
    ) -> Vec<HashMap<String, ParamValue>> {
        (0..n).map(|_| self.sample(history, direction, space)).collect()
    }
}
