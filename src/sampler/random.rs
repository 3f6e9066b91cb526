use crate::sampler::Sampler;
use crate::search_space::{ParamValue, ParameterRange, SearchSpace};
use crate::trial::{Direction, Trial};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Draws one value uniformly from `range`.
///
/// Integer ranges draw uniformly over the step grid, log float ranges draw
/// uniformly on the `ln` scale, categorical ranges draw a choice index.
pub(crate) fn uniform_draw<R: Rng + ?Sized>(rng: &mut R, range: &ParameterRange) -> ParamValue {
    match range {
        ParameterRange::Int {
            low, high, step, ..
        } => {
            let n_steps = (*high - *low) / *step + 1;
            ParamValue::Int(*low + rng.gen_range(0, n_steps) * *step)
        }
        ParameterRange::Float { low, high, log, .. } => {
            if *log {
                ParamValue::Float(rng.gen_range(low.ln(), high.ln()).exp().min(*high))
            } else {
                ParamValue::Float(rng.gen_range(*low, *high))
            }
        }
        ParameterRange::Categorical { choices, .. } => {
            ParamValue::Categorical(rng.gen_range(0, choices.len()))
        }
    }
}

/// Draws one full uniform assignment over `space`.
pub(crate) fn uniform_assignment<R: Rng + ?Sized>(
    rng: &mut R,
    space: &SearchSpace,
) -> HashMap<String, ParamValue> {
    space
        .iter()
        .map(|range| (range.name().to_owned(), uniform_draw(rng, range)))
        .collect()
}

/// Sampler drawing every parameter uniformly and independently.
#[derive(Debug)]
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    /// Makes a new `RandomSampler` seeded from entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Makes a new `RandomSampler` with a fixed seed.
    ///
    /// Given a fixed draw order, the proposed assignments are
    /// deterministic.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RandomSampler {
    fn sample(
        &mut self,
        _history: &[Trial],
        _direction: Direction,
        space: &SearchSpace,
    ) -> HashMap<String, ParamValue> {
        uniform_assignment(&mut self.rng, space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> SearchSpace {
        SearchSpace::new(vec![
            ParameterRange::float("x", 0.0, 1.0).unwrap(),
            ParameterRange::log_float("lr", 1e-4, 1.0).unwrap(),
            ParameterRange::int_with_step("n", 2, 11, 3).unwrap(),
            ParameterRange::categorical("opt", vec!["sgd".into(), "adam".into()]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn assignments_cover_exactly_the_space() {
        let space = space();
        let mut sampler = RandomSampler::with_seed(7);
        for _ in 0..100 {
            let params = sampler.sample(&[], Direction::Minimize, &space);
            assert_eq!(params.len(), space.len());
            for range in space.iter() {
                assert!(range.contains(&params[range.name()]));
            }
        }
    }

    #[test]
    fn seeded_draws_are_deterministic() {
        let space = space();
        let mut a = RandomSampler::with_seed(42);
        let mut b = RandomSampler::with_seed(42);
        for _ in 0..10 {
            assert_eq!(
                a.sample(&[], Direction::Minimize, &space),
                b.sample(&[], Direction::Minimize, &space),
            );
        }
    }

    #[test]
    fn empty_space_yields_empty_assignment() {
        let space = SearchSpace::new(vec![]).unwrap();
        let mut sampler = RandomSampler::with_seed(0);
        assert!(sampler.sample(&[], Direction::Minimize, &space).is_empty());
    }
}
