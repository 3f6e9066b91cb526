use crate::density_estimation::{BuildDensityEstimator, DensityEstimator};
use crate::search_space::Interval;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Builder of [`CategoricalEstimator`].
#[derive(Debug, Default)]
pub struct CategoricalEstimatorBuilder {}

impl CategoricalEstimatorBuilder {
    /// Makes a new [`CategoricalEstimatorBuilder`] instance.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuildDensityEstimator for CategoricalEstimatorBuilder {
    type Estimator = CategoricalEstimator;
    type Error = std::convert::Infallible;

    fn build_density_estimator<I>(
        &self,
        xs: I,
        interval: Interval,
    ) -> Result<Self::Estimator, Self::Error>
    where
        I: Iterator<Item = f64> + Clone,
    {
        let cardinality = interval.width().ceil() as usize;

        // Laplace smoothing: a prior weight of one per choice keeps every
        // choice reachable even with an empty observation set.
        let mut counts = vec![1.0; cardinality];
        let mut total = cardinality as f64;
        for x in xs {
            let i = x.floor() as usize;
            if i < cardinality {
                counts[i] += 1.0;
                total += 1.0;
            }
        }

        let probabilities: Vec<f64> = counts.iter().map(|c| c / total).collect();
        let distribution = WeightedIndex::new(probabilities.iter()).expect("unreachable");
        Ok(CategoricalEstimator {
            probabilities,
            distribution,
        })
    }
}

/// Laplace-smoothed categorical distribution over choice indices.
#[derive(Debug)]
pub struct CategoricalEstimator {
    probabilities: Vec<f64>,
    distribution: WeightedIndex<f64>,
}

impl DensityEstimator for CategoricalEstimator {
    fn log_pdf(&self, x: f64) -> f64 {
        let i = x.floor() as usize;
        if i < self.probabilities.len() {
            self.probabilities[i].ln()
        } else {
            std::f64::NEG_INFINITY
        }
    }
}

impl Distribution<f64> for CategoricalEstimator {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.distribution.sample(rng) as f64
    }
}
