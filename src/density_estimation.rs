//! One-dimensional probability density estimation over internal parameter
//! coordinates.
use crate::search_space::Interval;
use rand::distributions::Distribution;
use rand::Rng;

pub use self::categorical::{CategoricalEstimator, CategoricalEstimatorBuilder};
pub use self::parzen::{ParzenEstimator, ParzenEstimatorBuilder};

mod categorical;
mod parzen;

/// This trait allows estimating the probability density of a sample and sampling from the function.
pub trait DensityEstimator: Distribution<f64> {
    /// Estimates the log probability density of a sample.
    fn log_pdf(&self, x: f64) -> f64;
}

/// This trait allows building probability density estimators.
pub trait BuildDensityEstimator {
    /// Density estimator to be built.
    type Estimator: DensityEstimator;

    /// Possible error during building.
    type Error: std::error::Error;

    /// Builds a probability density estimator from the given internal-space samples.
    fn build_density_estimator<I>(
        &self,
        xs: I,
        interval: Interval,
    ) -> Result<Self::Estimator, Self::Error>
    where
        I: Iterator<Item = f64> + Clone;
}

/// Default estimator: a Parzen mixture for numeric parameters, a smoothed
/// categorical distribution for categorical ones.
#[derive(Debug)]
#[allow(missing_docs)]
pub enum DefaultEstimator {
    Parzen(ParzenEstimator),
    Categorical(CategoricalEstimator),
}

impl DensityEstimator for DefaultEstimator {
    fn log_pdf(&self, x: f64) -> f64 {
        match self {
            Self::Parzen(t) => t.log_pdf(x),
            Self::Categorical(t) => t.log_pdf(x),
        }
    }
}

impl Distribution<f64> for DefaultEstimator {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Parzen(t) => t.sample(rng),
            Self::Categorical(t) => t.sample(rng),
        }
    }
}

/// Builder of `DefaultEstimator`.
#[derive(Debug)]
#[allow(missing_docs)]
pub enum DefaultEstimatorBuilder {
    Parzen(ParzenEstimatorBuilder),
    Categorical(CategoricalEstimatorBuilder),
}

impl BuildDensityEstimator for DefaultEstimatorBuilder {
    type Estimator = DefaultEstimator;
    type Error = std::convert::Infallible;

    fn build_density_estimator<I>(
        &self,
        xs: I,
        interval: Interval,
    ) -> Result<Self::Estimator, Self::Error>
    where
        I: Iterator<Item = f64> + Clone,
    {
        match self {
            Self::Parzen(t) => t
                .build_density_estimator(xs, interval)
                .map(DefaultEstimator::Parzen),
            Self::Categorical(t) => t
                .build_density_estimator(xs, interval)
                .map(DefaultEstimator::Categorical),
        }
    }
}
