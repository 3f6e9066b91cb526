use crate::density_estimation::{BuildDensityEstimator, DensityEstimator};
use crate::search_space::Interval;
use ordered_float::OrderedFloat;
use rand::distributions::Distribution;
use rand::seq::SliceRandom;
use rand::Rng;
use statrs::distribution::{Continuous, Univariate};

// Rejection sampling retries before falling back to clamping the draw.
const MAX_REJECTIONS: usize = 100;

/// Builder of [`ParzenEstimator`].
#[derive(Debug, Default)]
pub struct ParzenEstimatorBuilder {}

impl ParzenEstimatorBuilder {
    /// Makes a new [`ParzenEstimatorBuilder`] instance.
    pub fn new() -> Self {
        Self::default()
    }

    fn setup_stddev(&self, xs: &mut [Normal], interval: Interval) {
        let n = xs.len();
        for i in 0..n {
            let prev = if i == 0 {
                interval.start()
            } else {
                xs[i - 1].mean
            };
            let curr = xs[i].mean;
            let succ = xs.get(i + 1).map_or(interval.end(), |x| x.mean);
            xs[i].stddev = (curr - prev).max(succ - curr);
        }

        if n >= 2 {
            xs[0].stddev = xs[1].mean - xs[0].mean;
            xs[n - 1].stddev = xs[n - 1].mean - xs[n - 2].mean;
        }

        let max_stddev = interval.width();
        let min_stddev = interval.width() / 100f64.min(1.0 + n as f64);
        for x in xs {
            x.stddev = x.stddev.max(min_stddev).min(max_stddev);
        }
    }
}

impl BuildDensityEstimator for ParzenEstimatorBuilder {
    type Estimator = ParzenEstimator;
    type Error = std::convert::Infallible;

    fn build_density_estimator<I>(
        &self,
        xs: I,
        interval: Interval,
    ) -> Result<Self::Estimator, Self::Error>
    where
        I: Iterator<Item = f64> + Clone,
    {
        let mut xs = xs
            .filter(|x| x.is_finite())
            .map(|x| Normal {
                mean: x,
                stddev: std::f64::NAN,
            })
            .collect::<Vec<_>>();
        xs.sort_by_key(|x| OrderedFloat(x.mean));

        self.setup_stddev(&mut xs, interval);

        // The broad prior component keeps the mixture defined when there are
        // no observations and stops it from collapsing onto a tight cluster.
        xs.push(Normal {
            mean: interval.midpoint(),
            stddev: interval.width(),
        });

        let p_accept = xs
            .iter()
            .map(|x| x.cdf(interval.end()) - x.cdf(interval.start()))
            .sum::<f64>()
            / xs.len() as f64;

        Ok(ParzenEstimator {
            samples: xs,
            interval,
            p_accept,
        })
    }
}

/// Normal distribution.
#[derive(Debug)]
struct Normal {
    mean: f64,
    stddev: f64,
}

impl Normal {
    fn log_pdf(&self, x: f64) -> f64 {
        statrs::distribution::Normal::new(self.mean, self.stddev)
            .expect("unreachable")
            .ln_pdf(x)
    }

    fn cdf(&self, x: f64) -> f64 {
        statrs::distribution::Normal::new(self.mean, self.stddev)
            .expect("unreachable")
            .cdf(x)
    }
}

/// Parzen window based density estimator.
///
/// The mixture carries one Gaussian per observed point, with bandwidths
/// taken from the distance to the neighboring points, plus a broad prior
/// Gaussian centered on the interval midpoint whose bandwidth is the full
/// interval width.
#[derive(Debug)]
pub struct ParzenEstimator {
    samples: Vec<Normal>,
    interval: Interval,
    p_accept: f64,
}

impl DensityEstimator for ParzenEstimator {
    fn log_pdf(&self, x: f64) -> f64 {
        let weight = 1.0 / self.samples.len() as f64;
        let xs = self
            .samples
            .iter()
            .map(|sample| sample.log_pdf(x) + (weight / self.p_accept).ln())
            .collect::<Vec<_>>();
        logsumexp(&xs)
    }
}

fn logsumexp(xs: &[f64]) -> f64 {
    let max_x = xs
        .iter()
        .max_by_key(|&&x| OrderedFloat(x))
        .expect("unreachable");
    xs.iter().map(|&x| (x - max_x).exp()).sum::<f64>().ln() + max_x
}

impl Distribution<f64> for ParzenEstimator {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        for _ in 0..MAX_REJECTIONS {
            let x = self.samples.choose(rng).expect("unreachable");
            let draw = rand_distr::Normal::new(x.mean, x.stddev)
                .expect("unreachable")
                .sample(rng);
            if self.interval.contains(draw) {
                return draw;
            }
        }
        let x = self.samples.choose(rng).expect("unreachable");
        let draw = rand_distr::Normal::new(x.mean, x.stddev)
            .expect("unreachable")
            .sample(rng);
        self.interval.clamp(draw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn prior_only_density_is_defined() -> anyhow::Result<()> {
        let interval = Interval::new(-5.0, 5.0);
        let estimator =
            ParzenEstimatorBuilder::new().build_density_estimator(std::iter::empty(), interval)?;

        assert!(estimator.log_pdf(0.0).is_finite());
        assert!(estimator.log_pdf(4.9).is_finite());

        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        for _ in 0..100 {
            let draw = estimator.sample(&mut rng);
            assert!(interval.contains(draw) || draw == interval.end());
        }
        Ok(())
    }

    #[test]
    fn density_concentrates_on_observations() -> anyhow::Result<()> {
        let interval = Interval::new(0.0, 10.0);
        let observed = vec![2.0, 2.1, 1.9, 2.05];
        let estimator = ParzenEstimatorBuilder::new()
            .build_density_estimator(observed.iter().copied(), interval)?;

        assert!(estimator.log_pdf(2.0) > estimator.log_pdf(8.0));
        Ok(())
    }

    #[test]
    fn non_finite_observations_are_dropped() -> anyhow::Result<()> {
        let interval = Interval::new(0.0, 1.0);
        let observed = vec![std::f64::NAN, 0.5, std::f64::INFINITY];
        let estimator = ParzenEstimatorBuilder::new()
            .build_density_estimator(observed.iter().copied(), interval)?;
        assert!(estimator.log_pdf(0.5).is_finite());
        Ok(())
    }
}
