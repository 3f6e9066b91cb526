use crate::sampler::random::{uniform_assignment, uniform_draw};
use crate::sampler::{BuildError, Sampler};
use crate::search_space::{ParamValue, ParameterRange, SearchSpace};
use crate::trial::{Direction, Trial, TrialState};
use log::debug;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::HashMap;

// Floor for covariance eigenvalues, keeps the sampling basis invertible.
const MIN_EIGENVALUE: f64 = 1e-12;

/// Builder of [`CmaEsSampler`].
#[derive(Debug)]
pub struct CmaEsSamplerBuilder {
    startup_trials: Option<usize>,
    population_size: Option<usize>,
    sigma0: f64,
    seed: Option<u64>,
}

impl CmaEsSamplerBuilder {
    /// Makes a new `CmaEsSamplerBuilder` instance with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many Complete trials must exist before CMA-ES takes over
    /// from random sampling.
    ///
    /// The default is the number of continuous dimensions.
    pub fn startup_trials(&mut self, startup_trials: usize) -> &mut Self {
        self.startup_trials = Some(startup_trials);
        self
    }

    /// Overrides the generation size λ.
    ///
    /// The default value is `4 + ⌊3·ln d⌋`.
    pub fn population_size(&mut self, population_size: usize) -> &mut Self {
        self.population_size = Some(population_size);
        self
    }

    /// Sets the initial step size in normalized coordinates.
    ///
    /// The default value is `0.3`, i.e. 0.3 times each range's width.
    pub fn sigma0(&mut self, sigma0: f64) -> &mut Self {
        self.sigma0 = sigma0;
        self
    }

    /// Seeds the sampler's RNG for deterministic proposals.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Builds a `CmaEsSampler` with the given settings.
    pub fn build(&self) -> Result<CmaEsSampler, BuildError> {
        if !(self.sigma0 > 0.0) {
            return Err(BuildError::NonPositiveSigma);
        }
        if self.population_size == Some(0) {
            return Err(BuildError::ZeroPopulation);
        }
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(CmaEsSampler {
            rng,
            sigma0: self.sigma0,
            startup_trials: self.startup_trials,
            population_size: self.population_size,
            state: None,
            consumed: 0,
        })
    }
}

impl Default for CmaEsSamplerBuilder {
    fn default() -> Self {
        Self {
            startup_trials: None,
            population_size: None,
            sigma0: 0.3,
            seed: None,
        }
    }
}

/// (μ/μ_w, λ)-CMA-ES sampler over the continuous subspace.
///
/// Float and integer ranges evolve under the covariance adaptation, in
/// per-dimension normalized coordinates (integers round on output);
/// categorical ranges fall back to a uniform draw on every call. A purely
/// categorical space delegates entirely to random sampling.
#[derive(Debug)]
pub struct CmaEsSampler {
    rng: StdRng,
    sigma0: f64,
    startup_trials: Option<usize>,
    population_size: Option<usize>,
    state: Option<CmaState>,
    consumed: usize,
}

#[derive(Debug)]
struct CmaState {
    dim: usize,
    lambda: usize,
    mu: usize,
    weights: Vec<f64>,
    mu_eff: f64,
    c_sigma: f64,
    d_sigma: f64,
    c_c: f64,
    c1: f64,
    c_mu: f64,
    chi_n: f64,
    mean: DVector<f64>,
    sigma: f64,
    cov: DMatrix<f64>,
    p_sigma: DVector<f64>,
    p_c: DVector<f64>,
    eig_vectors: DMatrix<f64>,
    eig_sqrt: DVector<f64>,
    generation: usize,
}

impl CmaState {
    fn new(dim: usize, lambda: usize, sigma0: f64) -> Self {
        let d = dim as f64;
        let mu = (lambda / 2).max(1);

        let raw: Vec<f64> = (0..mu)
            .map(|i| ((lambda as f64 + 1.0) / 2.0).ln() - ((i + 1) as f64).ln())
            .collect();
        let total: f64 = raw.iter().sum();
        let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();
        let mu_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let c_sigma = (mu_eff + 2.0) / (d + mu_eff + 5.0);
        let d_sigma =
            1.0 + 2.0 * (((mu_eff - 1.0) / (d + 1.0)).sqrt() - 1.0).max(0.0) + c_sigma;
        let c_c = (4.0 + mu_eff / d) / (d + 4.0 + 2.0 * mu_eff / d);
        let c1 = 2.0 / ((d + 1.3).powi(2) + mu_eff);
        let c_mu = (1.0 - c1)
            .min(2.0 * (mu_eff - 2.0 + 1.0 / mu_eff) / ((d + 2.0).powi(2) + mu_eff));
        let chi_n = d.sqrt() * (1.0 - 1.0 / (4.0 * d) + 1.0 / (21.0 * d * d));

        Self {
            dim,
            lambda,
            mu,
            weights,
            mu_eff,
            c_sigma,
            d_sigma,
            c_c,
            c1,
            c_mu,
            chi_n,
            mean: DVector::from_element(dim, 0.5),
            sigma: sigma0,
            cov: DMatrix::identity(dim, dim),
            p_sigma: DVector::zeros(dim),
            p_c: DVector::zeros(dim),
            eig_vectors: DMatrix::identity(dim, dim),
            eig_sqrt: DVector::from_element(dim, 1.0),
            generation: 0,
        }
    }

    fn refresh_eigen(&mut self) {
        let symmetric = (&self.cov + self.cov.transpose()) * 0.5;
        let eig = SymmetricEigen::new(symmetric);
        self.eig_vectors = eig.eigenvectors;
        self.eig_sqrt = eig.eigenvalues.map(|v| v.max(MIN_EIGENVALUE).sqrt());
    }

    fn inv_sqrt_mul(&self, v: &DVector<f64>) -> DVector<f64> {
        let t = self.eig_vectors.transpose() * v;
        let t = t.component_div(&self.eig_sqrt);
        &self.eig_vectors * t
    }

    /// One (μ/μ_w, λ) update from a generation already sorted best-first.
    fn update(&mut self, generation: &[DVector<f64>]) {
        let old_mean = self.mean.clone();
        let ys: Vec<DVector<f64>> = generation
            .iter()
            .take(self.mu)
            .map(|x| (x - &old_mean) / self.sigma)
            .collect();
        let mut y_w = DVector::zeros(self.dim);
        for (w, y) in self.weights.iter().zip(&ys) {
            y_w += y * *w;
        }

        self.mean = &old_mean + &y_w * self.sigma;

        let c_inv_y = self.inv_sqrt_mul(&y_w);
        self.p_sigma = &self.p_sigma * (1.0 - self.c_sigma)
            + c_inv_y * (self.c_sigma * (2.0 - self.c_sigma) * self.mu_eff).sqrt();
        self.sigma *=
            ((self.c_sigma / self.d_sigma) * (self.p_sigma.norm() / self.chi_n - 1.0)).exp();

        self.generation += 1;
        let decay = 1.0 - (1.0 - self.c_sigma).powi(2 * self.generation as i32);
        let h_sigma = self.p_sigma.norm() / decay.sqrt()
            < (1.4 + 2.0 / (self.dim as f64 + 1.0)) * self.chi_n;
        let h = if h_sigma { 1.0 } else { 0.0 };

        self.p_c = &self.p_c * (1.0 - self.c_c)
            + &y_w * (h * (self.c_c * (2.0 - self.c_c) * self.mu_eff).sqrt());

        let delta_h = (1.0 - h) * self.c_c * (2.0 - self.c_c);
        let mut rank_mu = DMatrix::zeros(self.dim, self.dim);
        for (w, y) in self.weights.iter().zip(&ys) {
            rank_mu += y * y.transpose() * *w;
        }
        self.cov = &self.cov * (1.0 - self.c1 - self.c_mu)
            + (&self.p_c * self.p_c.transpose() + &self.cov * delta_h) * self.c1
            + rank_mu * self.c_mu;

        self.refresh_eigen();
        debug!(
            "cma-es generation {}: sigma={:.6}, |p_sigma|={:.6}",
            self.generation,
            self.sigma,
            self.p_sigma.norm()
        );
    }
}

impl CmaEsSampler {
    /// Makes a new `CmaEsSampler` with the default settings.
    ///
    /// If you want to customize the settings, please use
    /// [`CmaEsSamplerBuilder`] instead.
    pub fn new() -> Self {
        CmaEsSamplerBuilder::new().build().expect("unreachable")
    }

    /// Makes a new `CmaEsSampler` with a fixed seed and default settings.
    pub fn with_seed(seed: u64) -> Self {
        CmaEsSamplerBuilder::new()
            .seed(seed)
            .build()
            .expect("unreachable")
    }

    fn default_lambda(dim: usize) -> usize {
        4 + (3.0 * (dim as f64).ln()).floor() as usize
    }

    /// Normalizes a trial's continuous parameters into the unit hypercube.
    fn normalize(trial: &Trial, continuous: &[&ParameterRange]) -> DVector<f64> {
        DVector::from_fn(continuous.len(), |i, _| {
            let range = continuous[i];
            let interval = range.internal_interval();
            trial
                .params
                .get(range.name())
                .and_then(|v| range.to_internal(v))
                .map(|x| ((x - interval.start()) / interval.width()).max(0.0).min(1.0))
                .unwrap_or(0.5)
        })
    }

    fn consume_generations(
        &mut self,
        completes: &[&Trial],
        direction: Direction,
        continuous: &[&ParameterRange],
    ) {
        let state = self.state.as_mut().expect("unreachable");
        while completes.len().saturating_sub(self.consumed) >= state.lambda {
            let mut chunk: Vec<&Trial> =
                completes[self.consumed..self.consumed + state.lambda].to_vec();
            chunk.sort_by_key(|t| OrderedFloat(direction.key(t.value.expect("unreachable"))));
            let generation: Vec<DVector<f64>> = chunk
                .iter()
                .map(|t| Self::normalize(t, continuous))
                .collect();
            state.update(&generation);
            self.consumed += state.lambda;
        }
    }

    fn draw(&mut self, continuous: &[&ParameterRange]) -> Vec<(String, ParamValue)> {
        let dim = self.state.as_ref().expect("unreachable").dim;
        let z = DVector::from_fn(dim, |_, _| self.rng.sample::<f64, _>(StandardNormal));
        let state = self.state.as_ref().expect("unreachable");
        let y = &state.eig_vectors * z.component_mul(&state.eig_sqrt);
        let u = &state.mean + y * state.sigma;

        continuous
            .iter()
            .enumerate()
            .map(|(i, range)| {
                let interval = range.internal_interval();
                let clipped = u[i].max(0.0).min(1.0);
                let internal = interval.start() + clipped * interval.width();
                (range.name().to_owned(), range.from_internal(internal))
            })
            .collect()
    }
}

impl Default for CmaEsSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn continuous_ranges(space: &SearchSpace) -> Vec<&ParameterRange> {
    space
        .iter()
        .filter(|r| !matches!(r, ParameterRange::Categorical { .. }))
        .collect()
}

impl Sampler for CmaEsSampler {
    fn sample(
        &mut self,
        history: &[Trial],
        direction: Direction,
        space: &SearchSpace,
    ) -> HashMap<String, ParamValue> {
        let continuous = continuous_ranges(space);
        let dim = continuous.len();
        if dim == 0 {
            return uniform_assignment(&mut self.rng, space);
        }

        let completes: Vec<&Trial> = history
            .iter()
            .filter(|t| t.state == TrialState::Complete && t.has_finite_value())
            .collect();
        let startup = self.startup_trials.unwrap_or(dim);
        if completes.len() < startup {
            return uniform_assignment(&mut self.rng, space);
        }

        let lambda = self.population_size.unwrap_or_else(|| Self::default_lambda(dim));
        if self.state.as_ref().map_or(true, |s| s.dim != dim) {
            self.state = Some(CmaState::new(dim, lambda, self.sigma0));
            self.consumed = 0;
        }

        self.consume_generations(&completes, direction, &continuous);

        let mut params: HashMap<String, ParamValue> =
            self.draw(&continuous).into_iter().collect();
        for range in space.iter() {
            if let ParameterRange::Categorical { .. } = range {
                params.insert(range.name().to_owned(), uniform_draw(&mut self.rng, range));
            }
        }
        params
    }
}
