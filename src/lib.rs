//! A black-box hyperparameter optimization engine.
//!
//! A caller declares a [`SearchSpace`], picks a [`Direction`], and drives an
//! ask/tell loop against a [`Study`]: ask proposes a parameter assignment,
//! the caller evaluates its objective and tells the result back. Samplers
//! ([`RandomSampler`], [`TpeSampler`], [`CmaEsSampler`]) concentrate later
//! proposals on promising regions; multi-objective studies expose the
//! Pareto front instead of a single best trial.
//!
//! # Examples
//!
//! Minimizing a quadratic over one float parameter:
//!
//! ```
//! use hypertune::{Direction, ParameterRange, SearchSpace, Study};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let space = SearchSpace::new(vec![ParameterRange::float("x", -5.0, 5.0)?])?;
//! let study = Study::new("quadratic", space, Direction::Minimize);
//!
//! for _ in 0..50 {
//!     let trial = study.ask();
//!     let x = trial.params["x"].as_float().unwrap();
//!     study.tell(trial.number, x * x)?;
//! }
//!
//! let best = study.best_trial().unwrap();
//! assert!(best.value.unwrap() < 25.0);
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

pub mod density_estimation;
pub mod pareto;
pub mod pbt;
pub mod pruner;
pub mod sampler;
pub mod search_space;
pub mod snapshot;
pub mod study;
pub mod trial;

pub use self::pruner::{MedianPruner, NopPruner, Pruner};
pub use self::sampler::{
    BuildError, CmaEsSampler, CmaEsSamplerBuilder, RandomSampler, Sampler, TpeSampler,
    TpeSamplerBuilder,
};
pub use self::search_space::{ParamValue, ParameterRange, SearchSpace, SearchSpaceError};
pub use self::study::{Study, StudyBuilder, StudyError, TellResult};
pub use self::trial::{Direction, Trial, TrialState};

/// Accelerator backend hint for objective evaluation environments.
///
/// Declared for forward compatibility; none of the core algorithms
/// consult it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuBackend {
    /// Evaluate on the CPU.
    None,

    /// NVIDIA CUDA devices.
    Cuda,

    /// Apple Metal devices.
    Metal,

    /// Vulkan compute devices.
    Vulkan,
}
