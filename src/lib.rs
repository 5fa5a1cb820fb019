#![forbid(unsafe_code)]

//! # consensus-harness
//!
//! Estimate how often each of several noisy binary classifiers is wrong, and
//! what the true labels probably are, without any ground truth.
//!
//! Every classifier labels the same instances of one or more domains. A Gibbs
//! sampler treats the true labels as latent variables and infers them jointly
//! with a label prior per domain and an error rate per classifier. The coupled
//! variant clusters domains under a Dirichlet-process prior so that related
//! domains share error-rate estimates.
//!
//! ```no_run
//! use consensus_harness::{load_predicted_instances, Integrator, IntegratorKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = load_predicted_instances("predictions.csv")?;
//! let mut integrator = IntegratorKind::from_name("cbi", "")?.with_seed(7).build(&data)?;
//! for rate in integrator.error_rates(false)?.iter() {
//!     println!("{} {} {:.3}", rate.label, rate.function_id, rate.value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod evaluation;
pub mod integrator;

pub use data::{
    load_error_rates, load_integrated_data, load_observed_instances, load_predicted_instances,
    save_error_rates, save_integrated_data, save_observed_instances, save_predicted_instances,
    DataError, ErrorRate, ErrorRates, IntegratedData, IntegratedInstance, Label, ObservedInstance,
    PredictedInstance, TableFormat,
};
pub use integrator::{
    BayesianIntegrator, ConfigError, CoupledBayesianIntegrator, CoupledConfig, Integrator,
    IntegratorError, IntegratorKind, JsonlTraceSink, JsonlWriter, MajorityVoteIntegrator,
    MemoryTraceSink, SampleTrace, SampleTraceSink, SamplerConfig, SufficientStatistics,
    TraceError, TraceWorker,
};
