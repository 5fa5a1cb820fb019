//! Classifier-output integrators.
//!
//! An integrator consumes predicted instances and produces two tables: a
//! per-(domain, classifier) error-rate estimate and a per-(domain, instance)
//! consensus label probability. Three estimators are available:
//!
//! - [`MajorityVoteIntegrator`]: one-shot vote, no sampling
//! - [`BayesianIntegrator`]: independent Gibbs sampler per domain
//! - [`CoupledBayesianIntegrator`]: Gibbs sampler whose error rates are shared
//!   by Dirichlet-process clusters of domains

pub mod bayesian;
pub mod config;
pub mod coupled;
pub mod dirichlet;
pub mod index;
pub mod majority;
pub mod sampling;
pub mod statistics;
pub mod trace;

use std::sync::Arc;

use nalgebra::DMatrix;

use crate::data::{
    ErrorRate, ErrorRates, IntegratedData, IntegratedInstance, Label, PredictedInstance,
};

pub use bayesian::BayesianIntegrator;
pub use config::{ConfigError, CoupledConfig, SamplerConfig};
pub use coupled::CoupledBayesianIntegrator;
pub use majority::MajorityVoteIntegrator;
pub use statistics::{DomainCounts, SufficientStatistics};
pub use trace::{
    JsonlTraceSink, JsonlWriter, MemoryTraceSink, SampleTrace, SampleTraceSink, TraceError,
    TraceWorker,
};

use index::ObservationIndex;
use sampling::DomainSums;

#[derive(Debug, thiserror::Error)]
pub enum IntegratorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("no predicted instances to integrate")]
    EmptyData,
    #[error("prediction of classifier {classifier} for instance {instance} in domain {label} must be in [0, 1] (got {value})")]
    InvalidPrediction {
        label: Label,
        instance: i64,
        classifier: i64,
        value: f64,
    },
    #[error("duplicate prediction of classifier {classifier} for instance {instance} in domain {label}")]
    DuplicateObservation {
        label: Label,
        instance: i64,
        classifier: i64,
    },
    #[error("classifier {classifier} has no predictions in domain {label}")]
    UnobservedClassifier { label: Label, classifier: i64 },
    #[error("observed instance refers to unknown domain {label}")]
    UnknownDomain { label: Label },
    #[error("unknown integration method {0:?} (expected mvi, bi or cbi)")]
    UnknownMethod(String),
    #[error("numerical failure: {0}")]
    Numerical(String),
    #[error("domain sampler failed: {0}")]
    Worker(String),
    #[error("trace error: {0}")]
    Trace(#[from] TraceError),
}

/// Common surface of all integrators.
///
/// Results are computed on first access and cached; `force = true` reruns
/// inference from the current sampler state.
pub trait Integrator {
    fn error_rates(&mut self, force: bool) -> Result<&ErrorRates, IntegratorError>;
    fn integrated_data(&mut self, force: bool) -> Result<&IntegratedData, IntegratorError>;
}

/// Closed set of integration methods, selectable by name.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegratorKind {
    MajorityVote,
    Bayesian(SamplerConfig),
    CoupledBayesian(CoupledConfig),
}

impl IntegratorKind {
    /// `name` is one of `mvi`/`majority`, `bi`/`bayesian`, `cbi`/`coupled`;
    /// `options` is the colon-separated options string (ignored by majority vote).
    pub fn from_name(name: &str, options: &str) -> Result<Self, IntegratorError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mvi" | "majority" => Ok(Self::MajorityVote),
            "bi" | "bayesian" => Ok(Self::Bayesian(SamplerConfig::from_options(options)?)),
            "cbi" | "coupled" => Ok(Self::CoupledBayesian(CoupledConfig::from_options(options)?)),
            other => Err(IntegratorError::UnknownMethod(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MajorityVote => "mvi",
            Self::Bayesian(_) => "bi",
            Self::CoupledBayesian(_) => "cbi",
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        match self {
            Self::MajorityVote => Self::MajorityVote,
            Self::Bayesian(cfg) => Self::Bayesian(cfg.with_seed(seed)),
            Self::CoupledBayesian(cfg) => Self::CoupledBayesian(cfg.with_seed(seed)),
        }
    }

    pub fn build(
        self,
        data: &[PredictedInstance],
    ) -> Result<Box<dyn Integrator + Send>, IntegratorError> {
        self.build_with_trace(data, None)
    }

    /// Like [`build`](Self::build), attaching `trace` to the Bayesian samplers.
    pub fn build_with_trace(
        self,
        data: &[PredictedInstance],
        trace: Option<Arc<dyn SampleTraceSink>>,
    ) -> Result<Box<dyn Integrator + Send>, IntegratorError> {
        Ok(match self {
            Self::MajorityVote => Box::new(MajorityVoteIntegrator::new(data)?),
            Self::Bayesian(cfg) => {
                let mut integrator = BayesianIntegrator::new(data, cfg)?;
                if let Some(sink) = trace {
                    integrator = integrator.with_trace(sink);
                }
                Box::new(integrator)
            }
            Self::CoupledBayesian(cfg) => {
                let mut integrator = CoupledBayesianIntegrator::new(data, cfg)?;
                if let Some(sink) = trace {
                    integrator = integrator.with_trace(sink);
                }
                Box::new(integrator)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Posterior summaries
// ---------------------------------------------------------------------------

/// Materialized output of one inference run.
#[derive(Debug, Clone)]
pub(crate) struct Posterior {
    pub error_rates: ErrorRates,
    pub integrated: IntegratedData,
    pub label_priors: Vec<(Label, f64)>,
}

impl Posterior {
    /// Divide the running sums by their sample counts. Rows follow domain
    /// order, then classifier (or instance) order.
    pub fn from_sums(index: &ObservationIndex, sums: &[DomainSums]) -> Self {
        let means = DMatrix::from_fn(
            index.number_of_domains(),
            index.number_of_classifiers(),
            |p, j| sums[p].error_rate_mean(j),
        );

        let mut error_rates = Vec::with_capacity(means.len());
        let mut integrated = Vec::new();
        let mut label_priors = Vec::with_capacity(sums.len());
        for (p, domain) in index.domains.iter().enumerate() {
            for (j, &function_id) in index.classifiers.keys().iter().enumerate() {
                error_rates.push(ErrorRate {
                    label: domain.label.clone(),
                    function_id,
                    value: means[(p, j)],
                });
            }
            for (i, &id) in domain.instances.keys().iter().enumerate() {
                integrated.push(IntegratedInstance {
                    id,
                    label: domain.label.clone(),
                    value: sums[p].label_mean(i),
                });
            }
            label_priors.push((domain.label.clone(), sums[p].label_prior_mean()));
        }

        Self {
            error_rates: ErrorRates::new(error_rates),
            integrated: IntegratedData::new(integrated),
            label_priors,
        }
    }
}
