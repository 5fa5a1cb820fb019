//! Uncoupled Gibbs sampler: every domain has its own label prior and its own
//! per-classifier error rates.
//!
//! One sweep of a domain chain:
//! 1. label prior ~ Beta(α_l + #label=1, β_l + #label=0)
//! 2. error rate of classifier j ~ Beta(α_e + d_j, β_e + o_j - d_j)
//! 3. every consensus label is redrawn from its Bernoulli posterior
//!
//! Domains never read each other's state, so each chain owns a private RNG
//! seeded from the integrator's generator and may run on its own thread.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::data::{ErrorRates, IntegratedData, Label, ObservedInstance, PredictedInstance};

use super::config::SamplerConfig;
use super::index::{DomainObservations, ObservationIndex};
use super::sampling::{
    domain_log_likelihood, label_posterior, sample_bernoulli, sample_beta, seeded_rng, DomainSums,
};
use super::statistics::{DomainCounts, SufficientStatistics};
use super::trace::{SampleTrace, SampleTraceSink};
use super::{Integrator, IntegratorError, Posterior};

/// Error rate every chain starts from.
pub(crate) const INITIAL_ERROR_RATE: f64 = 0.25;
/// Label prior every chain starts from.
pub(crate) const INITIAL_LABEL_PRIOR: f64 = 0.5;

/// Current sample state of one domain.
#[derive(Debug, Clone)]
struct DomainChain {
    label_prior: f64,
    error_rates: Vec<f64>,
    labels: Vec<u8>,
    counts: DomainCounts,
}

/// Per-sample summary of one chain, merged across domains for tracing.
#[derive(Debug, Clone, Copy)]
struct ChainSnapshot {
    label_prior: f64,
    error_rate_sum: f64,
    log_likelihood: f64,
}

struct DomainRun {
    sums: DomainSums,
    /// One entry per retained sample; empty unless the run is traced.
    snapshots: Vec<ChainSnapshot>,
}

impl DomainChain {
    fn new(domain: &DomainObservations, labels: Vec<u8>, number_of_classifiers: usize) -> Self {
        let counts = DomainCounts::from_labels(domain, &labels, number_of_classifiers);
        Self {
            label_prior: INITIAL_LABEL_PRIOR,
            error_rates: vec![INITIAL_ERROR_RATE; number_of_classifiers],
            labels,
            counts,
        }
    }

    fn sweep(
        &mut self,
        domain: &DomainObservations,
        config: &SamplerConfig,
        rng: &mut StdRng,
    ) -> Result<(), IntegratorError> {
        self.label_prior = sample_beta(
            rng,
            config.labels_prior_alpha + f64::from(self.counts.label_count(1)),
            config.labels_prior_beta + f64::from(self.counts.label_count(0)),
        )?;

        for (j, rate) in self.error_rates.iter_mut().enumerate() {
            let d = f64::from(self.counts.disagreements(j));
            let o = f64::from(self.counts.observations(j));
            *rate = sample_beta(
                rng,
                config.error_rates_prior_alpha + d,
                config.error_rates_prior_beta + o - d,
            )?;
        }

        for i in 0..domain.number_of_instances() {
            let observations = domain.instance(i);
            self.counts.before_resample(self.labels[i], observations);
            let p1 = label_posterior(self.label_prior, observations, |j| self.error_rates[j]);
            self.labels[i] = sample_bernoulli(rng, p1)?;
            self.counts.after_resample(self.labels[i], observations);
        }
        Ok(())
    }

    fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            label_prior: self.label_prior,
            error_rate_sum: self.error_rates.iter().sum(),
            log_likelihood: domain_log_likelihood(&self.counts, self.label_prior, |j| {
                self.error_rates[j]
            }),
        }
    }

    fn retain(&self, run: &mut DomainRun, traced: bool) {
        run.sums
            .accumulate(self.label_prior, |j| self.error_rates[j], &self.labels);
        if traced {
            run.snapshots.push(self.snapshot());
        }
    }

    /// Burn-in, then `number_of_samples` retained draws separated by
    /// `number_of_thinning_samples` discarded sweeps.
    fn run(
        &mut self,
        domain: &DomainObservations,
        config: &SamplerConfig,
        seed: u64,
        traced: bool,
    ) -> Result<DomainRun, IntegratorError> {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..config.number_of_burn_in_samples {
            self.sweep(domain, config, &mut rng)?;
        }

        let mut run = DomainRun {
            sums: DomainSums::new(self.error_rates.len(), self.labels.len()),
            snapshots: Vec::with_capacity(if traced { config.number_of_samples } else { 0 }),
        };
        self.retain(&mut run, traced);
        for _ in 1..config.number_of_samples {
            for _ in 0..=config.number_of_thinning_samples {
                self.sweep(domain, config, &mut rng)?;
            }
            self.retain(&mut run, traced);
        }
        Ok(run)
    }
}

pub struct BayesianIntegrator {
    config: SamplerConfig,
    index: ObservationIndex,
    chains: Vec<DomainChain>,
    rng: StdRng,
    trace: Option<Arc<dyn SampleTraceSink>>,
    posterior: Option<Posterior>,
}

impl BayesianIntegrator {
    pub fn new(data: &[PredictedInstance], config: SamplerConfig) -> Result<Self, IntegratorError> {
        config.validate()?;
        let index = ObservationIndex::build(data)?;
        index.require_full_coverage()?;

        let n = index.number_of_classifiers();
        let chains = index
            .domains
            .iter()
            .map(|domain| DomainChain::new(domain, domain.majority_labels(), n))
            .collect();
        let rng = seeded_rng(config.seed);
        debug!(
            domains = index.number_of_domains(),
            classifiers = n,
            "bayesian integrator initialized"
        );

        Ok(Self {
            config,
            index,
            chains,
            rng,
            trace: None,
            posterior: None,
        })
    }

    /// Start the chains from known labels where `observed` provides them
    /// instead of the majority vote. Instances absent from the predictions
    /// are ignored.
    pub fn with_observed(mut self, observed: &[ObservedInstance]) -> Result<Self, IntegratorError> {
        let n = self.index.number_of_classifiers();
        for row in observed {
            let p = self
                .index
                .domain_index(&row.label)
                .ok_or_else(|| IntegratorError::UnknownDomain {
                    label: row.label.clone(),
                })?;
            if let Some(i) = self.index.domains[p].instances.get(&row.id) {
                self.chains[p].labels[i] = u8::from(row.value);
            }
        }
        for (chain, domain) in self.chains.iter_mut().zip(&self.index.domains) {
            chain.counts = DomainCounts::from_labels(domain, &chain.labels, n);
        }
        self.posterior = None;
        Ok(self)
    }

    pub fn with_trace(mut self, sink: Arc<dyn SampleTraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Incrementally maintained counts of the current state.
    pub fn statistics(&self) -> SufficientStatistics {
        SufficientStatistics::uncoupled(self.chains.iter().map(|c| c.counts.clone()).collect())
    }

    /// Counts re-derived from scratch from the current labels.
    pub fn recomputed_statistics(&self) -> SufficientStatistics {
        let n = self.index.number_of_classifiers();
        SufficientStatistics::uncoupled(
            self.chains
                .iter()
                .zip(&self.index.domains)
                .map(|(chain, domain)| DomainCounts::from_labels(domain, &chain.labels, n))
                .collect(),
        )
    }

    /// Posterior mean label prior per domain, running inference if needed.
    pub fn label_prior_means(&mut self) -> Result<&[(Label, f64)], IntegratorError> {
        Ok(&self.posterior(false)?.label_priors)
    }

    fn posterior(&mut self, force: bool) -> Result<&Posterior, IntegratorError> {
        let posterior = match self.posterior.take() {
            Some(posterior) if !force => posterior,
            _ => self.infer()?,
        };
        Ok(self.posterior.insert(posterior))
    }

    fn infer(&mut self) -> Result<Posterior, IntegratorError> {
        let seeds: Vec<u64> = (0..self.chains.len()).map(|_| self.rng.gen()).collect();
        let config = &self.config;
        let traced = self.trace.is_some();
        debug!(
            burn_in = config.number_of_burn_in_samples,
            thinning = config.number_of_thinning_samples,
            samples = config.number_of_samples,
            parallel = config.parallel_domains,
            "bayesian inference started"
        );

        let results: Vec<Result<DomainRun, IntegratorError>> = if config.parallel_domains {
            std::thread::scope(|scope| {
                let handles: Vec<_> = self
                    .chains
                    .iter_mut()
                    .zip(&self.index.domains)
                    .zip(&seeds)
                    .map(|((chain, domain), &seed)| {
                        scope.spawn(move || chain.run(domain, config, seed, traced))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            Err(IntegratorError::Worker("domain sampler panicked".to_string()))
                        })
                    })
                    .collect()
            })
        } else {
            self.chains
                .iter_mut()
                .zip(&self.index.domains)
                .zip(&seeds)
                .map(|((chain, domain), &seed)| chain.run(domain, config, seed, traced))
                .collect()
        };
        let runs = results.into_iter().collect::<Result<Vec<_>, _>>()?;

        if let Some(sink) = &self.trace {
            emit_trace(&**sink, &runs, config, self.index.number_of_classifiers())?;
        }

        let sums: Vec<DomainSums> = runs.into_iter().map(|run| run.sums).collect();
        let posterior = Posterior::from_sums(&self.index, &sums);
        info!(
            domains = self.index.number_of_domains(),
            sweeps = sweeps_per_run(config),
            "bayesian inference completed"
        );
        Ok(posterior)
    }
}

/// Total sweeps of one inference run.
pub(crate) fn sweeps_per_run(config: &SamplerConfig) -> usize {
    config.number_of_burn_in_samples
        + config.number_of_samples.saturating_sub(1) * (config.number_of_thinning_samples + 1)
}

/// Sweeps completed when retained sample `sample_index` is taken.
pub(crate) fn sweep_of_sample(config: &SamplerConfig, sample_index: usize) -> usize {
    config.number_of_burn_in_samples + sample_index * (config.number_of_thinning_samples + 1)
}

fn emit_trace(
    sink: &dyn SampleTraceSink,
    runs: &[DomainRun],
    config: &SamplerConfig,
    number_of_classifiers: usize,
) -> Result<(), IntegratorError> {
    let domains = runs.len() as f64;
    let rates = (runs.len() * number_of_classifiers).max(1) as f64;
    for sample_index in 0..config.number_of_samples {
        let mut label_prior = 0.0;
        let mut error_rate = 0.0;
        let mut log_likelihood = 0.0;
        for run in runs {
            let snapshot = run.snapshots[sample_index];
            label_prior += snapshot.label_prior;
            error_rate += snapshot.error_rate_sum;
            log_likelihood += snapshot.log_likelihood;
        }
        sink.record(SampleTrace {
            sample_index,
            sweep: sweep_of_sample(config, sample_index),
            number_of_clusters: runs.len(),
            mean_label_prior: label_prior / domains,
            mean_error_rate: error_rate / rates,
            log_likelihood,
        })?;
    }
    Ok(())
}

impl Integrator for BayesianIntegrator {
    fn error_rates(&mut self, force: bool) -> Result<&ErrorRates, IntegratorError> {
        Ok(&self.posterior(force)?.error_rates)
    }

    fn integrated_data(&mut self, force: bool) -> Result<&IntegratedData, IntegratorError> {
        Ok(&self.posterior(force)?.integrated)
    }
}
