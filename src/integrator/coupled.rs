//! Coupled Gibbs sampler: domains are clustered by a Dirichlet-process prior
//! and every domain in a cluster shares that cluster's error rates.
//!
//! Sweep order: label priors and cluster error rates, then cluster
//! assignments, then consensus labels.
//!
//! Cluster moves score occupied clusters with the point-estimate likelihood
//! at the cluster's current error rates, and the new-cluster candidate with
//! the Beta-Binomial marginal. The sampler is therefore not fully collapsed.

use std::sync::Arc;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use statrs::function::beta::ln_beta;
use tracing::{debug, info, warn};

use crate::data::{ErrorRates, IntegratedData, Label, PredictedInstance};

use super::bayesian::{sweep_of_sample, sweeps_per_run, INITIAL_ERROR_RATE, INITIAL_LABEL_PRIOR};
use super::config::CoupledConfig;
use super::dirichlet::DirichletProcess;
use super::index::ObservationIndex;
use super::sampling::{
    binomial_log_likelihood, domain_log_likelihood, label_posterior, log_sum_exp, log_uniform,
    sample_bernoulli, sample_beta, seeded_rng, DomainSums,
};
use super::statistics::{DomainCounts, SufficientStatistics};
use super::trace::{SampleTrace, SampleTraceSink};
use super::{Integrator, IntegratorError, Posterior};

pub struct CoupledBayesianIntegrator {
    config: CoupledConfig,
    index: ObservationIndex,

    // -- Sample state ------------------------------------------------------
    label_priors: Vec<f64>,
    /// Rows are cluster ids, columns classifiers.
    error_rates: DMatrix<f64>,
    labels: Vec<Vec<u8>>,
    assignments: Vec<usize>,

    // -- Bookkeeping -------------------------------------------------------
    dp: DirichletProcess,
    statistics: SufficientStatistics,
    log_weights: Vec<f64>,
    sweeps: usize,

    rng: StdRng,
    trace: Option<Arc<dyn SampleTraceSink>>,
    posterior: Option<Posterior>,
}

impl CoupledBayesianIntegrator {
    /// Every domain starts in its own cluster with majority-vote labels.
    pub fn new(data: &[PredictedInstance], config: CoupledConfig) -> Result<Self, IntegratorError> {
        config.validate()?;
        let index = ObservationIndex::build(data)?;
        index.require_full_coverage()?;

        let domains = index.number_of_domains();
        let classifiers = index.number_of_classifiers();
        if domains == 1 {
            warn!("coupled integrator with a single domain behaves like the uncoupled one");
        }

        let labels: Vec<Vec<u8>> = index.domains.iter().map(|d| d.majority_labels()).collect();
        let counts = index
            .domains
            .iter()
            .zip(&labels)
            .map(|(domain, labels)| DomainCounts::from_labels(domain, labels, classifiers))
            .collect();
        let mut statistics = SufficientStatistics::coupled(counts, domains);
        let mut dp = DirichletProcess::new(config.alpha, domains);
        let assignments: Vec<usize> = (0..domains).collect();
        for (p, &k) in assignments.iter().enumerate() {
            dp.add_member_to_cluster(k);
            statistics.add_domain_to_cluster(p, k);
        }
        let rng = seeded_rng(config.sampler.seed);
        debug!(
            domains,
            classifiers,
            alpha = config.alpha,
            "coupled integrator initialized"
        );

        Ok(Self {
            label_priors: vec![INITIAL_LABEL_PRIOR; domains],
            error_rates: DMatrix::from_element(domains, classifiers, INITIAL_ERROR_RATE),
            labels,
            assignments,
            dp,
            statistics,
            log_weights: Vec::with_capacity(domains),
            sweeps: 0,
            config,
            index,
            rng,
            trace: None,
            posterior: None,
        })
    }

    pub fn with_trace(mut self, sink: Arc<dyn SampleTraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn config(&self) -> &CoupledConfig {
        &self.config
    }

    /// Current cluster id of every domain, in domain order.
    pub fn cluster_assignments(&self) -> &[usize] {
        &self.assignments
    }

    pub fn number_of_clusters(&self) -> usize {
        self.dp.number_of_clusters()
    }

    pub fn statistics(&self) -> SufficientStatistics {
        self.statistics.clone()
    }

    /// Counts re-derived from the current labels and cluster assignments.
    pub fn recomputed_statistics(&self) -> SufficientStatistics {
        let classifiers = self.index.number_of_classifiers();
        let counts = self
            .index
            .domains
            .iter()
            .zip(&self.labels)
            .map(|(domain, labels)| DomainCounts::from_labels(domain, labels, classifiers))
            .collect();
        let mut statistics = SufficientStatistics::coupled(counts, self.index.number_of_domains());
        for (p, &k) in self.assignments.iter().enumerate() {
            statistics.add_domain_to_cluster(p, k);
        }
        statistics
    }

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

    // -----------------------------------------------------------------------
    // Gibbs steps
    // -----------------------------------------------------------------------

    fn sample_priors_and_error_rates(&mut self) -> Result<(), IntegratorError> {
        let sampler = &self.config.sampler;
        for (p, prior) in self.label_priors.iter_mut().enumerate() {
            let counts = self.statistics.domain(p);
            *prior = sample_beta(
                &mut self.rng,
                sampler.labels_prior_alpha + f64::from(counts.label_count(1)),
                sampler.labels_prior_beta + f64::from(counts.label_count(0)),
            )?;
        }
        for k in self.dp.occupied_clusters() {
            let counts = self.statistics.cluster(k);
            for j in 0..self.error_rates.ncols() {
                let d = f64::from(counts.disagreements(j));
                let o = f64::from(counts.observations(j));
                self.error_rates[(k, j)] = sample_beta(
                    &mut self.rng,
                    sampler.error_rates_prior_alpha + d,
                    sampler.error_rates_prior_beta + o - d,
                )?;
            }
        }
        Ok(())
    }

    fn sample_cluster_assignments(&mut self) -> Result<(), IntegratorError> {
        let sampler = &self.config.sampler;
        let (a, b) = (sampler.error_rates_prior_alpha, sampler.error_rates_prior_beta);
        let prior_norm = ln_beta(a, b);

        for p in 0..self.assignments.len() {
            let current = self.assignments[p];
            self.dp.remove_member_from_cluster(current);
            self.statistics.remove_domain_from_cluster(p, current);

            let candidates = self.dp.compute_clusters_distribution();
            let counts = self.statistics.domain(p);
            self.log_weights.clear();
            for c in 0..candidates {
                let mut weight = self.dp.cluster_unnormalized_probability(c).ln();
                if self.dp.is_new_cluster(c) {
                    for j in 0..counts.number_of_classifiers() {
                        let d = f64::from(counts.disagreements(j));
                        let o = f64::from(counts.observations(j));
                        weight += ln_beta(a + d, b + o - d) - prior_norm;
                    }
                } else {
                    let k = self.dp.cluster_id(c);
                    for j in 0..counts.number_of_classifiers() {
                        weight += binomial_log_likelihood(
                            counts.disagreements(j),
                            counts.observations(j),
                            self.error_rates[(k, j)],
                        );
                    }
                }
                self.log_weights.push(weight);
            }
            for c in 1..self.log_weights.len() {
                self.log_weights[c] = log_sum_exp(self.log_weights[c - 1], self.log_weights[c]);
            }
            let Some(&total) = self.log_weights.last() else {
                return Err(IntegratorError::Numerical(format!(
                    "no candidate cluster for domain {}",
                    self.index.domains[p].label
                )));
            };
            if !total.is_finite() {
                return Err(IntegratorError::Numerical(format!(
                    "cluster weights of domain {} sum to {total}",
                    self.index.domains[p].label
                )));
            }

            let u = log_uniform(&mut self.rng, total);
            let chosen = self
                .log_weights
                .iter()
                .position(|&w| w > u)
                .unwrap_or(candidates - 1);
            let k = self.dp.cluster_id(chosen);
            let created = self.dp.is_new_cluster(chosen);

            self.dp.add_member_to_cluster(k);
            self.statistics.add_domain_to_cluster(p, k);
            self.assignments[p] = k;
            if created {
                self.draw_cluster_error_rates(k)?;
            }
        }
        Ok(())
    }

    /// Fresh error rates for cluster `k` from its pooled counts.
    fn draw_cluster_error_rates(&mut self, k: usize) -> Result<(), IntegratorError> {
        let sampler = &self.config.sampler;
        let counts = self.statistics.cluster(k);
        for j in 0..self.error_rates.ncols() {
            let d = f64::from(counts.disagreements(j));
            let o = f64::from(counts.observations(j));
            self.error_rates[(k, j)] = sample_beta(
                &mut self.rng,
                sampler.error_rates_prior_alpha + d,
                sampler.error_rates_prior_beta + o - d,
            )?;
        }
        Ok(())
    }

    fn sample_labels(&mut self) -> Result<(), IntegratorError> {
        for (p, domain) in self.index.domains.iter().enumerate() {
            let k = self.assignments[p];
            let prior = self.label_priors[p];
            let labels = &mut self.labels[p];
            for (i, label) in labels.iter_mut().enumerate() {
                let observations = domain.instance(i);
                self.statistics
                    .before_label_resample(p, Some(k), *label, observations);
                let p1 = label_posterior(prior, observations, |j| self.error_rates[(k, j)]);
                *label = sample_bernoulli(&mut self.rng, p1)?;
                self.statistics
                    .after_label_resample(p, Some(k), *label, observations);
            }
        }
        Ok(())
    }

    fn sweep(&mut self) -> Result<(), IntegratorError> {
        self.sample_priors_and_error_rates()?;
        self.sample_cluster_assignments()?;
        self.sample_labels()?;
        self.sweeps += 1;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inference
    // -----------------------------------------------------------------------

    fn retain(&self, sums: &mut [DomainSums]) {
        for (p, sum) in sums.iter_mut().enumerate() {
            let k = self.assignments[p];
            sum.accumulate(self.label_priors[p], |j| self.error_rates[(k, j)], &self.labels[p]);
        }
    }

    fn record_trace(&self, sample_index: usize) -> Result<(), IntegratorError> {
        let Some(sink) = &self.trace else {
            return Ok(());
        };
        let domains = self.assignments.len();
        let classifiers = self.error_rates.ncols();
        let mut error_rate = 0.0;
        let mut log_likelihood = 0.0;
        for (p, &k) in self.assignments.iter().enumerate() {
            let row = self.error_rates.row(k);
            error_rate += row.sum();
            log_likelihood += domain_log_likelihood(
                self.statistics.domain(p),
                self.label_priors[p],
                |j| row[j],
            );
        }
        sink.record(SampleTrace {
            sample_index,
            sweep: sweep_of_sample(&self.config.sampler, sample_index),
            number_of_clusters: self.dp.number_of_clusters(),
            mean_label_prior: self.label_priors.iter().sum::<f64>() / domains as f64,
            mean_error_rate: error_rate / (domains * classifiers).max(1) as f64,
            log_likelihood,
        })?;
        Ok(())
    }

    fn infer(&mut self) -> Result<Posterior, IntegratorError> {
        let sampler = self.config.sampler.clone();
        debug!(
            burn_in = sampler.number_of_burn_in_samples,
            thinning = sampler.number_of_thinning_samples,
            samples = sampler.number_of_samples,
            "coupled inference started"
        );
        if sampler.parallel_domains {
            debug!("parallel_domains ignored: coupled domains share cluster statistics");
        }

        for _ in 0..sampler.number_of_burn_in_samples {
            self.sweep()?;
        }
        debug!(
            clusters = self.dp.number_of_clusters(),
            "coupled burn-in finished"
        );

        let mut sums: Vec<DomainSums> = self
            .index
            .domains
            .iter()
            .map(|d| DomainSums::new(self.index.number_of_classifiers(), d.number_of_instances()))
            .collect();
        self.retain(&mut sums);
        self.record_trace(0)?;
        for sample_index in 1..sampler.number_of_samples {
            for _ in 0..=sampler.number_of_thinning_samples {
                self.sweep()?;
            }
            self.retain(&mut sums);
            self.record_trace(sample_index)?;
        }

        info!(
            domains = self.index.number_of_domains(),
            sweeps = sweeps_per_run(&sampler),
            clusters = self.dp.number_of_clusters(),
            "coupled inference completed"
        );
        Ok(Posterior::from_sums(&self.index, &sums))
    }
}

impl Integrator for CoupledBayesianIntegrator {
    fn error_rates(&mut self, force: bool) -> Result<&ErrorRates, IntegratorError> {
        Ok(&self.posterior(force)?.error_rates)
    }

    fn integrated_data(&mut self, force: bool) -> Result<&IntegratedData, IntegratorError> {
        Ok(&self.posterior(force)?.integrated)
    }
}
