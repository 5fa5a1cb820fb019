//! Random draws and numerics shared by the Gibbs samplers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};

use super::index::Observation;
use super::statistics::DomainCounts;
use super::IntegratorError;

pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Keep a probability strictly inside (0, 1) before taking logarithms.
pub fn clamp_probability(p: f64) -> f64 {
    p.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON)
}

/// Draw from Beta(a, b), refusing to hand a non-finite value back to the chain.
pub fn sample_beta(rng: &mut StdRng, a: f64, b: f64) -> Result<f64, IntegratorError> {
    let dist = Beta::new(a, b).map_err(|e| {
        IntegratorError::Numerical(format!("Beta({a}, {b}) is not a valid distribution: {e}"))
    })?;
    let x: f64 = dist.sample(rng);
    if !x.is_finite() {
        return Err(IntegratorError::Numerical(format!("Beta({a}, {b}) produced {x}")));
    }
    Ok(x)
}

/// `log(exp(a) + exp(b))` without overflow.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Posterior probability that an instance's label is 1 given its
/// observations, the domain's label prior and per-classifier error rates.
pub fn label_posterior<F>(prior: f64, observations: &[Observation], error_rate: F) -> f64
where
    F: Fn(usize) -> f64,
{
    let prior = clamp_probability(prior);
    let mut log_p0 = (1.0 - prior).ln();
    let mut log_p1 = prior.ln();
    for obs in observations {
        let e = clamp_probability(error_rate(obs.classifier));
        let (ln_err, ln_ok) = (e.ln(), (1.0 - e).ln());
        if obs.output == 0 {
            log_p0 += ln_ok;
            log_p1 += ln_err;
        } else {
            log_p0 += ln_err;
            log_p1 += ln_ok;
        }
    }
    (log_p1 - log_sum_exp(log_p0, log_p1)).exp()
}

pub fn sample_bernoulli(rng: &mut StdRng, p: f64) -> Result<u8, IntegratorError> {
    if !p.is_finite() {
        return Err(IntegratorError::Numerical(format!(
            "label posterior is {p}"
        )));
    }
    Ok(u8::from(rng.gen_bool(p.clamp(0.0, 1.0))))
}

/// Log-space uniform draw scaled to a cumulative log-mass `total`.
pub fn log_uniform(rng: &mut StdRng, total: f64) -> f64 {
    // gen::<f64>() is in [0, 1); ln(0) = -inf still selects the first candidate.
    rng.gen::<f64>().ln() + total
}

/// `d * ln(e) + (n - d) * ln(1 - e)`: log-likelihood of `d` disagreements
/// out of `n` observations at error rate `e`.
pub fn binomial_log_likelihood(disagreements: u32, observations: u32, e: f64) -> f64 {
    let e = clamp_probability(e);
    let d = f64::from(disagreements);
    let n = f64::from(observations);
    d * e.ln() + (n - d) * (1.0 - e).ln()
}

/// Complete-data log-likelihood of one domain: label terms under the label
/// prior plus output terms under each classifier's error rate.
pub fn domain_log_likelihood<F>(counts: &DomainCounts, label_prior: f64, error_rate: F) -> f64
where
    F: Fn(usize) -> f64,
{
    let prior = clamp_probability(label_prior);
    let mut ll = f64::from(counts.label_count(1)) * prior.ln()
        + f64::from(counts.label_count(0)) * (1.0 - prior).ln();
    for j in 0..counts.number_of_classifiers() {
        let (d, n) = (counts.disagreements(j), counts.observations(j));
        ll += binomial_log_likelihood(d, n, error_rate(j));
    }
    ll
}

/// Running sums of one domain's retained draws.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSums {
    label_prior: f64,
    error_rates: Vec<f64>,
    labels: Vec<f64>,
    samples: usize,
}

impl DomainSums {
    pub fn new(number_of_classifiers: usize, number_of_instances: usize) -> Self {
        Self {
            label_prior: 0.0,
            error_rates: vec![0.0; number_of_classifiers],
            labels: vec![0.0; number_of_instances],
            samples: 0,
        }
    }

    pub fn accumulate<F>(&mut self, label_prior: f64, error_rate: F, labels: &[u8])
    where
        F: Fn(usize) -> f64,
    {
        self.label_prior += label_prior;
        for (j, sum) in self.error_rates.iter_mut().enumerate() {
            *sum += error_rate(j);
        }
        for (sum, &label) in self.labels.iter_mut().zip(labels) {
            *sum += f64::from(label);
        }
        self.samples += 1;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn label_prior_mean(&self) -> f64 {
        self.label_prior / self.denominator()
    }

    pub fn error_rate_mean(&self, classifier: usize) -> f64 {
        self.error_rates[classifier] / self.denominator()
    }

    pub fn label_mean(&self, instance: usize) -> f64 {
        self.labels[instance] / self.denominator()
    }

    fn denominator(&self) -> f64 {
        self.samples.max(1) as f64
    }
}
