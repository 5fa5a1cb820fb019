//! Offline evaluation harness for the integrators.
//!
//! Synthetic cases draw a ground truth per domain, then let every classifier
//! flip the truth with a known error rate. The integrators only see the
//! flipped outputs; their estimates are scored against the injected rates and
//! the hidden labels.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use crate::data::{
    ErrorRate, ErrorRates, IntegratedData, Label, ObservedInstance, PredictedInstance,
    DECISION_THRESHOLD,
};
use crate::integrator::{IntegratorError, IntegratorKind};

// =============================================================================
// Synthetic case definitions
// =============================================================================

#[derive(Debug, Clone)]
pub struct SyntheticCase {
    pub name: &'static str,
    pub domains: usize,
    pub instances_per_domain: usize,
    /// Error rate of classifier j, shared by every domain.
    pub error_rates: Vec<f64>,
    /// Per-domain error rates; overrides `error_rates` when set.
    pub domain_error_rates: Option<Vec<Vec<f64>>>,
    /// Probability that a true label is 1.
    pub label_prior: f64,
    pub seed: u64,
}

/// Generated predictions plus the truth they were drawn from.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub predicted: Vec<PredictedInstance>,
    pub observed: Vec<ObservedInstance>,
    pub true_error_rates: ErrorRates,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationMetrics {
    /// Mean absolute deviation between estimated and injected error rates.
    pub error_rate_mad: f64,
    /// Mean of `1 - |p - y|` over instances.
    pub label_accuracy: f64,
    /// Share of instances whose thresholded probability equals the truth.
    pub hard_label_accuracy: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub case_name: String,
    pub method: String,
    pub metrics: EvaluationMetrics,
}

impl SyntheticCase {
    pub fn domain_label(domain: usize) -> Label {
        Label::new(format!("domain_{domain}"))
    }

    pub fn number_of_classifiers(&self) -> usize {
        match &self.domain_error_rates {
            Some(rates) => rates.first().map_or(0, Vec::len),
            None => self.error_rates.len(),
        }
    }

    pub fn true_error_rate(&self, domain: usize, classifier: usize) -> f64 {
        match &self.domain_error_rates {
            Some(rates) => rates[domain][classifier],
            None => self.error_rates[classifier],
        }
    }

    /// Draw the dataset. Identical for identical seeds.
    pub fn generate(&self) -> SyntheticDataset {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let classifiers = self.number_of_classifiers();
        let instances = self.domains * self.instances_per_domain;
        let mut predicted = Vec::with_capacity(instances * classifiers);
        let mut observed = Vec::with_capacity(instances);
        let mut true_error_rates = Vec::with_capacity(self.domains * classifiers);

        for p in 0..self.domains {
            let label = Self::domain_label(p);
            for i in 0..self.instances_per_domain {
                let id = i as i64;
                let truth = rng.gen_bool(self.label_prior);
                observed.push(ObservedInstance::new(id, label.clone(), truth));
                for j in 0..classifiers {
                    let flipped = rng.gen_bool(self.true_error_rate(p, j));
                    let value = continuous_output(&mut rng, truth != flipped);
                    predicted.push(PredictedInstance::new(id, label.clone(), j as i64, value));
                }
            }
            for j in 0..classifiers {
                true_error_rates.push(ErrorRate {
                    label: label.clone(),
                    function_id: j as i64,
                    value: self.true_error_rate(p, j),
                });
            }
        }

        SyntheticDataset {
            predicted,
            observed,
            true_error_rates: ErrorRates::new(true_error_rates),
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

pub fn synthetic_cases() -> Vec<SyntheticCase> {
    vec![
        SyntheticCase {
            name: "three_classifiers_2x20",
            domains: 2,
            instances_per_domain: 20,
            error_rates: vec![0.1, 0.3, 0.4],
            domain_error_rates: None,
            label_prior: 0.5,
            seed: 42,
        },
        SyntheticCase {
            name: "five_classifiers_4x50",
            domains: 4,
            instances_per_domain: 50,
            error_rates: vec![0.05, 0.1, 0.2, 0.3, 0.45],
            domain_error_rates: None,
            label_prior: 0.3,
            seed: 43,
        },
        SyntheticCase {
            name: "shifted_domains_4x40",
            domains: 4,
            instances_per_domain: 40,
            error_rates: Vec::new(),
            domain_error_rates: Some(vec![
                vec![0.1, 0.2, 0.3],
                vec![0.1, 0.2, 0.3],
                vec![0.3, 0.2, 0.1],
                vec![0.3, 0.2, 0.1],
            ]),
            label_prior: 0.5,
            seed: 44,
        },
        SyntheticCase {
            name: "single_classifier_1x30",
            domains: 1,
            instances_per_domain: 30,
            error_rates: vec![0.2],
            domain_error_rates: None,
            label_prior: 0.6,
            seed: 45,
        },
    ]
}

/// Run every case (or only the one named `filter`) through `method`.
pub fn run_synthetic_suite(
    filter: Option<&str>,
    method: &IntegratorKind,
) -> Result<Vec<EvaluationResult>, IntegratorError> {
    synthetic_cases()
        .into_iter()
        .filter(|case| filter.map_or(true, |name| case.name == name))
        .map(|case| run_synthetic_case(&case, method))
        .collect()
}

/// The case seed also seeds the sampler, so results are reproducible.
pub fn run_synthetic_case(
    case: &SyntheticCase,
    method: &IntegratorKind,
) -> Result<EvaluationResult, IntegratorError> {
    let dataset = case.generate();
    let mut integrator = method.clone().with_seed(case.seed).build(&dataset.predicted)?;
    let error_rates = integrator.error_rates(false)?.clone();
    let integrated = integrator.integrated_data(false)?;
    let metrics = evaluate(
        &error_rates,
        integrated,
        &dataset.observed,
        &dataset.true_error_rates,
    );
    info!(
        case = case.name,
        method = method.name(),
        mad = metrics.error_rate_mad,
        accuracy = metrics.label_accuracy,
        "synthetic case evaluated"
    );
    Ok(EvaluationResult {
        case_name: case.name.to_string(),
        method: method.name().to_string(),
        metrics,
    })
}

/// Score estimates against the truth. Rows missing from the estimates are
/// skipped; an empty comparison scores 0.
pub fn evaluate(
    error_rates: &ErrorRates,
    integrated: &IntegratedData,
    observed: &[ObservedInstance],
    true_error_rates: &ErrorRates,
) -> EvaluationMetrics {
    let deviations: Vec<f64> = true_error_rates
        .iter()
        .filter_map(|truth| {
            error_rates
                .get(&truth.label, truth.function_id)
                .map(|estimate| (estimate - truth.value).abs())
        })
        .collect();

    let mut soft = Vec::with_capacity(observed.len());
    let mut hard = Vec::with_capacity(observed.len());
    for row in observed {
        if let Some(p) = integrated.get(&row.label, row.id) {
            let y = if row.value { 1.0 } else { 0.0 };
            soft.push(1.0 - (p - y).abs());
            hard.push(if (p >= DECISION_THRESHOLD) == row.value { 1.0 } else { 0.0 });
        }
    }

    EvaluationMetrics {
        error_rate_mad: mean(&deviations),
        label_accuracy: mean(&soft),
        hard_label_accuracy: mean(&hard),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Continuous prediction on the correct side of the decision threshold.
fn continuous_output(rng: &mut StdRng, positive: bool) -> f64 {
    if positive {
        rng.gen_range(DECISION_THRESHOLD..=1.0)
    } else {
        rng.gen_range(0.0..DECISION_THRESHOLD)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
