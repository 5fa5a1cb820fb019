mod common;

use common::{long_run, shared_rates_data, short_run, truth, CLASSIFIERS, INJECTED, INSTANCES};
use consensus_harness::{BayesianIntegrator, Integrator, Label, PredictedInstance, SamplerConfig};

#[test]
fn recovers_injected_error_rates() {
    let mut integrator = BayesianIntegrator::new(&shared_rates_data(), long_run(17)).unwrap();
    let rates = integrator.error_rates(false).unwrap().clone();
    assert_eq!(rates.len(), 2 * 3);

    for domain in ["alpha", "beta"] {
        let label = Label::new(domain);
        for (&classifier, expected) in CLASSIFIERS.iter().zip(INJECTED) {
            let estimate = rates.get(&label, classifier).unwrap();
            assert!(
                (estimate - expected).abs() <= 0.1,
                "{domain}/{classifier}: estimated {estimate}, injected {expected}"
            );
        }
    }

    let integrated = integrator.integrated_data(false).unwrap();
    for (domain, offset) in [("alpha", 0), ("beta", 1)] {
        let label = Label::new(domain);
        let correct = (0..INSTANCES)
            .filter(|&i| {
                let p = integrated.get(&label, i as i64).unwrap();
                (p >= 0.5) == truth(i, offset)
            })
            .count();
        assert!(correct > INSTANCES * 3 / 4, "{domain}: only {correct} labels match");
    }
}

#[test]
fn posterior_means_are_probabilities() {
    let mut integrator = BayesianIntegrator::new(&shared_rates_data(), short_run(3)).unwrap();
    let rates = integrator.error_rates(false).unwrap();
    assert!(rates.iter().all(|r| (0.0..=1.0).contains(&r.value)));
    let integrated = integrator.integrated_data(false).unwrap();
    assert_eq!(integrated.len(), 2 * INSTANCES);
    assert!(integrated.iter().all(|r| (0.0..=1.0).contains(&r.value)));
    let priors = integrator.label_prior_means().unwrap();
    assert!(priors.iter().all(|(_, p)| *p > 0.0 && *p < 1.0));
}

#[test]
fn incremental_counts_match_recomputed_counts() {
    let mut integrator = BayesianIntegrator::new(&shared_rates_data(), short_run(5)).unwrap();
    integrator.error_rates(false).unwrap();
    assert_eq!(integrator.statistics(), integrator.recomputed_statistics());
    integrator.integrated_data(true).unwrap();
    assert_eq!(integrator.statistics(), integrator.recomputed_statistics());
}

#[test]
fn same_seed_gives_identical_results() {
    let run = |config: SamplerConfig| {
        let mut integrator = BayesianIntegrator::new(&shared_rates_data(), config).unwrap();
        let rates = integrator.error_rates(false).unwrap().clone();
        let labels = integrator.integrated_data(false).unwrap().clone();
        (rates, labels)
    };
    let first = run(short_run(99));
    let second = run(short_run(99));
    assert_eq!(first, second);

    let parallel = run(SamplerConfig {
        parallel_domains: true,
        ..short_run(99)
    });
    assert_eq!(first, parallel);

    let other = run(short_run(100));
    assert_ne!(first.0, other.0);
}

/// Posterior means of the error rate and of the label of a positive output
/// for a single classifier, by midpoint quadrature over (label prior, error
/// rate) with the labels summed out.
fn single_rater_posterior(positives: usize, negatives: usize, cfg: &SamplerConfig) -> (f64, f64) {
    let steps = 400;
    let h = 1.0 / steps as f64;
    let (mut z, mut e_sum, mut label_sum) = (0.0, 0.0, 0.0);
    for a in 0..steps {
        let pi = (a as f64 + 0.5) * h;
        for b in 0..steps {
            let e = (b as f64 + 0.5) * h;
            let q = pi * (1.0 - e) + (1.0 - pi) * e;
            let log_density = (cfg.labels_prior_alpha - 1.0) * pi.ln()
                + (cfg.labels_prior_beta - 1.0) * (1.0 - pi).ln()
                + (cfg.error_rates_prior_alpha - 1.0) * e.ln()
                + (cfg.error_rates_prior_beta - 1.0) * (1.0 - e).ln()
                + positives as f64 * q.ln()
                + negatives as f64 * (1.0 - q).ln();
            let w = log_density.exp();
            z += w;
            e_sum += w * e;
            label_sum += w * pi * (1.0 - e) / q;
        }
    }
    (e_sum / z, label_sum / z)
}

#[test]
fn single_classifier_matches_closed_form_posterior() {
    let positives = 20;
    let negatives = 10;
    let data: Vec<PredictedInstance> = (0..positives + negatives)
        .map(|i| PredictedInstance::new(i as i64, "solo", 1, if i < positives { 0.9 } else { 0.1 }))
        .collect();
    let config = SamplerConfig {
        number_of_burn_in_samples: 1000,
        number_of_thinning_samples: 2,
        number_of_samples: 5000,
        ..SamplerConfig::default()
    }
    .with_seed(8);
    let (expected_rate, expected_label) = single_rater_posterior(positives, negatives, &config);

    let mut integrator = BayesianIntegrator::new(&data, config).unwrap();
    let label = Label::new("solo");
    let rate = integrator.error_rates(false).unwrap().get(&label, 1).unwrap();
    assert!(
        (rate - expected_rate).abs() < 0.05,
        "error rate {rate} vs closed form {expected_rate}"
    );

    let integrated = integrator.integrated_data(false).unwrap();
    let mean_positive_label = (0..positives)
        .map(|i| integrated.get(&label, i as i64).unwrap())
        .sum::<f64>()
        / positives as f64;
    assert!(
        (mean_positive_label - expected_label).abs() < 0.05,
        "label mean {mean_positive_label} vs closed form {expected_label}"
    );
}

#[test]
fn invalid_configuration_fails_at_construction() {
    let config = SamplerConfig {
        labels_prior_alpha: -1.0,
        ..SamplerConfig::default()
    };
    assert!(BayesianIntegrator::new(&shared_rates_data(), config).is_err());
    assert!(BayesianIntegrator::new(&[], SamplerConfig::default()).is_err());
}
