#![allow(dead_code)]

use consensus_harness::{PredictedInstance, SamplerConfig};

/// Classifier ids used by the designed scenarios.
pub const CLASSIFIERS: [i64; 3] = [11, 22, 33];

/// True error rates of `CLASSIFIERS` in the unswapped layout.
pub const INJECTED: [f64; 3] = [0.1, 0.3, 0.4];

pub const INSTANCES: usize = 400;

/// How many of the `INSTANCES` instances each combination of classifiers
/// gets wrong. The counts are `INSTANCES` times the product of the per-rater
/// probabilities for rates {0.1, 0.3, 0.4}, so every classifier flips exactly
/// its rate and the flips look independent. With fewer instances or
/// disjoint flip sets the posterior mean of the 0.1 classifier sits near
/// 0.34 and no sampler can recover it.
const FLIP_PATTERNS: [([bool; 3], usize); 8] = [
    ([true, true, true], 5),
    ([true, true, false], 7),
    ([true, false, true], 11),
    ([false, true, true], 43),
    ([true, false, false], 17),
    ([false, true, false], 65),
    ([false, false, true], 101),
    ([false, false, false], 151),
];

/// Reliability order for `designed_domain`: `CLASSIFIERS[j]` takes the flip
/// column `order[j]` of the pattern table.
pub const SAME_ORDER: [usize; 3] = [0, 1, 2];
pub const SWAPPED_ORDER: [usize; 3] = [2, 1, 0];

pub fn truth(i: usize, offset: usize) -> bool {
    (i + offset) % 2 == 1
}

/// True error rate of `CLASSIFIERS[j]` under `order`.
pub fn injected(order: [usize; 3], j: usize) -> f64 {
    INJECTED[order[j]]
}

/// One domain of `INSTANCES` instances laid out from `FLIP_PATTERNS`.
pub fn designed_domain(label: &str, offset: usize, order: [usize; 3]) -> Vec<PredictedInstance> {
    let flips = FLIP_PATTERNS
        .iter()
        .flat_map(|&(pattern, count)| std::iter::repeat(pattern).take(count));
    let mut rows = Vec::with_capacity(INSTANCES * CLASSIFIERS.len());
    for (i, pattern) in flips.enumerate() {
        for (j, &classifier) in CLASSIFIERS.iter().enumerate() {
            let output = truth(i, offset) != pattern[order[j]];
            let value = if output { 0.8 } else { 0.2 };
            rows.push(PredictedInstance::new(i as i64, label, classifier, value));
        }
    }
    assert_eq!(rows.len(), INSTANCES * CLASSIFIERS.len());
    rows
}

/// Two domains sharing true error rates {0.1, 0.3, 0.4}.
pub fn shared_rates_data() -> Vec<PredictedInstance> {
    let mut rows = designed_domain("alpha", 0, SAME_ORDER);
    rows.extend(designed_domain("beta", 1, SAME_ORDER));
    rows
}

/// Two domains whose classifiers swap reliability.
pub fn swapped_rates_data() -> Vec<PredictedInstance> {
    let mut rows = designed_domain("alpha", 0, SAME_ORDER);
    rows.extend(designed_domain("beta", 1, SWAPPED_ORDER));
    rows
}

/// At least 2000 burn-in sweeps and 200 retained samples.
pub fn long_run(seed: u64) -> SamplerConfig {
    SamplerConfig {
        number_of_burn_in_samples: 2000,
        number_of_thinning_samples: 5,
        number_of_samples: 200,
        ..SamplerConfig::default()
    }
    .with_seed(seed)
}

pub fn short_run(seed: u64) -> SamplerConfig {
    SamplerConfig {
        number_of_burn_in_samples: 100,
        number_of_thinning_samples: 1,
        number_of_samples: 20,
        ..SamplerConfig::default()
    }
    .with_seed(seed)
}
