use consensus_harness::evaluation::{run_synthetic_suite, synthetic_cases};
use consensus_harness::IntegratorKind;

fn assert_prob(x: f64) {
    assert!(
        x.is_finite() && (0.0..=1.0).contains(&x),
        "expected probability in [0,1], got {x}"
    );
}

fn quick(name: &str) -> IntegratorKind {
    let options = if name == "cbi" {
        "500:2:60:-:-:-:-:1.0"
    } else {
        "500:2:60:-:-:-:-"
    };
    IntegratorKind::from_name(name, options).unwrap()
}

#[test]
fn synthetic_suite_filter_selects_exact_name() {
    let all = synthetic_cases();
    assert!(all.iter().any(|c| c.name == "three_classifiers_2x20"));

    let selected =
        run_synthetic_suite(Some("three_classifiers_2x20"), &IntegratorKind::MajorityVote)
            .unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].case_name, "three_classifiers_2x20");

    let none = run_synthetic_suite(Some("no_such_case"), &IntegratorKind::MajorityVote).unwrap();
    assert!(none.is_empty());
}

#[test]
fn bayesian_methods_track_injected_rates() {
    let case = Some("five_classifiers_4x50");
    for name in ["bi", "cbi"] {
        let metrics = &run_synthetic_suite(case, &quick(name)).unwrap()[0].metrics;
        assert_prob(metrics.error_rate_mad);
        assert_prob(metrics.label_accuracy);
        assert_prob(metrics.hard_label_accuracy);
        assert!(metrics.error_rate_mad < 0.1, "{name}: {metrics:?}");
        assert!(metrics.hard_label_accuracy >= 0.85, "{name}: {metrics:?}");
    }
}

#[test]
fn shifted_domains_keep_domain_specific_rates() {
    let result = &run_synthetic_suite(Some("shifted_domains_4x40"), &quick("cbi")).unwrap()[0];
    assert!(result.metrics.error_rate_mad < 0.12, "{:?}", result.metrics);
}

#[test]
fn suite_is_deterministic() {
    let a = run_synthetic_suite(Some("single_classifier_1x30"), &quick("bi")).unwrap();
    let b = run_synthetic_suite(Some("single_classifier_1x30"), &quick("bi")).unwrap();
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}
