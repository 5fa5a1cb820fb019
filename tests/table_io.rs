use consensus_harness::{
    load_error_rates, load_integrated_data, load_observed_instances, load_predicted_instances,
    save_error_rates, save_integrated_data, save_observed_instances, save_predicted_instances,
    DataError, ErrorRate, ErrorRates, IntegratedData, IntegratedInstance, Label, ObservedInstance,
    PredictedInstance,
};
use tempfile::tempdir;

fn error_rates() -> ErrorRates {
    ErrorRates::new(vec![
        ErrorRate {
            label: Label::new("animal"),
            function_id: 3,
            value: 0.1 + 0.2,
        },
        ErrorRate {
            label: Label::new("city"),
            function_id: -7,
            value: 1.0 / 3.0,
        },
        ErrorRate {
            label: Label::new("city"),
            function_id: 12,
            value: 0.0,
        },
    ])
}

fn integrated() -> IntegratedData {
    IntegratedData::new(vec![
        IntegratedInstance {
            id: 0,
            label: Label::new("animal"),
            value: 0.995,
        },
        IntegratedInstance {
            id: 9_000_000_001,
            label: Label::new("animal"),
            value: 2.0 / 7.0,
        },
    ])
}

#[test]
fn output_tables_survive_every_format() {
    let dir = tempdir().unwrap();
    for ext in ["csv", "bin", "jsonl"] {
        let rates_path = dir.path().join(format!("rates.{ext}"));
        save_error_rates(&rates_path, &error_rates()).unwrap();
        assert_eq!(load_error_rates(&rates_path).unwrap(), error_rates(), "{ext}");

        let data_path = dir.path().join(format!("integrated.{ext}"));
        save_integrated_data(&data_path, &integrated()).unwrap();
        assert_eq!(load_integrated_data(&data_path).unwrap(), integrated(), "{ext}");
    }
}

#[test]
fn input_tables_survive_csv() {
    let dir = tempdir().unwrap();
    let predicted = vec![
        PredictedInstance::new(1, "animal", 4, 0.73),
        PredictedInstance::new(2, "animal", 4, 0.0),
    ];
    let path = dir.path().join("predicted.csv");
    save_predicted_instances(&path, &predicted).unwrap();
    assert_eq!(load_predicted_instances(&path).unwrap(), predicted);

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().next(), Some("ID,LABEL,FUNCTION_ID,VALUE"));

    let observed = vec![
        ObservedInstance::new(1, "animal", true),
        ObservedInstance::new(2, "animal", false),
    ];
    let path = dir.path().join("observed.csv");
    save_observed_instances(&path, &observed).unwrap();
    assert_eq!(load_observed_instances(&path).unwrap(), observed);
}

#[test]
fn errors_are_reported_without_writing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rates.parquet");
    assert!(matches!(
        save_error_rates(&path, &error_rates()),
        Err(DataError::UnsupportedFormat(_))
    ));
    assert!(!path.exists());

    let bad = ErrorRates::new(vec![ErrorRate {
        label: Label::new("a,b"),
        function_id: 1,
        value: 0.5,
    }]);
    let path = dir.path().join("bad.csv");
    assert!(matches!(
        save_error_rates(&path, &bad),
        Err(DataError::InvalidLabel(_))
    ));
    assert!(!path.exists());

    assert!(matches!(
        load_error_rates(dir.path().join("missing.csv")),
        Err(DataError::Io(_))
    ));
}
