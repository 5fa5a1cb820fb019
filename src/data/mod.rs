//! Records consumed and produced by the integrators.
//!
//! Inputs are [`PredictedInstance`] rows (one per instance, domain and
//! classifier) and, optionally, [`ObservedInstance`] ground-truth rows.
//! Outputs are an [`ErrorRates`] table and an [`IntegratedData`] table.

pub mod io;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use io::{
    load_error_rates, load_integrated_data, load_observed_instances, load_predicted_instances,
    save_error_rates, save_integrated_data, save_observed_instances, save_predicted_instances,
    DataError, TableFormat,
};

/// Threshold applied to continuous predictions to obtain a binary output.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Opaque key of a domain (one binary classification task).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A classifier's prediction for one instance of one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedInstance {
    pub id: i64,
    pub label: Label,
    pub function_id: i64,
    /// Continuous prediction in `[0, 1]`.
    pub value: f64,
}

impl PredictedInstance {
    pub fn new(id: i64, label: impl Into<Label>, function_id: i64, value: f64) -> Self {
        Self {
            id,
            label: label.into(),
            function_id,
            value,
        }
    }

    /// Binary output obtained by thresholding `value`.
    pub fn output(&self) -> u8 {
        u8::from(self.value >= DECISION_THRESHOLD)
    }
}

/// Ground-truth label of one instance of one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedInstance {
    pub id: i64,
    pub label: Label,
    pub value: bool,
}

impl ObservedInstance {
    pub fn new(id: i64, label: impl Into<Label>, value: bool) -> Self {
        Self {
            id,
            label: label.into(),
            value,
        }
    }
}

/// Estimated error rate of one classifier on one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRate {
    pub label: Label,
    pub function_id: i64,
    pub value: f64,
}

/// Integrated (consensus) label probability of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedInstance {
    pub id: i64,
    pub label: Label,
    pub value: f64,
}

/// Error-rate table keyed by (domain, classifier).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorRates {
    rows: Vec<ErrorRate>,
}

impl ErrorRates {
    pub fn new(rows: Vec<ErrorRate>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ErrorRate] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ErrorRate> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ErrorRate> {
        self.rows.iter()
    }

    pub fn get(&self, label: &Label, function_id: i64) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| &r.label == label && r.function_id == function_id)
            .map(|r| r.value)
    }
}

/// Integrated-data table keyed by (domain, instance).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegratedData {
    rows: Vec<IntegratedInstance>,
}

impl IntegratedData {
    pub fn new(rows: Vec<IntegratedInstance>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[IntegratedInstance] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<IntegratedInstance> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IntegratedInstance> {
        self.rows.iter()
    }

    pub fn get(&self, label: &Label, id: i64) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| &r.label == label && r.id == id)
            .map(|r| r.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_thresholds_at_one_half() {
        assert_eq!(PredictedInstance::new(0, "a", 0, 0.5).output(), 1);
        assert_eq!(PredictedInstance::new(0, "a", 0, 0.49).output(), 0);
        assert_eq!(PredictedInstance::new(0, "a", 0, 1.0).output(), 1);
    }

    #[test]
    fn tables_lookup_by_key() {
        let rates = ErrorRates::new(vec![
            ErrorRate {
                label: Label::new("a"),
                function_id: 3,
                value: 0.2,
            },
            ErrorRate {
                label: Label::new("b"),
                function_id: 3,
                value: 0.4,
            },
        ]);
        assert_eq!(rates.get(&Label::new("b"), 3), Some(0.4));
        assert_eq!(rates.get(&Label::new("c"), 3), None);

        let data = IntegratedData::new(vec![IntegratedInstance {
            id: 7,
            label: Label::new("a"),
            value: 0.75,
        }]);
        assert_eq!(data.get(&Label::new("a"), 7), Some(0.75));
        assert!(data.get(&Label::new("a"), 8).is_none());
    }
}
