//! Id interning and per-domain observation layout.
//!
//! Domains, classifiers and instances are mapped to dense indices in order
//! of first appearance, so every downstream table is deterministic for a
//! given input order.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::data::{Label, PredictedInstance};

use super::IntegratorError;

/// Bidirectional map between external keys and dense indices.
#[derive(Debug, Clone)]
pub struct KeyIndex<K> {
    positions: HashMap<K, usize>,
    keys: Vec<K>,
}

impl<K: Clone + Eq + Hash> Default for KeyIndex<K> {
    fn default() -> Self {
        Self {
            positions: HashMap::new(),
            keys: Vec::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> KeyIndex<K> {
    pub fn intern(&mut self, key: &K) -> usize {
        if let Some(&idx) = self.positions.get(key) {
            return idx;
        }
        let idx = self.keys.len();
        self.positions.insert(key.clone(), idx);
        self.keys.push(key.clone());
        idx
    }

    pub fn get(&self, key: &K) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn key(&self, idx: usize) -> &K {
        &self.keys[idx]
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One binary output of one classifier on one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub classifier: usize,
    pub output: u8,
}

/// Observations of a single domain, grouped by instance (CSR layout).
#[derive(Debug, Clone)]
pub struct DomainObservations {
    pub label: Label,
    pub instances: KeyIndex<i64>,
    offsets: Vec<usize>,
    observations: Vec<Observation>,
}

impl DomainObservations {
    pub fn number_of_instances(&self) -> usize {
        self.instances.len()
    }

    /// Observations attached to instance `i`.
    pub fn instance(&self, i: usize) -> &[Observation] {
        &self.observations[self.offsets[i]..self.offsets[i + 1]]
    }

    pub fn all(&self) -> &[Observation] {
        &self.observations
    }

    /// Number of observations per classifier.
    pub fn observation_counts(&self, number_of_classifiers: usize) -> Vec<u32> {
        let mut counts = vec![0u32; number_of_classifiers];
        for obs in &self.observations {
            counts[obs.classifier] += 1;
        }
        counts
    }

    /// Majority-vote initial labels: 1 when at least half of the outputs
    /// (rounded down) are positive.
    pub fn majority_labels(&self) -> Vec<u8> {
        (0..self.number_of_instances())
            .map(|i| {
                let obs = self.instance(i);
                let positives = obs.iter().filter(|o| o.output == 1).count();
                u8::from(positives >= obs.len() / 2)
            })
            .collect()
    }
}

/// Interned view of a predicted-instance collection.
#[derive(Debug, Clone)]
pub struct ObservationIndex {
    pub domains: Vec<DomainObservations>,
    pub classifiers: KeyIndex<i64>,
    domain_keys: KeyIndex<Label>,
}

impl ObservationIndex {
    /// Intern `data`, rejecting values outside `[0, 1]` and duplicate
    /// (domain, instance, classifier) triples.
    pub fn build(data: &[PredictedInstance]) -> Result<Self, IntegratorError> {
        if data.is_empty() {
            return Err(IntegratorError::EmptyData);
        }

        let mut domain_keys: KeyIndex<Label> = KeyIndex::default();
        let mut classifiers: KeyIndex<i64> = KeyIndex::default();
        let mut per_domain: Vec<Vec<&PredictedInstance>> = Vec::new();
        for row in data {
            if !(row.value.is_finite() && (0.0..=1.0).contains(&row.value)) {
                return Err(IntegratorError::InvalidPrediction {
                    label: row.label.clone(),
                    instance: row.id,
                    classifier: row.function_id,
                    value: row.value,
                });
            }
            let p = domain_keys.intern(&row.label);
            if p == per_domain.len() {
                per_domain.push(Vec::new());
            }
            classifiers.intern(&row.function_id);
            per_domain[p].push(row);
        }

        let mut domains = Vec::with_capacity(per_domain.len());
        for (p, rows) in per_domain.into_iter().enumerate() {
            let label = domain_keys.key(p).clone();
            let mut instances: KeyIndex<i64> = KeyIndex::default();
            let mut seen: HashSet<(i64, i64)> = HashSet::with_capacity(rows.len());
            let mut grouped: Vec<Vec<Observation>> = Vec::new();
            for row in rows {
                if !seen.insert((row.id, row.function_id)) {
                    return Err(IntegratorError::DuplicateObservation {
                        label,
                        instance: row.id,
                        classifier: row.function_id,
                    });
                }
                let i = instances.intern(&row.id);
                if i == grouped.len() {
                    grouped.push(Vec::new());
                }
                let classifier = classifiers.get(&row.function_id).unwrap_or_default();
                grouped[i].push(Observation {
                    classifier,
                    output: row.output(),
                });
            }

            let mut offsets = Vec::with_capacity(grouped.len() + 1);
            let mut observations = Vec::new();
            offsets.push(0);
            for group in grouped {
                observations.extend(group);
                offsets.push(observations.len());
            }
            domains.push(DomainObservations {
                label,
                instances,
                offsets,
                observations,
            });
        }

        Ok(Self {
            domains,
            classifiers,
            domain_keys,
        })
    }

    pub fn number_of_domains(&self) -> usize {
        self.domains.len()
    }

    pub fn number_of_classifiers(&self) -> usize {
        self.classifiers.len()
    }

    pub fn domain_index(&self, label: &Label) -> Option<usize> {
        self.domain_keys.get(label)
    }

    /// Every classifier must have at least one observation in every domain;
    /// otherwise the sampler would read an error rate with no data behind it.
    pub fn require_full_coverage(&self) -> Result<(), IntegratorError> {
        let n = self.number_of_classifiers();
        for domain in &self.domains {
            let counts = domain.observation_counts(n);
            if let Some(j) = counts.iter().position(|&c| c == 0) {
                return Err(IntegratorError::UnobservedClassifier {
                    label: domain.label.clone(),
                    classifier: *self.classifiers.key(j),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<PredictedInstance> {
        vec![
            PredictedInstance::new(10, "b", 7, 0.9),
            PredictedInstance::new(10, "b", 3, 0.1),
            PredictedInstance::new(11, "b", 7, 0.6),
            PredictedInstance::new(11, "b", 3, 0.7),
            PredictedInstance::new(10, "a", 3, 0.2),
            PredictedInstance::new(10, "a", 7, 0.4),
        ]
    }

    #[test]
    fn interns_in_first_appearance_order() {
        let index = ObservationIndex::build(&rows()).unwrap();
        assert_eq!(index.number_of_domains(), 2);
        assert_eq!(index.domains[0].label, Label::new("b"));
        assert_eq!(index.classifiers.keys(), &[7, 3]);
        assert_eq!(index.domains[0].number_of_instances(), 2);
        assert_eq!(
            index.domains[0].instance(0),
            &[
                Observation {
                    classifier: 0,
                    output: 1
                },
                Observation {
                    classifier: 1,
                    output: 0
                }
            ]
        );
        assert_eq!(index.domain_index(&Label::new("a")), Some(1));
    }

    #[test]
    fn majority_labels_break_ties_towards_one() {
        let index = ObservationIndex::build(&rows()).unwrap();
        // Instance 10 of "b" has one vote each way.
        assert_eq!(index.domains[0].majority_labels(), vec![1, 1]);
        // Instance 10 of "a" has no positive votes; floor(2 / 2) = 1 > 0.
        assert_eq!(index.domains[1].majority_labels(), vec![0]);
    }

    #[test]
    fn rejects_duplicates_and_out_of_range_values() {
        let mut data = rows();
        data.push(PredictedInstance::new(10, "a", 3, 0.8));
        assert!(matches!(
            ObservationIndex::build(&data),
            Err(IntegratorError::DuplicateObservation { instance: 10, classifier: 3, .. })
        ));

        let data = vec![PredictedInstance::new(1, "a", 0, 1.5)];
        assert!(matches!(
            ObservationIndex::build(&data),
            Err(IntegratorError::InvalidPrediction { .. })
        ));

        assert!(matches!(
            ObservationIndex::build(&[]),
            Err(IntegratorError::EmptyData)
        ));
    }

    #[test]
    fn coverage_check_names_missing_classifier() {
        let mut data = rows();
        data.push(PredictedInstance::new(12, "b", 9, 0.3));
        let index = ObservationIndex::build(&data).unwrap();
        match index.require_full_coverage() {
            Err(IntegratorError::UnobservedClassifier { label, classifier }) => {
                assert_eq!(label, Label::new("a"));
                assert_eq!(classifier, 9);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
