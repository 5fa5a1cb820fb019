//! Sufficient statistics of the Gibbs samplers.
//!
//! Two count tables are kept in step with the sampler state:
//! - label counts, indexed by (domain, label)
//! - confusion counts, indexed by (group, classifier, true label, output),
//!   where a group is a domain (uncoupled) or a DP cluster (coupled)
//!
//! Every stochastic update is bracketed by a `before_*` call that removes the
//! variable's current contribution and an `after_*` call that adds the new
//! one. A state is never counted twice.

use super::index::{DomainObservations, Observation};

/// 2x2 co-occurrence counts indexed by `[true label][output]`.
pub type Confusion = [[u32; 2]; 2];

fn disagreements_of(c: &Confusion) -> u32 {
    c[0][1] + c[1][0]
}

fn total_of(c: &Confusion) -> u32 {
    c[0][0] + c[0][1] + c[1][0] + c[1][1]
}

fn subtract(count: &mut u32, amount: u32) {
    match count.checked_sub(amount) {
        Some(rest) => *count = rest,
        None => panic!("sufficient statistic would go negative ({count} - {amount})"),
    }
}

fn decrement(count: &mut u32) {
    subtract(count, 1);
}

/// Counts attributable to a single domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainCounts {
    labels: [u32; 2],
    confusion: Vec<Confusion>,
}

impl DomainCounts {
    pub fn new(number_of_classifiers: usize) -> Self {
        Self {
            labels: [0; 2],
            confusion: vec![[[0; 2]; 2]; number_of_classifiers],
        }
    }

    /// Counts derived from scratch for `labels` over `domain`.
    pub fn from_labels(
        domain: &DomainObservations,
        labels: &[u8],
        number_of_classifiers: usize,
    ) -> Self {
        let mut counts = Self::new(number_of_classifiers);
        for (i, &label) in labels.iter().enumerate() {
            counts.after_resample(label, domain.instance(i));
        }
        counts
    }

    pub fn before_resample(&mut self, label: u8, observations: &[Observation]) {
        let y = label as usize;
        decrement(&mut self.labels[y]);
        for obs in observations {
            decrement(&mut self.confusion[obs.classifier][y][obs.output as usize]);
        }
    }

    pub fn after_resample(&mut self, label: u8, observations: &[Observation]) {
        let y = label as usize;
        self.labels[y] += 1;
        for obs in observations {
            self.confusion[obs.classifier][y][obs.output as usize] += 1;
        }
    }

    pub fn label_count(&self, label: u8) -> u32 {
        self.labels[label as usize]
    }

    pub fn confusion(&self, classifier: usize) -> &Confusion {
        &self.confusion[classifier]
    }

    pub fn disagreements(&self, classifier: usize) -> u32 {
        disagreements_of(&self.confusion[classifier])
    }

    pub fn observations(&self, classifier: usize) -> u32 {
        total_of(&self.confusion[classifier])
    }

    pub fn number_of_classifiers(&self) -> usize {
        self.confusion.len()
    }
}

/// Confusion counts pooled over every domain assigned to one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCounts {
    confusion: Vec<Confusion>,
}

impl ClusterCounts {
    pub fn new(number_of_classifiers: usize) -> Self {
        Self {
            confusion: vec![[[0; 2]; 2]; number_of_classifiers],
        }
    }

    pub fn disagreements(&self, classifier: usize) -> u32 {
        disagreements_of(&self.confusion[classifier])
    }

    pub fn observations(&self, classifier: usize) -> u32 {
        total_of(&self.confusion[classifier])
    }

    pub fn is_empty(&self) -> bool {
        self.confusion.iter().all(|c| total_of(c) == 0)
    }
}

/// Full count state of a sampler.
///
/// Uncoupled samplers carry no cluster table; their groups are the domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SufficientStatistics {
    domains: Vec<DomainCounts>,
    clusters: Vec<ClusterCounts>,
}

impl SufficientStatistics {
    pub fn uncoupled(domains: Vec<DomainCounts>) -> Self {
        Self {
            domains,
            clusters: Vec::new(),
        }
    }

    /// Domain counts plus `number_of_clusters` empty cluster tables.
    pub fn coupled(domains: Vec<DomainCounts>, number_of_clusters: usize) -> Self {
        let classifiers = domains.first().map_or(0, DomainCounts::number_of_classifiers);
        Self {
            domains,
            clusters: vec![ClusterCounts::new(classifiers); number_of_clusters],
        }
    }

    pub fn domain(&self, domain: usize) -> &DomainCounts {
        &self.domains[domain]
    }

    pub fn domains(&self) -> &[DomainCounts] {
        &self.domains
    }

    pub fn cluster(&self, cluster: usize) -> &ClusterCounts {
        &self.clusters[cluster]
    }

    /// Remove instance contributions before its label is redrawn.
    pub fn before_label_resample(
        &mut self,
        domain: usize,
        cluster: Option<usize>,
        label: u8,
        observations: &[Observation],
    ) {
        self.domains[domain].before_resample(label, observations);
        if let Some(k) = cluster {
            let y = label as usize;
            for obs in observations {
                decrement(&mut self.clusters[k].confusion[obs.classifier][y][obs.output as usize]);
            }
        }
    }

    /// Add instance contributions after its label was redrawn.
    pub fn after_label_resample(
        &mut self,
        domain: usize,
        cluster: Option<usize>,
        label: u8,
        observations: &[Observation],
    ) {
        self.domains[domain].after_resample(label, observations);
        if let Some(k) = cluster {
            let y = label as usize;
            for obs in observations {
                self.clusters[k].confusion[obs.classifier][y][obs.output as usize] += 1;
            }
        }
    }

    /// Take a domain's confusion counts out of `cluster`.
    pub fn remove_domain_from_cluster(&mut self, domain: usize, cluster: usize) {
        let source = &self.domains[domain].confusion;
        let target = &mut self.clusters[cluster].confusion;
        for (t, s) in target.iter_mut().zip(source) {
            for y in 0..2 {
                for o in 0..2 {
                    subtract(&mut t[y][o], s[y][o]);
                }
            }
        }
    }

    /// Add a domain's confusion counts to `cluster`.
    pub fn add_domain_to_cluster(&mut self, domain: usize, cluster: usize) {
        let source = &self.domains[domain].confusion;
        let target = &mut self.clusters[cluster].confusion;
        for (t, s) in target.iter_mut().zip(source) {
            for y in 0..2 {
                for o in 0..2 {
                    t[y][o] += s[y][o];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PredictedInstance;
    use crate::integrator::index::ObservationIndex;

    fn index() -> ObservationIndex {
        ObservationIndex::build(&[
            PredictedInstance::new(0, "a", 0, 0.9),
            PredictedInstance::new(0, "a", 1, 0.2),
            PredictedInstance::new(1, "a", 0, 0.1),
            PredictedInstance::new(1, "a", 1, 0.3),
        ])
        .unwrap()
    }

    #[test]
    fn counts_from_labels_match_manual_tally() {
        let index = index();
        let counts = DomainCounts::from_labels(&index.domains[0], &[1, 0], 2);
        assert_eq!(counts.label_count(1), 1);
        assert_eq!(counts.label_count(0), 1);
        // Classifier 0 agrees on both instances.
        assert_eq!(counts.disagreements(0), 0);
        // Classifier 1 says 0 on instance 0 whose label is 1.
        assert_eq!(counts.disagreements(1), 1);
        assert_eq!(counts.observations(1), 2);
    }

    #[test]
    fn before_after_pair_tracks_label_change() {
        let index = index();
        let domain = &index.domains[0];
        let mut stats =
            SufficientStatistics::coupled(vec![DomainCounts::from_labels(domain, &[1, 0], 2)], 1);
        stats.add_domain_to_cluster(0, 0);

        stats.before_label_resample(0, Some(0), 1, domain.instance(0));
        stats.after_label_resample(0, Some(0), 0, domain.instance(0));

        let expected = DomainCounts::from_labels(domain, &[0, 0], 2);
        assert_eq!(stats.domain(0), &expected);
        assert_eq!(stats.cluster(0).disagreements(0), expected.disagreements(0));
        assert_eq!(stats.cluster(0).disagreements(1), expected.disagreements(1));
    }

    #[test]
    fn moving_domain_between_clusters_conserves_counts() {
        let index = index();
        let domain = &index.domains[0];
        let mut stats =
            SufficientStatistics::coupled(vec![DomainCounts::from_labels(domain, &[1, 1], 2)], 2);
        stats.add_domain_to_cluster(0, 1);
        assert!(stats.cluster(0).is_empty());

        stats.remove_domain_from_cluster(0, 1);
        stats.add_domain_to_cluster(0, 0);
        assert!(stats.cluster(1).is_empty());
        assert_eq!(stats.cluster(0).observations(0), 2);
        assert_eq!(stats.cluster(0).disagreements(0), 1);
    }

    #[test]
    #[should_panic(expected = "would go negative")]
    fn double_decrement_is_caught() {
        let index = index();
        let domain = &index.domains[0];
        let mut counts = DomainCounts::from_labels(domain, &[1, 0], 2);
        counts.before_resample(1, domain.instance(0));
        counts.before_resample(1, domain.instance(0));
    }

    #[test]
    #[should_panic(expected = "would go negative")]
    fn removing_domain_from_wrong_cluster_is_caught() {
        let index = index();
        let domain = &index.domains[0];
        let mut stats =
            SufficientStatistics::coupled(vec![DomainCounts::from_labels(domain, &[1, 1], 2)], 2);
        stats.add_domain_to_cluster(0, 1);
        stats.remove_domain_from_cluster(0, 0);
    }
}
