//! Chinese-restaurant-process bookkeeping for the Dirichlet-process prior.
//!
//! Cluster ids live in `0..capacity`. A cluster is either occupied (one or
//! more members) or free; the lowest free id is offered as the "new cluster"
//! candidate. Ordered sets keep candidate enumeration deterministic.

use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct DirichletProcess {
    alpha: f64,
    member_counts: Vec<usize>,
    free: BTreeSet<usize>,
    occupied: BTreeSet<usize>,
    candidate_ids: Vec<usize>,
    candidate_weights: Vec<f64>,
    new_candidate: Option<usize>,
}

impl DirichletProcess {
    /// `capacity` bounds the number of simultaneously occupied clusters.
    pub fn new(alpha: f64, capacity: usize) -> Self {
        Self {
            alpha,
            member_counts: vec![0; capacity],
            free: (0..capacity).collect(),
            occupied: BTreeSet::new(),
            candidate_ids: Vec::with_capacity(capacity),
            candidate_weights: Vec::with_capacity(capacity),
            new_candidate: None,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn add_member_to_cluster(&mut self, cluster: usize) {
        self.member_counts[cluster] += 1;
        if self.member_counts[cluster] == 1 {
            self.free.remove(&cluster);
            self.occupied.insert(cluster);
        }
    }

    pub fn remove_member_from_cluster(&mut self, cluster: usize) {
        assert!(
            self.member_counts[cluster] > 0,
            "removing member from empty cluster {cluster}"
        );
        self.member_counts[cluster] -= 1;
        if self.member_counts[cluster] == 0 {
            self.occupied.remove(&cluster);
            self.free.insert(cluster);
        }
    }

    /// Number of occupied clusters.
    pub fn number_of_clusters(&self) -> usize {
        self.occupied.len()
    }

    pub fn members(&self, cluster: usize) -> usize {
        self.member_counts[cluster]
    }

    pub fn occupied_clusters(&self) -> impl Iterator<Item = usize> + '_ {
        self.occupied.iter().copied()
    }

    /// Populate the candidate list for the next draw and return its length:
    /// one entry per occupied cluster (weight = member count) followed by a
    /// single new-cluster entry (weight = alpha) when a free id exists.
    ///
    /// Call after removing the member being resampled.
    pub fn compute_clusters_distribution(&mut self) -> usize {
        self.candidate_ids.clear();
        self.candidate_weights.clear();
        for &cluster in &self.occupied {
            self.candidate_ids.push(cluster);
            self.candidate_weights.push(self.member_counts[cluster] as f64);
        }
        self.new_candidate = self.free.iter().next().copied();
        if let Some(cluster) = self.new_candidate {
            self.candidate_ids.push(cluster);
            self.candidate_weights.push(self.alpha);
        }
        self.candidate_ids.len()
    }

    pub fn cluster_unnormalized_probability(&self, index: usize) -> f64 {
        self.candidate_weights[index]
    }

    pub fn cluster_id(&self, index: usize) -> usize {
        self.candidate_ids[index]
    }

    /// Whether candidate `index` is the new-cluster entry.
    pub fn is_new_cluster(&self, index: usize) -> bool {
        self.new_candidate.is_some() && index + 1 == self.candidate_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_track_occupancy() {
        let mut dp = DirichletProcess::new(0.5, 3);
        dp.add_member_to_cluster(1);
        dp.add_member_to_cluster(1);
        dp.add_member_to_cluster(2);
        assert_eq!(dp.number_of_clusters(), 2);
        assert_eq!(dp.members(1), 2);

        dp.remove_member_from_cluster(2);
        assert_eq!(dp.number_of_clusters(), 1);
        assert_eq!(dp.occupied_clusters().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn distribution_lists_occupied_then_new() {
        let mut dp = DirichletProcess::new(0.5, 4);
        dp.add_member_to_cluster(2);
        dp.add_member_to_cluster(2);
        dp.add_member_to_cluster(3);

        let n = dp.compute_clusters_distribution();
        assert_eq!(n, 3);
        assert_eq!(dp.cluster_id(0), 2);
        assert_eq!(dp.cluster_unnormalized_probability(0), 2.0);
        assert_eq!(dp.cluster_id(1), 3);
        assert_eq!(dp.cluster_unnormalized_probability(1), 1.0);
        // Lowest free id is offered as the new cluster.
        assert_eq!(dp.cluster_id(2), 0);
        assert_eq!(dp.cluster_unnormalized_probability(2), 0.5);
        assert!(dp.is_new_cluster(2));
        assert!(!dp.is_new_cluster(1));
    }

    #[test]
    fn freed_cluster_is_reused_as_new_candidate() {
        let mut dp = DirichletProcess::new(1.0, 2);
        dp.add_member_to_cluster(0);
        dp.add_member_to_cluster(1);
        assert_eq!(dp.compute_clusters_distribution(), 2);
        assert!(!dp.is_new_cluster(1));

        dp.remove_member_from_cluster(0);
        assert_eq!(dp.compute_clusters_distribution(), 2);
        assert_eq!(dp.cluster_id(0), 1);
        assert_eq!(dp.cluster_id(1), 0);
        assert!(dp.is_new_cluster(1));
    }

    #[test]
    fn single_member_removed_leaves_only_new_candidate() {
        let mut dp = DirichletProcess::new(3.0, 1);
        dp.add_member_to_cluster(0);
        dp.remove_member_from_cluster(0);
        assert_eq!(dp.compute_clusters_distribution(), 1);
        assert!(dp.is_new_cluster(0));
        assert_eq!(dp.cluster_unnormalized_probability(0), 3.0);
    }

    #[test]
    #[should_panic(expected = "empty cluster 0")]
    fn removing_from_empty_cluster_panics() {
        let mut dp = DirichletProcess::new(1.0, 2);
        dp.remove_member_from_cluster(0);
    }
}
