use std::collections::BTreeMap;
use std::hash::BuildHasherDefault;

use dashmap::DashMap;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHasher};

use crate::algorithms::partition::VertexIndex;
use crate::types::vertex_id::VertexId;

/// A community label. Labels are seeded from vertex positions, so label `i`
/// originates at the `i`-th vertex of the ordered vertex list.
pub type Label = usize;

/// Label -> number of times the label was observed.
pub type Observations = FxHashMap<Label, u32>;

/// Result of community detection: label -> member vertices in vertex-list order.
pub type Communities<V> = BTreeMap<Label, Vec<V>>;

/// Concurrent map from vertex position to the labels observed at that vertex.
///
/// Access is sharded: each vertex entry is guarded by its shard lock rather
/// than one global lock. Only the worker owning a vertex's partition writes
/// its entry; any worker may read it while sampling a neighbor. Callers must
/// not hold a read guard while writing, which the methods below guarantee by
/// copying data out before returning.
pub struct LabelStore {
    observations: DashMap<usize, Observations, BuildHasherDefault<FxHasher>>,
}

impl LabelStore {
    /// Creates a store where every vertex has observed only its own seed label once.
    pub fn with_seed_labels(vertex_count: usize) -> Self {
        let observations = DashMap::with_capacity_and_hasher(vertex_count, BuildHasherDefault::default());
        for position in 0..vertex_count {
            let mut seed = Observations::default();
            seed.insert(position, 1);
            observations.insert(position, seed);
        }
        Self { observations }
    }

    /// Number of vertices tracked.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Copies the observation counts of a vertex, sorted by label.
    ///
    /// Sorting makes sampling independent of hash-map iteration order.
    pub fn snapshot(&self, position: usize) -> Vec<(Label, u32)> {
        let mut observed = self.observations
            .get(&position)
            .map(|entry| entry.iter().map(|(&label, &count)| (label, count)).collect::<Vec<_>>())
            .unwrap_or_default();
        observed.sort_unstable_by_key(|(label, _)| *label);
        observed
    }

    /// Records one more observation of `label` at the vertex.
    pub fn observe(&self, position: usize, label: Label) {
        let mut entry = self.observations.entry(position).or_default();
        *entry.entry(label).or_insert(0) += 1;
    }

    /// Total number of observations recorded at a vertex.
    pub fn total_observations(&self, position: usize) -> u64 {
        self.observations
            .get(&position)
            .map(|entry| entry.values().map(|&count| count as u64).sum())
            .unwrap_or(0)
    }

    /// Labels at a vertex whose share of all observations reaches `threshold`.
    ///
    /// A label is dropped when `count < threshold * total`.
    pub fn surviving_labels(&self, position: usize, threshold: f64) -> Vec<Label> {
        let observed = self.snapshot(position);
        let total = observed.iter().map(|(_, count)| *count as f64).sum::<f64>();
        observed
            .into_iter()
            .filter(|(_, count)| *count as f64 >= threshold * total)
            .map(|(label, _)| label)
            .collect()
    }
}

/// Turns the final label store into communities.
///
/// # Algorithm
///
/// 1. For each vertex (in parallel), keep only labels that clear the threshold.
/// 2. Invert the surviving (vertex, label) pairs into label -> vertices.
/// 3. Drop communities with fewer than `min_community_size` members.
///
/// The store is only read, so running this twice on the same store gives the
/// same result.
pub fn post_process<V>(
    label_store: &LabelStore,
    vertex_index: &VertexIndex<V>,
    threshold: f64,
    min_community_size: usize,
) -> Communities<V>
where
    V: VertexId
{
    // Step 1. Threshold each vertex independently.
    let surviving = (0..vertex_index.len())
        .into_par_iter()
        .map(|position| label_store.surviving_labels(position, threshold))
        .collect::<Vec<_>>();

    // Step 2. Invert in position order so member lists follow the vertex order.
    let mut communities = Communities::<V>::new();
    for (position, labels) in surviving.into_iter().enumerate() {
        for label in labels {
            communities
                .entry(label)
                .or_default()
                .push(vertex_index.vertex(position).clone());
        }
    }

    // Step 3. Drop small groups.
    communities.retain(|_, members| members.len() >= min_community_size);
    communities
}

#[cfg(test)]
mod test_label_store {
    use super::*;
    use crate::types::Network;

    fn index_of(vertex_count: u32) -> VertexIndex<u32> {
        let mut network = Network::new(false);
        for vertex in 0..vertex_count {
            network.add_vertex(vertex);
        }
        VertexIndex::build(&network)
    }

    #[test]
    fn test_seed_labels() {
        let store = LabelStore::with_seed_labels(4);
        assert_eq!(store.len(), 4);
        for position in 0..4 {
            assert_eq!(store.snapshot(position), vec![(position, 1)]);
            assert_eq!(store.total_observations(position), 1);
        }
    }

    #[test]
    fn test_observe_and_snapshot_order() {
        let store = LabelStore::with_seed_labels(3);
        store.observe(0, 2);
        store.observe(0, 1);
        store.observe(0, 2);
        assert_eq!(store.snapshot(0), vec![(0, 1), (1, 1), (2, 2)]);
        assert_eq!(store.total_observations(0), 4);
    }

    #[test]
    fn test_threshold_strictly_less_is_dropped() {
        let store = LabelStore::with_seed_labels(1);
        // label 0: 1, label 5: 3 -> total 4
        for _ in 0..3 {
            store.observe(0, 5);
        }
        // 1 < 0.25 * 4 is false, so label 0 survives exactly at the boundary
        assert_eq!(store.surviving_labels(0, 0.25), vec![0, 5]);
        assert_eq!(store.surviving_labels(0, 0.3), vec![5]);
        assert_eq!(store.surviving_labels(0, 0.0), vec![0, 5]);
    }

    #[test]
    fn test_post_process_groups_and_filters() {
        let index = index_of(4);
        let store = LabelStore::with_seed_labels(4);
        // Vertices 0, 1, 2 converge on label 0; vertex 3 keeps its own label.
        for position in 0..3 {
            for _ in 0..9 {
                store.observe(position, 0);
            }
        }

        let communities = post_process(&store, &index, 0.5, 2);
        assert_eq!(communities.len(), 1);
        assert_eq!(communities[&0], vec![0, 1, 2]);

        let unfiltered = post_process(&store, &index, 0.5, 1);
        assert_eq!(unfiltered.len(), 2);
        assert_eq!(unfiltered[&3], vec![3]);
    }

    #[test]
    fn test_post_process_idempotent() {
        let index = index_of(5);
        let store = LabelStore::with_seed_labels(5);
        store.observe(1, 0);
        store.observe(2, 0);
        store.observe(4, 3);

        let first = post_process(&store, &index, 0.3, 1);
        let second = post_process(&store, &index, 0.3, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_post_process_empty() {
        let index = index_of(0);
        let store = LabelStore::with_seed_labels(0);
        assert!(post_process(&store, &index, 0.3, 2).is_empty());
    }
}
