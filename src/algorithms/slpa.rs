use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::algorithms::label_store::{post_process, Communities, LabelStore};
use crate::algorithms::multinomial::{max_label, MultinomialLabels};
use crate::algorithms::partition::{Partition, PartitionId, PartitionPlan, VertexIndex};
use crate::config::{
    DEFAULT_ITERATIONS, DEFAULT_MIN_COMMUNITY_SIZE, DEFAULT_PARTITION_COUNT, DEFAULT_SEED, DEFAULT_THRESHOLD,
    STALL_WARNING_INTERVAL,
};
use crate::error::AlgorithmError;
use crate::types::graph_query::GraphQuery;
use crate::types::vertex_id::VertexId;
use crate::util::derive_seed;

/// Configuration for the concurrent SLPA community detection.
///
/// # Fields
/// * `iterations` - Number of label propagation iterations (T)
/// * `threshold` - Minimum share of a vertex's observations a label needs to be kept, in `[0, 1]`
/// * `seed` - Base seed; each partition worker derives its own generator from it
/// * `partition_count` - Number of partitions, and so of concurrent workers (P)
/// * `min_community_size` - Communities with fewer members are dropped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SLPAConfig {
    pub iterations: usize,
    pub threshold: f64,
    pub seed: u64,
    pub partition_count: usize,
    pub min_community_size: usize,
}

impl Default for SLPAConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            threshold: DEFAULT_THRESHOLD,
            seed: DEFAULT_SEED,
            partition_count: DEFAULT_PARTITION_COUNT,
            min_community_size: DEFAULT_MIN_COMMUNITY_SIZE,
        }
    }
}

impl SLPAConfig {
    fn validate(&self) -> Result<(), AlgorithmError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(AlgorithmError::InvalidArgument(format!(
                "threshold must lie in [0, 1], got {}", self.threshold
            )));
        }
        Ok(())
    }
}

/// Iteration counter of a partition as tracked by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    /// The partition is at (or asking to enter) this iteration.
    Running(usize),
    /// The partition completed all iterations.
    Finished,
}

/// Message sent by a partition worker to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Request to enter the internal phase of `iteration - 1` and then `iteration`.
    Progress { partition_id: PartitionId, iteration: usize },
    /// All iterations done; no reply expected.
    Finished { partition_id: PartitionId },
    /// The worker stopped before finishing (it panicked or lost the coordinator).
    Failed { partition_id: PartitionId },
}

impl WorkerMessage {
    fn partition_id(&self) -> PartitionId {
        match *self {
            WorkerMessage::Progress { partition_id, .. }
            | WorkerMessage::Finished { partition_id }
            | WorkerMessage::Failed { partition_id } => partition_id,
        }
    }
}

/// Go-ahead sent by the coordinator on a worker's private channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission;

/// Lifecycle of a partition worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    RunningExternal,
    AwaitingPermission,
    RunningInternal,
    Done,
}

/// Propagates labels for the vertices of one partition.
struct PartitionWorker<'a, V> {
    partition: &'a Partition,
    vertex_index: &'a VertexIndex<V>,
    label_store: &'a LabelStore,
    iterations: usize,
    rng: StdRng,
    outbound: Sender<WorkerMessage>,
    permission: Receiver<Permission>,
    phase: WorkerPhase,
}

impl<'a, V> PartitionWorker<'a, V>
where
    V: VertexId
{
    /// Runs all iterations.
    ///
    /// Per iteration: external vertices first, then (except on the last
    /// iteration) report progress and block until the coordinator allows the
    /// internal vertices to run. The last iteration reports termination instead
    /// and does not wait.
    fn run(mut self) {
        let mut externals = self.partition.externals.clone();
        let mut internals = self.partition.internals.clone();

        for iteration in 0..self.iterations {
            self.enter(WorkerPhase::RunningExternal);
            self.propagate(&mut externals);

            if iteration + 1 < self.iterations {
                self.enter(WorkerPhase::AwaitingPermission);
                let progress = WorkerMessage::Progress {
                    partition_id: self.partition.id,
                    iteration: iteration + 1,
                };
                if self.outbound.send(progress).is_err() || self.permission.recv().is_err() {
                    // Coordinator is gone; Drop reports the failure.
                    return;
                }
            }

            self.enter(WorkerPhase::RunningInternal);
            self.propagate(&mut internals);
        }

        self.enter(WorkerPhase::Done);
        let _ = self.outbound.send(WorkerMessage::Finished { partition_id: self.partition.id });
    }

    fn enter(&mut self, phase: WorkerPhase) {
        trace!(partition = self.partition.id, ?phase, "worker phase change");
        self.phase = phase;
    }

    /// One listener step for each vertex, in a freshly shuffled order.
    ///
    /// Every neighbor speaks one label drawn from its observations; the vertex
    /// records the most frequently spoken label.
    fn propagate(&mut self, positions: &mut [usize]) {
        positions.shuffle(&mut self.rng);
        for &position in positions.iter() {
            let neighbors = self.vertex_index.neighbors(position);
            if neighbors.is_empty() {
                continue;
            }

            let mut spoken = FxHashMap::default();
            for &neighbor in neighbors {
                let observed = self.label_store.snapshot(neighbor);
                if let Some(distribution) = MultinomialLabels::new(&observed) {
                    *spoken.entry(distribution.sample(&mut self.rng)).or_insert(0u32) += 1;
                }
            }

            if let Some(label) = max_label(&spoken, &mut self.rng) {
                self.label_store.observe(position, label);
            }
        }
    }
}

impl<'a, V> Drop for PartitionWorker<'a, V> {
    fn drop(&mut self) {
        if self.phase != WorkerPhase::Done {
            let _ = self.outbound.send(WorkerMessage::Failed { partition_id: self.partition.id });
        }
    }
}

/// Arbitrates iteration progress between partition workers.
///
/// A partition asking to enter iteration `k` is released only when every
/// partition it depends on is finished or within one iteration of `k`. When a
/// partition advances, its dependents that are still waiting are re-checked,
/// so unblocking propagates without polling every partition.
pub struct IterationCoordinator<'a> {
    plan: &'a PartitionPlan,
    current: Vec<IterationState>,
    pending: Vec<bool>,
    active_count: usize,
    permissions: Vec<Sender<Permission>>,
}

impl<'a> IterationCoordinator<'a> {
    /// Creates a coordinator for `plan`; `permissions[p]` is worker `p`'s private channel.
    pub fn new(plan: &'a PartitionPlan, permissions: Vec<Sender<Permission>>) -> Self {
        let partition_count = plan.len();
        Self {
            plan,
            current: vec![IterationState::Running(0); partition_count],
            pending: vec![false; partition_count],
            active_count: partition_count,
            permissions,
        }
    }

    /// Number of partitions that have not reported termination.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Last iteration state reported by a partition.
    pub fn iteration_state(&self, partition_id: PartitionId) -> IterationState {
        self.current[partition_id]
    }

    /// Whether a partition is waiting for permission.
    pub fn is_pending(&self, partition_id: PartitionId) -> bool {
        self.pending[partition_id]
    }

    /// Services the shared inbound channel until every worker has finished.
    ///
    /// Blocks on the channel; if nothing arrives for `STALL_WARNING_INTERVAL`
    /// a warning is logged and the wait continues.
    ///
    /// # Errors
    /// * `AlgorithmError::WorkerDisconnected` if a worker fails or all workers hang up early
    pub fn run(mut self, inbound: Receiver<WorkerMessage>) -> Result<(), AlgorithmError> {
        while self.active_count > 0 {
            match inbound.recv_timeout(STALL_WARNING_INTERVAL) {
                Ok(message) => self.handle(message)?,
                Err(RecvTimeoutError::Timeout) => {
                    let waiting = (0..self.pending.len()).filter(|&p| self.pending[p]).collect::<Vec<_>>();
                    warn!(
                        active = self.active_count,
                        "no SLPA progress for {:?}; waiting partitions {:?}, iterations {:?}",
                        STALL_WARNING_INTERVAL,
                        waiting,
                        self.current
                    );
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let first_active = self.current
                        .iter()
                        .position(|state| *state != IterationState::Finished)
                        .unwrap_or(0);
                    return Err(AlgorithmError::WorkerDisconnected(first_active));
                }
            }
        }
        // Dropping `self` closes every permission channel.
        Ok(())
    }

    /// Applies one worker message.
    pub fn handle(&mut self, message: WorkerMessage) -> Result<(), AlgorithmError> {
        let partition_id = message.partition_id();
        if partition_id >= self.current.len() {
            return Err(AlgorithmError::InvariantViolation(format!(
                "message from unknown partition {}", partition_id
            )));
        }

        match message {
            WorkerMessage::Failed { partition_id } => {
                return Err(AlgorithmError::WorkerDisconnected(partition_id));
            }
            WorkerMessage::Finished { partition_id } => {
                if self.current[partition_id] != IterationState::Finished {
                    self.current[partition_id] = IterationState::Finished;
                    self.pending[partition_id] = false;
                    self.active_count -= 1;
                }
                debug!(partition = partition_id, active = self.active_count, "partition finished");

                // The last active partition no longer has anyone to stay in step with.
                if self.active_count == 1 {
                    if let Some(last) = (0..self.pending.len()).find(|&p| self.pending[p]) {
                        self.grant(last)?;
                    }
                }
            }
            WorkerMessage::Progress { partition_id, iteration } => {
                self.current[partition_id] = IterationState::Running(iteration);
                self.pending[partition_id] = true;
                if self.dependencies_ready(partition_id) || self.active_count == 1 {
                    self.grant(partition_id)?;
                }
            }
        }

        // Re-check dependents still waiting on this partition.
        let plan = self.plan;
        for &dependent in plan.dependency_of(partition_id) {
            if self.pending[dependent] && self.dependencies_ready(dependent) {
                self.grant(dependent)?;
            }
        }
        Ok(())
    }

    /// Bounded-staleness check: every dependency is finished or within one iteration.
    pub fn dependencies_ready(&self, partition_id: PartitionId) -> bool {
        let iteration = match self.current[partition_id] {
            IterationState::Running(iteration) => iteration,
            IterationState::Finished => return true,
        };
        self.plan.depends_on(partition_id).iter().all(|&dependency| {
            match self.current[dependency] {
                IterationState::Finished => true,
                IterationState::Running(other) => iteration.abs_diff(other) <= 1,
            }
        })
    }

    fn grant(&mut self, partition_id: PartitionId) -> Result<(), AlgorithmError> {
        debug!(partition = partition_id, state = ?self.current[partition_id], "permission granted");
        self.pending[partition_id] = false;
        self.permissions[partition_id]
            .send(Permission)
            .map_err(|_| AlgorithmError::WorkerDisconnected(partition_id))
    }
}

/// Runs the partitioned propagation phase and returns the final label store.
///
/// One worker per partition runs on a dedicated pool while the coordinator
/// loop runs on the calling thread.
pub fn propagate_labels<V>(
    vertex_index: &VertexIndex<V>,
    plan: &PartitionPlan,
    config: &SLPAConfig,
) -> Result<LabelStore, AlgorithmError>
where
    V: VertexId
{
    let label_store = LabelStore::with_seed_labels(vertex_index.len());
    let partition_count = plan.len();
    if partition_count == 0 {
        return Ok(label_store);
    }

    // Each worker has at most one message in flight, so this never blocks a sender.
    let (outbound, inbound) = bounded::<WorkerMessage>(2 * partition_count);
    let (permission_senders, permission_receivers): (Vec<_>, Vec<_>) =
        (0..partition_count).map(|_| bounded::<Permission>(1)).unzip();

    let pool = ThreadPoolBuilder::new()
        .num_threads(partition_count)
        .thread_name(|worker_id| format!("slpa-partition-{}", worker_id))
        .build()?;

    let coordinator = IterationCoordinator::new(plan, permission_senders);
    pool.in_place_scope(|scope| {
        for (partition, permission) in plan.partitions().iter().zip(permission_receivers) {
            let worker = PartitionWorker {
                partition,
                vertex_index,
                label_store: &label_store,
                iterations: config.iterations,
                rng: StdRng::seed_from_u64(derive_seed(config.seed, partition.id)),
                outbound: outbound.clone(),
                permission,
                phase: WorkerPhase::RunningExternal,
            };
            scope.spawn(move |_| worker.run());
        }
        // Workers hold the only senders from here on.
        drop(outbound);
        coordinator.run(inbound)
    })?;

    Ok(label_store)
}

/// Concurrent Speaker-Listener Label Propagation over `graph`.
///
/// # Algorithm
///
/// 1. Index the ordered vertex list and split it into `partition_count`
///    contiguous partitions; derive the dependency graph.
/// 2. Seed every vertex with its own label.
/// 3. Propagate labels for `iterations` rounds, one worker per partition,
///    under the bounded-staleness protocol.
/// 4. Threshold, invert and size-filter the observations into communities.
///
/// An empty graph yields an empty map.
///
/// # Errors
/// * `AlgorithmError::InvalidArgument` if the threshold is outside `[0, 1]`
/// * `AlgorithmError::ThreadPool` if the worker pool cannot be created
/// * `AlgorithmError::WorkerDisconnected` if a worker dies mid-run
pub fn concurrent_slpa<V, G>(graph: &G, config: &SLPAConfig) -> Result<Communities<V>, AlgorithmError>
where
    V: VertexId,
    G: GraphQuery<V> + ?Sized
{
    config.validate()?;

    // Step 1. Index and partition.
    let vertex_index = VertexIndex::build(graph);
    if vertex_index.is_empty() {
        return Ok(Communities::new());
    }
    let plan = PartitionPlan::build(&vertex_index, config.partition_count);
    plan.validate(vertex_index.len())?;
    info!(
        vertices = vertex_index.len(),
        partitions = plan.len(),
        iterations = config.iterations,
        threshold = config.threshold,
        seed = config.seed,
        "starting concurrent SLPA"
    );

    // Step 2 and 3. Seed labels and propagate.
    let label_store = propagate_labels(&vertex_index, &plan, config)?;

    // Step 4. Post-process.
    let communities = post_process(&label_store, &vertex_index, config.threshold, config.min_community_size);
    info!(communities = communities.len(), "concurrent SLPA finished");
    Ok(communities)
}

/// Controller for running SLPA community detection on a shared graph.
pub struct SLPAController<G> {
    graph: Arc<G>,
}

impl<G> SLPAController<G> {
    /// Creates a new SLPA controller over the given graph.
    pub fn new(graph: Arc<G>) -> Self {
        Self { graph }
    }

    /// Detects overlapping communities with the given configuration.
    pub fn detect<V>(&self, config: &SLPAConfig) -> Result<Communities<V>, AlgorithmError>
    where
        V: VertexId,
        G: GraphQuery<V>
    {
        concurrent_slpa(self.graph.as_ref(), config)
    }
}

#[cfg(test)]
mod test_slpa {
    use std::collections::BTreeSet;

    use crossbeam_channel::TryRecvError;

    use super::*;
    use crate::types::Network;

    /// Two cliques of `clique_size` vertices; `bridged` adds one edge between them.
    fn two_cliques(clique_size: u32, bridged: bool) -> Network<u32> {
        let mut network = Network::new(false);
        for offset in [0, clique_size] {
            for a in 0..clique_size {
                for b in (a + 1)..clique_size {
                    network.add_edge(offset + a, offset + b, 1.0).unwrap();
                }
            }
        }
        if bridged {
            network.add_edge(clique_size - 1, clique_size, 1.0).unwrap();
        }
        network
    }

    /// Undirected path 0 - 1 - ... - (n-1).
    fn path_network(vertex_count: u32) -> Network<u32> {
        let mut network = Network::new(false);
        for vertex in 1..vertex_count {
            network.add_edge(vertex - 1, vertex, 1.0).unwrap();
        }
        network
    }

    fn config(iterations: usize, partition_count: usize, seed: u64) -> SLPAConfig {
        SLPAConfig {
            iterations,
            threshold: 0.3,
            seed,
            partition_count,
            min_community_size: 2,
        }
    }

    /// Coordinator over `plan` plus the receiving ends of its permission channels.
    fn coordinator_for(plan: &PartitionPlan) -> (IterationCoordinator<'_>, Vec<Receiver<Permission>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..plan.len()).map(|_| bounded(1)).unzip();
        (IterationCoordinator::new(plan, senders), receivers)
    }

    fn granted(receiver: &Receiver<Permission>) -> bool {
        match receiver.try_recv() {
            Ok(Permission) => true,
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => panic!("permission channel closed"),
        }
    }

    #[test]
    fn test_communities_respect_constraints() {
        let network = two_cliques(6, true);
        let slpa_config = SLPAConfig {
            min_community_size: 3,
            ..config(25, 3, 11)
        };
        let communities = concurrent_slpa(&network, &slpa_config).unwrap();
        assert!(!communities.is_empty());

        for (label, members) in &communities {
            assert!(*label < network.order());
            assert!(members.len() >= 3);
            // Members follow vertex order without duplicates
            assert!(members.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn test_labels_stay_in_component() {
        // Without a bridge no label can cross between the cliques.
        let network = two_cliques(5, false);
        for partition_count in [1, 2, 4] {
            let communities = concurrent_slpa(&network, &config(15, partition_count, 3000)).unwrap();
            for (label, members) in &communities {
                let home = *label / 5;
                assert!(members.iter().all(|vertex| *vertex as usize / 5 == home));
            }
        }
    }

    #[test]
    fn test_deterministic_single_partition() {
        let network = two_cliques(6, true);
        let first = concurrent_slpa(&network, &config(20, 1, 99)).unwrap();
        let second = concurrent_slpa(&network, &config(20, 1, 99)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_every_vertex_listens_once_per_iteration() {
        let mut network = path_network(9);
        network.add_vertex(100);
        let vertex_index = VertexIndex::build(&network);
        let plan = PartitionPlan::build(&vertex_index, 3);
        let iterations = 7;
        let label_store = propagate_labels(&vertex_index, &plan, &config(iterations, 3, 5)).unwrap();

        for position in 0..vertex_index.len() {
            let expected = if vertex_index.neighbors(position).is_empty() { 1 } else { 1 + iterations as u64 };
            assert_eq!(label_store.total_observations(position), expected, "position {}", position);
        }
    }

    #[test]
    fn test_zero_iterations_keeps_seed_labels() {
        let network = path_network(4);
        let slpa_config = SLPAConfig {
            min_community_size: 1,
            ..config(0, 2, 1)
        };
        let communities = concurrent_slpa(&network, &slpa_config).unwrap();
        assert_eq!(communities.len(), 4);
        for (label, members) in communities {
            assert_eq!(members, vec![label as u32]);
        }
    }

    #[test]
    fn test_partition_count_clamped() {
        let network = path_network(3);
        let communities = concurrent_slpa(&network, &config(10, 64, 8)).unwrap();
        for members in communities.values() {
            assert!(members.len() >= 2);
        }
    }

    #[test]
    fn test_empty_graph() {
        let network = Network::<u32>::new(false);
        assert!(concurrent_slpa(&network, &config(10, 4, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_threshold() {
        let network = path_network(3);
        for threshold in [-0.1, 1.5, f64::NAN] {
            let slpa_config = SLPAConfig { threshold, ..config(5, 1, 1) };
            assert!(matches!(
                concurrent_slpa(&network, &slpa_config),
                Err(AlgorithmError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_controller() {
        let controller = SLPAController::new(Arc::new(two_cliques(4, true)));
        let communities = controller.detect(&config(10, 2, 4)).unwrap();
        let covered = communities.values().flatten().copied().collect::<BTreeSet<u32>>();
        assert!(covered.iter().all(|vertex| *vertex < 8));
    }

    #[test]
    fn test_coordinator_bounded_staleness() {
        // Path of 6 in 3 partitions: 0 <-> 1 <-> 2
        let network = path_network(6);
        let vertex_index = VertexIndex::build(&network);
        let plan = PartitionPlan::build(&vertex_index, 3);
        let (mut coordinator, permissions) = coordinator_for(&plan);

        // Everyone starts at 0, so entering 1 is fine.
        coordinator.handle(WorkerMessage::Progress { partition_id: 0, iteration: 1 }).unwrap();
        assert!(granted(&permissions[0]));

        // Entering 2 while partition 1 is still at 0 would exceed the bound.
        coordinator.handle(WorkerMessage::Progress { partition_id: 0, iteration: 2 }).unwrap();
        assert!(!granted(&permissions[0]));
        assert!(coordinator.is_pending(0));

        // Partition 1 advancing releases it, and then the waiting dependent.
        coordinator.handle(WorkerMessage::Progress { partition_id: 1, iteration: 1 }).unwrap();
        assert!(granted(&permissions[1]));
        assert!(granted(&permissions[0]));
        assert!(!coordinator.is_pending(0));
        assert_eq!(coordinator.iteration_state(0), IterationState::Running(2));

        // Partition 2 does not depend on 0 and is within one of partition 1.
        coordinator.handle(WorkerMessage::Progress { partition_id: 2, iteration: 1 }).unwrap();
        assert!(granted(&permissions[2]));
    }

    #[test]
    fn test_coordinator_finished_dependency_is_ready() {
        let network = path_network(4);
        let vertex_index = VertexIndex::build(&network);
        let plan = PartitionPlan::build(&vertex_index, 2);
        let (mut coordinator, permissions) = coordinator_for(&plan);

        coordinator.handle(WorkerMessage::Progress { partition_id: 0, iteration: 1 }).unwrap();
        assert!(granted(&permissions[0]));
        coordinator.handle(WorkerMessage::Progress { partition_id: 0, iteration: 2 }).unwrap();
        assert!(!granted(&permissions[0]));

        // Partition 1 finishing leaves 0 alone and unblocks it.
        coordinator.handle(WorkerMessage::Finished { partition_id: 1 }).unwrap();
        assert_eq!(coordinator.active_count(), 1);
        assert!(granted(&permissions[0]));
        assert!(!granted(&permissions[1]));

        // A lone partition is never held back.
        coordinator.handle(WorkerMessage::Progress { partition_id: 0, iteration: 3 }).unwrap();
        assert!(granted(&permissions[0]));
        coordinator.handle(WorkerMessage::Finished { partition_id: 0 }).unwrap();
        assert_eq!(coordinator.active_count(), 0);
    }

    #[test]
    fn test_coordinator_reports_failed_worker() {
        let network = path_network(4);
        let vertex_index = VertexIndex::build(&network);
        let plan = PartitionPlan::build(&vertex_index, 2);
        let (mut coordinator, _permissions) = coordinator_for(&plan);

        let result = coordinator.handle(WorkerMessage::Failed { partition_id: 1 });
        assert!(matches!(result, Err(AlgorithmError::WorkerDisconnected(1))));
    }

    #[test]
    fn test_coordinator_rejects_unknown_partition() {
        let network = path_network(4);
        let vertex_index = VertexIndex::build(&network);
        let plan = PartitionPlan::build(&vertex_index, 2);
        let (mut coordinator, _permissions) = coordinator_for(&plan);

        let result = coordinator.handle(WorkerMessage::Finished { partition_id: 9 });
        assert!(matches!(result, Err(AlgorithmError::InvariantViolation(_))));
    }
}
