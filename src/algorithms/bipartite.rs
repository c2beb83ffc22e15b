use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DEFAULT_WORKER_COUNT, WORK_CHANNEL_CAPACITY};
use crate::error::AlgorithmError;
use crate::types::graph_query::GraphQuery;
use crate::types::vertex_id::VertexId;

/// Configuration for the concurrent bipartite check.
///
/// # Fields
/// * `worker_count` - Number of color workers (K); must be positive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BipartiteConfig {
    pub worker_count: usize,
}

impl Default for BipartiteConfig {
    fn default() -> Self {
        Self { worker_count: DEFAULT_WORKER_COUNT }
    }
}

/// Side of the bipartition a vertex is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Blue,
}

impl Color {
    pub fn complement(self) -> Self {
        match self {
            Color::Red => Color::Blue,
            Color::Blue => Color::Red,
        }
    }
}

/// A colored vertex whose neighbors still have to be proposed.
#[derive(Debug, Clone)]
struct WorkItem<V> {
    vertex: V,
    color: Color,
}

/// `(vertex, proposed color)` pairs produced by a worker for one work item.
type ProposalBatch<V> = Vec<(V, Color)>;

/// Outcome of a bipartite check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Bipartition<V> {
    /// Every edge joins a red and a blue vertex. Both sides are sorted.
    Bipartite { red: Vec<V>, blue: Vec<V> },
    /// Two proposals disagreed on the color of a vertex.
    NotBipartite,
    /// No vertex has an outgoing edge to start the traversal from.
    NoStartVertex,
}

impl<V> Bipartition<V> {
    pub fn is_bipartite(&self) -> bool {
        matches!(self, Bipartition::Bipartite { .. })
    }

    /// Flattens into `(is_bipartite, red, blue)`; both sets are `None` on failure.
    pub fn into_parts(self) -> (bool, Option<Vec<V>>, Option<Vec<V>>) {
        match self {
            Bipartition::Bipartite { red, blue } => (true, Some(red), Some(blue)),
            Bipartition::NotBipartite | Bipartition::NoStartVertex => (false, None, None),
        }
    }
}

/// Receives work items and answers with the complement color for every neighbor.
///
/// For directed graphs predecessors are proposed too, so vertices that are only
/// reachable against edge direction still get colored.
///
/// Exits when its work channel closes or the coordinator stops listening.
fn color_worker<V, G>(graph: &G, work: Receiver<WorkItem<V>>, results: Sender<ProposalBatch<V>>)
where
    V: VertexId,
    G: GraphQuery<V> + ?Sized
{
    for item in work.iter() {
        let proposed = item.color.complement();
        let mut batch = graph
            .neighbors(&item.vertex)
            .into_keys()
            .map(|neighbor| (neighbor, proposed))
            .collect::<ProposalBatch<V>>();
        if graph.is_directed() {
            batch.extend(graph.predecessors(&item.vertex).into_keys().map(|source| (source, proposed)));
        }
        if results.send(batch).is_err() {
            return;
        }
    }
}

/// Single owner of the color map and the frontier.
struct ColorCoordinator<V> {
    colors: FxHashMap<V, Color>,
    red: Vec<V>,
    blue: Vec<V>,
    frontier: VecDeque<WorkItem<V>>,
    vertex_list: Vec<V>,
    /// Next position in `vertex_list` to look at when reseeding
    reseed_cursor: usize,
    outstanding: usize,
    next_worker: usize,
}

impl<V> ColorCoordinator<V>
where
    V: VertexId
{
    fn new(vertex_list: Vec<V>, start: V) -> Self {
        let mut coordinator = Self {
            colors: FxHashMap::default(),
            red: Vec::new(),
            blue: Vec::new(),
            frontier: VecDeque::new(),
            vertex_list,
            reseed_cursor: 0,
            outstanding: 0,
            next_worker: 0,
        };
        coordinator.assign(start, Color::Red);
        coordinator
    }

    /// Records a first color for a vertex and queues it for expansion.
    fn assign(&mut self, vertex: V, color: Color) {
        self.colors.insert(vertex.clone(), color);
        match color {
            Color::Red => self.red.push(vertex.clone()),
            Color::Blue => self.blue.push(vertex.clone()),
        }
        self.frontier.push_back(WorkItem { vertex, color });
    }

    /// Hands queued items to workers in round-robin order without blocking.
    ///
    /// Stops early once every worker's channel is full; the rest stays queued.
    fn dispatch(&mut self, work_senders: &[Sender<WorkItem<V>>]) -> Result<(), AlgorithmError> {
        let mut full_workers = 0;
        while let Some(item) = self.frontier.pop_front() {
            let worker_id = self.next_worker;
            self.next_worker = (self.next_worker + 1) % work_senders.len();
            match work_senders[worker_id].try_send(item) {
                Ok(()) => {
                    self.outstanding += 1;
                    full_workers = 0;
                }
                Err(TrySendError::Full(item)) => {
                    self.frontier.push_front(item);
                    full_workers += 1;
                    if full_workers == work_senders.len() {
                        break;
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(AlgorithmError::WorkerDisconnected(worker_id));
                }
            }
        }
        Ok(())
    }

    /// Seeds the next uncolored vertex as red; `false` if every vertex is colored.
    fn reseed(&mut self) -> bool {
        while self.reseed_cursor < self.vertex_list.len() {
            let candidate = self.vertex_list[self.reseed_cursor].clone();
            self.reseed_cursor += 1;
            if !self.colors.contains_key(&candidate) {
                debug!(vertex = ?candidate, "frontier drained, seeding next component");
                self.assign(candidate, Color::Red);
                return true;
            }
        }
        false
    }

    /// Applies a proposal batch; `false` on the first conflicting proposal.
    fn accept(&mut self, batch: ProposalBatch<V>) -> bool {
        for (vertex, color) in batch {
            match self.colors.get(&vertex) {
                None => self.assign(vertex, color),
                Some(existing) if *existing != color => {
                    debug!(vertex = ?vertex, ?existing, proposed = ?color, "conflicting color proposal");
                    return false;
                }
                Some(_) => {}
            }
        }
        true
    }

    /// Drives the traversal to convergence or the first conflict.
    ///
    /// Takes ownership of both channel ends so that returning, for any reason,
    /// closes them and lets every worker exit.
    fn run(
        mut self,
        work_senders: Vec<Sender<WorkItem<V>>>,
        results: Receiver<ProposalBatch<V>>,
    ) -> Result<Bipartition<V>, AlgorithmError> {
        loop {
            self.dispatch(&work_senders)?;

            if self.outstanding == 0 && self.frontier.is_empty() {
                // Every edge of the colored components has been checked.
                if self.reseed() {
                    continue;
                }
                break;
            }
            if self.outstanding == 0 {
                continue;
            }

            let batch = results
                .recv()
                .map_err(|_| AlgorithmError::WorkerDisconnected(self.next_worker))?;
            self.outstanding -= 1;
            if !self.accept(batch) {
                return Ok(Bipartition::NotBipartite);
            }
        }

        let mut red = self.red;
        let mut blue = self.blue;
        red.sort_unstable();
        blue.sort_unstable();
        Ok(Bipartition::Bipartite { red, blue })
    }
}

/// Concurrent BFS-style two-coloring of `graph` with `worker_count` color workers.
///
/// # Algorithm
///
/// 1. Color the first vertex with an outgoing edge red and queue it.
/// 2. The coordinator hands queued vertices to workers round-robin; each worker
///    proposes the complement color for every neighbor.
/// 3. The coordinator colors unseen vertices and queues them. A proposal that
///    disagrees with a recorded color aborts the run.
/// 4. When the queue drains with vertices still uncolored, the next uncolored
///    vertex in vertex-list order is colored red and the traversal continues.
///
/// # Returns
/// * `Bipartition::Bipartite` with sorted red and blue sides
/// * `Bipartition::NotBipartite` on the first conflict
/// * `Bipartition::NoStartVertex` if no vertex has an outgoing edge
///
/// # Errors
/// * `AlgorithmError::InvalidArgument` if `worker_count` is zero
/// * `AlgorithmError::ThreadPool` if the worker pool cannot be created
/// * `AlgorithmError::WorkerDisconnected` if a worker dies mid-run
pub fn concurrent_bipartite<V, G>(graph: &G, worker_count: usize) -> Result<Bipartition<V>, AlgorithmError>
where
    V: VertexId,
    G: GraphQuery<V> + ?Sized
{
    if worker_count == 0 {
        return Err(AlgorithmError::InvalidArgument("worker count must be positive".to_string()));
    }

    // Step 1. Seed the frontier.
    let start = match graph.starting_vertex(true) {
        Some(start) => start,
        None => {
            info!("no vertex with an outgoing edge, bipartite check skipped");
            return Ok(Bipartition::NoStartVertex);
        }
    };
    info!(order = graph.order(), workers = worker_count, start = ?start, "starting concurrent bipartite check");
    let coordinator = ColorCoordinator::new(graph.vertex_list(), start);

    // Step 2 and 3. Workers propose, the coordinator decides.
    // A worker blocks on `results` only while the coordinator still reads it.
    let (result_sender, result_receiver) = bounded::<ProposalBatch<V>>(worker_count * WORK_CHANNEL_CAPACITY);
    let (work_senders, work_receivers): (Vec<_>, Vec<_>) =
        (0..worker_count).map(|_| bounded::<WorkItem<V>>(WORK_CHANNEL_CAPACITY)).unzip();

    let pool = ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .thread_name(|worker_id| format!("color-worker-{}", worker_id))
        .build()?;

    let outcome = pool.in_place_scope(|scope| {
        for work in work_receivers {
            let results = result_sender.clone();
            scope.spawn(move |_| color_worker(graph, work, results));
        }
        drop(result_sender);
        coordinator.run(work_senders, result_receiver)
    })?;

    info!(bipartite = outcome.is_bipartite(), "concurrent bipartite check finished");
    Ok(outcome)
}

/// Controller for running the bipartite check on a shared graph.
pub struct BipartiteController<G> {
    graph: Arc<G>,
}

impl<G> BipartiteController<G> {
    /// Creates a new bipartite controller over the given graph.
    pub fn new(graph: Arc<G>) -> Self {
        Self { graph }
    }

    /// Runs the check with the given configuration.
    pub fn bipartition<V>(&self, config: &BipartiteConfig) -> Result<Bipartition<V>, AlgorithmError>
    where
        V: VertexId,
        G: GraphQuery<V>
    {
        concurrent_bipartite(self.graph.as_ref(), config.worker_count)
    }
}
