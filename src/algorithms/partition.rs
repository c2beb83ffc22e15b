use std::collections::BTreeSet;
use std::ops::Range;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::AlgorithmError;
use crate::types::graph_query::GraphQuery;
use crate::types::vertex_id::VertexId;

/// Ordinal id of a partition, `0..partition_count`.
pub type PartitionId = usize;

/// Position-indexed snapshot of a graph.
///
/// Vertices are numbered by their position in the graph's ordered vertex list,
/// and every neighbor map is resolved to a sorted list of positions once, so
/// the workers never hash vertex ids while propagating labels.
#[derive(Debug)]
pub struct VertexIndex<V> {
    /// Vertex ids in `vertex_list` order
    vertices: Vec<V>,

    /// Reverse lookup: vertex id -> position
    positions: FxHashMap<V, usize>,

    /// For each position, the positions of its neighbors in ascending order
    adjacency: Vec<Vec<usize>>,
}

impl<V> VertexIndex<V>
where
    V: VertexId
{
    /// Resolves the graph's ordered vertex list and neighbor maps into positions.
    ///
    /// Neighbors that are not members of the vertex list are ignored.
    pub fn build<G>(graph: &G) -> Self
    where
        G: GraphQuery<V> + ?Sized
    {
        let vertices = graph.vertex_list();
        let positions = vertices
            .iter()
            .enumerate()
            .map(|(position, vertex_id)| (vertex_id.clone(), position))
            .collect::<FxHashMap<_, _>>();

        let adjacency = vertices
            .iter()
            .map(|vertex_id| {
                let mut neighbor_positions = graph
                    .neighbors(vertex_id)
                    .keys()
                    .filter_map(|neighbor| positions.get(neighbor).copied())
                    .collect::<Vec<_>>();
                neighbor_positions.sort_unstable();
                neighbor_positions
            })
            .collect::<Vec<_>>();

        Self {
            vertices,
            positions,
            adjacency,
        }
    }

    /// Number of indexed vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex id at a position.
    pub fn vertex(&self, position: usize) -> &V {
        &self.vertices[position]
    }

    /// Position of a vertex id, if indexed.
    pub fn position(&self, vertex_id: &V) -> Option<usize> {
        self.positions.get(vertex_id).copied()
    }

    /// Neighbor positions of the vertex at `position`.
    pub fn neighbors(&self, position: usize) -> &[usize] {
        &self.adjacency[position]
    }
}

/// Whether a vertex's neighborhood crosses its partition boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexScope {
    /// All neighbors live in the same partition.
    Internal,
    /// At least one neighbor lives in another partition.
    External,
}

/// One contiguous slice of the ordered vertex list, owned by a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub id: PartitionId,

    /// Positions covered by this partition
    pub range: Range<usize>,

    /// Positions whose neighbors all live in this partition
    pub internals: Vec<usize>,

    /// Positions with at least one neighbor in another partition
    pub externals: Vec<usize>,
}

impl Partition {
    /// Classifies a member position; `None` if the position is not in this partition.
    pub fn scope_of(&self, position: usize) -> Option<VertexScope> {
        if !self.range.contains(&position) {
            None
        } else if self.externals.binary_search(&position).is_ok() {
            Some(VertexScope::External)
        } else {
            Some(VertexScope::Internal)
        }
    }
}

/// The partitioning of a graph together with its inter-partition dependency graph.
///
/// Built once, sequentially, before any worker starts, and read-only afterwards.
///
/// # Invariants
/// - Partitions are pairwise disjoint and their union is `0..vertex_count`.
/// - `dependency_of` is the exact inverse of `depends_on`.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    partitions: Vec<Partition>,

    /// `depends_on[p]`: partitions owning a neighbor of an external vertex of `p`
    depends_on: Vec<BTreeSet<PartitionId>>,

    /// `dependency_of[p]`: partitions that depend on `p`
    dependency_of: Vec<BTreeSet<PartitionId>>,

    /// Nominal partition width; the last partition absorbs the remainder
    part_size: usize,
}

impl PartitionPlan {
    /// Splits the indexed vertices into contiguous partitions and derives dependencies.
    ///
    /// # Algorithm
    ///
    /// 1. Clamp the requested count to `1..=vertex_count` and split positions into
    ///    ranges of width `vertex_count / count`; the last range takes the remainder.
    /// 2. For every vertex, look at each neighbor once. A neighbor in another
    ///    partition marks the vertex External and records the dependency edge in
    ///    both directions (set semantics).
    ///
    /// An empty index yields an empty plan.
    pub fn build<V>(index: &VertexIndex<V>, requested_count: usize) -> Self
    where
        V: VertexId
    {
        let vertex_count = index.len();
        if vertex_count == 0 {
            return Self {
                partitions: Vec::new(),
                depends_on: Vec::new(),
                dependency_of: Vec::new(),
                part_size: 0,
            };
        }

        // Step 1. Cut the ordered vertex list into contiguous ranges.
        let partition_count = requested_count.clamp(1, vertex_count);
        let part_size = vertex_count / partition_count;
        let mut partitions = (0..partition_count)
            .map(|id| {
                let low = id * part_size;
                let high = if id + 1 == partition_count { vertex_count } else { low + part_size };
                Partition {
                    id,
                    range: low..high,
                    internals: Vec::new(),
                    externals: Vec::new(),
                }
            })
            .collect::<Vec<_>>();

        let mut plan = Self {
            partitions: Vec::new(),
            depends_on: vec![BTreeSet::new(); partition_count],
            dependency_of: vec![BTreeSet::new(); partition_count],
            part_size,
        };

        // Step 2. Classify vertices and record dependency edges.
        for partition in partitions.iter_mut() {
            for position in partition.range.clone() {
                let mut is_external = false;
                for &neighbor in index.neighbors(position) {
                    let owner = plan.partition_of(neighbor);
                    if owner != partition.id {
                        is_external = true;
                        plan.depends_on[partition.id].insert(owner);
                        plan.dependency_of[owner].insert(partition.id);
                    }
                }
                if is_external {
                    partition.externals.push(position);
                } else {
                    partition.internals.push(position);
                }
            }
        }
        plan.partitions = partitions;

        debug!(
            partitions = partition_count,
            part_size,
            "partition plan built: depends_on={:?}",
            plan.depends_on
        );
        plan
    }

    /// Owning partition of a vertex position.
    pub fn partition_of(&self, position: usize) -> PartitionId {
        let count = self.depends_on.len();
        if self.part_size == 0 || count == 0 {
            return 0;
        }
        (position / self.part_size).min(count - 1)
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Partitions that `partition_id` reads from across its boundary.
    pub fn depends_on(&self, partition_id: PartitionId) -> &BTreeSet<PartitionId> {
        &self.depends_on[partition_id]
    }

    /// Partitions that read from `partition_id` across their boundary.
    pub fn dependency_of(&self, partition_id: PartitionId) -> &BTreeSet<PartitionId> {
        &self.dependency_of[partition_id]
    }

    /// Checks the structural invariants of the plan.
    ///
    /// # Errors
    /// * `AlgorithmError::InvariantViolation` describing the first broken invariant
    pub fn validate(&self, vertex_count: usize) -> Result<(), AlgorithmError> {
        let mut next_position = 0usize;
        for (expected_id, partition) in self.partitions.iter().enumerate() {
            if partition.id != expected_id {
                return Err(AlgorithmError::InvariantViolation(format!(
                    "partition at slot {} carries id {}", expected_id, partition.id
                )));
            }
            if partition.range.start != next_position || partition.range.is_empty() {
                return Err(AlgorithmError::InvariantViolation(format!(
                    "partition {} covers {:?}, expected to start at {}", partition.id, partition.range, next_position
                )));
            }
            if partition.internals.len() + partition.externals.len() != partition.range.len() {
                return Err(AlgorithmError::InvariantViolation(format!(
                    "partition {} classifies {} of {} vertices",
                    partition.id,
                    partition.internals.len() + partition.externals.len(),
                    partition.range.len()
                )));
            }
            next_position = partition.range.end;
        }
        if next_position != vertex_count {
            return Err(AlgorithmError::InvariantViolation(format!(
                "partitions cover {} of {} vertices", next_position, vertex_count
            )));
        }

        for (partition_id, dependencies) in self.depends_on.iter().enumerate() {
            for &dependency in dependencies {
                if !self.dependency_of[dependency].contains(&partition_id) {
                    return Err(AlgorithmError::InvariantViolation(format!(
                        "{} depends on {} but is missing from its dependents", partition_id, dependency
                    )));
                }
            }
        }
        for (partition_id, dependents) in self.dependency_of.iter().enumerate() {
            for &dependent in dependents {
                if !self.depends_on[dependent].contains(&partition_id) {
                    return Err(AlgorithmError::InvariantViolation(format!(
                        "{} lists dependent {} that does not depend on it", partition_id, dependent
                    )));
                }
            }
        }
        Ok(())
    }
}
