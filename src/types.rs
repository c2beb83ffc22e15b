use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::error::NetworkError;
use crate::types::graph_query::GraphQuery;
use crate::types::vertex_id::VertexId;

pub mod edge_list;
pub mod graph_query;
pub mod vertex_id;

/// An in-memory weighted network stored as a pair of adjacency maps.
///
/// Every vertex owns an entry in both `out_edges` and `in_edges`, even when it
/// has no incident edge. For undirected networks an edge is stored once, as an
/// out-edge of the vertex it was added from, and neighbor queries merge both
/// maps.
///
/// # Type Parameters
/// - `V`: Type for vertex IDs (e.g. `u32` or `String`)
#[derive(Debug, Clone)]
pub struct Network<V>
where
    V: VertexId
{
    /// Outgoing edges: source -> (target -> weight)
    out_edges: BTreeMap<V, FxHashMap<V, f32>>,

    /// Incoming edges: target -> (source -> weight)
    in_edges: BTreeMap<V, FxHashMap<V, f32>>,

    /// Whether edges are directed
    directed: bool,
}

impl<V> Network<V>
where
    V: VertexId
{
    /// Creates an empty network.
    pub fn new(directed: bool) -> Self {
        Self {
            out_edges: BTreeMap::new(),
            in_edges: BTreeMap::new(),
            directed,
        }
    }

    /// Adds a vertex if it is not already present.
    pub fn add_vertex(&mut self, vertex_id: V) {
        self.in_edges.entry(vertex_id.clone()).or_default();
        self.out_edges.entry(vertex_id).or_default();
    }

    /// Removes a vertex and every edge touching it.
    pub fn remove_vertex(&mut self, vertex_id: &V) {
        if let Some(targets) = self.out_edges.remove(vertex_id) {
            for target in targets.keys() {
                if let Some(sources) = self.in_edges.get_mut(target) {
                    sources.remove(vertex_id);
                }
            }
        }
        if let Some(sources) = self.in_edges.remove(vertex_id) {
            for source in sources.keys() {
                if let Some(targets) = self.out_edges.get_mut(source) {
                    targets.remove(vertex_id);
                }
            }
        }
    }

    /// Adds a weighted edge, creating missing endpoints on the way.
    ///
    /// Adding an edge that already exists is a no-op (multi-edges are not
    /// modelled). For undirected networks the reverse pair counts as the same
    /// edge.
    ///
    /// # Errors
    /// * `NetworkError::SelfEdge` if `from == to`
    pub fn add_edge(&mut self, from: V, to: V, weight: f32) -> Result<(), NetworkError> {
        if from == to {
            return Err(NetworkError::SelfEdge(format!("{:?}", from)));
        }
        if self.has_edge(&from, &to) {
            return Ok(());
        }

        self.add_vertex(from.clone());
        self.add_vertex(to.clone());

        if let Some(targets) = self.out_edges.get_mut(&from) {
            targets.insert(to.clone(), weight);
        }
        if let Some(sources) = self.in_edges.get_mut(&to) {
            sources.insert(from, weight);
        }
        Ok(())
    }

    /// Removes the edge between two vertices if present.
    pub fn remove_edge(&mut self, from: &V, to: &V) {
        let removed = self.out_edges
            .get_mut(from)
            .and_then(|targets| targets.remove(to))
            .is_some();
        if removed {
            if let Some(sources) = self.in_edges.get_mut(to) {
                sources.remove(from);
            }
        } else if !self.directed {
            // Undirected edge stored in the other orientation.
            if let Some(targets) = self.out_edges.get_mut(to) {
                targets.remove(from);
            }
            if let Some(sources) = self.in_edges.get_mut(from) {
                sources.remove(to);
            }
        }
    }

    /// Returns the weight of an edge, or `0.0` if the edge does not exist.
    pub fn edge_weight(&self, from: &V, to: &V) -> f32 {
        if let Some(weight) = self.out_edges.get(from).and_then(|targets| targets.get(to)) {
            return *weight;
        }
        if !self.directed {
            if let Some(weight) = self.in_edges.get(from).and_then(|sources| sources.get(to)) {
                return *weight;
            }
        }
        0.0
    }

    /// Total number of incident edges (in plus out) of a vertex.
    pub fn degree(&self, vertex_id: &V) -> Result<usize, NetworkError> {
        Ok(self.out_degree(vertex_id)? + self.in_degree(vertex_id)?)
    }

    /// Number of outgoing edges of a vertex.
    pub fn out_degree(&self, vertex_id: &V) -> Result<usize, NetworkError> {
        self.out_edges
            .get(vertex_id)
            .map(|targets| targets.len())
            .ok_or_else(|| NetworkError::VertexNotFound(format!("{:?}", vertex_id)))
    }

    /// Number of incoming edges of a vertex.
    pub fn in_degree(&self, vertex_id: &V) -> Result<usize, NetworkError> {
        self.in_edges
            .get(vertex_id)
            .map(|sources| sources.len())
            .ok_or_else(|| NetworkError::VertexNotFound(format!("{:?}", vertex_id)))
    }

    /// Edge density; `0.0` for networks with fewer than two vertices.
    pub fn density(&self) -> f64 {
        let order = self.out_edges.len();
        if order < 2 {
            return 0.0;
        }
        let density = self.size() as f64 / (order * (order - 1)) as f64;
        if self.directed {
            density
        } else {
            2.0 * density
        }
    }

    /// Iterates over every stored edge as `(from, to, weight)` in source order.
    pub fn edges(&self) -> impl Iterator<Item = (&V, &V, f32)> + '_ {
        self.out_edges.iter().flat_map(|(from, targets)| {
            targets.iter().map(move |(to, weight)| (from, to, *weight))
        })
    }
}

impl<V> GraphQuery<V> for Network<V>
where
    V: VertexId
{
    fn order(&self) -> usize {
        self.out_edges.len()
    }

    fn size(&self) -> usize {
        self.out_edges.values().map(|targets| targets.len()).sum()
    }

    fn vertex_list(&self) -> Vec<V> {
        // BTreeMap keys come out sorted.
        self.out_edges.keys().cloned().collect()
    }

    fn neighbors(&self, vertex_id: &V) -> FxHashMap<V, f32> {
        let mut neighbors = self.out_edges
            .get(vertex_id)
            .cloned()
            .unwrap_or_default();
        if !self.directed {
            if let Some(sources) = self.in_edges.get(vertex_id) {
                for (source, weight) in sources {
                    neighbors.insert(source.clone(), *weight);
                }
            }
        }
        neighbors
    }

    fn predecessors(&self, vertex_id: &V) -> FxHashMap<V, f32> {
        self.in_edges
            .get(vertex_id)
            .cloned()
            .unwrap_or_default()
    }

    fn is_directed(&self) -> bool {
        self.directed
    }

    fn starting_vertex(&self, connected: bool) -> Option<V> {
        self.out_edges
            .iter()
            .find(|(_, targets)| !connected || !targets.is_empty())
            .map(|(vertex_id, _)| vertex_id.clone())
    }

    fn has_vertex(&self, vertex_id: &V) -> bool {
        self.out_edges.contains_key(vertex_id)
    }

    fn has_edge(&self, src_id: &V, dst_id: &V) -> bool {
        let forward = self.out_edges
            .get(src_id)
            .is_some_and(|targets| targets.contains_key(dst_id));
        if forward || self.directed {
            return forward;
        }
        self.in_edges
            .get(src_id)
            .is_some_and(|sources| sources.contains_key(dst_id))
    }
}
