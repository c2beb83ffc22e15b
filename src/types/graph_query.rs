use rustc_hash::FxHashMap;

use crate::types::vertex_id::VertexId;

/// A trait that defines the read-only query surface the algorithms need from a graph.
///
/// The concurrent algorithms never mutate the graph; implementations must be
/// `Sync` so that a single instance can be shared by every worker thread.
///
/// # Type Parameters
///
/// * `V` - The vertex identifier type, which must implement the `VertexId` trait.
pub trait GraphQuery<V>: Sync
where
    V: VertexId
{
    /// Number of vertices in the graph.
    fn order(&self) -> usize;

    /// Number of edges in the graph.
    fn size(&self) -> usize;

    /// Returns every vertex of the graph in ascending order.
    ///
    /// The order must be deterministic: partitioning and label numbering are
    /// both derived from positions in this list.
    fn vertex_list(&self) -> Vec<V>;

    /// Retrieves the weighted neighbors of a vertex.
    ///
    /// For directed graphs these are the targets of outgoing edges. For
    /// undirected graphs both edge directions are merged.
    ///
    /// # Parameters
    ///
    /// * `vertex_id` - A reference to the identifier of the vertex whose neighbors are being queried.
    ///
    /// # Returns
    ///
    /// A map from neighbor to edge weight; empty if the vertex is unknown.
    fn neighbors(&self, vertex_id: &V) -> FxHashMap<V, f32>;

    /// Retrieves the weighted sources of edges ending at a vertex.
    fn predecessors(&self, vertex_id: &V) -> FxHashMap<V, f32>;

    /// Whether edges are directed.
    fn is_directed(&self) -> bool;

    /// Picks a vertex to start a traversal from.
    ///
    /// # Parameters
    ///
    /// * `connected` - When `true`, only a vertex with at least one outgoing edge qualifies.
    ///
    /// # Returns
    ///
    /// The first qualifying vertex in `vertex_list` order, or `None`.
    fn starting_vertex(&self, connected: bool) -> Option<V>;

    /// Checks if a specific vertex exists in the graph.
    fn has_vertex(&self, vertex_id: &V) -> bool;

    /// Determines if an edge exists between two specified vertices.
    fn has_edge(&self, src_id: &V, dst_id: &V) -> bool;
}
