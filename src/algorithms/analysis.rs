use serde::Serialize;

use crate::types::graph_query::GraphQuery;
use crate::types::vertex_id::VertexId;

/// Basic statistics of a network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSummary {
    pub order: usize,
    pub size: usize,
    pub directed: bool,
    pub density: f64,
    pub isolated_vertices: usize,
}

/// Summarizes a network: vertex and edge counts, density and isolated vertices.
///
/// Density is `size / (order * (order - 1))` for directed graphs and twice that
/// for undirected ones; graphs with fewer than two vertices have density 0.
///
/// # Arguments
///
/// * `graph` - The graph to summarize
///
/// # Returns
///
/// * `NetworkSummary` - The collected statistics
pub fn summarize<V, G>(graph: &G) -> NetworkSummary
where
    V: VertexId,
    G: GraphQuery<V> + ?Sized
{
    let order = graph.order();
    let size = graph.size();
    let directed = graph.is_directed();

    let density = if order < 2 {
        0.0
    } else {
        let possible = (order * (order - 1)) as f64;
        let edges = if directed { size as f64 } else { 2.0 * size as f64 };
        edges / possible
    };

    let isolated_vertices = graph
        .vertex_list()
        .iter()
        .filter(|vertex_id| graph.neighbors(vertex_id).is_empty() && graph.predecessors(vertex_id).is_empty())
        .count();

    NetworkSummary {
        order,
        size,
        directed,
        density,
        isolated_vertices,
    }
}

#[cfg(test)]
mod test_analysis {
    use super::*;
    use crate::types::Network;

    #[test]
    fn test_summarize_undirected() {
        let mut network = Network::new(false);
        network.add_edge(1u32, 2, 1.0).unwrap();
        network.add_edge(2, 3, 1.0).unwrap();
        network.add_vertex(4);

        let summary = summarize(&network);
        assert_eq!(summary.order, 4);
        assert_eq!(summary.size, 2);
        assert!(!summary.directed);
        assert_eq!(summary.isolated_vertices, 1);
        assert!((summary.density - 4.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_summarize_directed_and_tiny() {
        let mut network = Network::new(true);
        network.add_edge(1u32, 2, 1.0).unwrap();
        let summary = summarize(&network);
        assert_eq!(summary.isolated_vertices, 0);
        assert!((summary.density - 0.5).abs() < 1e-12);

        let empty = summarize(&Network::<u32>::new(true));
        assert_eq!(empty.order, 0);
        assert_eq!(empty.density, 0.0);
    }
}
