use std::fmt::Debug;
use std::hash::Hash;

/// A trait for types that can be used as vertex identifiers in a network.
///
/// Vertex identifiers are opaque to the algorithms: they only need to be
/// cloned, compared, hashed and shared between worker threads. Ordering is
/// required so the network can hand out a deterministic vertex list.
pub trait VertexId: Clone + Ord + Eq + Hash + Debug + Send + Sync + 'static {}

/// Blanket implementation for all types that satisfy the VertexId trait bounds.
impl<T> VertexId for T where T: Clone + Ord + Eq + Hash + Debug + Send + Sync + 'static {}
