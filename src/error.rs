use thiserror::Error;

/// Errors raised while building, querying or loading a `Network`.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The graph model does not allow an edge from a vertex to itself.
    #[error("self-edges are not permitted (vertex {0})")]
    SelfEdge(String),

    /// The queried vertex is not a member of the network.
    #[error("vertex {0} is not a member of the network")]
    VertexNotFound(String),

    /// A record in an edge-list file carries an empty vertex name.
    #[error("line {line}: empty vertex field")]
    EmptyField { line: usize },

    #[error("network file io failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the concurrent algorithms.
///
/// A graph that turns out not to be bipartite is *not* an error; it is reported
/// through the normal return value.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A worker hung up before the coordinator finished (usually a worker panic).
    #[error("worker {0} disconnected before the run completed")]
    WorkerDisconnected(usize),

    /// Partition tables are inconsistent; unreachable with a correct partitioner.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

/// Errors raised while loading a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed yaml config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
