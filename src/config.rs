use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::algorithms::bipartite::BipartiteConfig;
use crate::algorithms::slpa::SLPAConfig;
use crate::error::ConfigError;

/// Buffer size used when reading network files.
pub const READ_BUFFER_SIZE: usize = 4 * 1024 * 1024;

// --- SLPA defaults ---
pub const DEFAULT_ITERATIONS: usize = 20;
pub const DEFAULT_THRESHOLD: f64 = 0.3;
pub const DEFAULT_SEED: u64 = 3000;
pub const DEFAULT_PARTITION_COUNT: usize = 2;
pub const DEFAULT_MIN_COMMUNITY_SIZE: usize = 2;

/// How long the SLPA coordinator waits for a progress message before it
/// reports a possible stall.
pub const STALL_WARNING_INTERVAL: Duration = Duration::from_secs(5);

// --- Bipartite defaults ---
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Capacity of each color worker's private work channel.
pub const WORK_CHANNEL_CAPACITY: usize = 5;

/// Parameters for every task the binary can run, loadable from YAML.
///
/// Missing sections and fields fall back to the defaults above, so an empty
/// file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub slpa: SLPAConfig,
    pub bipartite: BipartiteConfig,
}

impl RunConfig {
    /// Parses a run configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads a run configuration from a YAML file.
    ///
    /// # Errors
    /// * `ConfigError::Io` if the file cannot be read
    /// * `ConfigError::Yaml` if the content does not match the schema
    pub fn from_yaml_file<P: AsRef<Path>>(file_path: P) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(file_path)?;
        Self::from_yaml_str(&yaml)
    }
}
