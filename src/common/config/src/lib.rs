//! Configuration management for Tessera.
//!
//! Provides settings for the execution substrate and for partition behaviour.

use std::path::Path;

use serde::{Deserialize, Serialize};

use common_error::TesseraResult;

/// Global Tessera configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    /// Execution substrate configuration.
    pub cluster: ClusterConfig,
    /// Partition behaviour configuration.
    pub partition: PartitionConfig,
}

impl TesseraConfig {
    /// Parse a configuration from a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> TesseraResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> TesseraResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Replace the cluster configuration.
    #[must_use]
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    /// Replace the partition configuration.
    #[must_use]
    pub fn with_partition(mut self, partition: PartitionConfig) -> Self {
        self.partition = partition;
        self
    }
}

/// Execution substrate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of simulated nodes blocks are placed on.
    pub num_nodes: usize,
    /// Worker threads driving the runtime (`None` = one per core).
    pub worker_threads: Option<usize>,
    /// Upper bound on threads running block operations concurrently.
    pub max_blocking_threads: usize,
    /// Prefix for node identifiers (`{prefix}-{index}`).
    pub node_prefix: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            num_nodes: 4,
            worker_threads: None,
            max_blocking_threads: 64,
            node_prefix: "node".to_string(),
        }
    }
}

impl ClusterConfig {
    /// Set the number of nodes.
    #[must_use]
    pub fn with_nodes(mut self, num_nodes: usize) -> Self {
        self.num_nodes = num_nodes;
        self
    }

    /// Set the number of runtime worker threads.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Set the maximum number of concurrently running block operations.
    #[must_use]
    pub fn with_max_blocking_threads(mut self, threads: usize) -> Self {
        self.max_blocking_threads = threads;
        self
    }
}

/// How a partition learns which node holds its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LocationStrategy {
    /// Ask the substrate where the handle lives; fall back to an identity
    /// apply when the substrate does not know yet.
    #[default]
    Locate,
    /// Always run an identity apply and read the location it reports.
    IdentityApply,
}

/// Partition behaviour configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Strategy for resolving an unknown block location.
    pub location_strategy: LocationStrategy,
}
