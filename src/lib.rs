//! Tessera - lazy, distributed block partitions for tabular dataframes
//!
//! A table is a grid of blocks scattered over a cluster. Tessera keeps a
//! handle per block, queues transformations on it without running them, and
//! ships them to the block only when a result is needed.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use tessera_block as block;
pub use tessera_cluster as cluster;
pub use tessera_partition as partition;

pub use common_config::TesseraConfig;
pub use common_error::{TesseraError, TesseraResult};
pub use tessera_cluster::Cluster;
pub use tessera_partition::{DeferredFn, Partition, PartitionGrid};

/// Tessera version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
