//! Lazy, distributed partitions.
//!
//! A table is held as a grid of [`Partition`]s. Each partition is a handle to
//! a block living in the substrate plus a queue of operations not yet applied
//! to it, and caches of the block's length, width and location. Queuing work
//! is free; work is shipped when a partition is drained, applied or asked for
//! something that depends on its current contents.
//!
//! # Example
//!
//! ```ignore
//! let cluster = Cluster::local(TesseraConfig::default())?;
//! let part = Partition::put(&cluster, block);
//! let doubled = part.queue(double.clone(), Params::new()).queue(double, Params::new());
//! assert_eq!(doubled.length()?, part.length()?);
//! let result = doubled.materialize()?;
//! ```
//!
//! Failures raised by queued operations are not reported when the work is
//! shipped; they come back as `RemoteExecution` errors from whichever call
//! first needs the result.

mod call_queue;
mod dispatch;
mod grid;
mod partition;

pub use call_queue::{CallQueue, DeferredFn, DeferredOp, DeferredParams};
pub use grid::PartitionGrid;
pub use partition::Partition;
