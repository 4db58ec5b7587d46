//! Execution substrate for Tessera.
//!
//! Blocks and their metadata live in the substrate as objects addressed by
//! [`ObjectRef`]s. Work is shipped to the substrate as [`RemoteTask`]s that
//! name the objects they depend on; the substrate resolves those, runs the
//! task on some node and publishes its outputs as new objects. Nothing here
//! blocks except the explicit resolution calls (`get`, `wait`, `gather`).
//!
//! ```text
//!  driver                         substrate
//!  ──────                         ─────────
//!  put(block) ───────────────────▶ object #1 (ready, node-0)
//!  submit(task, deps=[#1]) ──────▶ object #2..#5 (pending)
//!                                   └─ resolve #1 → run on node-k → publish
//!  get(#2) ◀───────────────────── block (or the task's failure)
//! ```
//!
//! [`Cluster`] is the cheap, cloneable handle passed explicitly to every
//! partition; [`LocalCluster`] is the in-process implementation.

mod local;
mod metrics;
mod object;
mod registry;
mod substrate;
mod task;

pub use local::LocalCluster;
pub use metrics::{ClusterMetrics, MetricsSnapshot, TaskMetrics};
pub use object::{
    downcast, payload, NodeId, ObjectCell, ObjectId, ObjectRef, Payload, RawRef, RemoteResult,
};
pub use registry::{FunctionRegistry, SerializedFn};
pub use substrate::{Cluster, Substrate};
pub use task::{RemoteTask, TaskContext};
