//! The substrate abstraction and the handle partitions hold.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use common_config::TesseraConfig;
use common_error::TesseraResult;

use crate::local::LocalCluster;
use crate::metrics::ClusterMetrics;
use crate::object::{downcast, payload, NodeId, ObjectRef, Payload, RawRef};
use crate::registry::FunctionRegistry;
use crate::task::RemoteTask;

/// An object store plus a task executor.
///
/// Only `get`, `wait` and `gather` may block. Failures recorded in objects
/// come back wrapped as `RemoteExecution`.
pub trait Substrate: Send + Sync + fmt::Debug {
    /// A fresh, pending object to be filled by a task.
    fn allocate(&self) -> RawRef;

    /// Store a value and return a ready reference to it.
    fn put(&self, value: Payload) -> RawRef;

    /// Schedule `task`; its results are published into `outputs` in order.
    fn submit(&self, task: RemoteTask, outputs: Vec<RawRef>);

    /// Block until the object is available.
    fn get(&self, object: &RawRef) -> TesseraResult<Payload>;

    /// Block until all objects are available, ignoring failures.
    fn wait(&self, objects: &[RawRef]);

    /// Resolve several objects, in order.
    fn gather(&self, objects: &[RawRef]) -> TesseraResult<Vec<Payload>> {
        objects.iter().map(|object| self.get(object)).collect()
    }

    /// Node holding the object, if the substrate knows it yet. Failed objects
    /// have no location.
    fn locate(&self, object: &RawRef) -> Option<NodeId>;

    fn nodes(&self) -> &[NodeId];

    fn registry(&self) -> &FunctionRegistry;

    fn metrics(&self) -> &ClusterMetrics;

    fn config(&self) -> &TesseraConfig;
}

/// Cloneable handle to a substrate.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<dyn Substrate>,
}

impl Cluster {
    #[must_use]
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        Self { inner: substrate }
    }

    /// Start an in-process cluster.
    pub fn local(config: TesseraConfig) -> TesseraResult<Self> {
        Ok(Self::new(Arc::new(LocalCluster::new(config)?)))
    }

    #[must_use]
    pub fn substrate(&self) -> &dyn Substrate {
        self.inner.as_ref()
    }

    /// Store a value.
    #[must_use]
    pub fn put<T: Any + Send + Sync>(&self, value: T) -> ObjectRef<T> {
        self.inner.put(payload(value)).typed()
    }

    /// Schedule a task with `N` outputs.
    #[must_use]
    pub fn submit<const N: usize>(&self, task: RemoteTask) -> [RawRef; N] {
        let outputs: [RawRef; N] = std::array::from_fn(|_| self.inner.allocate());
        self.inner.submit(task, outputs.to_vec());
        outputs
    }

    /// Block until the value is available.
    pub fn get<T: Any + Send + Sync>(&self, object: &ObjectRef<T>) -> TesseraResult<Arc<T>> {
        downcast(self.inner.get(object.raw())?)
    }

    /// Resolve several objects of one type, in order.
    pub fn gather<T: Any + Send + Sync>(
        &self,
        objects: &[ObjectRef<T>],
    ) -> TesseraResult<Vec<Arc<T>>> {
        let raw: Vec<RawRef> = objects.iter().map(|o| o.raw().clone()).collect();
        self.inner
            .gather(&raw)?
            .into_iter()
            .map(downcast)
            .collect()
    }

    /// Block until all objects are available.
    pub fn wait<'a, T: 'a>(&self, objects: impl IntoIterator<Item = &'a ObjectRef<T>>) {
        let raw: Vec<RawRef> = objects.into_iter().map(|o| o.raw().clone()).collect();
        self.inner.wait(&raw);
    }

    #[must_use]
    pub fn locate<T>(&self, object: &ObjectRef<T>) -> Option<NodeId> {
        self.inner.locate(object.raw())
    }

    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        self.inner.nodes()
    }

    #[must_use]
    pub fn registry(&self) -> &FunctionRegistry {
        self.inner.registry()
    }

    #[must_use]
    pub fn metrics(&self) -> &ClusterMetrics {
        self.inner.metrics()
    }

    #[must_use]
    pub fn config(&self) -> &TesseraConfig {
        self.inner.config()
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cluster").field(&self.inner).finish()
    }
}
