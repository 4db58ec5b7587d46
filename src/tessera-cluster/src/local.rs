//! In-process substrate on a Tokio runtime.
//!
//! Each task becomes an async job that waits for its dependencies and then
//! runs its body on the blocking pool. Nodes are simulated: a task lands on
//! the node of its first dependency when that is known, otherwise nodes are
//! assigned round-robin. Values stored with `put` live on the driver node.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::runtime::{Handle, Runtime};

use common_config::TesseraConfig;
use common_error::{TesseraError, TesseraResult};
use common_runtime::{block_on, build_runtime};

use crate::metrics::ClusterMetrics;
use crate::object::{NodeId, ObjectCell, ObjectId, Payload, RawRef};
use crate::registry::FunctionRegistry;
use crate::substrate::Substrate;
use crate::task::{RemoteTask, TaskContext};

#[derive(Debug)]
pub struct LocalCluster {
    config: TesseraConfig,
    nodes: Vec<NodeId>,
    runtime: Option<Runtime>,
    handle: Handle,
    next_object: AtomicU64,
    next_node: AtomicUsize,
    registry: FunctionRegistry,
    metrics: ClusterMetrics,
}

impl LocalCluster {
    pub fn new(config: TesseraConfig) -> TesseraResult<Self> {
        let cluster = &config.cluster;
        if cluster.num_nodes == 0 {
            return Err(TesseraError::invalid_parameter(
                "a cluster needs at least one node",
            ));
        }
        let nodes = (0..cluster.num_nodes)
            .map(|i| NodeId::new(format!("{}-{i}", cluster.node_prefix)))
            .collect();
        let runtime = build_runtime(cluster.worker_threads, cluster.max_blocking_threads)?;
        let handle = runtime.handle().clone();
        log::debug!(
            "started local cluster with {} nodes",
            cluster.num_nodes
        );
        Ok(Self {
            config,
            nodes,
            runtime: Some(runtime),
            handle,
            next_object: AtomicU64::new(0),
            next_node: AtomicUsize::new(0),
            registry: FunctionRegistry::new(),
            metrics: ClusterMetrics::new(),
        })
    }

    /// Node that receives `put` values.
    #[must_use]
    pub fn driver_node(&self) -> &NodeId {
        &self.nodes[0]
    }

    fn new_cell(&self) -> ObjectCell {
        ObjectCell::new(ObjectId::new(
            self.next_object.fetch_add(1, Ordering::Relaxed),
        ))
    }

    fn place(&self, deps: &[RawRef]) -> NodeId {
        if let Some(node) = deps.first().and_then(|dep| dep.cell().node()) {
            return node.clone();
        }
        let next = self.next_node.fetch_add(1, Ordering::Relaxed);
        self.nodes[next % self.nodes.len()].clone()
    }
}

impl Substrate for LocalCluster {
    fn allocate(&self) -> RawRef {
        RawRef::new(self.new_cell())
    }

    fn put(&self, value: Payload) -> RawRef {
        self.metrics.record_put();
        let object = RawRef::new(self.new_cell());
        object.cell().complete(Ok(value), self.driver_node().clone());
        object
    }

    fn submit(&self, task: RemoteTask, outputs: Vec<RawRef>) {
        self.metrics.record_submit();
        let node = self.place(task.deps());
        log::trace!(
            "submitting '{}' on {node} with {} deps",
            task.name(),
            task.deps().len()
        );
        let ctx = TaskContext::new(node.clone(), self.registry.clone(), self.metrics.clone());
        let blocking = self.handle.clone();

        self.handle.spawn(async move {
            let deps = task.deps().to_vec();
            let resolved = join_all(deps.iter().map(|dep| dep.cell().resolved())).await;
            let inputs: Result<Vec<Payload>, Arc<TesseraError>> = resolved.into_iter().collect();

            let result = match inputs {
                // A failed dependency fails every output with the same cause.
                Err(err) => Err(err),
                Ok(inputs) => {
                    let name = task.name().to_string();
                    let expected = outputs.len();
                    let job = blocking.spawn_blocking(move || {
                        let start = Instant::now();
                        let result = task.run(&ctx, inputs, expected);
                        ctx.metrics()
                            .record_completion(&name, start.elapsed(), result.is_ok());
                        if let Err(err) = &result {
                            log::debug!("task '{name}' failed on {}: {err}", ctx.node());
                        }
                        result
                    });
                    match job.await {
                        Ok(result) => result.map_err(Arc::new),
                        Err(join_err) => Err(Arc::new(TesseraError::internal(format!(
                            "task join failed: {join_err}"
                        )))),
                    }
                }
            };

            match result {
                Ok(values) => {
                    for (object, value) in outputs.iter().zip(values) {
                        object.cell().complete(Ok(value), node.clone());
                    }
                }
                Err(err) => {
                    for object in &outputs {
                        object.cell().complete(Err(Arc::clone(&err)), node.clone());
                    }
                }
            }
        });
    }

    fn get(&self, object: &RawRef) -> TesseraResult<Payload> {
        block_on(object.cell().resolved()).map_err(TesseraError::remote)
    }

    fn wait(&self, objects: &[RawRef]) {
        block_on(join_all(objects.iter().map(|o| o.cell().resolved())));
    }

    fn locate(&self, object: &RawRef) -> Option<NodeId> {
        object.cell().node().cloned()
    }

    fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    fn metrics(&self) -> &ClusterMetrics {
        &self.metrics
    }

    fn config(&self) -> &TesseraConfig {
        &self.config
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
