//! Units of remote work.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use common_error::{TesseraError, TesseraResult};

use crate::metrics::ClusterMetrics;
use crate::object::{NodeId, ObjectRef, Payload, RawRef};
use crate::registry::FunctionRegistry;

type TaskBody = Box<dyn FnOnce(&TaskContext, Vec<Payload>) -> TesseraResult<Vec<Payload>> + Send>;

/// What a task body can see while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    node: NodeId,
    registry: FunctionRegistry,
    metrics: ClusterMetrics,
}

impl TaskContext {
    #[must_use]
    pub fn new(node: NodeId, registry: FunctionRegistry, metrics: ClusterMetrics) -> Self {
        Self {
            node,
            registry,
            metrics,
        }
    }

    /// Node the task runs on.
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    #[must_use]
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn metrics(&self) -> &ClusterMetrics {
        &self.metrics
    }
}

/// A closure shipped to the substrate together with the objects it reads.
///
/// The body receives the resolved dependencies in declaration order and must
/// return exactly as many payloads as the submitter asked for.
pub struct RemoteTask {
    name: String,
    deps: Vec<RawRef>,
    body: TaskBody,
}

impl RemoteTask {
    #[must_use]
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&TaskContext, Vec<Payload>) -> TesseraResult<Vec<Payload>> + Send + 'static,
    {
        Self {
            name: name.into(),
            deps: Vec::new(),
            body: Box::new(body),
        }
    }

    /// Add a dependency.
    #[must_use]
    pub fn with_dep<T>(mut self, object: &ObjectRef<T>) -> Self {
        self.deps.push(object.raw().clone());
        self
    }

    /// Add several dependencies of the same type.
    #[must_use]
    pub fn with_deps<'a, T: 'a>(
        mut self,
        objects: impl IntoIterator<Item = &'a ObjectRef<T>>,
    ) -> Self {
        self.deps
            .extend(objects.into_iter().map(|object| object.raw().clone()));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn deps(&self) -> &[RawRef] {
        &self.deps
    }

    /// Run the body, turning panics and output-count mismatches into errors.
    pub fn run(
        self,
        ctx: &TaskContext,
        inputs: Vec<Payload>,
        expected_outputs: usize,
    ) -> TesseraResult<Vec<Payload>> {
        let Self { name, body, .. } = self;
        let outputs = catch_unwind(AssertUnwindSafe(|| body(ctx, inputs))).map_err(|panic| {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            TesseraError::execution(format!("task '{name}' panicked: {reason}"))
        })??;
        if outputs.len() != expected_outputs {
            return Err(TesseraError::internal(format!(
                "task '{name}' returned {} outputs, expected {expected_outputs}",
                outputs.len()
            )));
        }
        Ok(outputs)
    }
}

impl fmt::Debug for RemoteTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTask")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}
