//! A single lazy block partition.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use arrow_array::RecordBatch;

use common_config::LocationStrategy;
use common_error::{TesseraError, TesseraResult};
use tessera_block::{Axis, Block, BlockFn, DenseMatrix, Params, Selector};
use tessera_cluster::{Cluster, NodeId, ObjectRef, SerializedFn};

use crate::call_queue::{CallQueue, DeferredFn, DeferredOp, DeferredParams};
use crate::dispatch::{
    deploy_broadcast, deploy_call_queue, deploy_selected_len, deploy_shape, deploy_to_dense,
    Companion, Deployed,
};

/// Metadata that is unknown, being computed, or known.
#[derive(Debug, Clone)]
enum MetaCache<T> {
    Unknown,
    Pending(ObjectRef<T>),
    Resolved(T),
}

impl<T> MetaCache<T> {
    fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

#[derive(Debug, Clone)]
struct PartitionState {
    handle: ObjectRef<Block>,
    call_queue: CallQueue,
    length: MetaCache<usize>,
    width: MetaCache<usize>,
    location: MetaCache<NodeId>,
}

impl PartitionState {
    fn unknown(handle: ObjectRef<Block>) -> Self {
        Self {
            handle,
            call_queue: CallQueue::new(),
            length: MetaCache::Unknown,
            width: MetaCache::Unknown,
            location: MetaCache::Unknown,
        }
    }

    fn deployed(deployed: Deployed) -> Self {
        Self {
            handle: deployed.block,
            call_queue: CallQueue::new(),
            length: MetaCache::Pending(deployed.length),
            width: MetaCache::Pending(deployed.width),
            location: MetaCache::Pending(deployed.location),
        }
    }
}

/// What a metadata read has to do once the partition lock is released.
enum Lookup<T> {
    Ready(T),
    Wait(ObjectRef<T>),
}

/// A handle to one block in the substrate plus the operations queued on it.
///
/// Queuing and applying return new partitions and never block. Draining
/// replaces this partition's own handle and metadata in one step.
pub struct Partition {
    cluster: Cluster,
    state: Mutex<PartitionState>,
}

impl Partition {
    fn with_state(cluster: Cluster, state: PartitionState) -> Self {
        Self {
            cluster,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PartitionState> {
        self.state.lock().expect("partition lock poisoned")
    }

    /// Push a local block to the substrate.
    ///
    /// Length and width come from the block itself.
    #[must_use]
    pub fn put(cluster: &Cluster, block: Block) -> Self {
        let (rows, cols) = block.shape();
        let handle = cluster.put(block.seal());
        let mut state = PartitionState::unknown(handle);
        state.length = MetaCache::Resolved(rows);
        state.width = MetaCache::Resolved(cols);
        Self::with_state(cluster.clone(), state)
    }

    /// A partition holding the zero-row, zero-column block.
    #[must_use]
    pub fn empty(cluster: &Cluster) -> Self {
        Self::put(cluster, Block::empty())
    }

    /// Wrap an existing block handle. Nothing about it is known yet.
    #[must_use]
    pub fn from_handle(cluster: &Cluster, handle: ObjectRef<Block>) -> Self {
        Self::with_state(cluster.clone(), PartitionState::unknown(handle))
    }

    /// Register `func` with the substrate under `name` and return a
    /// reference to it that is cheap to ship.
    pub fn preprocess_func(
        cluster: &Cluster,
        name: impl Into<String>,
        func: BlockFn,
    ) -> TesseraResult<DeferredFn> {
        let name = name.into();
        let reference = SerializedFn::named(name.clone())?;
        cluster.registry().register(name, func);
        Ok(DeferredFn::Serialized(reference))
    }

    #[must_use]
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Current handle. With queued operations pending this is the block
    /// before they are applied.
    #[must_use]
    pub fn handle(&self) -> ObjectRef<Block> {
        self.lock().handle.clone()
    }

    /// Number of queued operations.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.lock().call_queue.len()
    }

    /// Length and width if both are already resolved. Never blocks.
    #[must_use]
    pub fn cached_shape(&self) -> Option<(usize, usize)> {
        let state = self.lock();
        match (&state.length, &state.width) {
            (MetaCache::Resolved(rows), MetaCache::Resolved(cols)) => Some((*rows, *cols)),
            _ => None,
        }
    }

    /// A new partition with `func` appended to a copy of this queue.
    #[must_use]
    pub fn queue(&self, func: DeferredFn, params: impl Into<DeferredParams>) -> Self {
        let state = self.lock();
        let next = PartitionState {
            call_queue: state.call_queue.with(DeferredOp::new(func, params)),
            ..PartitionState::unknown(state.handle.clone())
        };
        Self::with_state(self.cluster.clone(), next)
    }

    /// Queue `func` and dispatch the whole queue now.
    ///
    /// The result's handle and metadata are pending; this partition is left
    /// as it was.
    #[must_use]
    pub fn apply(&self, func: DeferredFn, params: impl Into<DeferredParams>) -> Self {
        let (handle, queue) = {
            let state = self.lock();
            (
                state.handle.clone(),
                state.call_queue.with(DeferredOp::new(func, params)),
            )
        };
        let deployed = deploy_call_queue(&self.cluster, &handle, queue);
        Self::with_state(self.cluster.clone(), PartitionState::deployed(deployed))
    }

    /// Dispatch queued operations and adopt their results. Does nothing
    /// when the queue is empty.
    pub fn drain_call_queue(&self) {
        let mut state = self.lock();
        self.drain_locked(&mut state);
    }

    fn drain_locked(&self, state: &mut PartitionState) {
        if state.call_queue.is_empty() {
            return;
        }
        let queue = state.call_queue.take();
        log::debug!("draining {} ops from {:?}", queue.len(), state.handle);
        *state = PartitionState::deployed(deploy_call_queue(&self.cluster, &state.handle, queue));
    }

    /// Drain, then fetch the block.
    pub fn materialize(&self) -> TesseraResult<Block> {
        let handle = {
            let mut state = self.lock();
            self.drain_locked(&mut state);
            state.handle.clone()
        };
        self.cluster.get(&handle).map(Arc::unwrap_or_clone)
    }

    /// Drain, then block until the block exists. Failures are not reported.
    pub fn wait(&self) {
        let handle = {
            let mut state = self.lock();
            self.drain_locked(&mut state);
            state.handle.clone()
        };
        self.cluster.wait([&handle]);
    }

    /// Materialize as a record batch. Label blocks are a `TypeError`.
    pub fn to_record_batch(&self) -> TesseraResult<RecordBatch> {
        self.materialize()?.into_batch()
    }

    /// Convert to a dense matrix where the block lives and fetch it.
    pub fn to_dense(&self) -> TesseraResult<DenseMatrix> {
        let handle = {
            let mut state = self.lock();
            self.drain_locked(&mut state);
            state.handle.clone()
        };
        let dense = deploy_to_dense(&self.cluster, &handle);
        self.cluster.get(&dense).map(Arc::unwrap_or_clone)
    }

    /// Row count of the current block.
    pub fn length(&self) -> TesseraResult<usize> {
        self.shape().map(|(rows, _)| rows)
    }

    /// Column count of the current block. Label blocks have width 0.
    pub fn width(&self) -> TesseraResult<usize> {
        self.shape().map(|(_, cols)| cols)
    }

    /// Length and width together.
    ///
    /// Unknown extents are filled from the drain when operations are queued,
    /// otherwise by one introspection task. Either way both come from the
    /// same block.
    pub fn shape(&self) -> TesseraResult<(usize, usize)> {
        let (length, width) = {
            let mut state = self.lock();
            if state.length.is_unknown() || state.width.is_unknown() {
                if state.call_queue.is_empty() {
                    let (length, width) = deploy_shape(&self.cluster, &state.handle);
                    state.length = MetaCache::Pending(length);
                    state.width = MetaCache::Pending(width);
                } else {
                    self.drain_locked(&mut state);
                }
            }
            (lookup(&state.length)?, lookup(&state.width)?)
        };

        let rows = self.resolve(length, |state| &mut state.length)?;
        let cols = self.resolve(width, |state| &mut state.width)?;
        Ok((rows, cols))
    }

    /// Node holding the current block.
    pub fn location(&self) -> TesseraResult<NodeId> {
        let location = {
            let mut state = self.lock();
            if state.location.is_unknown() {
                self.drain_locked(&mut state);
            }
            if state.location.is_unknown() {
                state.location = self.find_location(&state.handle);
            }
            lookup(&state.location)?
        };
        self.resolve(location, |state| &mut state.location)
    }

    fn find_location(&self, handle: &ObjectRef<Block>) -> MetaCache<NodeId> {
        if self.cluster.config().partition.location_strategy == LocationStrategy::Locate {
            if let Some(node) = self.cluster.locate(handle) {
                return MetaCache::Resolved(node);
            }
        }
        log::debug!("locating {handle:?} through an identity apply");
        let queue = CallQueue::from(DeferredOp::new(DeferredFn::identity(), Params::new()));
        MetaCache::Pending(deploy_call_queue(&self.cluster, handle, queue).location)
    }

    /// Block on a lookup and cache the value if the cache still points at the
    /// same pending object.
    fn resolve<T, F>(&self, lookup: Lookup<T>, slot: F) -> TesseraResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&mut PartitionState) -> &mut MetaCache<T>,
    {
        let pending = match lookup {
            Lookup::Ready(value) => return Ok(value),
            Lookup::Wait(pending) => pending,
        };
        let value = Arc::unwrap_or_clone(self.cluster.get(&pending)?);
        let mut state = self.lock();
        let cache = slot(&mut *state);
        if matches!(cache, MetaCache::Pending(current) if *current == pending) {
            *cache = MetaCache::Resolved(value.clone());
        }
        Ok(value)
    }

    /// A new partition that selects rows and columns of this one.
    ///
    /// Length and width carry over where they can be derived without
    /// materializing. Resolved extents are counted locally and pending
    /// extents get a small remote task that counts from the pending value.
    /// Positions outside a resolved extent leave the cache unknown, so the
    /// next metadata query drains the queue and raises the failure.
    #[must_use]
    pub fn mask(&self, rows: impl Into<Selector>, cols: impl Into<Selector>) -> Self {
        let rows = rows.into();
        let cols = cols.into();
        let state = self.lock();

        let length = self.masked_extent(&state.length, &rows);
        let width = self.masked_extent(&state.width, &cols);
        let op = DeferredOp::new(
            DeferredFn::direct(move |block, _| block.slice(&rows, &cols)),
            Params::new(),
        );
        let next = PartitionState {
            handle: state.handle.clone(),
            call_queue: state.call_queue.with(op),
            length,
            width,
            location: MetaCache::Unknown,
        };
        Self::with_state(self.cluster.clone(), next)
    }

    fn masked_extent(&self, cache: &MetaCache<usize>, selector: &Selector) -> MetaCache<usize> {
        if selector.is_all() {
            return cache.clone();
        }
        match cache {
            MetaCache::Unknown => MetaCache::Unknown,
            MetaCache::Resolved(len) => match selector.checked_len(*len) {
                Ok(selected) => MetaCache::Resolved(selected),
                Err(err) => {
                    log::debug!("mask leaves extent unknown: {err}");
                    MetaCache::Unknown
                }
            },
            MetaCache::Pending(extent) => MetaCache::Pending(deploy_selected_len(
                &self.cluster,
                extent,
                selector.clone(),
            )),
        }
    }

    /// Dispatch `func` on this partition's block with `companions` drained,
    /// stitched along `concat_axis` and bound to `other_name`.
    pub(crate) fn broadcast_with(
        &self,
        companions: Vec<Companion>,
        concat_axis: Axis,
        func: DeferredFn,
        other_name: &str,
    ) -> Self {
        let deployed = deploy_broadcast(
            &self.cluster,
            self.pending(),
            companions,
            concat_axis,
            func,
            other_name.to_string(),
        );
        Self::with_state(self.cluster.clone(), PartitionState::deployed(deployed))
    }

    /// Handle and queue, for shipping together with other work.
    pub(crate) fn pending(&self) -> Companion {
        let state = self.lock();
        (state.handle.clone(), state.call_queue.clone())
    }
}

fn lookup<T: Clone>(cache: &MetaCache<T>) -> TesseraResult<Lookup<T>> {
    match cache {
        MetaCache::Resolved(value) => Ok(Lookup::Ready(value.clone())),
        MetaCache::Pending(pending) => Ok(Lookup::Wait(pending.clone())),
        MetaCache::Unknown => Err(TesseraError::internal("metadata cache left unknown")),
    }
}

impl Clone for Partition {
    /// Shares the handle; the queue and caches are copied.
    fn clone(&self) -> Self {
        Self::with_state(self.cluster.clone(), self.lock().clone())
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Partition")
            .field("handle", &state.handle)
            .field("queued", &state.call_queue.len())
            .field("length", &state.length)
            .field("width", &state.width)
            .field("location", &state.location)
            .finish()
    }
}
