//! Shipping call queues to the substrate.
//!
//! Every dispatch is a single task whose inputs are the block handles it
//! reads and whose outputs are the resulting block, its row count, its
//! column count and the node it ran on. Operations run strictly in queue
//! order. An operation that fails because its input block is read-only is
//! retried once against a writable copy of that block.

use std::sync::Arc;

use log::{debug, trace, warn};

use common_error::{TesseraError, TesseraResult};
use tessera_block::{Axis, Block, BlockFn, DenseMatrix, Params, Selector};
use tessera_cluster::{
    downcast, payload, Cluster, NodeId, ObjectRef, Payload, RemoteTask, TaskContext,
};

use crate::call_queue::{CallQueue, DeferredFn};

/// Handles produced by one dispatch.
#[derive(Debug, Clone)]
pub(crate) struct Deployed {
    pub block: ObjectRef<Block>,
    pub length: ObjectRef<usize>,
    pub width: ObjectRef<usize>,
    pub location: ObjectRef<NodeId>,
}

impl Deployed {
    fn from_outputs(cluster: &Cluster, task: RemoteTask) -> Self {
        let [block, length, width, location] = cluster.submit::<4>(task);
        Self {
            block: block.typed(),
            length: length.typed(),
            width: width.typed(),
            location: location.typed(),
        }
    }
}

/// Dispatch `queue` against the block behind `handle`.
pub(crate) fn deploy_call_queue(
    cluster: &Cluster,
    handle: &ObjectRef<Block>,
    queue: CallQueue,
) -> Deployed {
    debug!("dispatching {} queued ops on {handle:?}", queue.len());
    let task = RemoteTask::new("deploy_call_queue", move |ctx, inputs| {
        let block = input_block(&inputs, 0)?;
        let result = run_call_queue(ctx, block, &queue)?;
        Ok(block_outputs(ctx, result))
    })
    .with_dep(handle);
    Deployed::from_outputs(cluster, task)
}

/// One aligned right-hand partition: its handle and pending queue.
pub(crate) type Companion = (ObjectRef<Block>, CallQueue);

/// Dispatch a broadcast: drain the left queue and every companion queue,
/// stitch the companions along `concat_axis`, then call `func` on the left
/// block with the stitched block bound to `other_name`.
pub(crate) fn deploy_broadcast(
    cluster: &Cluster,
    left: Companion,
    right: Vec<Companion>,
    concat_axis: Axis,
    func: DeferredFn,
    other_name: String,
) -> Deployed {
    let (left_handle, left_queue) = left;
    let (right_handles, right_queues): (Vec<_>, Vec<_>) = right.into_iter().unzip();
    trace!(
        "dispatching broadcast on {left_handle:?} with {} companions",
        right_handles.len()
    );

    let task = RemoteTask::new("deploy_broadcast", move |ctx, inputs| {
        let left = run_call_queue(ctx, input_block(&inputs, 0)?, &left_queue)?;
        let companions = right_queues
            .iter()
            .enumerate()
            .map(|(i, queue)| run_call_queue(ctx, input_block(&inputs, i + 1)?, queue))
            .collect::<TesseraResult<Vec<_>>>()?;
        let other = Block::concat(&companions, concat_axis)?;

        let func = func.resolve(ctx.registry())?;
        let params = Params::new().with_block(other_name, other);
        let result = apply_with_copy_retry(ctx, left, &func, &params)?;
        Ok(block_outputs(ctx, result))
    })
    .with_dep(&left_handle)
    .with_deps(&right_handles);
    Deployed::from_outputs(cluster, task)
}

/// Row and column count of the block behind `handle`, from one task.
pub(crate) fn deploy_shape(
    cluster: &Cluster,
    handle: &ObjectRef<Block>,
) -> (ObjectRef<usize>, ObjectRef<usize>) {
    let task = RemoteTask::new("length_and_width", |_, inputs| {
        let block = input_block(&inputs, 0)?;
        Ok(vec![payload(block.num_rows()), payload(block.num_columns())])
    })
    .with_dep(handle);
    let [length, width] = cluster.submit::<2>(task);
    (length.typed(), width.typed())
}

/// Count `selector` picks from a pending extent. Out-of-range positions
/// fail the task.
pub(crate) fn deploy_selected_len(
    cluster: &Cluster,
    extent: &ObjectRef<usize>,
    selector: Selector,
) -> ObjectRef<usize> {
    let task = RemoteTask::new("selected_len", move |_, inputs| {
        let len = input::<usize>(&inputs, 0)?;
        Ok(vec![payload(selector.checked_len(*len)?)])
    })
    .with_dep(extent);
    let [sliced] = cluster.submit::<1>(task);
    sliced.typed()
}

/// Dense conversion of the block behind `handle`.
pub(crate) fn deploy_to_dense(
    cluster: &Cluster,
    handle: &ObjectRef<Block>,
) -> ObjectRef<DenseMatrix> {
    let task = RemoteTask::new("to_dense", |_, inputs| {
        Ok(vec![payload(input_block(&inputs, 0)?.to_dense()?)])
    })
    .with_dep(handle);
    let [dense] = cluster.submit::<1>(task);
    dense.typed()
}

/// Apply every queued operation in order, resolving serialized forms first.
pub(crate) fn run_call_queue(
    ctx: &TaskContext,
    block: Block,
    queue: &CallQueue,
) -> TesseraResult<Block> {
    let mut acc = block;
    for (i, op) in queue.iter().enumerate() {
        let func = op.func().resolve(ctx.registry())?;
        let params = op.params().resolve()?;
        trace!("applying op {i} ({:?}) on {}", op.func(), ctx.node());
        acc = apply_with_copy_retry(ctx, acc, &func, &params)?;
    }
    Ok(acc)
}

fn apply_with_copy_retry(
    ctx: &TaskContext,
    block: Block,
    func: &BlockFn,
    params: &Params,
) -> TesseraResult<Block> {
    match block.apply(func, params) {
        Err(err) if err.is_read_only() => {
            warn!("retrying on a copy after read-only failure on {}: {err}", ctx.node());
            ctx.metrics().record_copy_retry();
            block.copy()?.apply(func, params)
        }
        result => result,
    }
}

fn block_outputs(ctx: &TaskContext, block: Block) -> Vec<Payload> {
    let (rows, cols) = block.shape();
    vec![
        payload(block.seal()),
        payload(rows),
        payload(cols),
        payload(ctx.node().clone()),
    ]
}

fn input<T: std::any::Any + Send + Sync>(
    inputs: &[Payload],
    index: usize,
) -> TesseraResult<Arc<T>> {
    let value = inputs
        .get(index)
        .cloned()
        .ok_or_else(|| TesseraError::internal(format!("missing task input {index}")))?;
    downcast(value)
}

fn input_block(inputs: &[Payload], index: usize) -> TesseraResult<Block> {
    input::<Block>(inputs, index).map(Arc::unwrap_or_clone)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::{Int64Array, RecordBatch};
    use arrow_schema::{DataType, Field, Schema};
    use common_config::{ClusterConfig, TesseraConfig};
    use tessera_cluster::{ClusterMetrics, FunctionRegistry};

    use super::*;
    use crate::call_queue::DeferredOp;

    fn ctx() -> TaskContext {
        TaskContext::new(
            NodeId::new("node-0"),
            FunctionRegistry::new(),
            ClusterMetrics::new(),
        )
    }

    fn block(values: &[i64]) -> Block {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        Block::from_batch(
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))])
                .unwrap(),
        )
    }

    fn op(func: DeferredFn) -> DeferredOp {
        DeferredOp::new(func, Params::new())
    }

    /// Writes in place: refuses read-only blocks.
    fn in_place_head() -> DeferredFn {
        DeferredFn::direct(|block, _| {
            block.ensure_writable()?;
            block.slice(&(0..1).into(), &tessera_block::Selector::All)
        })
    }

    #[test]
    fn test_ops_apply_in_order() {
        let queue: CallQueue = [
            op(DeferredFn::direct(|b, _| b.slice(&(1..4).into(), &tessera_block::Selector::All))),
            op(DeferredFn::direct(|b, _| b.slice(&(0..1).into(), &tessera_block::Selector::All))),
        ]
        .into_iter()
        .fold(CallQueue::new(), |q, o| q.with(o));

        let result = run_call_queue(&ctx(), block(&[1, 2, 3, 4, 5]), &queue).unwrap();
        assert_eq!(result, block(&[2]));
    }

    #[test]
    fn test_read_only_is_retried_on_copy() {
        let ctx = ctx();
        let queue = CallQueue::from(op(in_place_head()));
        let result = run_call_queue(&ctx, block(&[7, 8]).seal(), &queue).unwrap();
        assert_eq!(result, block(&[7]));
        assert_eq!(ctx.metrics().copy_retries(), 1);
    }

    #[test]
    fn test_other_errors_propagate() {
        let ctx = ctx();
        let queue = CallQueue::from(op(DeferredFn::direct(|_, _| {
            Err(TesseraError::value_error("nope"))
        })));
        let err = run_call_queue(&ctx, block(&[1]), &queue).unwrap_err();
        assert!(matches!(err, TesseraError::ValueError(_)));
        assert_eq!(ctx.metrics().copy_retries(), 0);
    }

    #[test]
    fn test_deploy_reports_shape_and_node() {
        let config = TesseraConfig::default().with_cluster(ClusterConfig::default().with_nodes(1));
        let cluster = Cluster::local(config).unwrap();
        let handle = cluster.put(block(&[1, 2, 3]).seal());

        let deployed = deploy_call_queue(&cluster, &handle, CallQueue::from(op(in_place_head())));
        assert_eq!(*cluster.get(&deployed.length).unwrap(), 1);
        assert_eq!(*cluster.get(&deployed.width).unwrap(), 1);
        assert_eq!(cluster.get(&deployed.location).unwrap().as_str(), "node-0");
        let result = cluster.get(&deployed.block).unwrap();
        assert!(result.is_read_only());
        assert_eq!(cluster.metrics().copy_retries(), 1);
    }
}
