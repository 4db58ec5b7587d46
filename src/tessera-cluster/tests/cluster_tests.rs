//! End-to-end tests for the in-process substrate.

use std::sync::Arc;

use arrow_array::{Int64Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema};

use common_config::{ClusterConfig, TesseraConfig};
use common_error::TesseraError;
use tessera_block::{Block, Params};
use tessera_cluster::{downcast, payload, Cluster, NodeId, ObjectRef, RemoteTask};

fn cluster(nodes: usize) -> Cluster {
    let config = TesseraConfig::default()
        .with_cluster(ClusterConfig::default().with_nodes(nodes).with_worker_threads(2));
    Cluster::local(config).unwrap()
}

fn block(values: &[i64]) -> Block {
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
    Block::from_batch(
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))]).unwrap(),
    )
}

#[test]
fn put_then_get_returns_the_value() {
    let cluster = cluster(2);
    let object = cluster.put(block(&[1, 2, 3]));
    assert!(object.is_ready());
    assert_eq!(cluster.get(&object).unwrap().num_rows(), 3);
    assert_eq!(cluster.locate(&object), Some(NodeId::new("node-0")));
    assert_eq!(cluster.metrics().objects_put(), 1);
}

#[test]
fn task_outputs_are_published_in_order() {
    let cluster = cluster(3);
    let input = cluster.put(block(&[1, 2, 3, 4]));
    let task = RemoteTask::new("shape", |_, inputs| {
        let block = downcast::<Block>(inputs[0].clone())?;
        Ok(vec![payload(block.num_rows()), payload(block.num_columns())])
    })
    .with_dep(&input);

    let [rows, cols] = cluster.submit::<2>(task);
    let rows: ObjectRef<usize> = rows.typed();
    let cols: ObjectRef<usize> = cols.typed();
    assert_eq!(*cluster.get(&rows).unwrap(), 4);
    assert_eq!(*cluster.get(&cols).unwrap(), 1);

    // Placed with its input.
    assert_eq!(cluster.locate(&rows), Some(NodeId::new("node-0")));
    assert_eq!(cluster.metrics().tasks_submitted(), 1);
}

#[test]
fn failures_surface_wrapped_once_on_every_output() {
    let cluster = cluster(1);
    let task = RemoteTask::new("fail", |_, _| Err(TesseraError::value_error("bad input")));
    let [a, b] = cluster.submit::<2>(task);

    let err_a = cluster.get(&a.typed::<usize>()).unwrap_err();
    let err_b = cluster.get(&b.typed::<usize>()).unwrap_err();
    for err in [err_a, err_b] {
        assert!(err.is_remote());
        assert!(matches!(err.remote_cause(), Some(TesseraError::ValueError(_))));
    }
    assert_eq!(cluster.metrics().tasks_failed(), 1);
}

#[test]
fn dependency_failures_propagate() {
    let cluster = cluster(2);
    let [failed] = cluster.submit::<1>(RemoteTask::new("fail", |_, _| {
        Err(TesseraError::execution("upstream"))
    }));
    let failed: ObjectRef<usize> = failed.typed();
    let [downstream] = cluster.submit::<1>(
        RemoteTask::new("never-runs", |_, _| Ok(vec![payload(0_usize)])).with_dep(&failed),
    );

    let err = cluster.get(&downstream.typed::<usize>()).unwrap_err();
    assert!(matches!(
        err.remote_cause(),
        Some(TesseraError::ExecutionError(msg)) if msg == "upstream"
    ));
    assert!(cluster.metrics().task("never-runs").is_none());
}

#[test]
fn gather_preserves_order() {
    let cluster = cluster(4);
    let objects: Vec<ObjectRef<usize>> = (0..8_usize)
        .map(|i| {
            let [out] = cluster.submit::<1>(RemoteTask::new("const", move |_, _| {
                Ok(vec![payload(i)])
            }));
            out.typed()
        })
        .collect();

    cluster.wait(&objects);
    assert!(objects.iter().all(ObjectRef::is_ready));
    let values: Vec<usize> = cluster
        .gather(&objects)
        .unwrap()
        .into_iter()
        .map(|v| *v)
        .collect();
    assert_eq!(values, (0..8).collect::<Vec<_>>());
}

#[test]
fn tasks_resolve_registered_functions() {
    let cluster = cluster(2);
    cluster.registry().register_fn("first-row", |block, _| {
        block.slice(&(0..1).into(), &tessera_block::Selector::All)
    });

    let input = cluster.put(block(&[5, 6, 7]));
    let task = RemoteTask::new("apply-named", |ctx, inputs| {
        let func = ctx.registry().resolve("first-row")?;
        let block = downcast::<Block>(inputs[0].clone())?;
        Ok(vec![payload(block.apply(&func, &Params::new())?)])
    })
    .with_dep(&input);
    let [out] = cluster.submit::<1>(task);

    let result = cluster.get(&out.typed::<Block>()).unwrap();
    assert_eq!(*result, block(&[5]));
}

#[test]
fn zero_nodes_is_rejected() {
    let config = TesseraConfig::default().with_cluster(ClusterConfig::default().with_nodes(0));
    assert!(matches!(
        Cluster::local(config).unwrap_err(),
        TesseraError::InvalidParameter(_)
    ));
}
