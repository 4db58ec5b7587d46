//! Shared fixtures for partition tests.

#![allow(dead_code)]

use std::sync::Arc;

use arrow_array::{Array, Int64Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema};

use common_config::{ClusterConfig, TesseraConfig};
use common_error::TesseraError;
use tessera_block::Block;
use tessera_cluster::Cluster;
use tessera_partition::DeferredFn;

pub fn cluster() -> Cluster {
    let config = TesseraConfig::default()
        .with_cluster(ClusterConfig::default().with_nodes(3).with_worker_threads(2));
    Cluster::local(config).unwrap()
}

/// One Int64 column named `v`.
pub fn int_block(values: &[i64]) -> Block {
    let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
    Block::from_batch(
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))]).unwrap(),
    )
}

/// `cols` Int64 columns of `rows` rows; cell `(r, c)` holds `r * 100 + c`.
pub fn wide_block(rows: usize, cols: usize) -> Block {
    let fields: Vec<Field> = (0..cols)
        .map(|c| Field::new(format!("c{c}"), DataType::Int64, false))
        .collect();
    let columns = (0..cols)
        .map(|c| {
            let values: Vec<i64> = (0..rows).map(|r| (r * 100 + c) as i64).collect();
            Arc::new(Int64Array::from(values)) as Arc<dyn Array>
        })
        .collect();
    Block::from_batch(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap())
}

pub fn int_values(block: &Block) -> Vec<i64> {
    block
        .as_batch()
        .unwrap()
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .values()
        .to_vec()
}

/// Adds `k` to every value of the first column.
pub fn add(k: i64) -> DeferredFn {
    DeferredFn::direct(move |block, _| {
        let batch = block.as_batch()?;
        let values = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| TesseraError::type_error("expected Int64"))?;
        let added: Int64Array = values.iter().map(|v| v.map(|v| v + k)).collect();
        Ok(Block::from_batch(RecordBatch::try_new(
            batch.schema(),
            vec![Arc::new(added)],
        )?))
    })
}

/// Refuses read-only input, like an operation writing in place.
pub fn negate_in_place() -> DeferredFn {
    DeferredFn::direct(|block, _| {
        block.ensure_writable()?;
        let batch = block.as_batch()?;
        let values = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| TesseraError::type_error("expected Int64"))?;
        let negated: Int64Array = values.iter().map(|v| v.map(|v| -v)).collect();
        Ok(Block::from_batch(RecordBatch::try_new(
            batch.schema(),
            vec![Arc::new(negated)],
        )?))
    })
}
