//! Arrow IPC transport for blocks.

use std::io::Cursor;
use std::sync::Arc;

use arrow_array::{Array, RecordBatch};
use arrow_ipc::reader::StreamReader;
use arrow_ipc::writer::StreamWriter;
use arrow_schema::{Field, Schema};

use common_error::{value_err, TesseraError, TesseraResult};

use crate::block::{Block, BlockData};

const FRAME_TAG: u8 = b'F';
const LABELS_TAG: u8 = b'L';
const LABELS_FIELD: &str = "labels";

/// Arrow IPC transport for serializing/deserializing blocks.
pub struct BlockTransport;

impl BlockTransport {
    /// Serialize record batches to Arrow IPC stream format.
    pub fn serialize_batches(batches: &[RecordBatch]) -> TesseraResult<Vec<u8>> {
        if batches.is_empty() {
            return Ok(Vec::new());
        }

        let schema = batches[0].schema();
        let mut buffer = Vec::new();

        {
            let mut writer = StreamWriter::try_new(&mut buffer, &schema).map_err(|e| {
                TesseraError::InternalError(format!("Failed to create IPC writer: {e}"))
            })?;

            for batch in batches {
                writer.write(batch).map_err(|e| {
                    TesseraError::InternalError(format!("Failed to write batch: {e}"))
                })?;
            }

            writer.finish().map_err(|e| {
                TesseraError::InternalError(format!("Failed to finish IPC stream: {e}"))
            })?;
        }

        Ok(buffer)
    }

    /// Deserialize record batches from Arrow IPC stream format.
    pub fn deserialize_batches(data: &[u8]) -> TesseraResult<Vec<RecordBatch>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let cursor = Cursor::new(data);
        let reader = StreamReader::try_new(cursor, None).map_err(|e| {
            TesseraError::InternalError(format!("Failed to create IPC reader: {e}"))
        })?;

        let batches: Result<Vec<_>, _> = reader.collect();
        batches.map_err(|e| TesseraError::InternalError(format!("Failed to read batches: {e}")))
    }

    /// Encode one block: a kind tag followed by an IPC stream.
    pub fn encode(block: &Block) -> TesseraResult<Vec<u8>> {
        let (tag, batch) = match block.data() {
            BlockData::Frame(batch) => (FRAME_TAG, batch.clone()),
            BlockData::Labels(labels) => {
                let field = Field::new(LABELS_FIELD, labels.data_type().clone(), true);
                let batch = RecordBatch::try_new(
                    Arc::new(Schema::new(vec![field])),
                    vec![Arc::clone(labels)],
                )?;
                (LABELS_TAG, batch)
            }
        };
        let mut out = vec![tag];
        out.extend(Self::serialize_batches(std::slice::from_ref(&batch))?);
        Ok(out)
    }

    /// Decode a block produced by [`BlockTransport::encode`].
    pub fn decode(data: &[u8]) -> TesseraResult<Block> {
        let Some((&tag, payload)) = data.split_first() else {
            return Err(TesseraError::value_error("empty block payload"));
        };
        let mut batches = Self::deserialize_batches(payload)?;
        if batches.len() != 1 {
            value_err!("expected one batch in block payload, found {}", batches.len());
        }
        let batch = batches.remove(0);
        match tag {
            FRAME_TAG => Ok(Block::from_batch(batch)),
            LABELS_TAG => {
                if batch.num_columns() != 1 {
                    return Err(TesseraError::value_error("label payload must have one column"));
                }
                Ok(Block::from_labels(Arc::clone(batch.column(0))))
            }
            other => Err(TesseraError::value_error(format!(
                "unknown block tag {other:#x}"
            ))),
        }
    }
}
