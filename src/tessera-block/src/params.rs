//! Keyword parameters passed to block functions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use common_error::{TesseraError, TesseraResult};

use crate::block::Block;
use crate::transport::BlockTransport;

/// A function from a block and keyword parameters to a new block.
pub type BlockFn = Arc<dyn Fn(&Block, &Params) -> TesseraResult<Block> + Send + Sync>;

/// Wrap a closure as a [`BlockFn`].
#[must_use]
pub fn block_fn<F>(f: F) -> BlockFn
where
    F: Fn(&Block, &Params) -> TesseraResult<Block> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Keyword parameters: plain JSON values plus named blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Map<String, Value>,
    blocks: BTreeMap<String, Block>,
}

impl Params {
    /// Empty parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a JSON value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_value(key, value);
        self
    }

    /// Add a block value.
    #[must_use]
    pub fn with_block(mut self, key: impl Into<String>, block: Block) -> Self {
        self.insert_block(key, block);
        self
    }

    /// Insert a JSON value.
    pub fn insert_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Insert a block value.
    pub fn insert_block(&mut self, key: impl Into<String>, block: Block) {
        self.blocks.insert(key.into(), block);
    }

    /// Whether there are no parameters at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.blocks.is_empty()
    }

    /// Total number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len() + self.blocks.len()
    }

    // --- getters ---
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key)?.as_str()
    }

    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key)?.as_i64()
    }

    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key)?.as_f64()
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key)?.as_bool()
    }

    #[must_use]
    pub fn block(&self, key: &str) -> Option<&Block> {
        self.blocks.get(key)
    }

    /// A block parameter that must be present.
    pub fn require_block(&self, key: &str) -> TesseraResult<&Block> {
        self.blocks
            .get(key)
            .ok_or_else(|| TesseraError::value_error(format!("missing block parameter '{key}'")))
    }

    /// An integer parameter that must be present.
    pub fn require_i64(&self, key: &str) -> TesseraResult<i64> {
        self.get_i64(key)
            .ok_or_else(|| TesseraError::value_error(format!("missing integer parameter '{key}'")))
    }

    /// Encode for shipping across a process boundary.
    ///
    /// JSON values go through `serde_json`, blocks through Arrow IPC.
    pub fn serialize(&self) -> TesseraResult<SerializedParams> {
        let values = serde_json::to_vec(&self.values)?;
        let blocks = self
            .blocks
            .iter()
            .map(|(key, block)| Ok((key.clone(), BlockTransport::encode(block)?)))
            .collect::<TesseraResult<Vec<_>>>()?;
        Ok(SerializedParams { values, blocks })
    }
}

/// Parameters in their encoded, shippable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedParams {
    values: Vec<u8>,
    blocks: Vec<(String, Vec<u8>)>,
}

impl SerializedParams {
    /// Decode back into [`Params`].
    pub fn deserialize(&self) -> TesseraResult<Params> {
        let values: Map<String, Value> = serde_json::from_slice(&self.values)?;
        let blocks = self
            .blocks
            .iter()
            .map(|(key, bytes)| Ok((key.clone(), BlockTransport::decode(bytes)?)))
            .collect::<TesseraResult<BTreeMap<_, _>>>()?;
        Ok(Params { values, blocks })
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.values.len() + self.blocks.iter().map(|(k, b)| k.len() + b.len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use arrow_array::{Int64Array, RecordBatch};
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    fn small_block() -> Block {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        Block::from_batch(
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2]))]).unwrap(),
        )
    }

    #[test]
    fn test_getters() {
        let params = Params::new()
            .with_value("n", 3)
            .with_value("name", "x")
            .with_value("ratio", 0.5)
            .with_value("flag", true)
            .with_block("other", small_block());

        assert_eq!(params.len(), 5);
        assert_eq!(params.get_i64("n"), Some(3));
        assert_eq!(params.get_str("name"), Some("x"));
        assert_eq!(params.get_f64("ratio"), Some(0.5));
        assert_eq!(params.get_bool("flag"), Some(true));
        assert!(params.block("other").is_some());
        assert!(params.require_block("missing").is_err());
        assert!(params.require_i64("name").is_err());
    }

    #[test]
    fn test_serialized_params_decode() {
        let params = Params::new()
            .with_value("n", 3)
            .with_block("other", small_block());
        let encoded = params.serialize().unwrap();
        assert!(encoded.byte_len() > 0);

        let decoded = encoded.deserialize().unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_empty_params() {
        let params = Params::new();
        assert!(params.is_empty());
        assert_eq!(params.serialize().unwrap().deserialize().unwrap(), params);
    }
}
