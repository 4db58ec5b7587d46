//! Deferred operations and the per-partition queue that holds them.

use std::fmt;

use common_error::TesseraResult;
use tessera_block::{block_fn, Block, BlockFn, Params, SerializedParams};
use tessera_cluster::{FunctionRegistry, SerializedFn};

/// A block function, either held directly or referenced by its serialized
/// form and resolved where it runs.
#[derive(Clone)]
pub enum DeferredFn {
    Direct(BlockFn),
    Serialized(SerializedFn),
}

impl DeferredFn {
    /// Wrap a closure.
    #[must_use]
    pub fn direct<F>(func: F) -> Self
    where
        F: Fn(&Block, &Params) -> TesseraResult<Block> + Send + Sync + 'static,
    {
        Self::Direct(block_fn(func))
    }

    /// Reference a function registered under `name`.
    pub fn named(name: impl Into<String>) -> TesseraResult<Self> {
        Ok(Self::Serialized(SerializedFn::named(name)?))
    }

    /// The identity function.
    #[must_use]
    pub fn identity() -> Self {
        Self::direct(|block, _| Ok(block.clone()))
    }

    /// Get a callable function.
    pub fn resolve(&self, registry: &FunctionRegistry) -> TesseraResult<BlockFn> {
        match self {
            Self::Direct(func) => Ok(func.clone()),
            Self::Serialized(func) => registry.deserialize(func),
        }
    }

    /// Fail now if this cannot be resolved later.
    pub fn validate(&self, registry: &FunctionRegistry) -> TesseraResult<()> {
        self.resolve(registry).map(|_| ())
    }
}

impl fmt::Debug for DeferredFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("Direct(<fn>)"),
            Self::Serialized(func) => match func.name() {
                Ok(name) => write!(f, "Serialized({name})"),
                Err(_) => write!(f, "Serialized(<{} bytes>)", func.as_bytes().len()),
            },
        }
    }
}

impl From<BlockFn> for DeferredFn {
    fn from(func: BlockFn) -> Self {
        Self::Direct(func)
    }
}

impl From<SerializedFn> for DeferredFn {
    fn from(func: SerializedFn) -> Self {
        Self::Serialized(func)
    }
}

/// Keyword parameters, inline or pre-serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredParams {
    Inline(Params),
    Serialized(SerializedParams),
}

impl DeferredParams {
    pub fn resolve(&self) -> TesseraResult<Params> {
        match self {
            Self::Inline(params) => Ok(params.clone()),
            Self::Serialized(params) => params.deserialize(),
        }
    }
}

impl Default for DeferredParams {
    fn default() -> Self {
        Self::Inline(Params::new())
    }
}

impl From<Params> for DeferredParams {
    fn from(params: Params) -> Self {
        Self::Inline(params)
    }
}

impl From<SerializedParams> for DeferredParams {
    fn from(params: SerializedParams) -> Self {
        Self::Serialized(params)
    }
}

/// One queued operation.
#[derive(Debug, Clone)]
pub struct DeferredOp {
    func: DeferredFn,
    params: DeferredParams,
}

impl DeferredOp {
    #[must_use]
    pub fn new(func: DeferredFn, params: impl Into<DeferredParams>) -> Self {
        Self {
            func,
            params: params.into(),
        }
    }

    #[must_use]
    pub fn func(&self) -> &DeferredFn {
        &self.func
    }

    #[must_use]
    pub fn params(&self) -> &DeferredParams {
        &self.params
    }
}

/// Operations waiting to be applied, in append order.
#[derive(Debug, Clone, Default)]
pub struct CallQueue {
    ops: Vec<DeferredOp>,
}

impl CallQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: DeferredOp) {
        self.ops.push(op);
    }

    /// A copy with `op` appended.
    #[must_use]
    pub fn with(&self, op: DeferredOp) -> Self {
        let mut next = self.clone();
        next.push(op);
        next
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, DeferredOp> {
        self.ops.iter()
    }

    /// Empty the queue, returning what it held.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl From<DeferredOp> for CallQueue {
    fn from(op: DeferredOp) -> Self {
        Self { ops: vec![op] }
    }
}

impl<'a> IntoIterator for &'a CallQueue {
    type Item = &'a DeferredOp;
    type IntoIter = std::slice::Iter<'a, DeferredOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_error::TesseraError;

    #[test]
    fn test_with_leaves_original_untouched() {
        let queue = CallQueue::new();
        let next = queue.with(DeferredOp::new(DeferredFn::identity(), Params::new()));
        assert!(queue.is_empty());
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn test_take_empties() {
        let mut queue = CallQueue::from(DeferredOp::new(DeferredFn::identity(), Params::new()));
        let taken = queue.take();
        assert!(queue.is_empty());
        assert_eq!(taken.len(), 1);
    }

    #[test]
    fn test_serialized_fn_resolution() {
        let registry = FunctionRegistry::new();
        let func = DeferredFn::named("double").unwrap();
        assert!(matches!(
            func.validate(&registry),
            Err(TesseraError::InvalidParameter(_))
        ));

        registry.register_fn("double", |block, _| {
            Block::concat(&[block.clone(), block.clone()], tessera_block::Axis::Rows)
        });
        assert!(func.validate(&registry).is_ok());
        assert_eq!(format!("{func:?}"), "Serialized(double)");
    }

    #[test]
    fn test_serialized_params_resolve() {
        let params = Params::new().with_value("k", 2);
        let deferred = DeferredParams::from(params.serialize().unwrap());
        assert_eq!(deferred.resolve().unwrap(), params);
    }
}
