//! Named block functions and their serialized references.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use common_error::{TesseraError, TesseraResult};
use tessera_block::{block_fn, Block, BlockFn, Params};

#[derive(Serialize, Deserialize)]
struct FnRef {
    name: String,
}

/// A block function in shippable form: a reference to a registered name.
///
/// Executors resolve it against their [`FunctionRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedFn {
    bytes: Vec<u8>,
}

impl SerializedFn {
    /// Reference the function registered under `name`.
    pub fn named(name: impl Into<String>) -> TesseraResult<Self> {
        let bytes = serde_json::to_vec(&FnRef { name: name.into() })?;
        Ok(Self { bytes })
    }

    /// Wrap bytes received from elsewhere.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the referenced name.
    pub fn name(&self) -> TesseraResult<String> {
        let fn_ref: FnRef = serde_json::from_slice(&self.bytes)?;
        Ok(fn_ref.name)
    }
}

/// Registry of block functions that can be referenced by name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: Arc<RwLock<HashMap<String, BlockFn>>>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any previous one with the same name.
    pub fn register(&self, name: impl Into<String>, func: BlockFn) {
        let name = name.into();
        log::debug!("registering block function '{name}'");
        self.functions
            .write()
            .expect("registry lock poisoned")
            .insert(name, func);
    }

    /// Register a closure.
    pub fn register_fn<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&Block, &Params) -> TesseraResult<Block> + Send + Sync + 'static,
    {
        self.register(name, block_fn(func));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions
            .read()
            .expect("registry lock poisoned")
            .contains_key(name)
    }

    /// Look up a function by name.
    pub fn resolve(&self, name: &str) -> TesseraResult<BlockFn> {
        self.functions
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| {
                TesseraError::invalid_parameter(format!("unknown block function '{name}'"))
            })
    }

    /// Resolve a serialized reference.
    pub fn deserialize(&self, func: &SerializedFn) -> TesseraResult<BlockFn> {
        self.resolve(&func.name()?)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let registry = FunctionRegistry::new();
        registry.register_fn("identity", |block, _| Ok(block.clone()));

        assert!(registry.contains("identity"));
        assert!(registry.resolve("identity").is_ok());
        assert_eq!(registry.names(), vec!["identity".to_string()]);
    }

    #[test]
    fn test_unknown_name() {
        let registry = FunctionRegistry::new();
        let err = registry.resolve("missing").err().unwrap();
        assert!(matches!(err, TesseraError::InvalidParameter(_)));
    }

    #[test]
    fn test_serialized_reference() {
        let registry = FunctionRegistry::new();
        registry.register_fn("identity", |block, _| Ok(block.clone()));

        let func = SerializedFn::named("identity").unwrap();
        assert_eq!(func.name().unwrap(), "identity");
        assert!(registry.deserialize(&func).is_ok());

        let garbage = SerializedFn::from_bytes(b"not json".to_vec());
        assert!(matches!(
            registry.deserialize(&garbage).err().unwrap(),
            TesseraError::SerdeJsonError(_)
        ));
    }
}
