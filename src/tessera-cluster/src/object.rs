//! Object references and the cells backing them.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use common_error::{TesseraError, TesseraResult};

/// A type-erased value held by the substrate.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// What an object eventually resolves to. Failures are shared so every
/// output of a failed task reports the same cause.
pub type RemoteResult = Result<Payload, Arc<TesseraError>>;

/// Wrap a value as a [`Payload`].
#[must_use]
pub fn payload<T: Any + Send + Sync>(value: T) -> Payload {
    Arc::new(value)
}

/// Recover the concrete type of a [`Payload`].
pub fn downcast<T: Any + Send + Sync>(value: Payload) -> TesseraResult<Arc<T>> {
    value.downcast::<T>().map_err(|_| {
        TesseraError::internal(format!(
            "object does not hold a {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Substrate-unique object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a node in the substrate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write-once slot for an object's value and the node that produced it.
pub struct ObjectCell {
    id: ObjectId,
    value: watch::Sender<Option<RemoteResult>>,
    node: OnceLock<NodeId>,
}

impl ObjectCell {
    /// A pending cell.
    #[must_use]
    pub fn new(id: ObjectId) -> Self {
        let (value, _) = watch::channel(None);
        Self {
            id,
            value,
            node: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Whether the value (or failure) has been published.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// Node holding the value, once known.
    #[must_use]
    pub fn node(&self) -> Option<&NodeId> {
        self.node.get()
    }

    /// Publish the value. Later completions are ignored.
    ///
    /// Only a successful value records `node`; a failed object lives nowhere.
    pub fn complete(&self, result: RemoteResult, node: NodeId) -> bool {
        self.value.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            if result.is_ok() {
                let _ = self.node.set(node);
            }
            *slot = Some(result);
            true
        })
    }

    /// Wait until the value is published.
    pub async fn resolved(&self) -> RemoteResult {
        let mut rx = self.value.subscribe();
        let published = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        published.unwrap_or_else(|| {
            Err(Arc::new(TesseraError::internal(format!(
                "object {} was dropped before completion",
                self.id
            ))))
        })
    }
}

impl fmt::Debug for ObjectCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCell")
            .field("id", &self.id)
            .field("ready", &self.is_ready())
            .field("node", &self.node.get())
            .finish()
    }
}

/// Untyped, shared reference to an object cell.
#[derive(Clone)]
pub struct RawRef(Arc<ObjectCell>);

impl RawRef {
    #[must_use]
    pub fn new(cell: ObjectCell) -> Self {
        Self(Arc::new(cell))
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.0.id()
    }

    #[must_use]
    pub fn cell(&self) -> &ObjectCell {
        &self.0
    }

    /// View as a typed reference. The type is checked on resolution.
    #[must_use]
    pub fn typed<T>(self) -> ObjectRef<T> {
        ObjectRef::from_raw(self)
    }
}

impl PartialEq for RawRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for RawRef {}

impl Hash for RawRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawRef({})", self.id())
    }
}

/// Typed reference to a value held by the substrate.
pub struct ObjectRef<T> {
    raw: RawRef,
    _type: PhantomData<fn() -> T>,
}

impl<T> ObjectRef<T> {
    #[must_use]
    pub fn from_raw(raw: RawRef) -> Self {
        Self {
            raw,
            _type: PhantomData,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &RawRef {
        &self.raw
    }

    #[must_use]
    pub fn into_raw(self) -> RawRef {
        self.raw
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.raw.id()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.raw.cell().is_ready()
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self::from_raw(self.raw.clone())
    }
}

impl<T> PartialEq for ObjectRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for ObjectRef<T> {}

impl<T> Hash for ObjectRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef<{}>({})", std::any::type_name::<T>(), self.id())
    }
}
