//! The canonical state tree contract and its read-only view.

use crate::store::StoreInner;
use crate::value::{get_at_path, lookup};
use crate::{Path, StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::rc::Rc;

/// A type that can serve as a store's canonical state tree.
///
/// The store only ever holds one instance. Re-initialization, undo and redo
/// call [`load`](StateTree::load) on that instance instead of replacing it,
/// so implementations must repopulate themselves in place.
///
/// # Example
///
/// ```
/// use keel_store::{StateTree, StoreResult};
/// use serde_json::Value;
///
/// struct AppState {
///     doc: Value,
///     loads: usize,
/// }
///
/// impl StateTree for AppState {
///     fn tree(&self) -> &Value {
///         &self.doc
///     }
///
///     fn tree_mut(&mut self) -> &mut Value {
///         &mut self.doc
///     }
///
///     fn load(&mut self, data: Value) -> StoreResult<()> {
///         self.doc = data;
///         self.loads += 1;
///         Ok(())
///     }
/// }
/// ```
pub trait StateTree: 'static {
    /// The tree's current contents.
    fn tree(&self) -> &Value;

    /// Mutable access used by the store's controlled write path.
    fn tree_mut(&mut self) -> &mut Value;

    /// Repopulate from plain data, keeping this instance.
    fn load(&mut self, data: Value) -> StoreResult<()>;
}

impl StateTree for Value {
    fn tree(&self) -> &Value {
        self
    }

    fn tree_mut(&mut self) -> &mut Value {
        self
    }

    fn load(&mut self, data: Value) -> StoreResult<()> {
        *self = data;
        Ok(())
    }
}

/// Read-only access to a store's state.
///
/// This is the only handle on state given to code outside mutations; it has
/// no write surface.
pub struct StateReader<S: StateTree = Value> {
    inner: Rc<StoreInner<S>>,
}

impl<S: StateTree> StateReader<S> {
    pub(crate) fn new(inner: Rc<StoreInner<S>>) -> Self {
        Self { inner }
    }

    /// Value at `path`; fails with `PathNotFound` or `IndexOutOfBounds`.
    pub fn get(&self, path: impl Into<Path>) -> StoreResult<Value> {
        self.inner.read(&path.into())
    }

    /// Value at `path`, or `None` if any component is missing.
    pub fn try_get(&self, path: impl Into<Path>) -> Option<Value> {
        let doc = self.inner.doc.borrow();
        get_at_path(doc.tree(), &path.into()).cloned()
    }

    /// Deserialize the value at `path` into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, path: impl Into<Path>) -> StoreResult<T> {
        let doc = self.inner.doc.borrow();
        let value = lookup(doc.tree(), &path.into())?;
        T::deserialize(value).map_err(StoreError::from)
    }

    /// Whether a value exists at `path`.
    pub fn contains(&self, path: impl Into<Path>) -> bool {
        let doc = self.inner.doc.borrow();
        get_at_path(doc.tree(), &path.into()).is_some()
    }

    /// Number of elements or fields of the container at `path`.
    pub fn len(&self, path: impl Into<Path>) -> StoreResult<usize> {
        let path = path.into();
        let doc = self.inner.doc.borrow();
        match lookup(doc.tree(), &path)? {
            Value::Array(arr) => Ok(arr.len()),
            Value::Object(obj) => Ok(obj.len()),
            other => Err(StoreError::type_mismatch(
                path,
                "container",
                crate::value_type_name(other),
            )),
        }
    }

    /// Deep copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.inner.doc.borrow().tree().clone()
    }
}

impl<S: StateTree> Clone for StateReader<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: StateTree> std::fmt::Debug for StateReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StateReader").field(&"<Value>").finish()
    }
}
