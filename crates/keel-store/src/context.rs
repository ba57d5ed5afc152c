//! Arguments handed to actions and mutations.

use crate::{NodeView, StateReader, StateTree, Store, StoreResult};
use serde_json::Value;

/// Signature of a registered action.
pub type ActionFn<S> = dyn Fn(&ActionContext<'_, S>) -> StoreResult<Value>;

/// Signature of a registered mutation.
pub type MutationFn<S> = dyn Fn(&MutationContext<'_, S>) -> StoreResult<Value>;

/// What an action receives: the store's `commit` and `dispatch`, plus its payload.
///
/// Actions may read state but never write it; changes go through `commit`.
pub struct ActionContext<'a, S: StateTree = Value> {
    store: &'a Store<S>,
    payload: &'a Value,
}

impl<'a, S: StateTree> ActionContext<'a, S> {
    pub(crate) fn new(store: &'a Store<S>, payload: &'a Value) -> Self {
        Self { store, payload }
    }

    /// The payload passed to `dispatch`.
    pub fn payload(&self) -> &Value {
        self.payload
    }

    /// Commit a mutation on the owning store.
    pub fn commit(&self, key: &str, payload: Value) -> StoreResult<Value> {
        self.store.commit(key, payload)
    }

    /// Dispatch another action on the owning store.
    pub fn dispatch(&self, key: &str, payload: Value) -> StoreResult<Value> {
        self.store.dispatch(key, payload)
    }

    /// Read-only view of the current state.
    pub fn state(&self) -> StateReader<S> {
        self.store.state()
    }
}

/// What a mutation receives: the root view of the state and its payload.
pub struct MutationContext<'a, S: StateTree = Value> {
    /// Root accessor view; the only sanctioned way to write the tree.
    pub state: NodeView<S>,
    /// The payload passed to `commit`.
    pub payload: &'a Value,
}
