//! The store: canonical state, action/mutation tables and change propagation.
//!
//! Every change follows the same path:
//!
//! ```text
//! dispatch(action) -> commit(mutation) -> writes through NodeView
//!     -> re-walk (wrap new containers) -> fold into history -> change events
//! ```
//!
//! Writes made while a mutation runs are recorded and their change events
//! are queued; the queue is flushed once the outermost commit has re-walked
//! the tree and folded its history entry, so observers always see a
//! consistent tree. Mutation and silent-modification modes are depth
//! counters, which keeps nested commits (an action committing from inside
//! another commit, or `bulk_set` inside a mutation) well-formed.

use crate::bus::{EventBus, SubscriptionId};
use crate::context::{ActionContext, ActionFn, MutationContext, MutationFn};
use crate::history::{History, HistoryEntry};
use crate::value::{deep_diff, get_at_path, get_at_path_mut, lookup, nest_at, value_type_name};
use crate::view::{NodeView, ViewArena};
use crate::{
    ContainerView, Path, PathPatterns, Seg, StateReader, StateTree, StoreConfig, StoreError,
    StoreResult, UnauthorizedWritePolicy,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Event name used for state change notifications.
pub const STATE_CHANGED: &str = "state_changed";

/// Key of the built-in mutation that writes a field map at a path.
pub const SET_PROPERTY: &str = "set_property";

/// A single write requested through a view.
pub(crate) enum WriteOp {
    Set(String, Value),
    Push(Value),
    Remove(String),
}

impl WriteOp {
    fn target(&self, container: &Path) -> Path {
        match self {
            WriteOp::Set(key, _) | WriteOp::Remove(key) => {
                container.with_segment(Seg::key(key.as_str()))
            }
            WriteOp::Push(_) => container.clone(),
        }
    }
}

/// Outcome of applying a write to a container node.
struct Applied {
    seg: Seg,
    /// Later array elements moved, so every child view is invalid.
    shifted: bool,
}

/// Increments a depth counter for the guard's lifetime.
struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }

    fn depth(&self) -> usize {
        self.depth.get()
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

pub(crate) struct StoreInner<S: StateTree> {
    pub(crate) doc: RefCell<S>,
    pub(crate) arena: RefCell<ViewArena>,
    actions: HashMap<String, Rc<ActionFn<S>>>,
    mutations: HashMap<String, Rc<MutationFn<S>>>,
    bus: EventBus<Path>,
    history: RefCell<History>,
    mutation_depth: Cell<usize>,
    silent_depth: Cell<usize>,
    pending_events: RefCell<Vec<Path>>,
    config: StoreConfig,
}

impl<S: StateTree> StoreInner<S> {
    pub(crate) fn read(&self, path: &Path) -> StoreResult<Value> {
        let doc = self.doc.borrow();
        lookup(doc.tree(), path).cloned()
    }

    /// The single write path into the canonical tree.
    pub(crate) fn write(&self, container: &Path, op: WriteOp) -> StoreResult<()> {
        let tracked = self.mutation_depth.get() > 0;
        if !tracked && self.silent_depth.get() == 0 {
            let path = op.target(container);
            warn!(
                path = %path.to_dotted(),
                "do not set state directly, use an action or mutation"
            );
            return match self.config.unauthorized_writes {
                UnauthorizedWritePolicy::Ignore => Ok(()),
                UnauthorizedWritePolicy::Reject => Err(StoreError::UnauthorizedWrite { path }),
            };
        }

        let (applied, previous) = {
            let mut doc = self.doc.borrow_mut();
            let node = get_at_path_mut(doc.tree_mut(), container)
                .ok_or_else(|| StoreError::path_not_found(container.clone()))?;
            let previous = tracked.then(|| node.clone());
            (apply_write(node, container, op)?, previous)
        };

        {
            let mut arena = self.arena.borrow_mut();
            if applied.shifted {
                arena.evict_children(container);
            } else {
                arena.evict(&container.with_segment(applied.seg.clone()));
            }
        }

        if let Some(previous) = previous {
            self.history.borrow_mut().record(crate::FieldChange {
                path: container.clone(),
                field: applied.seg.component().into_owned(),
                previous,
            });
            self.pending_events
                .borrow_mut()
                .push(container.with_segment(applied.seg));
        }
        Ok(())
    }

    /// Register every container not yet wrapped.
    fn update_state(&self) {
        let doc = self.doc.borrow();
        self.arena.borrow_mut().wrap_tree(doc.tree());
    }

    /// Replace the tree contents without events or history.
    fn load_silently(&self, data: Value) -> StoreResult<()> {
        {
            let _silent = DepthGuard::enter(&self.silent_depth);
            self.doc.borrow_mut().load(data)?;
        }
        self.arena.borrow_mut().clear();
        self.update_state();
        Ok(())
    }

    /// Start history over from the current tree and rebuild every view.
    fn reset(&self) {
        let snapshot = self.doc.borrow().tree().clone();
        self.history.borrow_mut().reset(snapshot);
        self.arena.borrow_mut().clear();
        self.update_state();
    }

    fn commit_history_batch(&self, source: &str) {
        let snapshot = self.doc.borrow().tree().clone();
        self.history.borrow_mut().commit_batch(snapshot, source);
    }

    /// Fire a change event now, or queue it while a mutation is running.
    fn emit(&self, path: &Path) {
        if self.mutation_depth.get() > 0 {
            self.pending_events.borrow_mut().push(path.clone());
        } else {
            self.bus.fire(STATE_CHANGED, path);
        }
    }

    fn flush_events(&self) {
        let events = std::mem::take(&mut *self.pending_events.borrow_mut());
        let mut seen = HashSet::new();
        for path in events {
            if seen.insert(path.components()) {
                self.bus.fire(STATE_CHANGED, &path);
            }
        }
    }
}

fn apply_write(node: &mut Value, container: &Path, op: WriteOp) -> StoreResult<Applied> {
    let unchanged = |seg| Applied {
        seg,
        shifted: false,
    };
    match (node, op) {
        (Value::Object(obj), WriteOp::Set(key, value)) => {
            obj.insert(key.clone(), value);
            Ok(unchanged(Seg::Key(key)))
        }
        (Value::Object(obj), WriteOp::Remove(key)) => {
            obj.remove(&key);
            Ok(unchanged(Seg::Key(key)))
        }
        (Value::Object(_), WriteOp::Push(_)) => Err(StoreError::type_mismatch(
            container.clone(),
            "array",
            "object",
        )),
        (Value::Array(arr), WriteOp::Push(value)) => {
            arr.push(value);
            Ok(unchanged(Seg::Index(arr.len() - 1)))
        }
        (Value::Array(arr), WriteOp::Set(key, value)) => {
            let index = array_index(container, &key)?;
            match index.cmp(&arr.len()) {
                std::cmp::Ordering::Less => arr[index] = value,
                std::cmp::Ordering::Equal => arr.push(value),
                std::cmp::Ordering::Greater => {
                    return Err(StoreError::index_out_of_bounds(
                        container.clone(),
                        index,
                        arr.len(),
                    ))
                }
            }
            Ok(unchanged(Seg::Index(index)))
        }
        (Value::Array(arr), WriteOp::Remove(key)) => {
            let index = array_index(container, &key)?;
            if index >= arr.len() {
                return Err(StoreError::index_out_of_bounds(
                    container.clone(),
                    index,
                    arr.len(),
                ));
            }
            arr.remove(index);
            Ok(Applied {
                seg: Seg::Index(index),
                shifted: true,
            })
        }
        (leaf, _) => Err(StoreError::type_mismatch(
            container.clone(),
            "container",
            value_type_name(leaf),
        )),
    }
}

fn array_index(container: &Path, key: &str) -> StoreResult<usize> {
    Seg::key(key).as_index().ok_or_else(|| {
        StoreError::type_mismatch(container.with_segment(Seg::key(key)), "array index", "string")
    })
}

#[derive(Deserialize)]
struct SetPropertyPayload {
    value_object: Map<String, Value>,
    #[serde(default)]
    path: PathInput,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PathInput {
    Dotted(String),
    Segments(Path),
}

impl Default for PathInput {
    fn default() -> Self {
        PathInput::Segments(Path::root())
    }
}

/// Built-in mutation: write every field of `value_object` into the
/// container at `path` (root when omitted).
fn set_property<S: StateTree>(ctx: &MutationContext<'_, S>) -> StoreResult<Value> {
    let payload = SetPropertyPayload::deserialize(ctx.payload)
        .map_err(|e| StoreError::invalid_payload(format!("{SET_PROPERTY}: {e}")))?;
    let path = match payload.path {
        PathInput::Dotted(dotted) => Path::parse(&dotted),
        PathInput::Segments(path) => path,
    };

    let mut target = ctx.state.clone();
    for seg in &path {
        target = target.child(&seg.component())?;
    }
    for (key, value) in payload.value_object {
        target.set(&key, value)?;
    }
    Ok(Value::Null)
}

/// A centralized state container.
///
/// State changes only through registered mutations, committed directly or
/// from actions. Every completed mutation becomes an undoable history entry
/// and notifies the observers of the paths it touched.
///
/// `Store` is a cheap handle; clones share the same state. It is
/// single-threaded by construction.
///
/// # Example
///
/// ```
/// use keel_store::Store;
/// use serde_json::{json, Value};
///
/// let store = Store::builder(json!({"todos": []}))
///     .mutation("add_todo", |ctx| {
///         ctx.state.child("todos")?.push(ctx.payload.clone())?;
///         Ok(Value::Null)
///     })
///     .action("add_todo", |ctx| ctx.commit("add_todo", ctx.payload().clone()))
///     .build()
///     .unwrap();
///
/// store.dispatch("add_todo", json!({"title": "a"})).unwrap();
/// store.dispatch("add_todo", json!({"title": "b"})).unwrap();
/// assert_eq!(store.state().len("todos").unwrap(), 2);
///
/// store.undo().unwrap();
/// assert_eq!(store.state().len("todos").unwrap(), 1);
/// store.redo().unwrap();
/// assert_eq!(store.state().get("todos.1.title").unwrap(), "b");
/// ```
pub struct Store<S: StateTree = Value> {
    inner: Rc<StoreInner<S>>,
}

impl<S: StateTree> Store<S> {
    /// Start building a store around an initial state tree.
    pub fn builder(state: S) -> StoreBuilder<S> {
        StoreBuilder::new(state)
    }

    pub(crate) fn from_inner(inner: Rc<StoreInner<S>>) -> Self {
        Self { inner }
    }

    /// Read-only view of the state.
    pub fn state(&self) -> StateReader<S> {
        StateReader::new(Rc::clone(&self.inner))
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    fn root_view(&self) -> NodeView<S> {
        let root = Path::root();
        let id = self.inner.arena.borrow_mut().register(&root);
        NodeView::new(Rc::downgrade(&self.inner), id, root)
    }

    /// Run the action registered under `key` and return its result.
    pub fn dispatch(&self, key: &str, payload: Value) -> StoreResult<Value> {
        let action = self
            .inner
            .actions
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::ActionNotFound {
                key: key.to_owned(),
            })?;
        debug!(action = key, "dispatch");
        action(&ActionContext::new(self, &payload))
    }

    /// Run the mutation registered under `key` and return its result.
    ///
    /// The outermost commit re-walks the tree, records a history entry
    /// (unless an update group is open) and then notifies observers. A
    /// mutation that fails part-way keeps the writes it made before failing;
    /// they are recorded like any other.
    pub fn commit(&self, key: &str, payload: Value) -> StoreResult<Value> {
        let mutation = self
            .inner
            .mutations
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::MutationNotFound {
                key: key.to_owned(),
            })?;

        let result = {
            let guard = DepthGuard::enter(&self.inner.mutation_depth);
            debug!(mutation = key, depth = guard.depth(), "commit");
            let ctx = MutationContext {
                state: self.root_view(),
                payload: &payload,
            };
            let result = mutation(&ctx);
            self.inner.update_state();

            let group_open = self.inner.history.borrow().has_checkpoint();
            if guard.depth() == 1 && !group_open {
                self.inner.commit_history_batch(key);
            }
            result
        };

        if self.inner.mutation_depth.get() == 0 {
            self.inner.flush_events();
        }
        result
    }

    /// Repopulate the canonical tree from plain data and restart history.
    ///
    /// The existing tree is reloaded in place through [`StateTree::load`].
    pub fn initialize_state(&self, data: Value) -> StoreResult<()> {
        {
            let _silent = DepthGuard::enter(&self.inner.silent_depth);
            self.inner.doc.borrow_mut().load(data)?;
        }
        self.inner.reset();
        self.inner.emit(&Path::root());
        Ok(())
    }

    /// Open an update group at `path` by checkpointing the subtree there.
    ///
    /// Mutations committed until [`end_update`](Self::end_update) share one
    /// history entry. Groups do not nest: opening a second group replaces
    /// the first one's checkpoint.
    pub fn begin_update(&self, path: impl Into<Path>) -> StoreResult<()> {
        let path = path.into();
        let checkpoint = self.read_path(&path)?;
        if let Some(replaced) = self.inner.history.borrow_mut().begin(path.clone(), checkpoint) {
            warn!(
                replaced = %replaced.to_dotted(),
                path = %path.to_dotted(),
                "update group opened while another was open; replacing its checkpoint"
            );
        }
        debug!(path = %path.to_dotted(), "update group opened");
        Ok(())
    }

    /// Close the update group and notify observers of `path`.
    ///
    /// The change event fires even when no group is open.
    pub fn end_update(&self, path: impl Into<Path>) {
        let path = path.into();
        let checkpoint = self.inner.history.borrow_mut().take_checkpoint();
        if let Some(checkpoint) = checkpoint {
            let (snapshot, diff) = {
                let doc = self.inner.doc.borrow();
                let current = get_at_path(doc.tree(), &path).cloned().unwrap_or(Value::Null);
                let diff = deep_diff(&checkpoint.value, &current).map(|d| nest_at(&path, d));
                (doc.tree().clone(), diff)
            };
            debug!(
                path = %path.to_dotted(),
                opened_at = %checkpoint.path.to_dotted(),
                changed = diff.is_some(),
                "update group closed"
            );
            self.inner.history.borrow_mut().commit_group(
                snapshot,
                diff,
                format!("update_group:{}", path.to_dotted()),
            );
        }
        self.inner.emit(&path);
    }

    /// Revert to the previous history entry.
    ///
    /// History only moves once the state tree has accepted the snapshot, so
    /// a failed load leaves both the tree and the stacks as they were.
    pub fn undo(&self) -> StoreResult<()> {
        let snapshot = self.inner.history.borrow().undo_target()?;
        self.inner.load_silently(snapshot)?;
        self.inner.history.borrow_mut().undo();
        debug!(history = self.history_len(), future = self.future_len(), "undo");
        self.inner.emit(&Path::root());
        Ok(())
    }

    /// Reapply the most recently undone entry.
    pub fn redo(&self) -> StoreResult<()> {
        let snapshot = self.inner.history.borrow().redo_target()?;
        self.inner.load_silently(snapshot)?;
        self.inner.history.borrow_mut().redo();
        debug!(history = self.history_len(), future = self.future_len(), "redo");
        self.inner.emit(&Path::root());
        Ok(())
    }

    /// Call `callback` with the changed path whenever a change concerns
    /// one of `paths`.
    ///
    /// Paths are dot-delimited; `@each` matches any single component and a
    /// path matches every change beneath it. Root-level changes (undo,
    /// redo, initialization) notify every observer.
    pub fn observe_path(
        &self,
        paths: impl Into<PathPatterns>,
        callback: impl Fn(&Path) + 'static,
    ) -> SubscriptionId {
        let patterns: PathPatterns = paths.into();
        debug!(?patterns, "observer added");
        self.inner.bus.subscribe(
            STATE_CHANGED,
            callback,
            Some(Box::new(move |changed: &Path| patterns.matches(changed))),
        )
    }

    /// Remove an observer. Unknown ids are logged and ignored.
    pub fn unobserve(&self, id: SubscriptionId) {
        self.inner.bus.unsubscribe(STATE_CHANGED, id);
    }

    /// Value at `path`; fails with `PathNotFound` if a component is missing.
    pub fn get_value_at_path(&self, path: impl Into<Path>) -> StoreResult<Value> {
        self.read_path(&path.into())
    }

    fn read_path(&self, path: &Path) -> StoreResult<Value> {
        self.inner.read(path)
    }

    /// Write through the root view without events or history.
    ///
    /// Meant for hydrating state that should not become an undo step.
    /// Inside a running mutation, writes are recorded as usual.
    pub fn silently<R>(&self, f: impl FnOnce(&NodeView<S>) -> R) -> R {
        let result = {
            let _silent = DepthGuard::enter(&self.inner.silent_depth);
            f(&self.root_view())
        };
        self.inner.update_state();
        result
    }

    /// Borrow the canonical tree read-only.
    ///
    /// `f` must not commit or dispatch; the tree stays borrowed while it runs.
    pub fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.doc.borrow())
    }

    /// Clone of the history stack, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.borrow().entries().to_vec()
    }

    /// Number of history entries, including the base entry.
    pub fn history_len(&self) -> usize {
        self.inner.history.borrow().len()
    }

    /// Number of entries available to redo.
    pub fn future_len(&self) -> usize {
        self.inner.history.borrow().future_len()
    }

    pub fn can_undo(&self) -> bool {
        self.history_len() > 1
    }

    pub fn can_redo(&self) -> bool {
        self.future_len() > 0
    }

    /// Whether an update group is open.
    pub fn is_update_open(&self) -> bool {
        self.inner.history.borrow().has_checkpoint()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.bus.subscriber_count(STATE_CHANGED)
    }

    /// Number of container nodes currently wrapped by views.
    pub fn wrapped_nodes(&self) -> usize {
        self.inner.arena.borrow().len()
    }
}

impl<S: StateTree> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: StateTree> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.inner.actions.keys().collect();
        actions.sort();
        let mut mutations: Vec<_> = self.inner.mutations.keys().collect();
        mutations.sort();
        f.debug_struct("Store")
            .field("actions", &actions)
            .field("mutations", &mutations)
            .field("history", &self.history_len())
            .field("future", &self.future_len())
            .field("observers", &self.observer_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for [`Store`].
///
/// Registering the same action or mutation key twice is reported by
/// [`build`](Self::build). A mutation named [`SET_PROPERTY`] replaces the
/// built-in one.
pub struct StoreBuilder<S: StateTree> {
    state: S,
    actions: HashMap<String, Rc<ActionFn<S>>>,
    mutations: HashMap<String, Rc<MutationFn<S>>>,
    config: StoreConfig,
    wiring_error: Option<StoreError>,
}

impl<S: StateTree> StoreBuilder<S> {
    fn new(state: S) -> Self {
        Self {
            state,
            actions: HashMap::new(),
            mutations: HashMap::new(),
            config: StoreConfig::default(),
            wiring_error: None,
        }
    }

    /// Register an action.
    pub fn action<F>(mut self, key: impl Into<String>, action: F) -> Self
    where
        F: Fn(&ActionContext<'_, S>) -> StoreResult<Value> + 'static,
    {
        let key = key.into();
        if self.actions.contains_key(&key) {
            if self.wiring_error.is_none() {
                self.wiring_error = Some(StoreError::DuplicateAction(key));
            }
            return self;
        }
        self.actions.insert(key, Rc::new(action));
        self
    }

    /// Register a mutation.
    pub fn mutation<F>(mut self, key: impl Into<String>, mutation: F) -> Self
    where
        F: Fn(&MutationContext<'_, S>) -> StoreResult<Value> + 'static,
    {
        let key = key.into();
        if self.mutations.contains_key(&key) {
            if self.wiring_error.is_none() {
                self.wiring_error = Some(StoreError::DuplicateMutation(key));
            }
            return self;
        }
        self.mutations.insert(key, Rc::new(mutation));
        self
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Adopt the initial state and create the store.
    pub fn build(self) -> StoreResult<Store<S>> {
        if let Some(err) = self.wiring_error {
            return Err(err);
        }
        let mut mutations = self.mutations;
        let builtin: Rc<MutationFn<S>> = Rc::new(set_property::<S>);
        mutations.entry(SET_PROPERTY.to_owned()).or_insert(builtin);

        let inner = Rc::new(StoreInner {
            doc: RefCell::new(self.state),
            arena: RefCell::new(ViewArena::default()),
            actions: self.actions,
            mutations,
            bus: EventBus::new(),
            history: RefCell::new(History::new(&self.config)),
            mutation_depth: Cell::new(0),
            silent_depth: Cell::new(0),
            pending_events: RefCell::new(Vec::new()),
            config: self.config,
        });
        inner.reset();
        inner.emit(&Path::root());
        Ok(Store::from_inner(inner))
    }
}
