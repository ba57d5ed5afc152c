//! Write-gated accessor views over container nodes of the state tree.
//!
//! A [`NodeView`] addresses one array or object by path. Reads go straight
//! to the canonical tree. Writes are routed through the store, which
//! decides from its current mode whether to record and apply them (inside a
//! mutation), apply them quietly (silent modification), or refuse them.
//!
//! Views are registered in a [`ViewArena`], a side table keyed by path
//! components and node id. The store re-walks the tree after every mutation and
//! registers containers it has not seen; replacing a container evicts its
//! entry and every entry beneath it, so views of the old node go stale.

use crate::store::{StoreInner, WriteOp};
use crate::value::{is_container, value_type_name};
use crate::{Path, Seg, StateTree, StoreError, StoreResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Identity of a registered container node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Side table of wrapped container nodes.
#[derive(Debug, Default)]
pub(crate) struct ViewArena {
    next: u64,
    /// Keyed by components, so an object key containing `.` stays distinct
    /// from the nested path spelled the same way.
    by_path: HashMap<Vec<String>, NodeId>,
    paths: HashMap<NodeId, Path>,
}

impl ViewArena {
    /// Register the node at `path`, or return its existing id.
    pub(crate) fn register(&mut self, path: &Path) -> NodeId {
        let key = path.components();
        if let Some(id) = self.by_path.get(&key) {
            return *id;
        }
        let id = NodeId(self.next);
        self.next += 1;
        self.by_path.insert(key, id);
        self.paths.insert(id, path.clone());
        id
    }

    pub(crate) fn id_of(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(&path.components()).copied()
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.paths.contains_key(&id)
    }

    /// Evict `path` and every node beneath it.
    pub(crate) fn evict(&mut self, path: &Path) {
        self.retain(|p| !path.is_prefix_of(p));
    }

    /// Evict every node strictly beneath `path`.
    pub(crate) fn evict_children(&mut self, path: &Path) {
        self.retain(|p| p.len() <= path.len() || !path.is_prefix_of(p));
    }

    fn retain(&mut self, keep: impl Fn(&Path) -> bool) {
        self.paths.retain(|_, p| keep(p));
        let paths = &self.paths;
        self.by_path.retain(|_, id| paths.contains_key(id));
    }

    /// Forget every node. Ids are never reused.
    pub(crate) fn clear(&mut self) {
        self.by_path.clear();
        self.paths.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.paths.len()
    }

    /// Register every container in `tree` that has no entry yet.
    pub(crate) fn wrap_tree(&mut self, tree: &Value) {
        let mut path = Path::root();
        self.register(&path);
        self.wrap_children(tree, &mut path);
    }

    fn wrap_children(&mut self, node: &Value, path: &mut Path) {
        let children: Vec<(Seg, &Value)> = match node {
            Value::Object(obj) => obj.iter().map(|(k, v)| (Seg::key(k.as_str()), v)).collect(),
            Value::Array(arr) => arr.iter().enumerate().map(|(i, v)| (Seg::index(i), v)).collect(),
            _ => return,
        };
        for (seg, child) in children.into_iter().filter(|(_, v)| is_container(v)) {
            path.push(seg);
            self.wrap_children(child, path);
            if self.id_of(path).is_none() {
                self.register(path);
            }
            path.pop();
        }
    }
}

/// Controlled access to one container of the state tree.
///
/// Keys are object keys or, for arrays, decimal indices (`"0"`).
pub trait ContainerView {
    /// Path of this node from the root.
    fn path(&self) -> &Path;

    /// Dot-joined form of [`path`](Self::path).
    fn store_path(&self) -> String {
        self.path().to_dotted()
    }

    /// Read a field. Returns `None` when the field does not exist.
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Write a field, subject to the store's write gating.
    fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Write several fields at once by committing `set_property` for this path.
    fn bulk_set(&self, values: Map<String, Value>) -> StoreResult<()>;
}

/// Accessor view over a container node.
///
/// Handed to mutations as their `state`; only writes made while a mutation
/// (or a silent modification) is running reach the tree.
pub struct NodeView<S: StateTree = Value> {
    store: Weak<StoreInner<S>>,
    id: NodeId,
    path: Path,
}

impl<S: StateTree> NodeView<S> {
    pub(crate) fn new(store: Weak<StoreInner<S>>, id: NodeId, path: Path) -> Self {
        Self { store, id, path }
    }

    /// Arena id of the node this view wraps.
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn resolve(&self) -> StoreResult<Rc<StoreInner<S>>> {
        let inner = self.store.upgrade().ok_or_else(|| self.stale())?;
        if !inner.arena.borrow().contains(self.id) {
            return Err(self.stale());
        }
        Ok(inner)
    }

    fn stale(&self) -> StoreError {
        StoreError::StaleView {
            path: self.path.clone(),
        }
    }

    /// Clone of the whole node.
    pub fn value(&self) -> StoreResult<Value> {
        let inner = self.resolve()?;
        inner.read(&self.path)
    }

    /// Whether the view still addresses a live node.
    pub fn is_live(&self) -> bool {
        self.resolve().is_ok()
    }

    /// View of a nested container.
    ///
    /// Fails with `PathNotFound` when the field is missing and
    /// `TypeMismatch` when it holds a leaf value.
    pub fn child(&self, key: &str) -> StoreResult<NodeView<S>> {
        let inner = self.resolve()?;
        let seg = {
            let doc = inner.doc.borrow();
            let node = crate::value::lookup(doc.tree(), &self.path)?;
            let seg = match node {
                Value::Array(_) => Seg::key(key)
                    .as_index()
                    .map(Seg::index)
                    .ok_or_else(|| {
                        StoreError::type_mismatch(self.path.clone(), "object", "array")
                    })?,
                _ => Seg::key(key),
            };
            let child_path = self.path.with_segment(seg.clone());
            let child = crate::value::lookup(doc.tree(), &child_path)?;
            if !is_container(child) {
                return Err(StoreError::type_mismatch(
                    child_path,
                    "container",
                    value_type_name(child),
                ));
            }
            seg
        };
        let child_path = self.path.with_segment(seg);
        let id = inner.arena.borrow_mut().register(&child_path);
        Ok(NodeView::new(Rc::downgrade(&inner), id, child_path))
    }

    /// View of an array element.
    pub fn item(&self, index: usize) -> StoreResult<NodeView<S>> {
        self.child(&index.to_string())
    }

    /// Append to an array node.
    pub fn push(&self, value: Value) -> StoreResult<()> {
        let inner = self.resolve()?;
        inner.write(&self.path, WriteOp::Push(value))
    }

    /// Remove a field (or array element, shifting later ones down).
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        let inner = self.resolve()?;
        inner.write(&self.path, WriteOp::Remove(key.to_owned()))
    }

    /// Number of fields or elements.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(match self.value()? {
            Value::Array(arr) => arr.len(),
            Value::Object(obj) => obj.len(),
            _ => 0,
        })
    }

    /// Whether the node has no fields or elements.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Field names, or decimal indices for arrays.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(match self.value()? {
            Value::Array(arr) => (0..arr.len()).map(|i| i.to_string()).collect(),
            Value::Object(obj) => obj.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    /// Position of the first array element accepted by `predicate`.
    pub fn position(&self, predicate: impl Fn(&Value) -> bool) -> StoreResult<Option<usize>> {
        Ok(match self.value()? {
            Value::Array(arr) => arr.iter().position(predicate),
            _ => None,
        })
    }
}

impl<S: StateTree> ContainerView for NodeView<S> {
    fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let inner = self.resolve()?;
        let doc = inner.doc.borrow();
        let node = crate::value::lookup(doc.tree(), &self.path)?;
        Ok(crate::value::child(node, &Seg::key(key)).cloned())
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let inner = self.resolve()?;
        inner.write(&self.path, WriteOp::Set(key.to_owned(), value))
    }

    fn bulk_set(&self, values: Map<String, Value>) -> StoreResult<()> {
        let inner = self.resolve()?;
        let payload = serde_json::json!({
            "value_object": values,
            "path": self.path,
        });
        crate::Store::from_inner(inner).commit(crate::SET_PROPERTY, payload)?;
        Ok(())
    }
}

impl<S: StateTree> Clone for NodeView<S> {
    fn clone(&self) -> Self {
        Self {
            store: Weak::clone(&self.store),
            id: self.id,
            path: self.path.clone(),
        }
    }
}

impl<S: StateTree> fmt::Debug for NodeView<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeView")
            .field("id", &self.id)
            .field("path", &self.path.to_dotted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_wrap_tree_registers_every_container() {
        let mut arena = ViewArena::default();
        arena.wrap_tree(&json!({
            "todos": [{"title": "a"}, {"title": "b"}],
            "settings": {"theme": "dark"},
            "count": 3
        }));
        // root, todos, todos.0, todos.1, settings
        assert_eq!(arena.len(), 5);
        assert!(arena.id_of(&path!("todos", 1)).is_some());
        assert!(arena.id_of(&Path::parse("count")).is_none());
    }

    #[test]
    fn test_wrap_tree_keeps_existing_ids() {
        let mut arena = ViewArena::default();
        let tree = json!({"todos": [{"title": "a"}]});
        arena.wrap_tree(&tree);
        let before = arena.id_of(&Path::parse("todos.0")).unwrap();
        arena.wrap_tree(&tree);
        assert_eq!(arena.id_of(&Path::parse("todos.0")), Some(before));
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn test_evict_subtree() {
        let mut arena = ViewArena::default();
        arena.wrap_tree(&json!({"todos": [{"a": {}}, {}], "other": {}}));
        let todos = arena.id_of(&Path::parse("todos")).unwrap();

        arena.evict_children(&Path::parse("todos"));
        assert!(arena.contains(todos));
        assert!(arena.id_of(&Path::parse("todos.0")).is_none());
        assert!(arena.id_of(&Path::parse("todos.0.a")).is_none());

        arena.evict(&Path::parse("todos"));
        assert!(!arena.contains(todos));
        assert!(arena.id_of(&Path::parse("other")).is_some());
    }

    #[test]
    fn test_dotted_key_is_distinct_from_nested_path() {
        let mut arena = ViewArena::default();
        arena.wrap_tree(&json!({"a.b": {}, "a": {"b": {}}}));
        let dotted = arena.id_of(&Path::root().key("a.b")).unwrap();
        let nested = arena.id_of(&path!("a", "b")).unwrap();
        assert_ne!(dotted, nested);

        arena.evict(&Path::parse("a"));
        assert!(arena.contains(dotted));
        assert!(!arena.contains(nested));
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut arena = ViewArena::default();
        let first = arena.register(&Path::parse("a"));
        arena.clear();
        let second = arena.register(&Path::parse("a"));
        assert_ne!(first, second);
    }
}
