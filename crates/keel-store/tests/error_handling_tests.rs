//! Write gating, stale views, typed reads and wiring errors.

mod common;

use keel_store::{
    ContainerView, NodeView, StateTree, Store, StoreConfig, StoreError, StoreResult,
    UnauthorizedWritePolicy, Value,
};
use serde::Deserialize;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Slot = Rc<RefCell<Option<NodeView>>>;

/// A store whose `grab` mutation leaks a view of the container at its
/// payload path.
fn leaky_store(config: StoreConfig) -> (Store, Slot) {
    common::init_tracing();
    let slot: Slot = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&slot);
    let store = Store::builder(json!({
        "settings": {"theme": "light"},
        "items": [{"n": 0}, {"n": 1}]
    }))
    .config(config)
    .mutation("grab", move |ctx| {
        let mut view = ctx.state.clone();
        for key in ctx.payload.as_str().unwrap_or_default().split('.') {
            view = view.child(key)?;
        }
        *sink.borrow_mut() = Some(view);
        Ok(Value::Null)
    })
    .mutation("replace_items", |ctx| {
        ctx.state.set("items", json!([{"n": 9}]))?;
        Ok(Value::Null)
    })
    .mutation("drop_first", |ctx| {
        ctx.state.child("items")?.remove("0")?;
        Ok(Value::Null)
    })
    .build()
    .unwrap();
    (store, slot)
}

fn grab(store: &Store, slot: &Slot, path: &str) -> NodeView {
    store.commit("grab", json!(path)).unwrap();
    slot.borrow_mut().take().unwrap()
}

// ============================================================================
// Writes outside mutations
// ============================================================================

#[test]
fn test_unauthorized_write_is_ignored_by_default() {
    let (store, slot) = leaky_store(StoreConfig::default());
    let settings = grab(&store, &slot, "settings");
    let history = store.history_len();

    settings.set("theme", json!("dark")).unwrap();

    assert_eq!(store.get_value_at_path("settings.theme").unwrap(), "light");
    assert_eq!(store.history_len(), history);
}

#[test]
fn test_unauthorized_write_rejected_when_configured() {
    let config =
        StoreConfig::default().with_unauthorized_writes(UnauthorizedWritePolicy::Reject);
    let (store, slot) = leaky_store(config);
    let settings = grab(&store, &slot, "settings");

    let err = settings.set("theme", json!("dark")).unwrap_err();
    match err {
        StoreError::UnauthorizedWrite { path } => assert_eq!(path.to_dotted(), "settings.theme"),
        other => panic!("unexpected error: {other}"),
    }
    let err = settings.remove("theme").unwrap_err();
    assert!(matches!(err, StoreError::UnauthorizedWrite { .. }));
    assert_eq!(store.get_value_at_path("settings.theme").unwrap(), "light");
}

#[test]
fn test_leaked_view_still_reads() {
    let (store, slot) = leaky_store(StoreConfig::default());
    let settings = grab(&store, &slot, "settings");
    assert_eq!(settings.get("theme").unwrap(), Some(json!("light")));
    assert_eq!(settings.get("missing").unwrap(), None);
    assert_eq!(settings.store_path(), "settings");
    assert_eq!(settings.keys().unwrap(), vec!["theme"]);
}

// ============================================================================
// Stale views
// ============================================================================

#[test]
fn test_replaced_node_makes_view_stale() {
    let (store, slot) = leaky_store(StoreConfig::default());
    let item = grab(&store, &slot, "items.0");
    assert!(item.is_live());

    store.commit("replace_items", Value::Null).unwrap();

    assert!(!item.is_live());
    assert!(matches!(item.value(), Err(StoreError::StaleView { .. })));
    // a fresh view addresses the new node
    let fresh = grab(&store, &slot, "items.0");
    assert_eq!(fresh.value().unwrap(), json!({"n": 9}));
    assert_ne!(fresh.id(), item.id());
}

#[test]
fn test_array_remove_invalidates_element_views() {
    let (store, slot) = leaky_store(StoreConfig::default());
    let second = grab(&store, &slot, "items.1");
    let items = grab(&store, &slot, "items");

    store.commit("drop_first", Value::Null).unwrap();

    assert!(!second.is_live());
    assert!(items.is_live());
    assert_eq!(items.len().unwrap(), 1);
}

#[test]
fn test_undo_invalidates_views() {
    let (store, slot) = leaky_store(StoreConfig::default());
    store.commit("replace_items", Value::Null).unwrap();
    let item = grab(&store, &slot, "items.0");

    store.undo().unwrap();

    assert!(matches!(item.get("n"), Err(StoreError::StaleView { .. })));
}

#[test]
fn test_view_dropped_with_store() {
    let (store, slot) = leaky_store(StoreConfig::default());
    let settings = grab(&store, &slot, "settings");
    drop(store);
    assert!(!settings.is_live());
}

// ============================================================================
// Navigation errors inside mutations
// ============================================================================

#[test]
fn test_child_errors() {
    let (store, _slot) = leaky_store(StoreConfig::default());
    let err = store.commit("grab", json!("settings.theme")).unwrap_err();
    assert!(matches!(
        err,
        StoreError::TypeMismatch {
            found: "string",
            ..
        }
    ));
    let err = store.commit("grab", json!("nowhere")).unwrap_err();
    assert!(matches!(err, StoreError::PathNotFound { .. }));
    assert!(!err.is_not_found());
}

#[test]
fn test_push_onto_object_fails() {
    let store = Store::builder(json!({"settings": {}}))
        .mutation("bad_push", |ctx| {
            ctx.state.child("settings")?.push(json!(1))?;
            Ok(Value::Null)
        })
        .build()
        .unwrap();
    let err = store.commit("bad_push", Value::Null).unwrap_err();
    assert!(matches!(err, StoreError::TypeMismatch { expected: "array", .. }));
}

// ============================================================================
// Reads
// ============================================================================

#[derive(Debug, Deserialize, PartialEq)]
struct Todo {
    title: String,
    done: bool,
}

#[test]
fn test_typed_reads() {
    let store = common::todo_store();
    store.dispatch("add_todo", json!({"title": "a"})).unwrap();

    let todos: Vec<Todo> = store.state().get_as("todos").unwrap();
    assert_eq!(
        todos,
        vec![Todo {
            title: "a".into(),
            done: false
        }]
    );
    let err = store.state().get_as::<Todo>("filter").unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));
}

#[test]
fn test_missing_paths() {
    let store = common::todo_store();
    let reader = store.state();

    assert!(matches!(
        reader.get("todos.0"),
        Err(StoreError::IndexOutOfBounds { index: 0, len: 0, .. })
    ));
    assert!(matches!(
        reader.get("settings.nope"),
        Err(StoreError::PathNotFound { .. })
    ));
    assert!(reader.try_get("settings.nope").is_none());
    assert!(!reader.contains("settings.nope"));
    assert!(reader.contains("settings.theme"));
    assert!(matches!(
        reader.len("filter"),
        Err(StoreError::TypeMismatch { .. })
    ));
}

// ============================================================================
// Custom state trees
// ============================================================================

struct Counted {
    doc: Value,
    loads: usize,
}

impl StateTree for Counted {
    fn tree(&self) -> &Value {
        &self.doc
    }

    fn tree_mut(&mut self) -> &mut Value {
        &mut self.doc
    }

    fn load(&mut self, data: Value) -> StoreResult<()> {
        if !data.is_object() {
            return Err(StoreError::invalid_payload("state must be an object"));
        }
        self.doc = data;
        self.loads += 1;
        Ok(())
    }
}

#[test]
fn test_state_tree_is_reloaded_in_place() {
    let store = Store::builder(Counted {
        doc: json!({"count": 0}),
        loads: 0,
    })
    .mutation("inc", |ctx| {
        let count = ctx.state.get("count")?.and_then(|v| v.as_i64()).unwrap_or(0);
        ctx.state.set("count", json!(count + 1))?;
        Ok(Value::Null)
    })
    .build()
    .unwrap();

    store.commit("inc", Value::Null).unwrap();
    store.undo().unwrap();
    store.redo().unwrap();
    assert_eq!(store.inspect(|s| s.loads), 2);

    store.initialize_state(json!({"count": 10})).unwrap();
    assert_eq!(store.inspect(|s| s.loads), 3);
    assert_eq!(store.get_value_at_path("count").unwrap(), 10);

    assert!(store.initialize_state(json!([1, 2])).is_err());
    assert_eq!(store.get_value_at_path("count").unwrap(), 10);
}

// ============================================================================
// Wiring
// ============================================================================

#[test]
fn test_duplicate_registration_fails_build() {
    let err = Store::builder(json!({}))
        .action("go", |_| Ok(Value::Null))
        .action("go", |_| Ok(Value::Null))
        .build()
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateAction(ref key) if key == "go"));

    let err = Store::builder(json!({}))
        .mutation("set", |_| Ok(Value::Null))
        .mutation("set", |_| Ok(Value::Null))
        .build()
        .unwrap_err();
    assert_eq!(err.to_string(), "mutation already registered: set");
}

#[test]
fn test_config_from_json() {
    let config = StoreConfig::from_json(
        r#"{"unauthorized_writes": "reject", "history_limit": 2}"#,
    )
    .unwrap();
    assert_eq!(config.unauthorized_writes, UnauthorizedWritePolicy::Reject);
    assert!(config.clear_redo_on_commit);

    let store = common::todo_store_with(config);
    store.dispatch("add_many", json!(["a", "b", "c"])).unwrap();
    assert_eq!(store.history_len(), 2);
    assert_eq!(store.config().history_limit, Some(2));
}

// ============================================================================
// Failed loads during undo/redo
// ============================================================================

/// Tree whose `load` fails while the shared switch is on.
struct Flaky {
    doc: Value,
    failing: Rc<Cell<bool>>,
}

impl StateTree for Flaky {
    fn tree(&self) -> &Value {
        &self.doc
    }

    fn tree_mut(&mut self) -> &mut Value {
        &mut self.doc
    }

    fn load(&mut self, data: Value) -> StoreResult<()> {
        if self.failing.get() {
            return Err(StoreError::invalid_payload("storage unavailable"));
        }
        self.doc = data;
        Ok(())
    }
}

fn flaky_store() -> (Store<Flaky>, Rc<Cell<bool>>) {
    common::init_tracing();
    let failing = Rc::new(Cell::new(false));
    let store = Store::builder(Flaky {
        doc: json!({"n": 0}),
        failing: Rc::clone(&failing),
    })
    .mutation("inc", |ctx| {
        let n = ctx.state.get("n")?.and_then(|v| v.as_i64()).unwrap_or(0);
        ctx.state.set("n", json!(n + 1))?;
        Ok(Value::Null)
    })
    .build()
    .unwrap();
    store.commit("inc", Value::Null).unwrap();
    store.commit("inc", Value::Null).unwrap();
    (store, failing)
}

#[test]
fn test_failed_undo_keeps_history() {
    let (store, failing) = flaky_store();

    failing.set(true);
    assert!(store.undo().is_err());
    assert_eq!(store.get_value_at_path("n").unwrap(), 2);
    assert_eq!((store.history_len(), store.future_len()), (3, 0));

    failing.set(false);
    store.undo().unwrap();
    assert_eq!(store.get_value_at_path("n").unwrap(), 1);
    assert_eq!((store.history_len(), store.future_len()), (2, 1));
}

#[test]
fn test_failed_redo_keeps_future() {
    let (store, failing) = flaky_store();
    store.undo().unwrap();

    failing.set(true);
    assert!(store.redo().is_err());
    assert_eq!(store.get_value_at_path("n").unwrap(), 1);
    assert_eq!((store.history_len(), store.future_len()), (2, 1));

    failing.set(false);
    store.redo().unwrap();
    assert_eq!(store.get_value_at_path("n").unwrap(), 2);
    assert!(!store.can_redo());
}

// ============================================================================
// Keys containing dots
// ============================================================================

#[test]
fn test_dotted_key_view_survives_nested_replacement() {
    let slot: Slot = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&slot);
    let store = Store::builder(json!({"a.b": {"x": 1}, "a": {"b": {"x": 2}}}))
        .mutation("grab_dotted", move |ctx| {
            *sink.borrow_mut() = Some(ctx.state.child("a.b")?);
            Ok(Value::Null)
        })
        .mutation("replace_a", |ctx| {
            ctx.state.set("a", json!({"b": {"x": 3}}))?;
            Ok(Value::Null)
        })
        .build()
        .unwrap();

    store.commit("grab_dotted", Value::Null).unwrap();
    let dotted = slot.borrow_mut().take().unwrap();
    store.commit("replace_a", Value::Null).unwrap();

    assert!(dotted.is_live());
    assert_eq!(dotted.get("x").unwrap(), Some(json!(1)));
}
