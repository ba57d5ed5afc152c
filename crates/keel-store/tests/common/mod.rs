//! Shared fixtures for integration tests.

#![allow(dead_code)]

use keel_store::{ContainerView, Path, Store, StoreConfig, StoreError, Value};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

/// Install a test-writer subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn initial_todos() -> Value {
    json!({
        "todos": [],
        "filter": "all",
        "settings": {"theme": "light", "compact": false}
    })
}

fn payload_index(payload: &Value) -> Result<usize, StoreError> {
    payload["index"]
        .as_u64()
        .map(|i| i as usize)
        .ok_or_else(|| StoreError::invalid_payload("expected numeric `index`"))
}

/// A todo-list store wired the way an application would wire it.
pub fn todo_store() -> Store {
    todo_store_with(StoreConfig::default())
}

pub fn todo_store_with(config: StoreConfig) -> Store {
    init_tracing();
    Store::builder(initial_todos())
        .config(config)
        .mutation("add_todo", |ctx| {
            let title = ctx.payload["title"].clone();
            ctx.state
                .child("todos")?
                .push(json!({"title": title, "done": false}))?;
            Ok(Value::Null)
        })
        .mutation("toggle_todo", |ctx| {
            let item = ctx.state.child("todos")?.item(payload_index(ctx.payload)?)?;
            let done = item.get("done")?.and_then(|v| v.as_bool()).unwrap_or(false);
            item.set("done", json!(!done))?;
            Ok(json!(!done))
        })
        .mutation("rename_todo", |ctx| {
            let item = ctx.state.child("todos")?.item(payload_index(ctx.payload)?)?;
            item.set("title", ctx.payload["title"].clone())?;
            Ok(Value::Null)
        })
        .mutation("remove_todo", |ctx| {
            let index = payload_index(ctx.payload)?;
            ctx.state.child("todos")?.remove(&index.to_string())?;
            Ok(Value::Null)
        })
        .mutation("set_filter", |ctx| {
            ctx.state.set("filter", ctx.payload.clone())?;
            Ok(Value::Null)
        })
        .action("add_todo", |ctx| ctx.commit("add_todo", ctx.payload().clone()))
        .action("toggle_todo", |ctx| {
            ctx.commit("toggle_todo", ctx.payload().clone())
        })
        .action("rename_todo", |ctx| {
            ctx.commit("rename_todo", ctx.payload().clone())
        })
        .action("remove_todo", |ctx| {
            ctx.commit("remove_todo", ctx.payload().clone())
        })
        .action("set_filter", |ctx| ctx.commit("set_filter", ctx.payload().clone()))
        .action("add_many", |ctx| {
            let titles = ctx
                .payload()
                .as_array()
                .cloned()
                .ok_or_else(|| StoreError::invalid_payload("expected an array of titles"))?;
            for title in titles {
                ctx.commit("add_todo", json!({"title": title}))?;
            }
            Ok(Value::Null)
        })
        .action("count_open", |ctx| {
            let todos: Vec<Value> = ctx.state().get_as("todos")?;
            let open = todos.iter().filter(|t| t["done"] == false).count();
            Ok(json!(open))
        })
        .build()
        .expect("todo store wiring")
}

/// Record every changed path an observer of `paths` is notified with.
pub fn record(store: &Store, paths: &str) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    store.observe_path(paths, move |changed: &Path| {
        sink.borrow_mut().push(changed.to_dotted())
    });
    seen
}

pub fn titles(store: &Store) -> Vec<String> {
    store
        .state()
        .get_as::<Vec<Value>>("todos")
        .expect("todos array")
        .into_iter()
        .map(|t| t["title"].as_str().unwrap_or_default().to_owned())
        .collect()
}
