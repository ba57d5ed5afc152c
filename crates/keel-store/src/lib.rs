//! Centralized state container with mutation-gated writes, undo/redo
//! history and path-scoped change notification.
//!
//! State lives in a single tree of JSON values. Code outside the store reads
//! it through [`StateReader`]; writes happen only inside registered
//! mutations, through the [`NodeView`] accessors they receive. Actions are
//! the entry point for callers: they may read state and commit mutations.
//!
//! # Quick start
//!
//! ```
//! use keel_store::{Store, Value};
//! use serde_json::json;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let store = Store::builder(json!({"todos": [], "filter": "all"}))
//!     .mutation("add_todo", |ctx| {
//!         let title = ctx.payload["title"].clone();
//!         ctx.state.child("todos")?.push(json!({"title": title, "done": false}))?;
//!         Ok(Value::Null)
//!     })
//!     .action("add_todo", |ctx| ctx.commit("add_todo", ctx.payload().clone()))
//!     .build()
//!     .unwrap();
//!
//! let changes = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&changes);
//! store.observe_path("todos", move |_| counter.set(counter.get() + 1));
//!
//! store.dispatch("add_todo", json!({"title": "write docs"})).unwrap();
//! assert_eq!(changes.get(), 1);
//! assert_eq!(store.state().get("todos.0.title").unwrap(), "write docs");
//!
//! // built-in field writer
//! store
//!     .commit("set_property", json!({"value_object": {"done": true}, "path": ["todos", 0]}))
//!     .unwrap();
//! assert_eq!(store.state().get("todos.0.done").unwrap(), true);
//!
//! store.undo().unwrap();
//! assert_eq!(store.state().get("todos.0.done").unwrap(), false);
//! ```

pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod path;
pub mod state;
pub mod store;
pub mod value;
pub mod view;

pub use bus::{EventBus, SubscriptionId};
pub use config::{StoreConfig, UnauthorizedWritePolicy};
pub use context::{ActionContext, ActionFn, MutationContext, MutationFn};
pub use error::{HistoryOp, StoreError, StoreResult};
pub use history::{EntryKind, FieldChange, HistoryEntry};
pub use path::{Path, PathPattern, PathPatterns, Seg, WILDCARD};
pub use state::{StateReader, StateTree};
pub use store::{Store, StoreBuilder, SET_PROPERTY, STATE_CHANGED};
pub use value::{deep_diff, get_at_path, lookup, nest_at, value_type_name, ValueKind};
pub use view::{ContainerView, NodeId, NodeView};

pub use serde_json::Value;
