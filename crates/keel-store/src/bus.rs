//! Named-event pub/sub with per-subscriber predicates.
//!
//! The bus is synchronous and single-threaded: `fire` invokes matching
//! callbacks in registration order before returning. Handlers are collected
//! before any of them runs, so callbacks may subscribe, unsubscribe or fire
//! again without conflicting with the dispatch in progress.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{trace, warn};
use uuid::Uuid;

/// Identifier returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Callback<A> = Rc<dyn Fn(&A)>;
type Predicate<A> = Rc<dyn Fn(&A) -> bool>;

struct Handler<A: ?Sized> {
    id: SubscriptionId,
    callback: Callback<A>,
    predicate: Option<Predicate<A>>,
}

/// Event bus keyed by event name, carrying arguments of type `A`.
pub struct EventBus<A: ?Sized> {
    handlers: RefCell<HashMap<String, Vec<Handler<A>>>>,
}

impl<A: ?Sized> EventBus<A> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(HashMap::new()),
        }
    }

    /// Register `callback` for `event`.
    ///
    /// When `predicate` is given, the callback only runs for arguments the
    /// predicate accepts.
    pub fn subscribe(
        &self,
        event: &str,
        callback: impl Fn(&A) + 'static,
        predicate: Option<Box<dyn Fn(&A) -> bool>>,
    ) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.handlers
            .borrow_mut()
            .entry(event.to_owned())
            .or_default()
            .push(Handler {
                id,
                callback: Rc::new(callback),
                predicate: predicate.map(Rc::from),
            });
        trace!(event, %id, "subscribed");
        id
    }

    /// Remove a subscription.
    ///
    /// Unknown events and ids are logged and otherwise ignored, so removing
    /// the same subscription twice is harmless.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) {
        let mut handlers = self.handlers.borrow_mut();
        let Some(list) = handlers.get_mut(event) else {
            warn!(event, %id, "removing subscription for nonexistent event");
            return;
        };
        match list.iter().position(|h| h.id == id) {
            Some(pos) => {
                list.remove(pos);
                trace!(event, %id, "unsubscribed");
            }
            None => warn!(event, %id, "removing nonexistent subscription"),
        }
    }

    /// Invoke every subscriber of `event` whose predicate accepts `args`.
    ///
    /// Returns the number of callbacks invoked. Predicate panics propagate.
    pub fn fire(&self, event: &str, args: &A) -> usize {
        let snapshot: Vec<(Callback<A>, Option<Predicate<A>>)> =
            match self.handlers.borrow().get(event) {
                Some(list) => list
                    .iter()
                    .map(|h| (Rc::clone(&h.callback), h.predicate.clone()))
                    .collect(),
                None => return 0,
            };

        let mut invoked = 0;
        for (callback, predicate) in snapshot {
            if predicate.map_or(true, |accepts| accepts(args)) {
                callback(args);
                invoked += 1;
            }
        }
        invoked
    }

    /// Number of live subscriptions for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.handlers.borrow().get(event).map_or(0, Vec::len)
    }

    /// Whether `id` is subscribed to `event`.
    pub fn is_subscribed(&self, event: &str, id: SubscriptionId) -> bool {
        self.handlers
            .borrow()
            .get(event)
            .is_some_and(|list| list.iter().any(|h| h.id == id))
    }
}

impl<A: ?Sized> Default for EventBus<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> fmt::Debug for EventBus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.borrow();
        let mut map = f.debug_map();
        for (event, list) in handlers.iter() {
            map.entry(event, &list.len());
        }
        map.finish()
    }
}
