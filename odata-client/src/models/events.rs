//! Observer registry for model and collection events

use super::Model;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Field path to error codes (`required`, `maxlength`), nested fields dotted
pub type ValidationErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A field value changed
    Change,
    /// The entity was re-read from a response
    Sync,
    /// A persistence request was issued
    Request,
    /// The entity was deleted on the service
    Destroy,
    /// Validation failed
    Invalid,
    /// A collection gained a model
    Add,
    /// A collection dropped or flagged a model
    Remove,
    /// A collection reconciled a batch of items
    Assign,
    /// Local changes were discarded
    Reset,
}

/// Outcome of a collection reconciliation
#[derive(Debug, Clone, Default)]
pub struct AssignBuckets {
    pub added: Vec<Model>,
    pub merged: Vec<Model>,
    pub removed: Vec<Model>,
}

#[derive(Debug, Clone)]
pub struct ModelEvent {
    pub kind: EventKind,
    /// Where the event happened, relative to the emitter (`Location.City`, `[2].Name`)
    pub path: String,
    pub value: Option<Value>,
    pub previous: Option<Value>,
    pub errors: Option<ValidationErrors>,
    pub buckets: Option<AssignBuckets>,
}

impl ModelEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            path: String::new(),
            value: None,
            previous: None,
            errors: None,
            buckets: None,
        }
    }

    pub fn change(path: impl Into<String>, value: Value, previous: Option<Value>) -> Self {
        Self {
            path: path.into(),
            value: Some(value),
            previous,
            ..Self::new(EventKind::Change)
        }
    }

    pub fn invalid(errors: ValidationErrors) -> Self {
        Self {
            errors: Some(errors),
            ..Self::new(EventKind::Invalid)
        }
    }

    pub fn assign(buckets: AssignBuckets) -> Self {
        Self {
            buckets: Some(buckets),
            ..Self::new(EventKind::Assign)
        }
    }

    /// The same event seen from a parent at `prefix`
    pub fn nested(&self, prefix: &str) -> Self {
        let path = match (self.path.is_empty(), self.path.starts_with('[')) {
            (true, _) => prefix.to_string(),
            (false, true) => format!("{}{}", prefix, self.path),
            (false, false) => format!("{}.{}", prefix, self.path),
        };
        Self {
            path,
            ..self.clone()
        }
    }
}

type Listener = Rc<dyn Fn(&ModelEvent)>;
type Listeners = RefCell<Vec<(u64, Listener)>>;

/// Listener list shared by a model or collection and its handles
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Rc<Listeners>,
    next_id: Rc<Cell<u64>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it stays registered while the subscription lives
    pub fn subscribe(&self, listener: impl Fn(&ModelEvent) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        Subscription {
            id,
            listeners: Rc::downgrade(&self.listeners),
        }
    }

    /// Call every listener; listeners may subscribe or unsubscribe meanwhile
    pub fn emit(&self, event: &ModelEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn downgrade(&self) -> WeakEmitter {
        WeakEmitter {
            listeners: Rc::downgrade(&self.listeners),
            next_id: Rc::downgrade(&self.next_id),
        }
    }
}

/// Handle that unregisters its listener when dropped
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish()
    }
}

/// Record of a child forwarding its events to a parent under `path`
#[derive(Debug)]
pub struct ParentLink {
    pub path: String,
    _subscription: Subscription,
}

impl ParentLink {
    /// Forward everything `child` emits to `parent`, prefixed with `path`
    pub fn bubble(child: &EventEmitter, parent: &EventEmitter, path: impl Into<String>) -> Self {
        let path = path.into();
        let prefix = path.clone();
        let parent = parent.downgrade();
        let subscription = child.subscribe(move |event| {
            if let Some(parent) = parent.upgrade() {
                parent.emit(&event.nested(&prefix));
            }
        });
        Self {
            path,
            _subscription: subscription,
        }
    }

    /// Link around an already registered forwarding listener
    pub(crate) fn from_subscription(path: impl Into<String>, subscription: Subscription) -> Self {
        Self {
            path: path.into(),
            _subscription: subscription,
        }
    }
}

/// Non-owning emitter handle, so children never keep parents alive
#[derive(Clone)]
pub struct WeakEmitter {
    listeners: Weak<Listeners>,
    next_id: Weak<Cell<u64>>,
}

impl WeakEmitter {
    pub fn upgrade(&self) -> Option<EventEmitter> {
        Some(EventEmitter {
            listeners: self.listeners.upgrade()?,
            next_id: self.next_id.upgrade()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_drop_unregisters() {
        let emitter = EventEmitter::new();
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let subscription = emitter.subscribe(move |_| counter.set(counter.get() + 1));

        emitter.emit(&ModelEvent::new(EventKind::Sync));
        drop(subscription);
        emitter.emit(&ModelEvent::new(EventKind::Sync));

        assert_eq!(seen.get(), 1);
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_bubbled_paths() {
        let child = EventEmitter::new();
        let parent = EventEmitter::new();
        let paths = Rc::new(RefCell::new(Vec::new()));
        let sink = paths.clone();
        let _listen = parent.subscribe(move |e| sink.borrow_mut().push(e.path.clone()));
        let _link = ParentLink::bubble(&child, &parent, "Location");

        child.emit(&ModelEvent::change("City", json!("Boise"), None));
        child.emit(&ModelEvent::change("[1].Name", json!("x"), None));
        child.emit(&ModelEvent::new(EventKind::Sync));

        assert_eq!(
            *paths.borrow(),
            vec!["Location.City", "Location[1].Name", "Location"]
        );
    }

    #[test]
    fn test_parent_link_does_not_keep_parent_alive() {
        let child = EventEmitter::new();
        let link = {
            let parent = EventEmitter::new();
            ParentLink::bubble(&child, &parent, "x")
        };
        child.emit(&ModelEvent::new(EventKind::Change));
        assert_eq!(link.path, "x");
    }
}
