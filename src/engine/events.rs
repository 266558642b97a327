//! Events - Listener registry and bubbling dispatch.
//!
//! # API
//!
//! - `Document::add_listener(node, kind, fn)` - Listen on one node
//! - `Document::remove_listener(id)` - Stop listening
//! - `Document::dispatch(event)` - Run listeners on the target, then its
//!   ancestors when the event bubbles
//! - [`HandlerTable`] - One handler per (node, event name), evicted on release

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use super::document::{Document, NodeId};
use crate::error::DomError;
use crate::types::EventHandler;

// =============================================================================
// TYPES
// =============================================================================

/// Keyboard modifier state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    pub fn alt() -> Self {
        Self {
            alt: true,
            ..Self::default()
        }
    }

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An event dispatched through the document.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Event name, e.g. "click", "keydown", "animationend".
    pub kind: String,
    /// Node the event was dispatched at.
    pub target: NodeId,
    /// Key name for keyboard events (e.g. "Enter", "Escape", "a").
    pub key: Option<String>,
    pub modifiers: Modifiers,
    pub bubbles: bool,
    stopped: Cell<bool>,
}

impl Event {
    /// A bubbling event.
    pub fn new(kind: impl Into<String>, target: NodeId) -> Self {
        Self {
            kind: kind.into(),
            target,
            key: None,
            modifiers: Modifiers::none(),
            bubbles: true,
            stopped: Cell::new(false),
        }
    }

    pub fn click(target: NodeId) -> Self {
        Self::new("click", target)
    }

    pub fn key_down(target: NodeId, key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::new("keydown", target)
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn animation_end(target: NodeId) -> Self {
        Self {
            bubbles: false,
            ..Self::new("animationend", target)
        }
    }

    pub fn transition_end(target: NodeId) -> Self {
        Self {
            bubbles: false,
            ..Self::new("transitionend", target)
        }
    }

    /// Keep the event from reaching ancestors.
    pub fn stop_propagation(&self) {
        self.stopped.set(true);
    }

    pub fn is_key(&self, key: &str) -> bool {
        self.key.as_deref() == Some(key)
    }
}

/// Handle returned by [`Document::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId {
    node: NodeId,
    seq: u64,
}

type Listener = (u64, String, Rc<dyn Fn(&Event)>);

#[derive(Default)]
pub(super) struct Listeners {
    next: u64,
    by_node: HashMap<NodeId, Vec<Listener>>,
}

impl Listeners {
    pub(super) fn clear_node(&mut self, node: NodeId) {
        self.by_node.remove(&node);
    }
}

// =============================================================================
// EVENT DISPATCH
// =============================================================================

impl Document {
    pub fn add_listener(
        &self,
        node: NodeId,
        kind: &str,
        handler: impl Fn(&Event) + 'static,
    ) -> Result<ListenerId, DomError> {
        if !self.exists(node) {
            return Err(DomError::Missing(node));
        }
        let mut listeners = self.inner.listeners.borrow_mut();
        let seq = listeners.next;
        listeners.next += 1;
        listeners
            .by_node
            .entry(node)
            .or_default()
            .push((seq, kind.to_string(), Rc::new(handler)));
        Ok(ListenerId { node, seq })
    }

    /// Returns false if the listener was already removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let Some(list) = listeners.by_node.get_mut(&id.node) else {
            return false;
        };
        let before = list.len();
        list.retain(|(seq, _, _)| *seq != id.seq);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.by_node.remove(&id.node);
        }
        removed
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.inner
            .listeners
            .borrow()
            .by_node
            .get(&node)
            .map_or(0, Vec::len)
    }

    /// Dispatch `event`. Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &Event) -> usize {
        let path: Vec<NodeId> = if event.bubbles {
            std::iter::successors(Some(event.target), |n| self.parent(*n)).collect()
        } else {
            vec![event.target]
        };

        let mut invoked = 0;
        for node in path {
            // Clone out so handlers may add or remove listeners.
            let handlers: Vec<Rc<dyn Fn(&Event)>> = self
                .inner
                .listeners
                .borrow()
                .by_node
                .get(&node)
                .map(|list| {
                    list.iter()
                        .filter(|(_, kind, _)| *kind == event.kind)
                        .map(|(_, _, handler)| handler.clone())
                        .collect()
                })
                .unwrap_or_default();
            for handler in handlers {
                handler(event);
                invoked += 1;
            }
            if event.stopped.get() {
                break;
            }
        }
        invoked
    }
}

// =============================================================================
// HANDLER TABLE
// =============================================================================

type HandlerKey = (NodeId, String);

/// Per-node table of handlers bound through `"!event"` keys.
///
/// Binding a name again replaces the previous handler on that node. Entries
/// are evicted when the node is released.
#[derive(Clone, Default)]
pub struct HandlerTable {
    inner: Rc<RefCell<TableInner>>,
}

#[derive(Default)]
struct TableInner {
    entries: HashMap<HandlerKey, ListenerId>,
    /// Nodes carrying an eviction hook. One hook per node, whatever the
    /// number of bind/unbind cycles.
    hooked: HashSet<NodeId>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(
        &self,
        doc: &Document,
        node: NodeId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), DomError> {
        self.unbind(doc, node, event);

        let id = doc.add_listener(node, event, move |e| handler.call(e))?;
        let needs_hook = {
            let mut inner = self.inner.borrow_mut();
            inner.entries.insert((node, event.to_string()), id);
            inner.hooked.insert(node)
        };

        if needs_hook {
            let table: Weak<RefCell<TableInner>> = Rc::downgrade(&self.inner);
            doc.on_release(node, move || {
                if let Some(table) = table.upgrade() {
                    let mut table = table.borrow_mut();
                    table.hooked.remove(&node);
                    table.entries.retain(|(n, _), _| *n != node);
                }
            })?;
        }
        Ok(())
    }

    /// Returns whether a handler was bound.
    pub fn unbind(&self, doc: &Document, node: NodeId, event: &str) -> bool {
        let previous = self
            .inner
            .borrow_mut()
            .entries
            .remove(&(node, event.to_string()));
        match previous {
            Some(id) => {
                doc.remove_listener(id);
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self, node: NodeId, event: &str) -> bool {
        self.inner
            .borrow()
            .entries
            .contains_key(&(node, event.to_string()))
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }
}
