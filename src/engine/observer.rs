//! Mutation observer.
//!
//! Every change to a [`Document`] produces [`MutationRecord`]s. Observers
//! subscribe with a [`MutationKind`] filter and receive the records of one
//! operation as a batch, after the document has released its internal
//! borrows.

use std::rc::Rc;

use bitflags::bitflags;

use super::document::{Document, NodeId};

bitflags! {
    /// Kinds of change an observer can filter on.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MutationKind: u8 {
        /// A node was inserted under `target`.
        const ATTACH = 1 << 0;
        /// A node was removed from `target`.
        const DETACH = 1 << 1;
        /// An attribute or the class list of `target` changed.
        const ATTRIBUTES = 1 << 2;
        /// The own text of `target` changed.
        const TEXT = 1 << 3;
    }
}

/// One change to the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// The node whose children, attributes or text changed.
    pub target: NodeId,
    /// The inserted or removed child, for ATTACH/DETACH.
    pub node: Option<NodeId>,
    /// The attribute name, for ATTRIBUTES.
    pub name: Option<String>,
}

impl MutationRecord {
    pub(super) fn attach(parent: NodeId, child: NodeId) -> Self {
        Self {
            kind: MutationKind::ATTACH,
            target: parent,
            node: Some(child),
            name: None,
        }
    }

    pub(super) fn detach(parent: NodeId, child: NodeId) -> Self {
        Self {
            kind: MutationKind::DETACH,
            target: parent,
            node: Some(child),
            name: None,
        }
    }

    pub(super) fn attribute(target: NodeId, name: &str) -> Self {
        Self {
            kind: MutationKind::ATTRIBUTES,
            target,
            node: None,
            name: Some(name.to_string()),
        }
    }

    pub(super) fn text(target: NodeId) -> Self {
        Self {
            kind: MutationKind::TEXT,
            target,
            node: None,
            name: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type MutationCallback = Rc<dyn Fn(&[MutationRecord])>;

#[derive(Default)]
pub(super) struct Observers {
    next: u64,
    entries: Vec<(ObserverId, MutationKind, MutationCallback)>,
}

impl Observers {
    fn add(&mut self, kinds: MutationKind, callback: MutationCallback) -> ObserverId {
        let id = ObserverId(self.next);
        self.next += 1;
        self.entries.push((id, kinds, callback));
        id
    }

    fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _, _)| *entry != id);
        self.entries.len() != before
    }
}

impl Document {
    /// Subscribe to changes of the given kinds.
    pub fn observe(
        &self,
        kinds: MutationKind,
        callback: impl Fn(&[MutationRecord]) + 'static,
    ) -> ObserverId {
        self.inner
            .observers
            .borrow_mut()
            .add(kinds, Rc::new(callback))
    }

    /// Returns false if the observer was already disconnected.
    pub fn disconnect(&self, id: ObserverId) -> bool {
        self.inner.observers.borrow_mut().remove(id)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().entries.len()
    }

    pub(super) fn notify(&self, records: Vec<MutationRecord>) {
        if records.is_empty() {
            return;
        }
        let present = records
            .iter()
            .fold(MutationKind::empty(), |acc, r| acc | r.kind);
        let targets: Vec<(MutationKind, MutationCallback)> = self
            .inner
            .observers
            .borrow()
            .entries
            .iter()
            .filter(|(_, kinds, _)| kinds.intersects(present))
            .map(|(_, kinds, cb)| (*kinds, cb.clone()))
            .collect();

        for (kinds, callback) in targets {
            if kinds.contains(present) {
                callback(&records);
            } else {
                let batch: Vec<MutationRecord> = records
                    .iter()
                    .filter(|r| kinds.intersects(r.kind))
                    .cloned()
                    .collect();
                callback(&batch);
            }
        }
    }
}

// =============================================================================
// Attachment notifier
// =============================================================================

/// Source of "something was attached or detached" signals.
///
/// The lifecycle coordinator holds one subscription for all of its waits and
/// re-checks [`is_attached`](Self::is_attached) for each pending node.
pub trait AttachmentNotifier {
    fn subscribe(&self, callback: Rc<dyn Fn()>) -> ObserverId;
    fn unsubscribe(&self, id: ObserverId);
    fn is_attached(&self, node: NodeId) -> bool;
}

impl AttachmentNotifier for Document {
    fn subscribe(&self, callback: Rc<dyn Fn()>) -> ObserverId {
        self.observe(MutationKind::ATTACH | MutationKind::DETACH, move |_| {
            callback()
        })
    }

    fn unsubscribe(&self, id: ObserverId) {
        self.disconnect(id);
    }

    fn is_attached(&self, node: NodeId) -> bool {
        Document::is_attached(self, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_observer_filters_by_kind() {
        let doc = Document::new();
        let el = doc.create_element("div");

        let structural = Rc::new(RefCell::new(Vec::new()));
        let s = structural.clone();
        doc.observe(MutationKind::ATTACH | MutationKind::DETACH, move |records| {
            s.borrow_mut().extend(records.iter().cloned());
        });

        doc.set_attr(el, "title", "x").unwrap();
        assert!(structural.borrow().is_empty());

        doc.append_child(doc.body(), el).unwrap();
        assert_eq!(
            *structural.borrow(),
            vec![MutationRecord::attach(doc.body(), el)]
        );
    }

    #[test]
    fn test_move_emits_detach_then_attach() {
        let doc = Document::new();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        let item = doc.create_element("span");
        doc.append_child(a, item).unwrap();

        let kinds = Rc::new(RefCell::new(Vec::new()));
        let k = kinds.clone();
        doc.observe(MutationKind::all(), move |records| {
            k.borrow_mut().extend(records.iter().map(|r| (r.kind, r.target)));
        });

        doc.append_child(b, item).unwrap();
        assert_eq!(
            *kinds.borrow(),
            vec![(MutationKind::DETACH, a), (MutationKind::ATTACH, b)]
        );
    }

    #[test]
    fn test_disconnect() {
        let doc = Document::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let id = doc.subscribe(Rc::new(move || h.set(h.get() + 1)));

        let el = doc.create_element("div");
        doc.append_child(doc.body(), el).unwrap();
        assert_eq!(hits.get(), 1);

        doc.unsubscribe(id);
        assert_eq!(doc.observer_count(), 0);
        doc.remove(el).unwrap();
        assert_eq!(hits.get(), 1);
    }
}
