//! Document - Element arena with DOM move semantics.
//!
//! Manages the lifecycle of element nodes:
//! - Generation-checked [`NodeId`] handles into a slot arena
//! - Free slot pool for O(1) reuse after [`Document::release`]
//! - Release hooks so side tables can evict per-node entries
//! - Mutation records for every structural, attribute and text change
//!
//! Inserting a node that already has a parent moves it (one DETACH record
//! followed by one ATTACH record). Nodes removed from the tree stay alive
//! until released.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::events::Listeners;
use super::observer::{MutationRecord, Observers};
use super::style::{Animation, Stylesheet};
use super::timers::Clock;
use crate::error::DomError;
use crate::types::Scalar;

// =============================================================================
// Node handles
// =============================================================================

/// Handle to an element in a [`Document`].
///
/// A released slot bumps its generation, so stale handles never alias a node
/// allocated later in the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

// =============================================================================
// Arena
// =============================================================================

#[derive(Clone, Debug, Default)]
pub(super) struct Node {
    pub(super) tag: String,
    pub(super) attrs: IndexMap<String, String>,
    pub(super) classes: IndexSet<String>,
    pub(super) props: HashMap<String, Scalar>,
    pub(super) text: String,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Default)]
pub(super) struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Arena {
    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId { index, generation: 0 }
        }
    }

    fn free(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index())
            && slot.generation == id.generation
            && slot.node.take().is_some()
        {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
        }
    }

    pub(super) fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.get(id).ok_or(DomError::Missing(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.get_mut(id).ok_or(DomError::Missing(id))
    }

    fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.get(id)?.parent?;
        let siblings = &self.get(parent)?.children;
        let pos = siblings.iter().position(|c| *c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Unlink `id` from its parent. Returns the former parent.
    fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.get_mut(id)?.parent.take()?;
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        Some(parent)
    }

    /// `id` and all its descendants in pre-order.
    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get(current) {
                out.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn clone_rec(&mut self, id: NodeId) -> Option<NodeId> {
        let mut source = self.get(id)?.clone();
        let children = std::mem::take(&mut source.children);
        source.parent = None;
        let copy = self.alloc(source);
        for child in children {
            if let Some(child_copy) = self.clone_rec(child) {
                if let Some(node) = self.get_mut(child_copy) {
                    node.parent = Some(copy);
                }
                if let Some(node) = self.get_mut(copy) {
                    node.children.push(child_copy);
                }
            }
        }
        Some(copy)
    }
}

// =============================================================================
// Document
// =============================================================================

type ReleaseHook = Box<dyn FnOnce()>;

pub(super) struct DocumentInner {
    pub(super) arena: RefCell<Arena>,
    pub(super) body: NodeId,
    pub(super) clock: Clock,
    pub(super) observers: RefCell<Observers>,
    pub(super) listeners: RefCell<Listeners>,
    pub(super) release_hooks: RefCell<HashMap<NodeId, Vec<ReleaseHook>>>,
    pub(super) stylesheet: RefCell<Stylesheet>,
}

/// Shared handle to an element tree. Cloning is cheap.
#[derive(Clone)]
pub struct Document {
    pub(super) inner: Rc<DocumentInner>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("body", &self.inner.body)
            .field("live_nodes", &self.live_nodes())
            .finish()
    }
}

impl Document {
    /// Create a document with an empty `body` and a fresh clock.
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    pub fn with_clock(clock: Clock) -> Self {
        let mut arena = Arena::default();
        let body = arena.alloc(Node {
            tag: "body".into(),
            ..Node::default()
        });
        Self {
            inner: Rc::new(DocumentInner {
                arena: RefCell::new(arena),
                body,
                clock,
                observers: RefCell::new(Observers::default()),
                listeners: RefCell::new(Listeners::default()),
                release_hooks: RefCell::new(HashMap::new()),
                stylesheet: RefCell::new(Stylesheet::default()),
            }),
        }
    }

    /// Root of the attached tree.
    pub fn body(&self) -> NodeId {
        self.inner.body
    }

    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Whether two handles refer to the same document.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn live_nodes(&self) -> usize {
        self.inner.arena.borrow().live()
    }

    fn read<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        self.inner.arena.borrow().get(id).map(f)
    }

    // -------------------------------------------------------------------------
    // Creation
    // -------------------------------------------------------------------------

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.inner.arena.borrow_mut().alloc(Node {
            tag: tag.to_ascii_lowercase(),
            ..Node::default()
        })
    }

    /// Deep copy of `id` and its descendants, detached. Listeners are not
    /// copied.
    pub fn clone_subtree(&self, id: NodeId) -> Result<NodeId, DomError> {
        self.inner
            .arena
            .borrow_mut()
            .clone_rec(id)
            .ok_or(DomError::Missing(id))
    }

    pub fn exists(&self, id: NodeId) -> bool {
        self.inner.arena.borrow().get(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<String> {
        self.read(id, |n| n.tag.clone())
    }

    // -------------------------------------------------------------------------
    // Attributes, classes and properties
    // -------------------------------------------------------------------------

    /// Attribute value. `class` reads back the class list.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<String> {
        self.read(id, |n| {
            if name == "class" {
                if n.classes.is_empty() {
                    None
                } else {
                    Some(n.classes.iter().cloned().collect::<Vec<_>>().join(" "))
                }
            } else {
                n.attrs.get(name).cloned()
            }
        })
        .flatten()
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn attr_names(&self, id: NodeId) -> Vec<String> {
        self.read(id, |n| {
            let mut names: Vec<String> = n.attrs.keys().cloned().collect();
            if !n.classes.is_empty() {
                names.push("class".into());
            }
            names
        })
        .unwrap_or_default()
    }

    pub fn set_attr(&self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let changed = {
            let mut arena = self.inner.arena.borrow_mut();
            let node = arena.node_mut(id)?;
            if name == "class" {
                let classes: IndexSet<String> =
                    value.split_whitespace().map(str::to_string).collect();
                let changed = classes != node.classes;
                node.classes = classes;
                changed
            } else {
                node.attrs.insert(name.to_string(), value.to_string()).as_deref() != Some(value)
            }
        };
        if changed {
            self.notify(vec![MutationRecord::attribute(id, name)]);
        }
        Ok(())
    }

    /// Returns whether the attribute was present.
    pub fn remove_attr(&self, id: NodeId, name: &str) -> Result<bool, DomError> {
        let removed = {
            let mut arena = self.inner.arena.borrow_mut();
            let node = arena.node_mut(id)?;
            if name == "class" {
                let had = !node.classes.is_empty();
                node.classes.clear();
                had
            } else {
                node.attrs.shift_remove(name).is_some()
            }
        };
        if removed {
            self.notify(vec![MutationRecord::attribute(id, name)]);
        }
        Ok(removed)
    }

    pub fn classes(&self, id: NodeId) -> Vec<String> {
        self.read(id, |n| n.classes.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.read(id, |n| n.classes.contains(class)).unwrap_or(false)
    }

    /// Returns whether the class was newly added.
    pub fn add_class(&self, id: NodeId, class: &str) -> Result<bool, DomError> {
        let added = self
            .inner
            .arena
            .borrow_mut()
            .node_mut(id)?
            .classes
            .insert(class.to_string());
        if added {
            self.notify(vec![MutationRecord::attribute(id, "class")]);
        }
        Ok(added)
    }

    /// Returns whether the class was present.
    pub fn remove_class(&self, id: NodeId, class: &str) -> Result<bool, DomError> {
        let removed = self
            .inner
            .arena
            .borrow_mut()
            .node_mut(id)?
            .classes
            .shift_remove(class);
        if removed {
            self.notify(vec![MutationRecord::attribute(id, "class")]);
        }
        Ok(removed)
    }

    /// Property at a dotted path, e.g. `value` or `style.color`.
    pub fn prop(&self, id: NodeId, path: &str) -> Option<Scalar> {
        self.read(id, |n| n.props.get(path).cloned()).flatten()
    }

    /// Set a property. Null clears it. Properties emit no mutation records.
    pub fn set_prop(&self, id: NodeId, path: &str, value: Scalar) -> Result<(), DomError> {
        let mut arena = self.inner.arena.borrow_mut();
        let node = arena.node_mut(id)?;
        if value.is_null() {
            node.props.remove(path);
        } else {
            node.props.insert(path.to_string(), value);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Text
    // -------------------------------------------------------------------------

    /// Text content of `id` and its descendants, in document order.
    pub fn text(&self, id: NodeId) -> String {
        let arena = self.inner.arena.borrow();
        arena
            .subtree(id)
            .into_iter()
            .filter_map(|n| arena.get(n).map(|node| node.text.clone()))
            .collect()
    }

    /// Replace all content of `id` with `text`. Former children are detached,
    /// not released.
    pub fn set_text(&self, id: NodeId, text: &str) -> Result<(), DomError> {
        let mut records = Vec::new();
        {
            let mut arena = self.inner.arena.borrow_mut();
            let children = std::mem::take(&mut arena.node_mut(id)?.children);
            for child in children {
                if let Some(node) = arena.get_mut(child) {
                    node.parent = None;
                }
                records.push(MutationRecord::detach(id, child));
            }
            let node = arena.node_mut(id)?;
            if node.text != text {
                node.text = text.to_string();
                records.push(MutationRecord::text(id));
            }
        }
        self.notify(records);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Tree navigation
    // -------------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.read(id, |n| n.parent).flatten()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.read(id, |n| n.children.clone()).unwrap_or_default()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.inner.arena.borrow().next_sibling(id)
    }

    /// Descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut all = self.inner.arena.borrow().subtree(id);
        if !all.is_empty() {
            all.remove(0);
        }
        all
    }

    /// Whether `node` is `ancestor` or inside it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.inner.arena.borrow().is_inclusive_ancestor(ancestor, node)
    }

    /// Whether `id` is connected to the body.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(self.inner.body, id)
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference` (or last). A child that
    /// already has a parent is moved.
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        let mut records = Vec::with_capacity(2);
        {
            let mut arena = self.inner.arena.borrow_mut();
            arena.node(parent)?;
            arena.node(child)?;
            if arena.is_inclusive_ancestor(child, parent) {
                return Err(DomError::Hierarchy { parent, child });
            }

            let reference = if reference == Some(child) {
                arena.next_sibling(child)
            } else {
                reference
            };
            if let Some(r) = reference
                && arena.get(r).and_then(|n| n.parent) != Some(parent)
            {
                return Err(DomError::NotAChild {
                    parent,
                    reference: r,
                });
            }

            if let Some(old) = arena.detach(child) {
                records.push(MutationRecord::detach(old, child));
            }
            let node = arena.node_mut(parent)?;
            let pos = reference
                .and_then(|r| node.children.iter().position(|c| *c == r))
                .unwrap_or(node.children.len());
            node.children.insert(pos, child);
            arena.node_mut(child)?.parent = Some(parent);
            records.push(MutationRecord::attach(parent, child));
        }
        self.notify(records);
        Ok(())
    }

    /// Detach `id` from its parent. Returns whether it had one.
    pub fn remove(&self, id: NodeId) -> Result<bool, DomError> {
        let old = {
            let mut arena = self.inner.arena.borrow_mut();
            arena.node(id)?;
            arena.detach(id)
        };
        match old {
            Some(parent) => {
                self.notify(vec![MutationRecord::detach(parent, id)]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Detach every child of `parent`, then append `children` in order.
    ///
    /// Every new child is checked before anything is touched. Content that
    /// already matches is left alone.
    pub fn replace_children(&self, parent: NodeId, children: &[NodeId]) -> Result<(), DomError> {
        {
            let arena = self.inner.arena.borrow();
            let node = arena.node(parent)?;
            if node.children == children && node.text.is_empty() {
                return Ok(());
            }
            for child in children {
                arena.node(*child)?;
                if arena.is_inclusive_ancestor(*child, parent) {
                    return Err(DomError::Hierarchy {
                        parent,
                        child: *child,
                    });
                }
            }
        }
        for child in self.children(parent) {
            self.remove(child)?;
        }
        self.set_text(parent, "")?;
        for child in children {
            self.append_child(parent, *child)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Release
    // -------------------------------------------------------------------------

    /// Run `hook` when `id` is released.
    pub fn on_release(&self, id: NodeId, hook: impl FnOnce() + 'static) -> Result<(), DomError> {
        if !self.exists(id) {
            return Err(DomError::Missing(id));
        }
        self.inner
            .release_hooks
            .borrow_mut()
            .entry(id)
            .or_default()
            .push(Box::new(hook));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn release_hook_count(&self, id: NodeId) -> usize {
        self.inner.release_hooks.borrow().get(&id).map_or(0, Vec::len)
    }

    /// Detach `id` and free it with all its descendants. Release hooks run
    /// before the slots are freed, so they can still read the nodes.
    pub fn release(&self, id: NodeId) -> Result<(), DomError> {
        let subtree = {
            let arena = self.inner.arena.borrow();
            arena.node(id)?;
            arena.subtree(id)
        };
        self.remove(id)?;

        let hooks: Vec<ReleaseHook> = {
            let mut table = self.inner.release_hooks.borrow_mut();
            subtree
                .iter()
                .filter_map(|n| table.remove(n))
                .flatten()
                .collect()
        };
        for hook in hooks {
            hook();
        }

        {
            let mut listeners = self.inner.listeners.borrow_mut();
            for node in &subtree {
                listeners.clear_node(*node);
            }
        }
        let mut arena = self.inner.arena.borrow_mut();
        for node in subtree {
            arena.free(node);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Styles
    // -------------------------------------------------------------------------

    /// Declare the animation played while an element carries `class`.
    pub fn define_animation(&self, class: &str, animation: Animation) {
        self.inner.stylesheet.borrow_mut().define(class, animation);
    }

    /// Animation currently applied to `id`. When several classes declare one,
    /// the class added last wins.
    pub fn computed_animation(&self, id: NodeId) -> Option<Animation> {
        let classes = self.classes(id);
        let sheet = self.inner.stylesheet.borrow();
        classes.iter().rev().find_map(|class| sheet.get(class))
    }
}
