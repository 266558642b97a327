//! View - One UI subtree with its name index.
//!
//! A view wraps a root node and indexes the named elements and groups below
//! it. Binding (`set_data`) lives in the bind module, open/close/replace in
//! the mount pipeline; this module holds the index, reads, selector
//! resolution, marking and keyboard actions.
//!
//! # Example
//!
//! ```ignore
//! let form = View::from_template(&rt, "trader-form".into())?;
//! form.set_data(data([("email", attrs([("value", "x@y.com")]))]))?;
//! let record = form.read_data(None)?;
//! form.open(None).await?;
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use spark_signals::{Signal, signal};

use super::group::Group;
use crate::engine::{CssSelector, ElementDef, Event, ListenerId, NodeId, TemplateRef, read_control};
use crate::error::BindError;
use crate::pipeline::{ReplaceSlot, Runtime};
use crate::types::{DataRecord, Selector, Value};

// =============================================================================
// Types
// =============================================================================

/// Where a view is in its open/close lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViewState {
    #[default]
    Closed,
    Opening,
    Open,
    Closing,
}

/// A resolved selector target.
#[derive(Clone, Debug)]
pub enum Target {
    Node(NodeId),
    /// A row of a group, addressed by a path selector.
    View(View),
}

impl Target {
    /// The node to act on: the node itself, or the row's root.
    pub fn node(&self) -> NodeId {
        match self {
            Target::Node(node) => *node,
            Target::View(view) => view.root(),
        }
    }
}

#[derive(Default)]
pub(crate) struct ViewIndex {
    pub(crate) names: IndexMap<String, Vec<NodeId>>,
    pub(crate) groups: IndexMap<String, Rc<RefCell<Group>>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ActionKind {
    Default,
    Cancel,
}

#[derive(Default)]
struct ActionSlot {
    handler: Option<Rc<dyn Fn()>>,
    triggers: Vec<ListenerId>,
}

#[derive(Default)]
struct Actions {
    default: ActionSlot,
    cancel: ActionSlot,
    key_listener: Option<ListenerId>,
}

impl Actions {
    fn slot_mut(&mut self, kind: ActionKind) -> &mut ActionSlot {
        match kind {
            ActionKind::Default => &mut self.default,
            ActionKind::Cancel => &mut self.cancel,
        }
    }
}

pub(crate) struct ViewInner {
    pub(crate) rt: Rc<Runtime>,
    pub(crate) root: NodeId,
    pub(crate) index: RefCell<ViewIndex>,
    pub(crate) marked: RefCell<Vec<NodeId>>,
    pub(crate) overlay: Cell<Option<NodeId>>,
    pub(crate) slot: RefCell<Option<Rc<ReplaceSlot>>>,
    actions: RefCell<Actions>,
    pub(crate) state: Signal<ViewState>,
}

/// Handle to a view. Cloning shares the same view.
#[derive(Clone)]
pub struct View {
    pub(crate) inner: Rc<ViewInner>,
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("root", &self.inner.root)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

// =============================================================================
// Construction
// =============================================================================

impl View {
    /// Wrap an existing node and index it.
    pub fn new(rt: &Rc<Runtime>, root: NodeId) -> Result<Self, BindError> {
        if !rt.document().exists(root) {
            return Err(crate::error::DomError::Missing(root).into());
        }
        let view = Self {
            inner: Rc::new(ViewInner {
                rt: rt.clone(),
                root,
                index: RefCell::new(ViewIndex::default()),
                marked: RefCell::new(Vec::new()),
                overlay: Cell::new(None),
                slot: RefCell::new(None),
                actions: RefCell::new(Actions::default()),
                state: signal(ViewState::Closed),
            }),
        };
        view.rebuild_map()?;
        Ok(view)
    }

    /// Create a view on a registered template, a definition object or a node.
    pub fn from_template(rt: &Rc<Runtime>, template: TemplateRef) -> Result<Self, BindError> {
        let root = rt.templates().instantiate(rt.document(), &template)?;
        Self::new(rt, root)
    }

    pub(crate) fn from_inner(inner: Rc<ViewInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ViewInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.inner.rt
    }

    pub fn ptr_eq(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> ViewState {
        self.inner.state.get()
    }

    /// Reactive handle to the lifecycle state.
    pub fn state_signal(&self) -> Signal<ViewState> {
        self.inner.state.clone()
    }

    pub(crate) fn set_state(&self, state: ViewState) {
        if self.inner.state.get() != state {
            self.inner.state.set(state);
        }
    }
}

// =============================================================================
// Index
// =============================================================================

impl View {
    /// Re-index named elements and groups below the root.
    ///
    /// A group found on the same container node as before is kept, so its
    /// rows keep their identity. Group containers are not descended into.
    pub fn rebuild_map(&self) -> Result<(), BindError> {
        let rt = &self.inner.rt;
        let doc = rt.document();
        let config = rt.config();
        let previous = std::mem::take(&mut self.inner.index.borrow_mut().groups);

        let mut names: IndexMap<String, Vec<NodeId>> = IndexMap::new();
        let mut groups = IndexMap::new();
        let mut stack: Vec<NodeId> = doc.children(self.inner.root).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if let Some(name) = doc.attr(node, &config.name_attr) {
                if let Some(group_name) = name.strip_suffix(config.group_suffix.as_str()) {
                    let group = match previous.get(group_name) {
                        Some(group) if group.borrow().container() == node => group.clone(),
                        _ => Rc::new(RefCell::new(Group::index(rt, group_name, node)?)),
                    };
                    groups.insert(group_name.to_string(), group);
                    continue;
                }
                names.entry(name).or_default().push(node);
            }
            stack.extend(doc.children(node).into_iter().rev());
        }

        *self.inner.index.borrow_mut() = ViewIndex { names, groups };
        Ok(())
    }

    /// Indexed element names, in document order.
    pub fn names(&self) -> Vec<String> {
        self.inner.index.borrow().names.keys().cloned().collect()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.inner.index.borrow().groups.keys().cloned().collect()
    }

    /// Run `f` on the group called `name` (with or without the suffix).
    pub fn group<R>(&self, name: &str, f: impl FnOnce(&Group) -> R) -> Option<R> {
        let group = self.lookup_group(name)?;
        let group = group.borrow();
        Some(f(&group))
    }

    pub(crate) fn lookup_group(&self, name: &str) -> Option<Rc<RefCell<Group>>> {
        let suffix = self.inner.rt.config().group_suffix.as_str();
        let name = name.strip_suffix(suffix).unwrap_or(name);
        self.inner.index.borrow().groups.get(name).cloned()
    }

    pub(crate) fn named(&self, name: &str) -> Vec<NodeId> {
        self.inner
            .index
            .borrow()
            .names
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Rows addressed by a path step: one row, or all rows in order.
    pub(crate) fn path_rows(&self, group: &str, id: Option<&str>) -> Result<Vec<View>, BindError> {
        let group = self
            .lookup_group(group)
            .ok_or_else(|| BindError::UnknownGroup(group.to_string()))?;
        let group = group.borrow();
        Ok(match id {
            Some(id) => group.row(id).into_iter().collect(),
            None => group.rows().into_iter().map(|(_, view)| view).collect(),
        })
    }

    /// Resolve a selector. Bare names never resolve to group containers.
    pub fn find_elements(&self, selector: &Selector) -> Result<Vec<Target>, BindError> {
        match selector {
            Selector::Name(name) => Ok(self.named(name).into_iter().map(Target::Node).collect()),
            Selector::Css(css) => {
                let parsed = CssSelector::parse(css)?;
                Ok(self
                    .inner
                    .rt
                    .document()
                    .query_all(self.inner.root, &parsed)
                    .into_iter()
                    .map(Target::Node)
                    .collect())
            }
            Selector::Path { group, id, rest } => {
                let rows = self.path_rows(group, id.as_deref())?;
                match rest {
                    None => Ok(rows.into_iter().map(Target::View).collect()),
                    Some(rest) => {
                        let mut out = Vec::new();
                        for row in rows {
                            out.extend(row.find_elements(rest)?);
                        }
                        Ok(out)
                    }
                }
            }
        }
    }

    /// Nodes a selector resolves to.
    pub(crate) fn resolve_nodes(&self, selector: &Selector) -> Result<Vec<NodeId>, BindError> {
        Ok(self
            .find_elements(selector)?
            .iter()
            .map(Target::node)
            .collect())
    }
}

// =============================================================================
// Read
// =============================================================================

impl View {
    /// Read values back from the tree.
    ///
    /// Without `keys`, every indexed name and group is read. Groups read as a
    /// list of row records, each carrying its `@id`. Keys matching nothing
    /// are left out.
    pub fn read_data(&self, keys: Option<&[&str]>) -> Result<DataRecord, BindError> {
        let keys: Vec<String> = match keys {
            Some(keys) => keys.iter().map(|k| k.to_string()).collect(),
            None => {
                let index = self.inner.index.borrow();
                index.names.keys().chain(index.groups.keys()).cloned().collect()
            }
        };

        let mut record = DataRecord::new();
        for key in keys {
            if let Some(group) = self.lookup_group(&key) {
                let rows = group.borrow().rows();
                let mut items = Vec::with_capacity(rows.len());
                for (id, row) in rows {
                    let mut item = DataRecord::new();
                    item.insert("@id".to_string(), Value::text(id));
                    item.extend(row.read_data(None)?);
                    items.push(Value::Record(item));
                }
                let name = group.borrow().name().to_string();
                record.insert(name, Value::List(items));
                continue;
            }

            let nodes = self.resolve_nodes(&Selector::parse(&key))?;
            let value = nodes
                .into_iter()
                .fold(None, |acc, node| Some(self.read_node(node, acc)));
            if let Some(value) = value {
                record.insert(key, value);
            }
        }
        Ok(record)
    }

    fn read_node(&self, node: NodeId, acc: Option<Value>) -> Value {
        let rt = &self.inner.rt;
        let doc = rt.document();
        match rt.elements().resolve(doc, node, &rt.config().kind_attr) {
            Some(adapter) => adapter.get_value(doc, node, acc),
            None => read_control(doc, node, acc),
        }
    }
}

// =============================================================================
// Marking
// =============================================================================

impl View {
    /// Add the highlight class to every target of `selector`. Returns the
    /// number of nodes marked.
    pub fn mark(&self, selector: &Selector) -> Result<usize, BindError> {
        let nodes = self.resolve_nodes(selector)?;
        let rt = &self.inner.rt;
        let class = &rt.config().mark_class;
        let mut marked = self.inner.marked.borrow_mut();
        for node in &nodes {
            rt.document().add_class(*node, class)?;
            if !marked.contains(node) {
                marked.push(*node);
            }
        }
        Ok(nodes.len())
    }

    /// Remove the highlight class from exactly the nodes marked before.
    pub fn unmark(&self) {
        let rt = &self.inner.rt;
        let class = &rt.config().mark_class;
        let marked = std::mem::take(&mut *self.inner.marked.borrow_mut());
        for node in marked {
            if rt.document().exists(node)
                && let Err(err) = rt.document().remove_class(node, class)
            {
                tracing::debug!(%node, %err, "unmark failed");
            }
        }
    }

    pub fn marked(&self) -> Vec<NodeId> {
        self.inner.marked.borrow().clone()
    }
}

// =============================================================================
// Keyboard actions
// =============================================================================

impl View {
    /// Run `action` on Enter inside the view, and on clicks of `trigger`.
    pub fn set_default_action(
        &self,
        action: impl Fn() + 'static,
        trigger: Option<&Selector>,
    ) -> Result<(), BindError> {
        self.set_action(ActionKind::Default, Rc::new(action), trigger)
    }

    /// Run `action` on Escape inside the view, and on clicks of `trigger`.
    pub fn set_cancel_action(
        &self,
        action: impl Fn() + 'static,
        trigger: Option<&Selector>,
    ) -> Result<(), BindError> {
        self.set_action(ActionKind::Cancel, Rc::new(action), trigger)
    }

    fn set_action(
        &self,
        kind: ActionKind,
        action: Rc<dyn Fn()>,
        trigger: Option<&Selector>,
    ) -> Result<(), BindError> {
        let doc = self.inner.rt.document();
        let triggers = match trigger {
            Some(selector) => self.resolve_nodes(selector)?,
            None => Vec::new(),
        };
        self.ensure_key_listener()?;

        let mut actions = self.inner.actions.borrow_mut();
        let slot = actions.slot_mut(kind);
        for id in slot.triggers.drain(..) {
            doc.remove_listener(id);
        }
        slot.handler = Some(action.clone());
        for node in triggers {
            let action = action.clone();
            slot.triggers
                .push(doc.add_listener(node, "click", move |_| action())?);
        }
        Ok(())
    }

    fn ensure_key_listener(&self) -> Result<(), BindError> {
        if self.inner.actions.borrow().key_listener.is_some() {
            return Ok(());
        }
        let weak = self.downgrade();
        let id = self
            .inner
            .rt
            .document()
            .add_listener(self.inner.root, "keydown", move |event: &Event| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !event.modifiers.is_empty() {
                    return;
                }
                let action = {
                    let actions = inner.actions.borrow();
                    match event.key.as_deref() {
                        Some("Enter") => actions.default.handler.clone(),
                        Some("Escape") => actions.cancel.handler.clone(),
                        _ => None,
                    }
                };
                if let Some(action) = action {
                    event.stop_propagation();
                    action();
                }
            })?;
        self.inner.actions.borrow_mut().key_listener = Some(id);
        Ok(())
    }
}

// =============================================================================
// Content
// =============================================================================

impl View {
    /// Replace the view's content with a fresh instance of `template`, then
    /// re-index.
    pub fn load_template(&self, template: TemplateRef) -> Result<(), BindError> {
        let node = self
            .inner
            .rt
            .templates()
            .instantiate(self.inner.rt.document(), &template)?;
        self.set_content(node)
    }

    /// Shorthand for loading a definition object.
    pub fn load_def(&self, def: ElementDef) -> Result<(), BindError> {
        self.load_template(TemplateRef::Def(def))
    }

    /// Make `node` the view's only content, then re-index.
    pub fn set_content(&self, node: NodeId) -> Result<(), BindError> {
        self.inner
            .rt
            .document()
            .replace_children(self.inner.root, &[node])?;
        self.rebuild_map()
    }

    /// Release the view's nodes, and its modal overlay if any.
    pub fn discard(&self) {
        let doc = self.inner.rt.document();
        self.inner.marked.borrow_mut().clear();
        if let Some(overlay) = self.inner.overlay.take()
            && doc.exists(overlay)
            && let Err(err) = doc.release(overlay)
        {
            tracing::debug!(%overlay, %err, "overlay release failed");
        }
        if doc.exists(self.inner.root)
            && let Err(err) = doc.release(self.inner.root)
        {
            tracing::debug!(root = %self.inner.root, %err, "view release failed");
        }
        self.set_state(ViewState::Closed);
    }
}
