//! Templates - Reusable markup fragments.
//!
//! A template is a detached subtree kept in the [`TemplateRegistry`] under a
//! string id. Instantiating it deep-clones the subtree. [`ElementDef`] is the
//! definition-object form, building a fresh fragment each time.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::document::{Document, NodeId};
use crate::error::{BindError, DomError, RegistryError};

/// Content of an [`ElementDef`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Content {
    #[default]
    Empty,
    Text(String),
    Children(Vec<ElementDef>),
}

/// Definition object for a fragment.
///
/// ```ignore
/// let row = ElementDef::new("li")
///     .class("trade")
///     .child(ElementDef::new("span").attr("name", "price"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementDef {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub content: Content,
}

impl ElementDef {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Append to the `class` attribute.
    pub fn class(mut self, class: &str) -> Self {
        match self.attrs.iter_mut().find(|(name, _)| name == "class") {
            Some((_, value)) => {
                value.push(' ');
                value.push_str(class);
            }
            None => self.attrs.push(("class".into(), class.into())),
        }
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.content = Content::Text(text.into());
        self
    }

    pub fn child(mut self, child: ElementDef) -> Self {
        match &mut self.content {
            Content::Children(children) => children.push(child),
            _ => self.content = Content::Children(vec![child]),
        }
        self
    }

    pub fn children(self, children: impl IntoIterator<Item = ElementDef>) -> Self {
        children.into_iter().fold(self, ElementDef::child)
    }

    /// Build a detached fragment in `doc`.
    pub fn build(&self, doc: &Document) -> Result<NodeId, BindError> {
        let node = doc.create_element(&self.tag);
        for (name, value) in &self.attrs {
            doc.set_attr(node, name, value)?;
        }
        match &self.content {
            Content::Empty => {}
            Content::Text(text) => doc.set_text(node, text)?,
            Content::Children(children) => {
                for child in children {
                    let built = child.build(doc)?;
                    doc.append_child(node, built)?;
                }
            }
        }
        Ok(node)
    }
}

/// Where a view's content comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateRef {
    /// A registered template, cloned.
    Id(String),
    /// A definition object, built fresh.
    Def(ElementDef),
    /// An existing node, used as is.
    Node(NodeId),
}

impl From<&str> for TemplateRef {
    fn from(id: &str) -> Self {
        TemplateRef::Id(id.to_string())
    }
}

impl From<String> for TemplateRef {
    fn from(id: String) -> Self {
        TemplateRef::Id(id)
    }
}

impl From<ElementDef> for TemplateRef {
    fn from(def: ElementDef) -> Self {
        TemplateRef::Def(def)
    }
}

impl From<NodeId> for TemplateRef {
    fn from(node: NodeId) -> Self {
        TemplateRef::Node(node)
    }
}

/// Templates keyed by id. Registration is write-once.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    entries: Rc<RefCell<HashMap<String, NodeId>>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build `def` once and keep it as template `id`.
    pub fn register(&self, doc: &Document, id: &str, def: &ElementDef) -> Result<(), BindError> {
        if self.contains(id) {
            return Err(RegistryError::DuplicateTemplate(id.to_string()).into());
        }
        let node = def.build(doc)?;
        self.entries.borrow_mut().insert(id.to_string(), node);
        Ok(())
    }

    /// Keep an existing node as template `id`. The node is detached.
    pub fn register_node(&self, doc: &Document, id: &str, node: NodeId) -> Result<(), BindError> {
        if self.contains(id) {
            return Err(RegistryError::DuplicateTemplate(id.to_string()).into());
        }
        doc.remove(node)?;
        self.entries.borrow_mut().insert(id.to_string(), node);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.borrow().contains_key(id)
    }

    /// Deep clone of template `id`.
    pub fn clone_template(&self, doc: &Document, id: &str) -> Result<NodeId, BindError> {
        let source = self
            .entries
            .borrow()
            .get(id)
            .copied()
            .ok_or_else(|| BindError::UnknownTemplate(id.to_string()))?;
        Ok(doc.clone_subtree(source)?)
    }

    /// Resolve a [`TemplateRef`] to a node ready to be wrapped in a view.
    pub fn instantiate(&self, doc: &Document, template: &TemplateRef) -> Result<NodeId, BindError> {
        match template {
            TemplateRef::Id(id) => self.clone_template(doc, id),
            TemplateRef::Def(def) => def.build(doc),
            TemplateRef::Node(node) => {
                if doc.exists(*node) {
                    Ok(*node)
                } else {
                    Err(DomError::Missing(*node).into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_def() -> ElementDef {
        ElementDef::new("li")
            .class("trade")
            .class("row")
            .child(ElementDef::new("span").attr("name", "symbol"))
            .child(ElementDef::new("span").attr("name", "qty").text("0"))
    }

    #[test]
    fn test_build() {
        let doc = Document::new();
        let node = row_def().build(&doc).unwrap();
        assert_eq!(doc.tag(node).as_deref(), Some("li"));
        assert_eq!(doc.classes(node), vec!["trade", "row"]);
        assert_eq!(doc.children(node).len(), 2);
        assert_eq!(doc.text(node), "0");
    }

    #[test]
    fn test_registry_clones_fresh_instances() {
        let doc = Document::new();
        let registry = TemplateRegistry::new();
        registry.register(&doc, "trade-row", &row_def()).unwrap();

        let a = registry.instantiate(&doc, &"trade-row".into()).unwrap();
        let b = registry.instantiate(&doc, &"trade-row".into()).unwrap();
        assert_ne!(a, b);
        assert_eq!(doc.children(a).len(), 2);

        assert_eq!(
            registry.register(&doc, "trade-row", &row_def()),
            Err(BindError::Registry(RegistryError::DuplicateTemplate("trade-row".into())))
        );
        assert_eq!(
            registry.instantiate(&doc, &"missing".into()),
            Err(BindError::UnknownTemplate("missing".into()))
        );
    }
}
