//! Custom element registry and generic control access.
//!
//! The binder writes and reads a node's primary value through an
//! [`ElementAdapter`] when one is registered for the node's kind (its
//! `data-kind` attribute, falling back to its tag name). Everything else goes
//! through the generic control rules:
//!
//! - `input[type=checkbox]` / `input[type=radio]` toggle the `checked` property
//! - other `input`, `select` and `textarea` hold the `value` property
//! - any other element shows the value as text content

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::document::{Document, NodeId};
use crate::error::{BindError, DomError, RegistryError};
use crate::types::{AttrMap, Scalar, Value};

/// Value access for a custom element kind.
pub trait ElementAdapter {
    fn set_value(&self, doc: &Document, node: NodeId, value: &Scalar) -> Result<(), BindError>;

    /// Read the node's value. `acc` holds what earlier nodes with the same
    /// name produced, for kinds that accumulate.
    fn get_value(&self, doc: &Document, node: NodeId, acc: Option<Value>) -> Value;

    /// Apply an attribute map. Returning false hands the map to the generic
    /// attribute rules.
    fn set_attrs(&self, _doc: &Document, _node: NodeId, _attrs: &AttrMap) -> Result<bool, BindError> {
        Ok(false)
    }
}

/// Write-once table of element adapters, keyed by kind.
#[derive(Clone, Default)]
pub struct ElementRegistry {
    adapters: Rc<RefCell<HashMap<String, Rc<dyn ElementAdapter>>>>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        kind: &str,
        adapter: impl ElementAdapter + 'static,
    ) -> Result<(), RegistryError> {
        let mut adapters = self.adapters.borrow_mut();
        if adapters.contains_key(kind) {
            return Err(RegistryError::DuplicateKind(kind.to_string()));
        }
        adapters.insert(kind.to_string(), Rc::new(adapter));
        tracing::debug!(kind, "registered element adapter");
        Ok(())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.adapters.borrow().contains_key(kind)
    }

    /// Adapter for `node`, looked up by `kind_attr` first, then by tag.
    pub fn resolve(
        &self,
        doc: &Document,
        node: NodeId,
        kind_attr: &str,
    ) -> Option<Rc<dyn ElementAdapter>> {
        let adapters = self.adapters.borrow();
        if adapters.is_empty() {
            return None;
        }
        doc.attr(node, kind_attr)
            .and_then(|kind| adapters.get(&kind).cloned())
            .or_else(|| doc.tag(node).and_then(|tag| adapters.get(&tag).cloned()))
    }
}

// =============================================================================
// Generic controls
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Control {
    Checkbox,
    Radio,
    Field,
    Content,
}

fn control(doc: &Document, node: NodeId) -> Control {
    match doc.tag(node).as_deref() {
        Some("input") => match doc
            .attr(node, "type")
            .map(|t| t.to_ascii_lowercase())
            .as_deref()
        {
            Some("checkbox") => Control::Checkbox,
            Some("radio") => Control::Radio,
            _ => Control::Field,
        },
        Some("select" | "textarea") => Control::Field,
        _ => Control::Content,
    }
}

/// Whether repeated nodes of this kind accumulate when read.
pub fn is_toggle(doc: &Document, node: NodeId) -> bool {
    matches!(control(doc, node), Control::Checkbox | Control::Radio)
}

/// Write `value` as the node's primary value.
///
/// A toggle with a `value` attribute is checked when the bound text equals
/// it; otherwise it follows the value's truthiness.
pub fn write_control(doc: &Document, node: NodeId, value: &Scalar) -> Result<(), DomError> {
    match control(doc, node) {
        Control::Checkbox | Control::Radio => {
            let checked = match (value, doc.attr(node, "value")) {
                (Scalar::Text(_) | Scalar::Number(_) | Scalar::Date(_), Some(own)) => {
                    value.to_text() == own
                }
                _ => value.is_truthy(),
            };
            doc.set_prop(node, "checked", Scalar::Bool(checked))
        }
        Control::Field => doc.set_prop(node, "value", value.clone()),
        Control::Content => doc.set_text(node, &value.to_text()),
    }
}

/// Read the node's primary value.
///
/// Checkboxes with a `value` attribute accumulate the values of the checked
/// ones into a list; radios yield the value of the checked one.
pub fn read_control(doc: &Document, node: NodeId, acc: Option<Value>) -> Value {
    let checked = || doc.prop(node, "checked").is_some_and(|c| c.is_truthy());
    match control(doc, node) {
        Control::Checkbox => match doc.attr(node, "value") {
            Some(own) => {
                let mut list = match acc {
                    Some(Value::List(list)) => list,
                    _ => Vec::new(),
                };
                if checked() {
                    list.push(Value::text(own));
                }
                Value::List(list)
            }
            None => Value::from(checked()),
        },
        Control::Radio => match doc.attr(node, "value") {
            Some(own) if checked() => Value::text(own),
            Some(_) => acc.unwrap_or_else(Value::null),
            None => Value::from(checked()),
        },
        Control::Field => Value::Scalar(doc.prop(node, "value").unwrap_or_default()),
        Control::Content => Value::text(doc.text(node)),
    }
}
