//! Core types for bindery.
//!
//! These types describe "what should appear where": the data literal bound by
//! [`View::set_data`](crate::View::set_data), the values read back by
//! [`View::read_data`](crate::View::read_data), and the selectors used to
//! address targets inside a view.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use chrono::NaiveDate;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use indexmap::IndexMap;

use crate::engine::{Event, NodeId};
use crate::error::BindError;
use crate::primitives::View;

// =============================================================================
// Scalar
// =============================================================================

/// A primitive value written as a target's primary value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scalar {
    #[default]
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Whether the value counts as "on" for class toggles and checkboxes.
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Text(s) => !s.is_empty(),
            Scalar::Number(n) => *n != 0.0 && !n.is_nan(),
            Scalar::Bool(b) => *b,
            Scalar::Date(_) => true,
        }
    }

    /// Text form used for attributes and text content.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Text(s) => s.clone(),
            Scalar::Number(n) => format_number(*n),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Integral numbers print without a trailing `.0`.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Number(f64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Scalar::Date(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Scalar::Null, Into::into)
    }
}

// =============================================================================
// Read values
// =============================================================================

/// Ordered record produced by `read_data`.
pub type DataRecord = IndexMap<String, Value>;

/// A value read back from the rendered tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    /// Accumulated checkbox values, or the rows of a group.
    List(Vec<Value>),
    /// A row or sub-view read as a whole.
    Record(DataRecord),
}

impl Value {
    pub fn null() -> Self {
        Value::Scalar(Scalar::Null)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Value::Scalar(Scalar::Text(value.into()))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }
}

/// `From` impls wrapping every scalar-convertible type.
macro_rules! from_scalar {
    ($target:ident: $($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for $target {
                fn from(value: $ty) -> Self {
                    $target::Scalar(value.into())
                }
            }
        )*

        impl<T: Into<Scalar>> From<Option<T>> for $target {
            fn from(value: Option<T>) -> Self {
                $target::Scalar(value.into())
            }
        }
    };
}

from_scalar!(Value: Scalar, &str, String, f64, i64, i32, bool, NaiveDate);

// =============================================================================
// Event handlers and deferred values
// =============================================================================

/// Event handler bound with a `"!event"` key.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler")
    }
}

/// Outcome of a deferred literal.
pub type DeferredResult = Result<Literal, BindError>;

/// A future-valued literal. Cloning shares the same underlying future, so a
/// deferred bound to several targets settles once.
#[derive(Clone)]
pub struct Deferred(Shared<LocalBoxFuture<'static, DeferredResult>>);

impl Deferred {
    pub fn new(future: impl Future<Output = DeferredResult> + 'static) -> Self {
        Self(future.boxed_local().shared())
    }

    /// Wrap a future that cannot fail.
    pub fn from_value<F, L>(future: F) -> Self
    where
        F: Future<Output = L> + 'static,
        L: Into<Literal>,
    {
        Self::new(future.map(|value| Ok(value.into())))
    }

    /// Wait for the value.
    pub async fn resolve(self) -> DeferredResult {
        self.0.await
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred")
    }
}

// =============================================================================
// Data literal
// =============================================================================

/// Mapping of named effects applied onto one node.
pub type AttrMap = IndexMap<String, Literal>;

/// Top-level argument of `set_data`: selector string -> literal.
pub type DataMap = IndexMap<String, Literal>;

/// The value assigned to a named target when binding.
#[derive(Clone, Debug)]
pub enum Literal {
    /// Primary value of the target.
    Scalar(Scalar),
    /// `value`, `classList`, `.prop.path`, `!event` and plain attributes.
    Attrs(AttrMap),
    /// Rows of a group.
    Rows(Vec<RowLiteral>),
    /// Applied once the future settles.
    Deferred(Deferred),
    /// Ready-made node spliced in as the target's only child.
    Node(NodeId),
    /// Ready-made view spliced in as the target's only child.
    View(View),
    /// Only valid under a `!event` key.
    Handler(EventHandler),
}

impl Literal {
    pub fn null() -> Self {
        Literal::Scalar(Scalar::Null)
    }

    pub fn handler(handler: impl Fn(&Event) + 'static) -> Self {
        Literal::Handler(EventHandler::new(handler))
    }

    pub fn deferred(future: impl Future<Output = DeferredResult> + 'static) -> Self {
        Literal::Deferred(Deferred::new(future))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Literal::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

from_scalar!(Literal: Scalar, &str, String, f64, i64, i32, bool, NaiveDate);

impl From<Vec<RowLiteral>> for Literal {
    fn from(rows: Vec<RowLiteral>) -> Self {
        Literal::Rows(rows)
    }
}

impl From<Deferred> for Literal {
    fn from(deferred: Deferred) -> Self {
        Literal::Deferred(deferred)
    }
}

impl From<View> for Literal {
    fn from(view: View) -> Self {
        Literal::View(view)
    }
}

impl From<EventHandler> for Literal {
    fn from(handler: EventHandler) -> Self {
        Literal::Handler(handler)
    }
}

impl From<serde_json::Value> for Literal {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Literal::null(),
            Json::Bool(b) => b.into(),
            Json::Number(n) => n.as_f64().unwrap_or_default().into(),
            Json::String(s) => s.into(),
            Json::Array(items) => Literal::Rows(items.into_iter().map(RowLiteral::from).collect()),
            Json::Object(map) => {
                Literal::Attrs(map.into_iter().map(|(k, v)| (k, Literal::from(v))).collect())
            }
        }
    }
}

/// Build an attribute-map literal.
pub fn attrs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Literal
where
    K: Into<String>,
    V: Into<Literal>,
{
    Literal::Attrs(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
}

/// Build a `set_data` argument.
pub fn data<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> DataMap
where
    K: Into<String>,
    V: Into<Literal>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Convert a JSON object into a `set_data` argument.
pub fn data_from_json(value: serde_json::Value) -> Result<DataMap, BindError> {
    match value {
        serde_json::Value::Object(map) => {
            Ok(map.into_iter().map(|(k, v)| (k, Literal::from(v))).collect())
        }
        other => Err(BindError::InvalidLiteral(format!(
            "top-level data must be an object, got {other}"
        ))),
    }
}

// =============================================================================
// Rows
// =============================================================================

/// One row of a collection literal.
#[derive(Clone, Debug, Default)]
pub struct RowLiteral {
    /// `@id`; defaults to the row's index.
    pub id: Option<String>,
    /// `@template`; defaults to the group's default template.
    pub template: Option<String>,
    /// Bound into the row's own view.
    pub data: DataMap,
}

impl RowLiteral {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Split `@id` and `@template` out of a row map.
    pub fn from_map(mut map: AttrMap) -> Self {
        let id = map
            .shift_remove("@id")
            .and_then(|lit| lit.as_scalar().map(Scalar::to_text));
        let template = map
            .shift_remove("@template")
            .and_then(|lit| lit.as_scalar().map(Scalar::to_text));
        Self { id, template, data: map }
    }
}

impl From<serde_json::Value> for RowLiteral {
    fn from(value: serde_json::Value) -> Self {
        match Literal::from(value) {
            Literal::Attrs(map) => RowLiteral::from_map(map),
            other => RowLiteral {
                data: DataMap::from([("value".to_string(), other)]),
                ..RowLiteral::default()
            },
        }
    }
}

// =============================================================================
// Selector
// =============================================================================

/// Addresses zero or more targets inside a view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Lookup in the view's name index.
    Name(String),
    /// CSS query over the view's subtree.
    Css(String),
    /// Descend into a group: one row by id, or every row when `id` is `None`.
    Path {
        group: String,
        id: Option<String>,
        rest: Option<Box<Selector>>,
    },
}

impl Selector {
    /// `.`, `#` and `[` start a CSS selector, `$` prefixes an arbitrary one;
    /// anything else is a name.
    pub fn parse(text: &str) -> Self {
        match text.chars().next() {
            Some('.' | '#' | '[') => Selector::Css(text.to_string()),
            Some('$') => Selector::Css(text[1..].trim().to_string()),
            _ => Selector::Name(text.to_string()),
        }
    }

    pub fn path(group: impl Into<String>, id: Option<&str>) -> Self {
        Selector::Path {
            group: group.into(),
            id: id.map(str::to_string),
            rest: None,
        }
    }

    /// Attach `rest` below the deepest path step.
    pub fn then(self, rest: Selector) -> Self {
        match self {
            Selector::Path { group, id, rest: None } => Selector::Path {
                group,
                id,
                rest: Some(Box::new(rest)),
            },
            Selector::Path { group, id, rest: Some(inner) } => Selector::Path {
                group,
                id,
                rest: Some(Box::new(inner.then(rest))),
            },
            other => other,
        }
    }

    /// Build a path from `[group, id, group, id, ..., name?]` segments.
    pub fn from_path(segments: &[Option<&str>]) -> Result<Self, BindError> {
        match segments {
            [] => Err(BindError::InvalidPath("empty path".into())),
            [Some(name)] => Ok(Selector::parse(name)),
            [None] => Err(BindError::InvalidPath("trailing null segment".into())),
            [Some(group), id, rest @ ..] => {
                let head = Selector::path(*group, *id);
                if rest.is_empty() {
                    Ok(head)
                } else {
                    Ok(head.then(Selector::from_path(rest)?))
                }
            }
            [None, ..] => Err(BindError::InvalidPath("group name cannot be null".into())),
        }
    }
}

impl From<&str> for Selector {
    fn from(text: &str) -> Self {
        Selector::parse(text)
    }
}

impl From<String> for Selector {
    fn from(text: String) -> Self {
        Selector::parse(&text)
    }
}
