//! Binding - Applying data literals to a view.
//!
//! # Literal Kinds
//!
//! - Scalar: the target's primary value (adapter or generic control)
//! - Attrs: attributes, with special keys:
//!   - `classList`: map of class toggles
//!   - `!click`: event handler (null unbinds)
//!   - `.path`: property write
//!   - `value`: primary value, always applied last
//! - Rows: keyed group render
//! - Node / View: replaces the target's children
//! - Deferred: applied when it resolves
//!
//! `set_data` applies everything it can synchronously and returns a
//! [`Pending`] that settles once every deferred value below it has been
//! applied.

use std::rc::Weak;

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture, TryFutureExt};

use super::view::{View, ViewInner};
use crate::engine::{NodeId, write_control};
use crate::error::BindError;
use crate::types::{AttrMap, DataMap, Deferred, Literal, RowLiteral, Scalar, Selector};

/// Deferred work still outstanding after a binding call.
pub type Pending = LocalBoxFuture<'static, Result<(), BindError>>;

// =============================================================================
// PUBLIC API
// =============================================================================

impl View {
    /// Bind every `selector -> literal` entry of `data`.
    ///
    /// Stops at the first synchronous error. Deferred values are applied in
    /// the background; the returned future settles with them.
    pub fn set_data(&self, data: DataMap) -> Result<Pending, BindError> {
        let mut waits = Vec::new();
        for (key, literal) in data {
            self.bind(&Selector::parse(&key), literal, &mut waits)?;
        }
        Ok(settle(waits))
    }

    /// Bind a single literal to a selector.
    pub fn set_data_at(&self, selector: &Selector, literal: Literal) -> Result<Pending, BindError> {
        let mut waits = Vec::new();
        self.bind(selector, literal, &mut waits)?;
        Ok(settle(waits))
    }
}

fn settle(waits: Vec<Pending>) -> Pending {
    if waits.is_empty() {
        return future::ready(Ok(())).boxed_local();
    }
    future::try_join_all(waits).map_ok(|_| ()).boxed_local()
}

// =============================================================================
// RESOLUTION
// =============================================================================

impl View {
    fn bind(
        &self,
        selector: &Selector,
        literal: Literal,
        waits: &mut Vec<Pending>,
    ) -> Result<(), BindError> {
        if let Literal::Deferred(deferred) = literal {
            let selector = selector.clone();
            waits.push(self.defer(deferred, move |view, literal, waits| {
                view.bind(&selector, literal, waits)
            }));
            return Ok(());
        }

        match selector {
            Selector::Name(name) => {
                if let Some(group) = self.lookup_group(name) {
                    let rows = group_rows(name, literal)?;
                    let rt = self.inner.rt.clone();
                    waits.extend(group.borrow_mut().render(&rt, rows)?);
                    return Ok(());
                }
                let nodes = self.named(name);
                self.apply_all(nodes, literal, waits)
            }
            Selector::Css(_) => {
                let nodes = self.resolve_nodes(selector)?;
                self.apply_all(nodes, literal, waits)
            }
            Selector::Path { group, id, rest } => {
                let rows = self.path_rows(group, id.as_deref())?;
                for row in rows {
                    match (rest, &literal) {
                        (Some(rest), _) => row.bind(rest, literal.clone(), waits)?,
                        (None, Literal::Attrs(map)) => {
                            for (key, value) in map.clone() {
                                row.bind(&Selector::parse(&key), value, waits)?;
                            }
                        }
                        (None, _) => row.apply(row.root(), literal.clone(), waits)?,
                    }
                }
                Ok(())
            }
        }
    }

    fn apply_all(
        &self,
        nodes: Vec<NodeId>,
        literal: Literal,
        waits: &mut Vec<Pending>,
    ) -> Result<(), BindError> {
        if nodes.is_empty() {
            return Ok(());
        }
        if matches!(literal, Literal::Rows(_)) {
            return Err(BindError::NotAGroup(self.describe(&nodes)));
        }
        for node in nodes {
            self.apply(node, literal.clone(), waits)?;
        }
        Ok(())
    }

    fn describe(&self, nodes: &[NodeId]) -> String {
        let doc = self.inner.rt.document();
        nodes
            .first()
            .and_then(|n| doc.attr(*n, &self.inner.rt.config().name_attr).or_else(|| doc.tag(*n)))
            .unwrap_or_default()
    }
}

/// Rows to render for a group key. Null clears the group.
fn group_rows(name: &str, literal: Literal) -> Result<Vec<RowLiteral>, BindError> {
    match literal {
        Literal::Rows(rows) => Ok(rows),
        Literal::Scalar(Scalar::Null) => Ok(Vec::new()),
        other => Err(BindError::InvalidLiteral(format!(
            "group {name} expects rows, got {}",
            kind_name(&other)
        ))),
    }
}

fn kind_name(literal: &Literal) -> &'static str {
    match literal {
        Literal::Scalar(_) => "a scalar",
        Literal::Attrs(_) => "an attribute map",
        Literal::Rows(_) => "rows",
        Literal::Deferred(_) => "a deferred value",
        Literal::Node(_) => "a node",
        Literal::View(_) => "a view",
        Literal::Handler(_) => "a handler",
    }
}

// =============================================================================
// APPLICATION
// =============================================================================

impl View {
    fn apply(&self, node: NodeId, literal: Literal, waits: &mut Vec<Pending>) -> Result<(), BindError> {
        let doc = self.inner.rt.document();
        match literal {
            Literal::Scalar(value) => self.write_value(node, &value),
            Literal::Attrs(map) => self.apply_attrs(node, map, waits),
            Literal::Node(child) => Ok(doc.replace_children(node, &[child])?),
            Literal::View(view) => Ok(doc.replace_children(node, &[view.root()])?),
            Literal::Rows(_) => Err(BindError::NotAGroup(self.describe(&[node]))),
            Literal::Handler(_) => Err(BindError::MisplacedHandler),
            Literal::Deferred(deferred) => {
                waits.push(self.defer(deferred, move |view, literal, waits| {
                    view.apply(node, literal, waits)
                }));
                Ok(())
            }
        }
    }

    fn write_value(&self, node: NodeId, value: &Scalar) -> Result<(), BindError> {
        let rt = &self.inner.rt;
        let doc = rt.document();
        match rt.elements().resolve(doc, node, &rt.config().kind_attr) {
            Some(adapter) => adapter.set_value(doc, node, value),
            None => Ok(write_control(doc, node, value)?),
        }
    }

    fn apply_attrs(&self, node: NodeId, map: AttrMap, waits: &mut Vec<Pending>) -> Result<(), BindError> {
        let rt = &self.inner.rt;
        let doc = rt.document();
        if let Some(adapter) = rt.elements().resolve(doc, node, &rt.config().kind_attr)
            && adapter.set_attrs(doc, node, &map)?
        {
            return Ok(());
        }

        let mut value = None;
        for (key, literal) in map {
            if key == "value" {
                value = Some(literal);
                continue;
            }
            self.apply_attr(node, &key, literal, waits)?;
        }
        if let Some(literal) = value {
            self.apply_attr(node, "value", literal, waits)?;
        }
        Ok(())
    }

    fn apply_attr(
        &self,
        node: NodeId,
        key: &str,
        literal: Literal,
        waits: &mut Vec<Pending>,
    ) -> Result<(), BindError> {
        let rt = &self.inner.rt;
        let doc = rt.document();

        if let Literal::Deferred(deferred) = literal {
            let key = key.to_string();
            waits.push(self.defer(deferred, move |view, literal, waits| {
                view.apply_attr(node, &key, literal, waits)
            }));
            return Ok(());
        }

        if key == "classList" {
            let Literal::Attrs(toggles) = literal else {
                return Err(BindError::InvalidAttribute(key.to_string()));
            };
            for (class, on) in toggles {
                let on = match on {
                    Literal::Scalar(value) => value.is_truthy(),
                    _ => return Err(BindError::InvalidAttribute(format!("classList.{class}"))),
                };
                if on {
                    doc.add_class(node, &class)?;
                } else {
                    doc.remove_class(node, &class)?;
                }
            }
            return Ok(());
        }

        if let Some(event) = key.strip_prefix('!') {
            return match literal {
                Literal::Handler(handler) => Ok(rt.handlers().bind(doc, node, event, handler)?),
                Literal::Scalar(Scalar::Null) => {
                    rt.handlers().unbind(doc, node, event);
                    Ok(())
                }
                _ => Err(BindError::InvalidAttribute(key.to_string())),
            };
        }

        if let Some(path) = key.strip_prefix('.') {
            let Literal::Scalar(value) = literal else {
                return Err(BindError::InvalidAttribute(key.to_string()));
            };
            return Ok(doc.set_prop(node, path, value)?);
        }

        if key == "value" {
            return self.apply(node, literal, waits);
        }

        match literal {
            Literal::Scalar(Scalar::Null | Scalar::Bool(false)) => {
                doc.remove_attr(node, key)?;
            }
            Literal::Scalar(Scalar::Bool(true)) => doc.set_attr(node, key, "")?,
            Literal::Scalar(value) => doc.set_attr(node, key, &value.to_text())?,
            Literal::Handler(_) => return Err(BindError::MisplacedHandler),
            _ => return Err(BindError::InvalidAttribute(key.to_string())),
        }
        Ok(())
    }
}

// =============================================================================
// DEFERRED VALUES
// =============================================================================

impl View {
    /// Apply `deferred` with `then` once it resolves.
    ///
    /// The view is held weakly; a view dropped before resolution settles the
    /// wait without applying anything.
    fn defer<F>(&self, deferred: Deferred, then: F) -> Pending
    where
        F: FnOnce(&View, Literal, &mut Vec<Pending>) -> Result<(), BindError> + 'static,
    {
        let weak = self.downgrade();
        let (tx, rx) = oneshot::channel();
        self.inner.rt.spawn(async move {
            let result = resolve_into(weak, deferred, then).await;
            if let Err(err) = &result {
                tracing::warn!(%err, "deferred binding failed");
            }
            let _ = tx.send(result);
        });
        rx.map(|result| result.unwrap_or(Err(BindError::Abandoned)))
            .boxed_local()
    }
}

async fn resolve_into<F>(weak: Weak<ViewInner>, deferred: Deferred, then: F) -> Result<(), BindError>
where
    F: FnOnce(&View, Literal, &mut Vec<Pending>) -> Result<(), BindError>,
{
    let literal = deferred.resolve().await?;
    let Some(inner) = weak.upgrade() else {
        return Ok(());
    };
    let mut nested = Vec::new();
    then(&View::from_inner(inner), literal, &mut nested)?;
    settle(nested).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Document, ElementAdapter, ElementDef, Event, MutationKind};
    use crate::primitives::RenderStats;
    use crate::test_support::Harness;
    use crate::types::{Value, attrs, data};
    use futures::channel::oneshot;
    use std::cell::Cell;
    use std::rc::Rc;

    fn profile(h: &Harness) -> View {
        h.view(
            ElementDef::new("form")
                .child(ElementDef::new("input").attr("name", "email"))
                .child(ElementDef::new("span").attr("name", "status"))
                .child(ElementDef::new("button").attr("name", "save").text("Save"))
                .child(ElementDef::new("ul").attr("name", "orders[]").child(ElementDef::new("li"))),
        )
    }

    #[test]
    fn test_email_round_trip_with_class() {
        let mut h = Harness::new();
        let view = profile(&h);
        view.set_data(data([(
            "email",
            attrs([("value", Literal::from("ops@desk.io")), ("class", Literal::from("ok"))]),
        )]))
        .unwrap();
        h.run();

        let email = view.named("email")[0];
        assert_eq!(
            view.read_data(Some(&["email"])).unwrap()["email"],
            Value::text("ops@desk.io")
        );
        assert!(h.doc.has_class(email, "ok"));
    }

    #[test]
    fn test_attribute_rules() {
        let h = Harness::new();
        let view = profile(&h);
        let save = view.named("save")[0];
        view.set_data(data([(
            "save",
            attrs([
                ("disabled", Literal::from(true)),
                ("title", Literal::from(3)),
                (".tabIndex", Literal::from(2)),
                ("classList", attrs([("busy", true), ("idle", false)])),
            ]),
        )]))
        .unwrap();
        assert_eq!(h.doc.attr(save, "disabled").as_deref(), Some(""));
        assert_eq!(h.doc.attr(save, "title").as_deref(), Some("3"));
        assert_eq!(h.doc.prop(save, "tabIndex"), Some(Scalar::Number(2.0)));
        assert!(h.doc.has_class(save, "busy"));

        view.set_data(data([("save", attrs([("disabled", false)]))])).unwrap();
        assert!(!h.doc.has_attr(save, "disabled"));
    }

    #[test]
    fn test_handler_binding_replaces_and_unbinds() {
        let h = Harness::new();
        let view = profile(&h);
        let save = view.named("save")[0];
        let clicks = Rc::new(Cell::new(0));

        for _ in 0..2 {
            let c = clicks.clone();
            view.set_data(data([(
                "save",
                attrs([("!click", Literal::handler(move |_| c.set(c.get() + 1)))]),
            )]))
            .unwrap();
        }
        h.doc.dispatch(&Event::click(save));
        assert_eq!(clicks.get(), 1);
        assert_eq!(h.doc.listener_count(save), 1);

        view.set_data(data([("save", attrs([("!click", Literal::null())]))])).unwrap();
        h.doc.dispatch(&Event::click(save));
        assert_eq!(clicks.get(), 1);
        assert!(!h.rt.handlers().is_bound(save, "click"));
    }

    #[test]
    fn test_binding_same_data_twice_changes_nothing() {
        let mut h = Harness::new();
        let view = h.view(
            ElementDef::new("form")
                .child(ElementDef::new("input").attr("name", "email"))
                .child(ElementDef::new("span").attr("name", "status"))
                .child(ElementDef::new("div").attr("name", "chart"))
                .child(ElementDef::new("div").attr("name", "badge"))
                .child(
                    ElementDef::new("ul")
                        .attr("name", "orders[]")
                        .child(ElementDef::new("li").child(ElementDef::new("span").attr("name", "pair"))),
                ),
        );
        let chart = h.view(ElementDef::new("canvas"));
        let badge = h.doc.create_element("img");
        let bound = data([
            ("email", attrs([("value", Literal::from("ops@desk.io")), ("class", Literal::from("ok wide"))])),
            ("status", Literal::from("running")),
            ("chart", Literal::View(chart.clone())),
            ("badge", Literal::Node(badge)),
            (
                "orders",
                Literal::Rows(vec![
                    RowLiteral::new("btc").with("pair", "BTC/USDT"),
                    RowLiteral::new("eth").with("pair", "ETH/USDT"),
                ]),
            ),
        ]);

        view.set_data(bound.clone()).unwrap();
        h.run();
        let rows_before: Vec<NodeId> =
            view.group("orders", |g| g.rows().into_iter().map(|(_, v)| v.root()).collect()).unwrap();

        let records = h.count_mutations(MutationKind::all(), || {
            view.set_data(bound).unwrap();
        });
        h.run();
        assert_eq!(records, 0);
        let rows_after: Vec<NodeId> =
            view.group("orders", |g| g.rows().into_iter().map(|(_, v)| v.root()).collect()).unwrap();
        assert_eq!(rows_after, rows_before);
        assert_eq!(h.doc.children(view.named("chart")[0]), vec![chart.root()]);
        assert_eq!(h.doc.children(view.named("badge")[0]), vec![badge]);
        assert_eq!(view.group("orders", |g| g.last_stats()), Some(RenderStats::default()));
    }

    #[test]
    fn test_node_binding_to_released_node_keeps_content() {
        let h = Harness::new();
        let view = profile(&h);
        let status = view.named("status")[0];
        view.set_data(data([("status", "idle")])).unwrap();

        let gone = h.doc.create_element("div");
        h.doc.release(gone).unwrap();
        assert!(view.set_data(data([("status", Literal::Node(gone))])).is_err());
        assert_eq!(h.doc.text(status), "idle");
    }

    #[test]
    fn test_misplaced_handler_and_rows() {
        let h = Harness::new();
        let view = profile(&h);
        let Err(err) = view.set_data(data([("status", Literal::handler(|_| {}))])) else {
            panic!("a handler on a plain element should fail");
        };
        assert_eq!(err, BindError::MisplacedHandler);

        let Err(err) = view.set_data(data([("status", Literal::Rows(vec![]))])) else {
            panic!("rows on a non-group name should fail");
        };
        assert_eq!(err, BindError::NotAGroup("status".into()));

        let Err(err) = view.set_data(data([("orders", Literal::from("x"))])) else {
            panic!("a scalar on a group should fail");
        };
        assert!(matches!(err, BindError::InvalidLiteral(_)));

        // Unmatched names are a no-op.
        assert!(view.set_data(data([("nothing", Literal::from(1))])).is_ok());
    }

    #[test]
    fn test_deferred_value_applies_later() {
        let mut h = Harness::new();
        let view = profile(&h);
        let (tx, rx) = oneshot::channel::<Literal>();
        let deferred = Literal::deferred(async move { rx.await.map_err(|_| BindError::Abandoned) });

        let pending = view
            .set_data(data([("status", deferred), ("email", Literal::from("now"))]))
            .unwrap();
        let done = h.track(pending);
        h.run();

        let status = view.named("status")[0];
        assert_eq!(h.doc.text(status), "");
        assert_eq!(
            view.read_data(Some(&["email"])).unwrap()["email"],
            Value::text("now")
        );
        assert!(done.borrow().is_none());

        tx.send(Literal::from("filled")).unwrap();
        h.run();
        assert_eq!(h.doc.text(status), "filled");
        assert_eq!(*done.borrow(), Some(Ok(())));
    }

    #[test]
    fn test_deferred_attribute_and_failure() {
        let mut h = Harness::new();
        let view = profile(&h);
        let save = view.named("save")[0];
        let title = Literal::deferred(async { Ok(Literal::from("later")) });
        let pending = view.set_data(data([("save", attrs([("title", title)]))])).unwrap();
        let done = h.track(pending);
        h.run();
        assert_eq!(h.doc.attr(save, "title").as_deref(), Some("later"));
        assert_eq!(*done.borrow(), Some(Ok(())));

        let failing = Literal::deferred(async { Err(BindError::Rejected("offline".into())) });
        let pending = view.set_data(data([("status", failing)])).unwrap();
        let done = h.track(pending);
        h.run();
        assert_eq!(*done.borrow(), Some(Err(BindError::Rejected("offline".into()))));
    }

    #[test]
    fn test_path_binding_into_rows() {
        let mut h = Harness::new();
        let view = h.view(
            ElementDef::new("div").child(
                ElementDef::new("ul")
                    .attr("name", "orders[]")
                    .child(ElementDef::new("li").child(ElementDef::new("span").attr("name", "qty"))),
            ),
        );
        view.set_data(data([(
            "orders",
            Literal::Rows(vec![RowLiteral::new("a"), RowLiteral::new("b")]),
        )]))
        .unwrap();
        h.run();

        let qty_b = Selector::from_path(&[Some("orders"), Some("b"), Some("qty")]).unwrap();
        view.set_data_at(&qty_b, Literal::from(7)).unwrap();
        view.set_data_at(&Selector::path("orders", Some("a")), attrs([("qty", 3)]))
            .unwrap();

        let rows = view.group("orders", |g| g.rows()).unwrap();
        assert_eq!(h.doc.text(rows[0].1.root()), "3");
        assert_eq!(h.doc.text(rows[1].1.root()), "7");
    }

    #[test]
    fn test_null_clears_group() {
        let mut h = Harness::new();
        let view = profile(&h);
        view.set_data(data([("orders[]", Literal::Rows(vec![RowLiteral::new("1")]))]))
            .unwrap();
        view.set_data(data([("orders", Literal::null())])).unwrap();
        h.run();
        assert_eq!(view.group("orders", |g| g.len()), Some(0));
    }

    struct Stars;

    impl ElementAdapter for Stars {
        fn set_value(&self, doc: &Document, node: NodeId, value: &Scalar) -> Result<(), BindError> {
            let n = match value {
                Scalar::Number(n) => *n as usize,
                _ => return Err(BindError::InvalidLiteral("stars expects a number".into())),
            };
            doc.set_text(node, &"*".repeat(n))?;
            Ok(())
        }

        fn get_value(&self, doc: &Document, node: NodeId, _acc: Option<Value>) -> Value {
            Value::from(doc.text(node).len() as i64)
        }
    }

    #[test]
    fn test_custom_element_adapter() {
        let h = Harness::new();
        h.rt.register_element("x-stars", Stars).unwrap();
        let view = h.view(ElementDef::new("div").child(ElementDef::new("x-stars").attr("name", "rating")));

        view.set_data(data([("rating", 3)])).unwrap();
        let rating = view.named("rating")[0];
        assert_eq!(h.doc.text(rating), "***");
        assert_eq!(view.read_data(None).unwrap()["rating"], Value::from(3));
        assert!(view.set_data(data([("rating", "lots")])).is_err());
    }
}
