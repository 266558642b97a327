//! Group Reconciler - Keyed rows with minimal structural change.
//!
//! A group is the container element named with the group suffix
//! (`trades[]`). Its row templates are taken out of the container when the
//! view is indexed; every row of a bound collection becomes one cloned
//! template wrapped in its own [`View`].
//!
//! # Row Lifecycle
//!
//! - New ids: clone the template, wrap in a view, bind the row literal
//! - Existing ids: bind the row literal into the same view (NO recreation!)
//! - Removed ids: close with animation, then release the row's nodes
//!
//! # Ordering
//!
//! After binding, the rows kept from the previous render that form a longest
//! increasing run of their old positions stay where they are. Every other
//! row is inserted before its successor in the new order, walking from the
//! end. The number of moves is the minimum for a keyed reorder.
//!
//! ```text
//! [a, b, c] -> [c, a, b]   c moves before a
//! [a, b, c] -> [b, c, a]   a moves to the end
//! ```

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;

use super::bind::Pending;
use super::view::View;
use crate::diagnostics::Diagnostic;
use crate::engine::NodeId;
use crate::error::BindError;
use crate::pipeline::Runtime;
use crate::types::RowLiteral;

/// Counters of one group render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Rows created from a template.
    pub created: usize,
    /// Existing rows repositioned.
    pub moved: usize,
    /// Rows torn down.
    pub removed: usize,
    /// Rows whose update failed.
    pub failed: usize,
}

pub struct Group {
    name: String,
    container: NodeId,
    templates: IndexMap<String, NodeId>,
    rows: HashMap<String, View>,
    order: Vec<String>,
    next_order: Vec<String>,
    last_stats: RenderStats,
}

impl Group {
    /// Take the row templates out of `container`.
    ///
    /// Children carrying the template attribute are templates, keyed by its
    /// value (empty means `default`). Without any, the first child is the
    /// default template.
    pub(crate) fn index(rt: &Runtime, name: &str, container: NodeId) -> Result<Self, BindError> {
        let doc = rt.document();
        let attr = &rt.config().template_attr;
        let children = doc.children(container);

        let mut templates = IndexMap::new();
        for child in &children {
            if let Some(key) = doc.attr(*child, attr) {
                let key = if key.is_empty() { "default".to_string() } else { key };
                templates.insert(key, *child);
            }
        }
        if templates.is_empty()
            && let Some(first) = children.first()
        {
            templates.insert("default".to_string(), *first);
        }
        for node in templates.values() {
            doc.remove(*node)?;
        }

        Ok(Self {
            name: name.to_string(),
            container,
            templates,
            rows: HashMap::new(),
            order: Vec::new(),
            next_order: Vec::new(),
            last_stats: RenderStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Row ids in display order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn row(&self, id: &str) -> Option<View> {
        self.rows.get(id).cloned()
    }

    /// Row views in display order.
    pub fn rows(&self) -> Vec<(String, View)> {
        self.order
            .iter()
            .filter_map(|id| self.rows.get(id).map(|v| (id.clone(), v.clone())))
            .collect()
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn last_stats(&self) -> RenderStats {
        self.last_stats
    }

    // -------------------------------------------------------------------------
    // Render
    // -------------------------------------------------------------------------

    /// Reconcile the group with `rows`. Duplicate ids fail before anything
    /// is touched. Returns the pending deferred work of the row bindings.
    pub(crate) fn render(
        &mut self,
        rt: &Rc<Runtime>,
        rows: Vec<RowLiteral>,
    ) -> Result<Vec<Pending>, BindError> {
        let ids: Vec<String> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| row.id.clone().unwrap_or_else(|| i.to_string()))
            .collect();
        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !seen.insert(id.as_str()) {
                return Err(BindError::DuplicateRowId {
                    group: self.name.clone(),
                    id: id.clone(),
                });
            }
        }

        self.begin();
        let mut stats = RenderStats::default();
        let mut pending = Vec::new();
        for (id, row) in ids.into_iter().zip(rows) {
            match self.update(rt, &id, row) {
                Ok((created, waits)) => {
                    if created {
                        stats.created += 1;
                    }
                    pending.push(waits);
                }
                Err(error) => {
                    stats.failed += 1;
                    rt.report(Diagnostic::RowUpdateFailed {
                        group: self.name.clone(),
                        id,
                        error,
                    });
                }
            }
        }
        let (moved, removed) = self.finish(rt);
        stats.moved = moved;
        stats.removed = removed;

        tracing::debug!(
            group = %self.name,
            rows = self.order.len(),
            created = stats.created,
            moved = stats.moved,
            removed = stats.removed,
            failed = stats.failed,
            "group rendered"
        );
        self.last_stats = stats;
        Ok(pending)
    }

    fn begin(&mut self) {
        self.next_order.clear();
    }

    /// Bind one row. Returns whether the row was created.
    fn update(
        &mut self,
        rt: &Rc<Runtime>,
        id: &str,
        row: RowLiteral,
    ) -> Result<(bool, Pending), BindError> {
        let (view, created) = match self.rows.get(id) {
            Some(view) => (view.clone(), false),
            None => {
                let node = self.instantiate(rt, row.template.as_deref())?;
                let view = View::new(rt, node)?;
                self.rows.insert(id.to_string(), view.clone());
                (view, true)
            }
        };
        self.next_order.push(id.to_string());
        let pending = view.set_data(row.data)?;
        Ok((created, pending))
    }

    fn instantiate(&self, rt: &Runtime, template: Option<&str>) -> Result<NodeId, BindError> {
        let doc = rt.document();
        let node = match template {
            Some(name) => match self.templates.get(name) {
                Some(source) => doc.clone_subtree(*source)?,
                None => rt.templates().clone_template(doc, name)?,
            },
            None => {
                let source = self
                    .templates
                    .get("default")
                    .or_else(|| self.templates.values().next())
                    .ok_or_else(|| BindError::MissingTemplate(self.name.clone()))?;
                doc.clone_subtree(*source)?
            }
        };
        doc.remove_attr(node, &rt.config().template_attr)?;
        Ok(node)
    }

    /// Place rows in the new order and tear down the ones that left.
    /// Returns (moved, removed).
    fn finish(&mut self, rt: &Rc<Runtime>) -> (usize, usize) {
        let next_order = std::mem::take(&mut self.next_order);
        let keep: HashSet<&str> = next_order.iter().map(String::as_str).collect();

        let removed: Vec<String> = self
            .order
            .iter()
            .filter(|id| !keep.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &removed {
            if let Some(view) = self.rows.remove(id) {
                self.teardown(rt, id.clone(), view);
            }
        }

        // Rows on a longest run already in the new relative order stay put.
        let previous: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let retained: Vec<(usize, usize)> = next_order
            .iter()
            .enumerate()
            .filter_map(|(pos, id)| previous.get(id.as_str()).map(|&was| (pos, was)))
            .collect();
        let seq: Vec<usize> = retained.iter().map(|&(_, was)| was).collect();
        let stay: HashSet<usize> = longest_increasing(&seq)
            .into_iter()
            .map(|i| retained[i].0)
            .collect();

        let doc = rt.document();
        let mut anchor: Option<NodeId> = None;
        let mut moved = 0;
        for (pos, id) in next_order.iter().enumerate().rev() {
            let Some(view) = self.rows.get(id) else {
                continue;
            };
            let root = view.root();
            if stay.contains(&pos) {
                anchor = Some(root);
                continue;
            }
            match doc.insert_before(self.container, root, anchor) {
                Ok(()) => {
                    if previous.contains_key(id.as_str()) {
                        moved += 1;
                    }
                    anchor = Some(root);
                }
                Err(err) => {
                    tracing::warn!(group = %self.name, %id, %err, "failed to place row");
                }
            }
        }

        let removed_count = removed.len();
        self.order = next_order;
        (moved, removed_count)
    }

    /// Close the row with animation, then release its nodes. Failures are
    /// reported and never block sibling rows.
    fn teardown(&self, rt: &Rc<Runtime>, id: String, view: View) {
        let closing = view.close();
        let group = self.name.clone();
        let reporter = rt.clone();
        rt.spawn(async move {
            if let Err(error) = closing.await {
                reporter.report(Diagnostic::RowTeardownFailed {
                    group,
                    id,
                    error,
                });
            }
            view.discard();
        });
    }
}

/// Indices of one longest strictly increasing subsequence of `seq`.
fn longest_increasing(seq: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &value) in seq.iter().enumerate() {
        let at = tails.partition_point(|&t| seq[t] < value);
        if at > 0 {
            prev[i] = Some(tails[at - 1]);
        }
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }
    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(i);
        cursor = prev[i];
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Animation, ElementDef};
    use crate::error::LifecycleError;
    use crate::test_support::Harness;
    use crate::types::{Literal, Value, data};
    use proptest::prelude::*;
    use std::time::Duration;

    fn book(h: &Harness) -> View {
        h.view(
            ElementDef::new("section").child(
                ElementDef::new("ul").attr("name", "trades[]").child(
                    ElementDef::new("li")
                        .attr("data-open-class", "row-in")
                        .attr("data-close-class", "row-out")
                        .child(ElementDef::new("span").attr("name", "symbol"))
                        .child(ElementDef::new("span").attr("name", "qty")),
                ),
            ),
        )
    }

    fn rows(ids: &[&str]) -> Literal {
        Literal::Rows(
            ids.iter()
                .map(|id| RowLiteral::new(*id).with("symbol", id.to_uppercase()))
                .collect(),
        )
    }

    fn roots(view: &View) -> Vec<NodeId> {
        view.group("trades", |g| g.rows().into_iter().map(|(_, v)| v.root()).collect())
            .unwrap_or_default()
    }

    fn container_children(h: &Harness, view: &View) -> Vec<NodeId> {
        let container = view.group("trades", |g| g.container()).unwrap();
        h.doc.children(container)
    }

    #[test]
    fn test_template_taken_out_of_container() {
        let h = Harness::new();
        let view = book(&h);
        assert!(container_children(&h, &view).is_empty());
        assert_eq!(view.group("trades", |g| g.template_names()), Some(vec!["default".to_string()]));
    }

    #[test]
    fn test_rows_render_in_order() {
        let mut h = Harness::new();
        let view = book(&h);
        view.set_data(data([("trades", rows(&["a", "b", "c"]))])).unwrap();
        h.run();

        assert_eq!(container_children(&h, &view), roots(&view));
        let texts: Vec<String> = roots(&view).iter().map(|r| h.doc.text(*r)).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
        assert_eq!(
            view.group("trades", |g| g.last_stats()),
            Some(RenderStats {
                created: 3,
                ..RenderStats::default()
            })
        );
    }

    #[test]
    fn test_rotation_is_one_move() {
        let h = Harness::new();
        let view = book(&h);
        view.set_data(data([("trades", rows(&["a", "b", "c"]))])).unwrap();
        let before = roots(&view);

        let moves = h.count_mutations(crate::engine::MutationKind::ATTACH, || {
            view.set_data(data([("trades", rows(&["c", "a", "b"]))])).unwrap();
        });
        assert_eq!(moves, 1);
        assert_eq!(view.group("trades", |g| g.last_stats().moved), Some(1));
        assert_eq!(roots(&view), vec![before[2], before[0], before[1]]);
        assert_eq!(container_children(&h, &view), roots(&view));
    }

    #[test]
    fn test_rotation_to_the_end_is_one_move() {
        let h = Harness::new();
        let view = book(&h);
        view.set_data(data([("trades", rows(&["a", "b", "c"]))])).unwrap();
        let before = roots(&view);

        let moves = h.count_mutations(crate::engine::MutationKind::ATTACH, || {
            view.set_data(data([("trades", rows(&["b", "c", "a"]))])).unwrap();
        });
        assert_eq!(moves, 1);
        assert_eq!(view.group("trades", |g| g.last_stats().moved), Some(1));
        assert_eq!(roots(&view), vec![before[1], before[2], before[0]]);
        assert_eq!(container_children(&h, &view), roots(&view));
    }

    #[test]
    fn test_longest_increasing_run() {
        assert_eq!(longest_increasing(&[]), Vec::<usize>::new());
        assert_eq!(longest_increasing(&[1, 2, 0]), vec![0, 1]);
        assert_eq!(longest_increasing(&[2, 0, 1]), vec![1, 2]);
        assert_eq!(longest_increasing(&[3, 1, 4, 0, 5, 2]).len(), 3);
    }

    #[test]
    fn test_duplicate_id_fails_before_mutation() {
        let mut h = Harness::new();
        let view = book(&h);
        view.set_data(data([("trades", rows(&["a", "b"]))])).unwrap();
        let before = container_children(&h, &view);

        let Err(err) = view.set_data(data([("trades", rows(&["x", "b", "x"]))])) else {
            panic!("duplicate row ids should fail");
        };
        assert_eq!(
            err,
            BindError::DuplicateRowId {
                group: "trades".into(),
                id: "x".into()
            }
        );
        assert_eq!(container_children(&h, &view), before);
        assert_eq!(view.group("trades", |g| g.ids().to_vec()), Some(vec!["a".into(), "b".into()]));
        h.run();
    }

    #[test]
    fn test_removed_row_torn_down_once() {
        let mut h = Harness::new();
        h.doc.define_animation("row-out", Animation::keyframes(Duration::from_millis(200)));
        let view = book(&h);
        view.set_data(data([("trades", rows(&["a", "b", "c"]))])).unwrap();
        let b_root = view.group("trades", |g| g.row("b").unwrap().root()).unwrap();
        h.doc.add_class(b_root, "row-in").unwrap();

        view.set_data(data([("trades", rows(&["a", "c"]))])).unwrap();
        h.run();
        assert_eq!(view.group("trades", |g| g.last_stats().removed), Some(1));

        // Absent from reads at once, while the closing animation still runs.
        let read = view.read_data(Some(&["trades"])).unwrap();
        let Value::List(items) = &read["trades"] else { panic!("expected list") };
        assert_eq!(items.len(), 2);
        assert!(h.doc.parent(b_root).is_some());
        assert!(h.doc.has_class(b_root, "row-out"));

        h.pump(200);
        assert!(!h.doc.exists(b_root));
        assert!(h.sink.is_empty());
    }

    #[test]
    fn test_row_failure_does_not_block_siblings() {
        let mut h = Harness::new();
        let view = book(&h);
        let result = view.set_data(data([(
            "trades",
            Literal::Rows(vec![
                RowLiteral::new("a"),
                RowLiteral::new("b").template("no-such-template"),
                RowLiteral::new("c"),
            ]),
        )]));
        assert!(result.is_ok());
        h.run();

        assert_eq!(view.group("trades", |g| g.ids().to_vec()), Some(vec!["a".into(), "c".into()]));
        assert_eq!(
            h.sink.take(),
            vec![Diagnostic::RowUpdateFailed {
                group: "trades".into(),
                id: "b".into(),
                error: BindError::UnknownTemplate("no-such-template".into()),
            }]
        );
    }

    #[test]
    fn test_teardown_of_detached_row_is_reported() {
        let mut h = Harness::new();
        let view = book(&h);
        view.set_data(data([("trades", rows(&["a"]))])).unwrap();
        let a_root = view.group("trades", |g| g.row("a").unwrap().root()).unwrap();
        h.doc.remove(a_root).unwrap();

        view.set_data(data([("trades", Literal::Rows(vec![]))])).unwrap();
        h.run();
        assert_eq!(
            h.sink.take(),
            vec![Diagnostic::RowTeardownFailed {
                group: "trades".into(),
                id: "a".into(),
                error: LifecycleError::NotAttached(a_root),
            }]
        );
        assert!(!h.doc.exists(a_root));
    }

    #[test]
    fn test_default_ids_are_indices() {
        let mut h = Harness::new();
        let view = book(&h);
        let literal = Literal::Rows(vec![
            RowLiteral::default().with("qty", 1),
            RowLiteral::default().with("qty", 2),
        ]);
        view.set_data(data([("trades", literal)])).unwrap();
        h.run();
        assert_eq!(view.group("trades", |g| g.ids().to_vec()), Some(vec!["0".into(), "1".into()]));
        let qty = view
            .group("trades", |g| g.row("1").unwrap())
            .unwrap()
            .read_data(Some(&["qty"]))
            .unwrap();
        assert_eq!(qty["qty"], Value::text("2"));
    }

    #[test]
    fn test_named_templates() {
        let mut h = Harness::new();
        let view = h.view(
            ElementDef::new("div").child(
                ElementDef::new("ul")
                    .attr("name", "events[]")
                    .child(ElementDef::new("li").attr("data-template", "").text("fill"))
                    .child(ElementDef::new("li").attr("data-template", "alert").class("alert")),
            ),
        );
        let literal = Literal::Rows(vec![
            RowLiteral::new("1"),
            RowLiteral::new("2").template("alert"),
        ]);
        view.set_data(data([("events", literal)])).unwrap();
        h.run();

        let rows = view.group("events", |g| g.rows()).unwrap();
        assert!(!h.doc.has_class(rows[0].1.root(), "alert"));
        assert!(h.doc.has_class(rows[1].1.root(), "alert"));
        assert!(!h.doc.has_attr(rows[1].1.root(), "data-template"));
    }

    proptest! {
        #[test]
        fn prop_same_ids_keep_row_identity(order in Just((0..6).collect::<Vec<u32>>()).prop_shuffle()) {
            let mut h = Harness::new();
            let view = book(&h);
            let ids: Vec<String> = (0..6).map(|i| format!("r{i}")).collect();
            let initial: Vec<&str> = ids.iter().map(String::as_str).collect();
            view.set_data(data([("trades", rows(&initial))])).unwrap();
            let first: HashMap<String, NodeId> = view
                .group("trades", |g| g.rows().into_iter().map(|(id, v)| (id, v.root())).collect())
                .unwrap();

            let shuffled: Vec<&str> = order.iter().map(|i| ids[*i as usize].as_str()).collect();
            view.set_data(data([("trades", rows(&shuffled))])).unwrap();
            h.run();

            let after = view.group("trades", |g| g.rows()).unwrap();
            prop_assert_eq!(after.len(), 6);
            for (position, (id, row)) in after.iter().enumerate() {
                prop_assert_eq!(id.as_str(), shuffled[position]);
                prop_assert_eq!(first[id], row.root());
            }
            prop_assert_eq!(container_children(&h, &view), after.iter().map(|(_, v)| v.root()).collect::<Vec<_>>());
            prop_assert_eq!(view.group("trades", |g| g.last_stats().created), Some(0));
            prop_assert_eq!(view.group("trades", |g| g.last_stats().removed), Some(0));
        }
    }
}
