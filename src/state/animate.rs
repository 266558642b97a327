//! Open/Close Animations - Class-driven transitions
//!
//! A node opts into animated open/close by declaring its classes:
//!
//! ```text
//! <div data-open-class="fade-in" data-close-class="fade-out">
//! ```
//!
//! # Pattern
//!
//! - Opening adds the opening class and awaits its animation, if any
//! - Closing swaps the opening class for the closing class, restarts keyframe
//!   animations by re-inserting the node in place, then awaits the first of
//!   the end event or a timer of the animation's duration
//! - A node without both classes, or not currently open, is detached at once

use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};

use super::lifecycle::Transition;
use crate::config::Config;
use crate::engine::{Animation, AnimationKind, Document, NodeId};
use crate::error::LifecycleError;

// =============================================================================
// PUBLIC API
// =============================================================================

/// Add the node's opening class and wait for the animation it starts.
pub fn open_node(doc: &Document, config: &Config, node: NodeId) -> Transition {
    let animation = match begin_open(doc, config, node) {
        Ok(animation) => animation,
        Err(err) => return future::ready(Err(err)).boxed_local(),
    };
    match animation {
        Some(animation) => wait_for_end(doc, node, animation)
            .map(|_| Ok(()))
            .boxed_local(),
        None => future::ready(Ok(())).boxed_local(),
    }
}

/// Detach `node`, playing its closing animation first when it has one.
///
/// Fails with `Released` for a released node and `NotAttached` for a node
/// without a parent. The class swap happens before this returns.
pub fn close_node(doc: &Document, config: &Config, node: NodeId) -> Transition {
    let animation = match begin_close(doc, config, node) {
        Ok(animation) => animation,
        Err(err) => return future::ready(Err(err)).boxed_local(),
    };
    match animation {
        Some(animation) => {
            let doc = doc.clone();
            async move {
                wait_for_end(&doc, node, animation).await;
                detach(&doc, node)
            }
            .boxed_local()
        }
        None => future::ready(detach(doc, node)).boxed_local(),
    }
}

// =============================================================================
// INTERNALS
// =============================================================================

fn begin_open(
    doc: &Document,
    config: &Config,
    node: NodeId,
) -> Result<Option<Animation>, LifecycleError> {
    if !doc.exists(node) {
        return Err(LifecycleError::Released(node));
    }
    if let Some(close) = doc.attr(node, &config.close_class_attr) {
        doc.remove_class(node, &close)?;
    }
    let Some(open) = doc.attr(node, &config.open_class_attr) else {
        return Ok(None);
    };
    doc.add_class(node, &open)?;
    Ok(doc.computed_animation(node).filter(|a| !a.is_instant()))
}

fn begin_close(
    doc: &Document,
    config: &Config,
    node: NodeId,
) -> Result<Option<Animation>, LifecycleError> {
    if !doc.exists(node) {
        return Err(LifecycleError::Released(node));
    }
    let Some(parent) = doc.parent(node) else {
        return Err(LifecycleError::NotAttached(node));
    };

    let open = doc.attr(node, &config.open_class_attr);
    let close = doc.attr(node, &config.close_class_attr);
    let (Some(open), Some(close)) = (open, close) else {
        return Ok(None);
    };
    if !doc.has_class(node, &open) {
        return Ok(None);
    }

    doc.remove_class(node, &open)?;
    doc.add_class(node, &close)?;
    let Some(animation) = doc.computed_animation(node).filter(|a| !a.is_instant()) else {
        return Ok(None);
    };
    if animation.kind == AnimationKind::Keyframes {
        let next = doc.next_sibling(node);
        doc.insert_before(parent, node, next)?;
    }
    Ok(Some(animation))
}

/// A node released while its animation ran counts as closed.
fn detach(doc: &Document, node: NodeId) -> Result<(), LifecycleError> {
    if doc.exists(node) {
        doc.remove(node)?;
    }
    Ok(())
}

/// Resolves on the first of the animation's end event at `node` or a timer
/// of its duration.
fn wait_for_end(doc: &Document, node: NodeId, animation: Animation) -> LocalBoxFuture<'static, ()> {
    let (tx, rx) = oneshot::channel::<()>();
    let tx = Rc::new(RefCell::new(Some(tx)));

    let fire = {
        let tx = tx.clone();
        move || {
            if let Some(tx) = tx.borrow_mut().take() {
                let _ = tx.send(());
            }
        }
    };

    let listener = {
        let fire = fire.clone();
        doc.add_listener(node, animation.end_event(), move |event| {
            if event.target == node {
                fire();
            }
        })
    };
    let timer = doc.clock().set_timeout(animation.duration, fire);

    let doc = doc.clone();
    async move {
        let _ = rx.await;
        if let Ok(id) = listener {
            doc.remove_listener(id);
        }
        doc.clock().clear_timeout(timer);
    }
    .boxed_local()
}
