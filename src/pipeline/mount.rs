//! Mount - Putting views on screen and taking them off.
//!
//! # Pattern
//!
//! - `open` inserts the root synchronously, then waits until the node is
//!   attached, lets layout settle for a few frames, and plays the opening
//!   animation
//! - `close` swaps to the closing class at once and detaches when the
//!   animation ends
//! - `replace` closes whatever currently occupies a slot and opens the next
//!   view in its place. Replacements on the same slot run one at a time, in
//!   call order, so two views of one slot are never attached together
//!
//! # Example
//!
//! ```ignore
//! let list = View::from_template(&rt, "bot-list".into())?;
//! list.open(None).await?;
//!
//! let detail = View::from_template(&rt, "bot-detail".into())?;
//! list.replace(&detail).await?;
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};

use crate::engine::NodeId;
use crate::error::LifecycleError;
use crate::primitives::{View, ViewInner, ViewState};
use crate::state::{Transition, close_node, open_node};

// =============================================================================
// Replace Slot
// =============================================================================

/// Shared by every view that took part in a `replace` chain.
pub(crate) struct ReplaceSlot {
    current: RefCell<Weak<ViewInner>>,
    lock: RefCell<Shared<LocalBoxFuture<'static, ()>>>,
}

impl ReplaceSlot {
    fn new(current: &View) -> Self {
        Self {
            current: RefCell::new(current.downgrade()),
            lock: RefCell::new(future::ready(()).boxed_local().shared()),
        }
    }

    fn current(&self) -> Option<View> {
        self.current.borrow().upgrade().map(View::from_inner)
    }
}

/// Where the next view of a slot goes.
enum Placement {
    Body,
    Modal,
    At { parent: NodeId, before: Option<NodeId> },
}

// =============================================================================
// Open / Close
// =============================================================================

impl View {
    /// Open under `parent`, or the document body.
    pub fn open(&self, parent: Option<NodeId>) -> Transition {
        let parent = parent.unwrap_or_else(|| self.inner.rt.document().body());
        self.open_at(parent, None)
    }

    /// Open under `parent`, before `before` (appended when `None`).
    ///
    /// The root is inserted before this returns. The transition settles once
    /// the opening animation has played.
    pub fn open_at(&self, parent: NodeId, before: Option<NodeId>) -> Transition {
        let rt = self.inner.rt.clone();
        let root = self.root();
        if let Err(err) = rt.document().insert_before(parent, root, before) {
            return future::ready(Err(err.into())).boxed_local();
        }
        self.set_state(ViewState::Opening);
        tracing::debug!(%root, %parent, "opening view");

        let view = self.clone();
        rt.clone().drive(async move {
            let result = async {
                rt.lifecycle().wait_for_render(root).await?;
                let delay = rt.config().settle_delay();
                if !delay.is_zero() {
                    rt.document().clock().sleep(delay).await;
                }
                open_node(rt.document(), rt.config(), root).await
            }
            .await;
            if view.state() == ViewState::Opening {
                view.set_state(match result {
                    Ok(()) => ViewState::Open,
                    Err(_) => ViewState::Closed,
                });
            }
            result
        })
    }

    /// Open inside a fresh overlay appended to the body. Closing the view
    /// releases the overlay.
    pub fn open_modal(&self) -> Transition {
        let rt = &self.inner.rt;
        let doc = rt.document();
        let overlay = match self.inner.overlay.get().filter(|o| doc.exists(*o)) {
            Some(overlay) => overlay,
            None => {
                let overlay = doc.create_element("div");
                let added = doc
                    .add_class(overlay, &rt.config().overlay_class)
                    .and_then(|_| doc.append_child(doc.body(), overlay));
                if let Err(err) = added {
                    if let Err(release) = doc.release(overlay) {
                        tracing::debug!(%overlay, err = %release, "overlay release failed");
                    }
                    return future::ready(Err(err.into())).boxed_local();
                }
                self.inner.overlay.set(Some(overlay));
                overlay
            }
        };
        self.open_at(overlay, None)
    }

    /// Play the closing animation, then detach the root.
    ///
    /// The node keeps its identity; it can be opened again.
    pub fn close(&self) -> Transition {
        let rt = self.inner.rt.clone();
        self.set_state(ViewState::Closing);
        let closing = close_node(rt.document(), rt.config(), self.root());

        let view = self.clone();
        rt.clone().drive(async move {
            let result = closing.await;
            if let Some(overlay) = view.inner.overlay.take()
                && rt.document().exists(overlay)
                && let Err(err) = rt.document().release(overlay)
            {
                tracing::debug!(%overlay, %err, "overlay release failed");
            }
            if view.state() == ViewState::Closing {
                view.set_state(ViewState::Closed);
            }
            if let Err(err) = &result {
                tracing::debug!(root = %view.root(), %err, "close failed");
            }
            result
        })
    }
}

// =============================================================================
// Replace
// =============================================================================

impl View {
    /// Close this slot's current view and open `next` where it was.
    ///
    /// A modal occupant is replaced by a modal. Calls queue behind each other
    /// on the same slot.
    pub fn replace(&self, next: &View) -> Transition {
        let slot = self
            .inner
            .slot
            .borrow()
            .clone()
            .unwrap_or_else(|| Rc::new(ReplaceSlot::new(self)));
        *self.inner.slot.borrow_mut() = Some(slot.clone());
        *next.inner.slot.borrow_mut() = Some(slot.clone());

        let previous = slot.lock.borrow().clone();
        let (tx, rx) = oneshot::channel();
        let task = {
            let slot = slot.clone();
            let next = next.clone();
            async move {
                previous.await;
                let _ = tx.send(swap(&slot, &next).await);
            }
        }
        .boxed_local()
        .shared();
        *slot.lock.borrow_mut() = task.clone();
        self.inner.rt.spawn(task);

        rx.map(|result| result.unwrap_or(Err(LifecycleError::Abandoned)))
            .boxed_local()
    }
}

async fn swap(slot: &ReplaceSlot, next: &View) -> Result<(), LifecycleError> {
    let doc = next.inner.rt.document().clone();
    let mut placement = Placement::Body;

    if let Some(current) = slot.current()
        && !current.ptr_eq(next)
        && let Some(parent) = doc.parent(current.root())
    {
        placement = if current.inner.overlay.get() == Some(parent) {
            Placement::Modal
        } else {
            Placement::At {
                parent,
                before: doc.next_sibling(current.root()),
            }
        };
        current.close().await?;
    }
    *slot.current.borrow_mut() = next.downgrade();

    if doc.parent(next.root()).is_some() {
        return Ok(());
    }
    match placement {
        Placement::Body => next.open(None).await,
        Placement::Modal => next.open_modal().await,
        Placement::At { parent, before } => {
            if !doc.exists(parent) {
                return next.open(None).await;
            }
            let before = before.filter(|b| doc.parent(*b) == Some(parent));
            next.open_at(parent, before).await
        }
    }
}
