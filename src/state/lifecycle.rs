//! Lifecycle Coordinator - Attachment waits sharing one observer
//!
//! Views need to know when a node actually became attached (to start its
//! opening animation) or detached (to finish a close). Every pending wait is
//! served by a single subscription to the [`AttachmentNotifier`] plus one
//! periodic sweep timer.
//!
//! # Pattern
//!
//! - First wait subscribes and starts the sweep, last settled wait stops both
//! - Every attachment change re-checks all pending waits
//! - The sweep re-checks too, then spends one round of each bounded wait, but
//!   only when a whole interval passed without any attachment change
//! - A wait whose rounds run out fails alone with `WaitTimeout`
//!
//! # Example
//!
//! ```ignore
//! let lifecycle = Lifecycle::new(Rc::new(doc.clone()), doc.clock().clone(), &config);
//! doc.append_child(doc.body(), panel)?;
//! lifecycle.wait_for_render(panel).await?;
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};

use crate::config::Config;
use crate::engine::{AttachmentNotifier, Clock, NodeId, ObserverId, TimerId};
use crate::error::{Attachment, LifecycleError};

/// Completion of a wait or a view transition.
pub type Transition = LocalBoxFuture<'static, Result<(), LifecycleError>>;

// =============================================================================
// COORDINATOR
// =============================================================================

struct Waiter {
    node: NodeId,
    target: Attachment,
    /// Sweeps left before timing out. `None` waits forever.
    rounds: Option<u32>,
    tx: oneshot::Sender<Result<(), LifecycleError>>,
}

struct Coordinator {
    notifier: Rc<dyn AttachmentNotifier>,
    clock: Clock,
    interval: Duration,
    render_rounds: u32,
    waiters: RefCell<Vec<Waiter>>,
    subscription: Cell<Option<ObserverId>>,
    sweep: Cell<Option<TimerId>>,
    last_change: Cell<Duration>,
}

impl Coordinator {
    fn matches(&self, node: NodeId, target: Attachment) -> bool {
        let attached = self.notifier.is_attached(node);
        match target {
            Attachment::Attached => attached,
            Attachment::Detached => !attached,
        }
    }

    /// Resolve every wait whose node reached its target state.
    fn settle(&self) {
        let settled: Vec<Waiter> = {
            let mut waiters = self.waiters.borrow_mut();
            let (done, pending): (Vec<_>, Vec<_>) = waiters
                .drain(..)
                .partition(|w| w.tx.is_canceled() || self.matches(w.node, w.target));
            *waiters = pending;
            done
        };
        if !settled.is_empty() {
            tracing::debug!(count = settled.len(), "attachment waits settled");
        }
        for waiter in settled {
            let _ = waiter.tx.send(Ok(()));
        }
    }

    fn on_change(&self) {
        self.last_change.set(self.clock.now());
        self.settle();
        self.stop_if_idle();
    }

    fn on_sweep(self: &Rc<Self>) {
        self.sweep.set(None);
        self.settle();

        let quiet = self.clock.now().saturating_sub(self.last_change.get()) >= self.interval;
        if quiet {
            let expired: Vec<Waiter> = {
                let mut waiters = self.waiters.borrow_mut();
                for waiter in waiters.iter_mut() {
                    if let Some(rounds) = waiter.rounds.as_mut() {
                        *rounds = rounds.saturating_sub(1);
                    }
                }
                let (expired, pending): (Vec<_>, Vec<_>) =
                    waiters.drain(..).partition(|w| w.rounds == Some(0));
                *waiters = pending;
                expired
            };
            for waiter in expired {
                tracing::debug!(node = %waiter.node, expected = %waiter.target, "attachment wait timed out");
                let _ = waiter.tx.send(Err(LifecycleError::WaitTimeout {
                    node: waiter.node,
                    target: waiter.target,
                }));
            }
        }

        if self.waiters.borrow().is_empty() {
            self.stop_if_idle();
        } else {
            self.schedule_sweep();
        }
    }

    fn start(self: &Rc<Self>) {
        if self.subscription.get().is_none() {
            let weak: Weak<Coordinator> = Rc::downgrade(self);
            let id = self.notifier.subscribe(Rc::new(move || {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.on_change();
                }
            }));
            self.subscription.set(Some(id));
        }
        if self.sweep.get().is_none() {
            self.schedule_sweep();
        }
    }

    fn schedule_sweep(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let id = self.clock.set_timeout(self.interval, move || {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.on_sweep();
            }
        });
        self.sweep.set(Some(id));
    }

    fn stop_if_idle(&self) {
        if !self.waiters.borrow().is_empty() {
            return;
        }
        if let Some(id) = self.subscription.take() {
            self.notifier.unsubscribe(id);
        }
        if let Some(id) = self.sweep.take() {
            self.clock.clear_timeout(id);
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.notifier.unsubscribe(id);
        }
        if let Some(id) = self.sweep.take() {
            self.clock.clear_timeout(id);
        }
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Shared handle to the attachment-wait coordinator.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Rc<Coordinator>,
}

impl Lifecycle {
    pub fn new(notifier: Rc<dyn AttachmentNotifier>, clock: Clock, config: &Config) -> Self {
        Self {
            inner: Rc::new(Coordinator {
                notifier,
                clock,
                interval: config.sweep_interval(),
                render_rounds: config.render_wait_rounds,
                waiters: RefCell::new(Vec::new()),
                subscription: Cell::new(None),
                sweep: Cell::new(None),
                last_change: Cell::new(Duration::ZERO),
            }),
        }
    }

    /// Wait until `node` is attached, with the configured round budget.
    pub fn wait_for_render(&self, node: NodeId) -> Transition {
        self.wait(node, Attachment::Attached, Some(self.inner.render_rounds))
    }

    /// Wait until `node` is detached, without a round budget.
    pub fn wait_for_remove(&self, node: NodeId) -> Transition {
        self.wait(node, Attachment::Detached, None)
    }

    /// Wait until `node` reaches `target`. With `rounds`, fail once that
    /// many quiet sweep intervals passed.
    pub fn wait(&self, node: NodeId, target: Attachment, rounds: Option<u32>) -> Transition {
        if self.inner.matches(node, target) {
            return future::ready(Ok(())).boxed_local();
        }
        if rounds == Some(0) {
            return future::ready(Err(LifecycleError::WaitTimeout { node, target })).boxed_local();
        }

        let (tx, rx) = oneshot::channel();
        self.inner.waiters.borrow_mut().push(Waiter {
            node,
            target,
            rounds,
            tx,
        });
        self.inner.start();

        rx.map(|result| result.unwrap_or(Err(LifecycleError::Abandoned)))
            .boxed_local()
    }

    /// Number of waits not yet settled.
    pub fn pending(&self) -> usize {
        self.inner.waiters.borrow().len()
    }

    /// Whether the shared subscription is active.
    pub fn is_observing(&self) -> bool {
        self.inner.subscription.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Document;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;

    struct Fixture {
        doc: Document,
        lifecycle: Lifecycle,
        pool: LocalPool,
    }

    fn fixture() -> Fixture {
        let doc = Document::new();
        let lifecycle = Lifecycle::new(Rc::new(doc.clone()), doc.clock().clone(), &Config::default());
        Fixture {
            doc,
            lifecycle,
            pool: LocalPool::new(),
        }
    }

    impl Fixture {
        fn track(&mut self, wait: Transition) -> Rc<RefCell<Option<Result<(), LifecycleError>>>> {
            let slot = Rc::new(RefCell::new(None));
            let s = slot.clone();
            self.pool
                .spawner()
                .spawn_local(async move {
                    *s.borrow_mut() = Some(wait.await);
                })
                .unwrap();
            self.pool.run_until_stalled();
            slot
        }

        fn advance_ms(&mut self, ms: u64) {
            for _ in 0..ms {
                self.doc.clock().advance(Duration::from_millis(1));
                self.pool.run_until_stalled();
            }
        }
    }

    #[test]
    fn test_already_attached_resolves_immediately() {
        let mut f = fixture();
        let el = f.doc.create_element("div");
        f.doc.append_child(f.doc.body(), el).unwrap();

        let result = f.track(f.lifecycle.wait_for_render(el));
        assert_eq!(*result.borrow(), Some(Ok(())));
        assert!(!f.lifecycle.is_observing());
    }

    #[test]
    fn test_waits_share_one_subscription() {
        let mut f = fixture();
        let a = f.doc.create_element("div");
        let b = f.doc.create_element("div");

        let ra = f.track(f.lifecycle.wait_for_render(a));
        let rb = f.track(f.lifecycle.wait_for_render(b));
        assert_eq!(f.doc.observer_count(), 1);
        assert_eq!(f.lifecycle.pending(), 2);

        f.doc.append_child(f.doc.body(), a).unwrap();
        f.pool.run_until_stalled();
        assert_eq!(*ra.borrow(), Some(Ok(())));
        assert_eq!(*rb.borrow(), None);

        f.doc.append_child(f.doc.body(), b).unwrap();
        f.pool.run_until_stalled();
        assert_eq!(*rb.borrow(), Some(Ok(())));

        // Last settled wait releases the observer and the sweep.
        assert_eq!(f.doc.observer_count(), 0);
        assert_eq!(f.doc.clock().pending(), 0);
    }

    #[test]
    fn test_wait_for_remove() {
        let mut f = fixture();
        let el = f.doc.create_element("div");
        f.doc.append_child(f.doc.body(), el).unwrap();

        let result = f.track(f.lifecycle.wait_for_remove(el));
        f.advance_ms(30_000);
        assert_eq!(*result.borrow(), None);

        f.doc.remove(el).unwrap();
        f.pool.run_until_stalled();
        assert_eq!(*result.borrow(), Some(Ok(())));
    }

    #[test]
    fn test_render_wait_times_out_after_quiet_rounds() {
        let mut f = fixture();
        let el = f.doc.create_element("div");
        let result = f.track(f.lifecycle.wait_for_render(el));

        f.advance_ms(9_999);
        assert_eq!(*result.borrow(), None);
        f.advance_ms(1);
        assert_eq!(
            *result.borrow(),
            Some(Err(LifecycleError::WaitTimeout {
                node: el,
                target: Attachment::Attached
            }))
        );
        assert!(!f.lifecycle.is_observing());
    }

    #[test]
    fn test_churn_postpones_timeout() {
        let mut f = fixture();
        let el = f.doc.create_element("div");
        let result = f.lifecycle.wait(el, Attachment::Attached, Some(2));
        let result = f.track(result);

        // Unrelated attachment changes every half interval keep every sweep busy.
        let other = f.doc.create_element("span");
        for _ in 0..10 {
            f.advance_ms(500);
            f.doc.append_child(f.doc.body(), other).unwrap();
            f.doc.remove(other).unwrap();
        }
        assert_eq!(*result.borrow(), None);

        f.advance_ms(3_000);
        assert!(matches!(
            *result.borrow(),
            Some(Err(LifecycleError::WaitTimeout { .. }))
        ));
    }

    #[test]
    fn test_dropped_wait_is_pruned() {
        let mut f = fixture();
        let el = f.doc.create_element("div");
        drop(f.lifecycle.wait_for_render(el));
        assert_eq!(f.lifecycle.pending(), 1);

        f.advance_ms(1_000);
        assert_eq!(f.lifecycle.pending(), 0);
        assert!(!f.lifecycle.is_observing());
    }
}
