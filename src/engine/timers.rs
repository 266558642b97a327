//! Virtual clock and timer queue.
//!
//! Stands in for the host event loop's timer and animation-frame queue. Time
//! only moves when the embedder calls [`Clock::advance`], which fires due
//! timers in deadline order. Callbacks run with no internal borrow held, so
//! they may schedule or cancel other timers.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};

/// Handle returned by [`Clock::set_timeout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId {
    deadline: Duration,
    seq: u64,
}

type TimerCallback = Box<dyn FnOnce()>;

#[derive(Default)]
struct ClockInner {
    now: Cell<Duration>,
    next_seq: Cell<u64>,
    timers: RefCell<BTreeMap<TimerId, TimerCallback>>,
}

/// Shared handle to the virtual clock.
#[derive(Clone, Default)]
pub struct Clock {
    inner: Rc<ClockInner>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since the clock was created.
    pub fn now(&self) -> Duration {
        self.inner.now.get()
    }

    /// Number of timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Schedule `callback` to run `delay` from now.
    pub fn set_timeout(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq + 1);
        let id = TimerId {
            deadline: self.now() + delay,
            seq,
        };
        self.inner.timers.borrow_mut().insert(id, Box::new(callback));
        id
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        self.inner.timers.borrow_mut().remove(&id).is_some()
    }

    /// Move time forward by `by`, firing every timer that falls due.
    ///
    /// Timers scheduled by a callback fire in the same call if their deadline
    /// is still within the window.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        loop {
            let due = {
                let timers = self.inner.timers.borrow();
                timers
                    .first_key_value()
                    .map(|(id, _)| *id)
                    .filter(|id| id.deadline <= target)
            };
            let Some(id) = due else { break };

            let callback = self.inner.timers.borrow_mut().remove(&id);
            self.inner.now.set(id.deadline);
            if let Some(callback) = callback {
                callback();
            }
        }
        self.inner.now.set(target);
    }

    /// Future that completes once `delay` has elapsed.
    pub fn sleep(&self, delay: Duration) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel::<()>();
        self.set_timeout(delay, move || {
            let _ = tx.send(());
        });
        rx.map(|_| ()).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let clock = Clock::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (ms, label) in [(30, "c"), (10, "a"), (20, "b")] {
            let log = log.clone();
            clock.set_timeout(Duration::from_millis(ms), move || log.borrow_mut().push(label));
        }

        clock.advance(Duration::from_millis(15));
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(clock.now(), Duration::from_millis(15));

        clock.advance(Duration::from_millis(100));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn test_clear_timeout() {
        let clock = Clock::new();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        let id = clock.set_timeout(Duration::from_millis(5), move || f.set(true));

        assert!(clock.clear_timeout(id));
        assert!(!clock.clear_timeout(id));
        clock.advance(Duration::from_millis(10));
        assert!(!fired.get());
    }

    #[test]
    fn test_nested_timer_within_window() {
        let clock = Clock::new();
        let fired = Rc::new(Cell::new(0));

        let inner_clock = clock.clone();
        let f = fired.clone();
        clock.set_timeout(Duration::from_millis(5), move || {
            let f = f.clone();
            inner_clock.set_timeout(Duration::from_millis(5), move || f.set(f.get() + 1));
        });

        clock.advance(Duration::from_millis(10));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_sleep() {
        let clock = Clock::new();
        let mut pool = LocalPool::new();
        let done = Rc::new(Cell::new(false));

        let d = done.clone();
        let sleep = clock.sleep(Duration::from_millis(50));
        pool.spawner()
            .spawn_local(async move {
                sleep.await;
                d.set(true);
            })
            .unwrap();

        pool.run_until_stalled();
        assert!(!done.get());

        clock.advance(Duration::from_millis(49));
        pool.run_until_stalled();
        assert!(!done.get());

        clock.advance(Duration::from_millis(1));
        pool.run_until_stalled();
        assert!(done.get());
    }
}
