//! Shared fixture for unit tests: a runtime on a local executor with a
//! collecting diagnostic sink.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;

use crate::config::Config;
use crate::diagnostics::CollectingSink;
use crate::engine::{Document, ElementDef, MutationKind};
use crate::pipeline::Runtime;
use crate::primitives::View;

pub(crate) struct Harness {
    pub pool: LocalPool,
    pub rt: Rc<Runtime>,
    pub doc: Document,
    pub sink: CollectingSink,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let pool = LocalPool::new();
        let doc = Document::new();
        let sink = CollectingSink::new();
        let rt = Runtime::builder(doc.clone(), pool.spawner())
            .config(config)
            .diagnostics(sink.clone())
            .build();
        Self { pool, rt, doc, sink }
    }

    /// Run every ready task.
    pub fn run(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Advance the clock `ms` milliseconds, one at a time, running tasks
    /// after each step.
    pub fn pump(&mut self, ms: u64) {
        self.run();
        for _ in 0..ms {
            self.doc.clock().advance(Duration::from_millis(1));
            self.run();
        }
    }

    /// Spawn `future` and expose its output once it finishes.
    pub fn track<T: 'static>(
        &mut self,
        future: impl Future<Output = T> + 'static,
    ) -> Rc<RefCell<Option<T>>> {
        let slot = Rc::new(RefCell::new(None));
        let out = slot.clone();
        self.pool
            .spawner()
            .spawn_local(async move {
                *out.borrow_mut() = Some(future.await);
            })
            .unwrap();
        self.run();
        slot
    }

    /// Build `def` detached and wrap it in a view.
    pub fn view(&self, def: ElementDef) -> View {
        let root = def.build(&self.doc).unwrap();
        View::new(&self.rt, root).unwrap()
    }

    /// Number of mutation records of `kind` produced while `f` runs.
    pub fn count_mutations(&self, kind: MutationKind, f: impl FnOnce()) -> usize {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = self.doc.observe(kind, move |records| {
            c.set(c.get() + records.iter().filter(|r| kind.contains(r.kind)).count());
        });
        f();
        self.doc.disconnect(id);
        count.get()
    }
}
