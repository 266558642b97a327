//! Runtime - The shared context every view binds through.
//!
//! Owns the document, configuration, registries, handler side table,
//! lifecycle coordinator, diagnostic sink and task spawner. Built once per
//! screen tree and passed around as `Rc<Runtime>`.
//!
//! # Example
//!
//! ```ignore
//! let mut pool = LocalPool::new();
//! let rt = Runtime::builder(Document::new(), pool.spawner())
//!     .config(Config::load("console.toml")?)
//!     .build();
//! let view = View::from_template(&rt, "order-form".into())?;
//! ```

use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::FutureExt;
use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::config::Config;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::engine::{
    AttachmentNotifier, Document, ElementAdapter, ElementDef, ElementRegistry, HandlerTable,
    TemplateRegistry,
};
use crate::error::{BindError, LifecycleError, RegistryError};
use crate::state::{Lifecycle, Transition};

pub struct Runtime {
    document: Document,
    config: Config,
    elements: ElementRegistry,
    templates: TemplateRegistry,
    handlers: HandlerTable,
    lifecycle: Lifecycle,
    spawner: Rc<dyn LocalSpawn>,
    diagnostics: Rc<dyn DiagnosticSink>,
}

impl Runtime {
    /// Runtime with default configuration and the tracing diagnostic sink.
    pub fn new(document: Document, spawner: impl LocalSpawn + 'static) -> Rc<Self> {
        Self::builder(document, spawner).build()
    }

    pub fn builder(document: Document, spawner: impl LocalSpawn + 'static) -> RuntimeBuilder {
        RuntimeBuilder {
            document,
            spawner: Rc::new(spawner),
            config: Config::default(),
            diagnostics: None,
            notifier: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn elements(&self) -> &ElementRegistry {
        &self.elements
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn register_element(
        &self,
        kind: &str,
        adapter: impl ElementAdapter + 'static,
    ) -> Result<(), RegistryError> {
        self.elements.register(kind, adapter)
    }

    pub fn register_template(&self, id: &str, def: &ElementDef) -> Result<(), BindError> {
        self.templates.register(&self.document, id, def)
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic);
    }

    /// Spawn a local task. Returns false if the executor is gone.
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) -> bool {
        match self.spawner.spawn_local(task) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(%err, "failed to spawn task");
                false
            }
        }
    }

    /// Run `task` to completion on the executor whether or not the returned
    /// future is polled.
    pub fn drive(
        &self,
        task: impl Future<Output = Result<(), LifecycleError>> + 'static,
    ) -> Transition {
        let (tx, rx) = oneshot::channel();
        self.spawn(async move {
            let _ = tx.send(task.await);
        });
        rx.map(|result| result.unwrap_or(Err(LifecycleError::Abandoned)))
            .boxed_local()
    }
}

pub struct RuntimeBuilder {
    document: Document,
    spawner: Rc<dyn LocalSpawn>,
    config: Config,
    diagnostics: Option<Rc<dyn DiagnosticSink>>,
    notifier: Option<Rc<dyn AttachmentNotifier>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn diagnostics(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.diagnostics = Some(Rc::new(sink));
        self
    }

    /// Source of attachment changes for the lifecycle coordinator. Defaults
    /// to the document's own mutation observer.
    pub fn notifier(mut self, notifier: Rc<dyn AttachmentNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Rc<Runtime> {
        let notifier = self
            .notifier
            .unwrap_or_else(|| Rc::new(self.document.clone()) as Rc<dyn AttachmentNotifier>);
        let lifecycle = Lifecycle::new(notifier, self.document.clock().clone(), &self.config);
        Rc::new(Runtime {
            lifecycle,
            document: self.document,
            config: self.config,
            elements: ElementRegistry::new(),
            templates: TemplateRegistry::new(),
            handlers: HandlerTable::new(),
            spawner: self.spawner,
            diagnostics: self.diagnostics
                .unwrap_or_else(|| Rc::new(TracingSink) as Rc<dyn DiagnosticSink>),
        })
    }
}
