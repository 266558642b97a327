//! # bindery
//!
//! Declarative UI binding for trading-console screens.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for
//! reactive view state.
//!
//! ## Architecture
//!
//! A screen is a tree of elements held in a [`Document`]. A [`View`] wraps a
//! subtree, indexes its named elements, and binds plain data literals into
//! it:
//!
//! ```text
//! set_data({ email: "x", trades: [rows] })
//!     │
//!     ├─ names  ─> element adapter / generic control
//!     ├─ groups ─> keyed reconcile (create, reorder, animated teardown)
//!     └─ deferred values ─> applied when resolved, awaited via Pending
//! ```
//!
//! Views open and close through class-driven animations. The lifecycle
//! coordinator waits for attachment changes using one shared observer and a
//! periodic sweep.
//!
//! ## Modules
//!
//! - [`types`] - Data literals, values and selectors
//! - [`engine`] - Element tree, events, observer, clock, registries
//! - [`primitives`] - Views, groups and binding
//! - [`state`] - Lifecycle coordinator and open/close animations
//! - [`pipeline`] - Runtime and the mount pipeline
//! - [`config`] / [`diagnostics`] / [`error`]

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod primitives;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used items
pub use types::*;

pub use config::Config;

pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, TracingSink};

pub use engine::{
    Animation, AttachmentNotifier, Clock, Document, ElementAdapter, ElementDef, ElementRegistry,
    Event, Modifiers, MutationKind, MutationRecord, NodeId, TemplateRef, TemplateRegistry,
};

pub use error::{Attachment, BindError, ConfigError, DomError, LifecycleError, RegistryError};

pub use pipeline::{Runtime, RuntimeBuilder};

pub use primitives::{Group, Pending, RenderStats, Target, View, ViewState};

pub use state::{Lifecycle, Transition};
