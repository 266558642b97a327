//! Engine - In-memory element tree and host services.
//!
//! The engine provides everything the binder needs from a UI host:
//! - Document: element arena, tree edits, release hooks
//! - Events: listeners, bubbling dispatch, per-node handler table
//! - Observer: mutation records and the attachment notifier
//! - Timers: virtual clock driving animations and sweeps
//! - Style: class-driven animations
//! - Query: CSS selector subset
//! - Elements / Templates: custom element adapters and markup fragments
//!
//! # Architecture
//!
//! Elements are NOT objects. They are generation-checked indices into one
//! slot arena:
//!
//! ```text
//! Slot 0: body  (gen 0, parent=None, children=[1])
//! Slot 1: form  (gen 0, parent=0,    children=[2, 3])
//! Slot 2: input (gen 3, parent=1,    name="email")
//! ```
//!
//! Embedders mirror the tree into a real UI by observing mutation records.

mod document;
mod elements;
mod events;
mod observer;
mod query;
mod style;
mod templates;
mod timers;

pub use document::*;
pub use elements::*;
pub use events::*;
pub use observer::*;
pub use query::*;
pub use style::*;
pub use templates::*;
pub use timers::*;
