//! Primitives - Views, groups and data binding.
//!
//! - [`View`] - A bound UI subtree: name index, reads, selectors, actions
//! - [`Group`] - Keyed rows rendered from a collection literal
//! - Binding - `set_data` and the literal rules, split out of the view
//!
//! # Architecture
//!
//! ```text
//! View (root) ── names:  email -> [input], status -> [span]
//!             └─ groups: trades -> Group ── rows: "a" -> View, "b" -> View
//! ```
//!
//! Every row is a view of its own, so rows nest groups the same way.

mod bind;
mod group;
mod view;

pub use bind::Pending;
pub use group::{Group, RenderStats};
pub use view::{Target, View, ViewState};

pub(crate) use view::ViewInner;
