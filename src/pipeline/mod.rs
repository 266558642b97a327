//! Pipeline - The runtime and the view mount pipeline.
//!
//! ```text
//! Runtime ── document, config, registries, lifecycle, spawner
//!    │
//!    └─ View.open ─> insert ─> wait_for_render ─> settle frames ─> open class
//!       View.close ─> close class ─> animation end ─> detach
//! ```

mod mount;
mod runtime;

pub(crate) use mount::ReplaceSlot;
pub use runtime::{Runtime, RuntimeBuilder};
