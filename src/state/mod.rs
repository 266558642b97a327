//! State Module - Runtime coordination systems
//!
//! - **Lifecycle** - Attachment waits sharing one observer and one sweep
//! - **Animate** - Class-driven open/close animations

pub mod animate;
mod lifecycle;

pub use animate::{close_node, open_node};
pub use lifecycle::*;
