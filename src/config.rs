//! Engine configuration.
//!
//! Attribute names the indexer looks for, class names the engine toggles and
//! the timing knobs of the lifecycle coordinator. Every field has a default,
//! so a TOML file only needs to list what it overrides:
//!
//! ```toml
//! mark_class = "has-error"
//! render_wait_rounds = 20
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attribute that names an element for bare-name selectors.
    pub name_attr: String,
    /// Attribute that overrides the tag name when looking up an element adapter.
    pub kind_attr: String,
    /// Attribute marking a row template inside a group container.
    pub template_attr: String,
    /// Suffix that turns a name into a group, e.g. `trades[]`.
    pub group_suffix: String,
    /// Attribute declaring the class that plays the opening animation.
    pub open_class_attr: String,
    /// Attribute declaring the class that plays the closing animation.
    pub close_class_attr: String,
    /// Class added by `View::mark`.
    pub mark_class: String,
    /// Class of the blocking overlay created by `View::open_modal`.
    pub overlay_class: String,
    /// Default round budget for `wait_for_render`.
    pub render_wait_rounds: u32,
    /// Interval of the attachment sweep, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Length of one animation frame, in milliseconds.
    pub frame_ms: u64,
    /// Frames to wait after insertion before adding the opening class.
    pub settle_frames: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name_attr: "name".into(),
            kind_attr: "data-kind".into(),
            template_attr: "data-template".into(),
            group_suffix: "[]".into(),
            open_class_attr: "data-open-class".into(),
            close_class_attr: "data-close-class".into(),
            mark_class: "marked".into(),
            overlay_class: "modal-overlay".into(),
            render_wait_rounds: 10,
            sweep_interval_ms: 1000,
            frame_ms: 16,
            settle_frames: 2,
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Delay between inserting a node and toggling its opening class.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.frame_ms * u64::from(self.settle_frames))
    }
}
