//! Class-driven animations.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnimationKind {
    /// Restarts when the element is re-inserted; ends with `animationend`.
    Keyframes,
    /// Runs on property change; ends with `transitionend`.
    Transition,
}

/// An animation declared for a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Animation {
    pub kind: AnimationKind,
    pub duration: Duration,
}

impl Animation {
    pub fn keyframes(duration: Duration) -> Self {
        Self {
            kind: AnimationKind::Keyframes,
            duration,
        }
    }

    pub fn transition(duration: Duration) -> Self {
        Self {
            kind: AnimationKind::Transition,
            duration,
        }
    }

    /// Name of the event fired when the animation completes.
    pub fn end_event(&self) -> &'static str {
        match self.kind {
            AnimationKind::Keyframes => "animationend",
            AnimationKind::Transition => "transitionend",
        }
    }

    pub fn is_instant(&self) -> bool {
        self.duration.is_zero()
    }
}

#[derive(Default)]
pub(super) struct Stylesheet {
    rules: HashMap<String, Animation>,
}

impl Stylesheet {
    pub(super) fn define(&mut self, class: &str, animation: Animation) {
        self.rules.insert(class.to_string(), animation);
    }

    pub(super) fn get(&self, class: &str) -> Option<Animation> {
        self.rules.get(class).copied()
    }
}
