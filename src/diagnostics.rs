//! Diagnostics for best-effort work.
//!
//! Row teardown and row updates happen inside a group render that must keep
//! going when one row fails. Those failures are reported here instead of
//! failing the render.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{BindError, LifecycleError};

#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// Closing a removed row failed. The row's nodes were released anyway.
    RowTeardownFailed {
        group: String,
        id: String,
        error: LifecycleError,
    },
    /// Creating or binding one row failed. Other rows were still rendered.
    RowUpdateFailed {
        group: String,
        id: String,
        error: BindError,
    },
}

pub trait DiagnosticSink {
    fn report(&self, diagnostic: Diagnostic);
}

/// Logs every diagnostic with `tracing::warn!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::RowTeardownFailed { group, id, error } => {
                tracing::warn!(%group, %id, %error, "row teardown failed");
            }
            Diagnostic::RowUpdateFailed { group, id, error } => {
                tracing::warn!(%group, %id, %error, "row update failed");
            }
        }
    }
}

/// Keeps every diagnostic for later inspection.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    entries: Rc<RefCell<Vec<Diagnostic>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.entries.borrow_mut().push(diagnostic);
    }
}
