//! Error types.
//!
//! Configuration mistakes in a calling screen (unknown template, duplicate row
//! id, a path into a group that does not exist) surface synchronously as
//! [`BindError`]. Animation waits fail with [`LifecycleError`] on the specific
//! waiter only. Errors that travel through shared futures are `Clone`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::NodeId;

/// Structural errors raised by the [`Document`](crate::engine::Document).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("node {0} does not exist")]
    Missing(NodeId),

    #[error("cannot insert node {child} into {parent}: it would become its own ancestor")]
    Hierarchy { parent: NodeId, child: NodeId },

    #[error("node {reference} is not a child of {parent}")]
    NotAChild { parent: NodeId, reference: NodeId },
}

/// Errors raised while binding or reading data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("unknown template `{0}`")]
    UnknownTemplate(String),

    #[error("duplicate row id `{id}` in group `{group}`")]
    DuplicateRowId { group: String, id: String },

    #[error("no group named `{0}` in this view")]
    UnknownGroup(String),

    #[error("`{0}` is not a group; collections can only be bound to groups")]
    NotAGroup(String),

    #[error("group `{0}` has no row template")]
    MissingTemplate(String),

    #[error("invalid selector path: {0}")]
    InvalidPath(String),

    #[error("invalid selector `{0}`")]
    InvalidSelector(String),

    #[error("attribute `{0}` cannot take this kind of value")]
    InvalidAttribute(String),

    #[error("event handlers must be bound under a `!event` key")]
    MisplacedHandler,

    #[error("invalid data literal: {0}")]
    InvalidLiteral(String),

    #[error("deferred value rejected: {0}")]
    Rejected(String),

    #[error("binding task was dropped before it settled")]
    Abandoned,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Which attachment state a wait is expecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Attached,
    Detached,
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attachment::Attached => f.write_str("attached"),
            Attachment::Detached => f.write_str("detached"),
        }
    }
}

/// Errors raised by open/close transitions and attachment waits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("timed out waiting for node {node} to become {target}")]
    WaitTimeout { node: NodeId, target: Attachment },

    #[error("node {0} is not attached to a parent")]
    NotAttached(NodeId),

    #[error("node {0} has been released")]
    Released(NodeId),

    #[error("transition was dropped before it settled")]
    Abandoned,

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Errors raised when registering adapters or templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("element kind `{0}` is already registered")]
    DuplicateKind(String),

    #[error("template `{0}` is already registered")]
    DuplicateTemplate(String),
}

/// Errors raised while loading a [`Config`](crate::config::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
