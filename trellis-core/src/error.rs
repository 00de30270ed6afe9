//! Error types shared by the reactive and render layers.

use thiserror::Error;

use crate::reactive::ContainerKind;
use crate::render::Key;

/// Errors raised by the reactive layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A container-specific operation was called on the wrong kind of container.
    #[error("`{op}` is not supported on a {kind} container")]
    WrongKind {
        op: &'static str,
        kind: ContainerKind,
    },

    /// A single microtask drain performed more job flushes than allowed.
    #[error("scheduler exceeded the recursion limit of {limit} flushes in one drain")]
    RecursionLimit { limit: usize },

    /// A list could not grow to the requested length.
    #[error("list cannot grow to {len} elements")]
    Capacity { len: usize },

    /// A runtime configuration failed validation.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised while mounting or patching a vnode tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// Two siblings in one children list share a key.
    #[error("duplicate key {0} in one sibling group")]
    DuplicateKey(Key),

    /// A vnode that should have been mounted carries no host node.
    #[error("vnode `{0}` has no mounted host node")]
    MissingHandle(String),

    #[error(transparent)]
    Reactive(#[from] ReactiveError),
}

pub type ReactiveResult<T> = Result<T, ReactiveError>;

pub type RenderResult<T> = Result<T, RenderError>;
