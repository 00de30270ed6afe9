//! Reactive Primitives
//!
//! This module implements the reactive system: views over mutable targets,
//! effects that re-run when what they read changes, computed values and
//! watchers.
//!
//! # Concepts
//!
//! ## Targets and views
//!
//! A [`Target`] is a plain mutable container (record, list, map or set). A
//! [`Reactive`] view wraps a target; reads through the view register the
//! running effect as a dependent of the key read, writes re-run the
//! dependents of the key written.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation whose reads are tracked. Its dependencies
//! are rebuilt on every run, so branches not taken stop subscribing.
//!
//! ## Computeds and watchers
//!
//! A [`Computed`] caches a derived value and recomputes it lazily. A watcher
//! ([`watch`]) calls back with the new and old value of a source.
//!
//! # Implementation Notes
//!
//! All state is thread-local; nothing here is `Send`. Batching is done by
//! the [`scheduler`], whose microtask queue the host drains with
//! [`flush_microtasks`].

mod collections;
mod computed;
mod context;
mod effect;
mod proxy;
mod runtime;
pub mod scheduler;
pub mod store;
mod subscriber;
mod value;
mod watch;

pub use computed::{computed, Computed};
pub use context::{pause_tracking, untracked, ReactiveContext, TrackingPause};
pub use effect::{effect, effect_with, Effect, EffectOptions, Scheduler};
pub use proxy::{
    is_reactive, is_readonly, reactive, readonly, shallow_reactive, shallow_readonly, to_raw,
    view, IntoTarget, Reactive, ViewFlags,
};
pub use runtime::{track, trigger, trigger_all, Runtime, RuntimeConfig, TriggerOp};
pub use scheduler::{flush_microtasks, next_tick, queue_job, queue_microtask};
pub use store::DepKey;
pub use subscriber::SubscriberId;
pub use value::{Callback, Container, ContainerKind, PropKey, Record, Target, TargetId, Value};
pub use watch::{traverse, watch, FlushMode, OnInvalidate, WatchHandle, WatchOptions, WatchSource};
