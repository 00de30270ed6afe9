//! Reactive Runtime
//!
//! The runtime connects reactive views to effects. It records dependencies
//! when views are read and decides which effects to re-run when views are
//! written.
//!
//! # How It Works
//!
//! 1. A read through a reactive view calls [`track`], which subscribes the
//!    running effect to `(target, key)`.
//!
//! 2. A write calls [`trigger`] with the mutation's classification. Besides
//!    the key's own subscribers, structural mutations also reach effects
//!    that enumerated the container:
//!
//!    | mutation                    | extra dep sets fired                  |
//!    |-----------------------------|---------------------------------------|
//!    | Add / Delete                | `Iterate`                             |
//!    | Set on a map                | `Iterate`                             |
//!    | Add / Delete on a map       | `MapKeyIterate`                       |
//!    | Add on a list               | `Length`                              |
//!    | `length = n` on a list      | every `Index(i)` with `i >= n`        |
//!
//! 3. Each collected effect runs once, inline or through its scheduler.
//!
//! # Threading
//!
//! All runtime state is thread-local. Reactive values are `!Send`, so one
//! thread's graph is never observed from another.

use std::cell::RefCell;

use indexmap::IndexMap;
use serde::Deserialize;

use super::context::{self, ReactiveContext};
use super::effect::Effect;
use super::store::{self, Dep, DepKey};
use super::subscriber::SubscriberId;
use super::value::{ContainerKind, TargetId, Value};
use crate::error::{ReactiveError, ReactiveResult};

/// Classification of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing key changed value.
    Set,
    /// A key or element was created.
    Add,
    /// A key or element was removed.
    Delete,
}

/// Runtime settings for the current thread.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of job flushes a single microtask drain may perform
    /// before it gives up. Guards against effects that keep re-scheduling
    /// each other forever.
    pub recursion_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 100,
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ReactiveResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ReactiveError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ReactiveResult<()> {
        if self.recursion_limit == 0 {
            return Err(ReactiveError::InvalidConfig(
                "recursion_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

/// Entry point for runtime-wide settings and queries.
pub struct Runtime;

impl Runtime {
    /// Install a configuration for the current thread.
    pub fn configure(config: RuntimeConfig) -> ReactiveResult<()> {
        config.validate()?;
        tracing::debug!(?config, "reactive runtime configured");
        CONFIG.with(|c| *c.borrow_mut() = config);
        Ok(())
    }

    /// The configuration in effect on the current thread.
    pub fn config() -> RuntimeConfig {
        CONFIG.with(|c| c.borrow().clone())
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if reads would currently be tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active() && context::should_track()
    }
}

/// Subscribe the running effect to `(target, key)`.
///
/// No-op outside an effect or while tracking is paused.
pub fn track(target: TargetId, key: DepKey) {
    if !context::should_track() {
        return;
    }
    let Some(effect) = ReactiveContext::current() else {
        return;
    };

    let dep = store::dep_for(target, key);
    if dep.insert(&effect) {
        effect.record_dep(&dep);
    }
}

/// Re-run the effects affected by a mutation of `(target, key)`.
///
/// `new_value` is only consulted for a list `length` write, where it holds
/// the new length.
pub fn trigger(
    target: TargetId,
    kind: ContainerKind,
    key: &DepKey,
    op: TriggerOp,
    new_value: Option<&Value>,
) {
    if !store::is_tracked(target) {
        return;
    }

    let running = ReactiveContext::current_subscriber();
    let mut to_run: IndexMap<SubscriberId, Effect> = IndexMap::new();

    collect(&mut to_run, store::get(target, key), running);

    let structural = matches!(op, TriggerOp::Add | TriggerOp::Delete);
    if structural || (op == TriggerOp::Set && kind == ContainerKind::Map) {
        collect(&mut to_run, store::get(target, &DepKey::Iterate), running);
    }
    if structural && kind == ContainerKind::Map {
        collect(&mut to_run, store::get(target, &DepKey::MapKeyIterate), running);
    }
    if op == TriggerOp::Add && kind == ContainerKind::List {
        collect(&mut to_run, store::get(target, &DepKey::Length), running);
    }
    if kind == ContainerKind::List && *key == DepKey::Length {
        let new_len = new_value
            .and_then(Value::as_number)
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(0);
        let truncated = store::deps_matching(target, |k| matches!(k, DepKey::Index(i) if *i >= new_len));
        for dep in truncated {
            collect(&mut to_run, Some(dep), running);
        }
    }

    if to_run.is_empty() {
        return;
    }

    tracing::trace!(
        target_id = target.raw(),
        ?key,
        ?op,
        effects = to_run.len(),
        "trigger"
    );

    for effect in to_run.into_values() {
        effect.schedule();
    }
}

/// Re-run every effect subscribed to any key of `target`.
///
/// Used when a collection is cleared, which invalidates every entry at once.
pub fn trigger_all(target: TargetId) {
    let running = ReactiveContext::current_subscriber();
    let mut to_run: IndexMap<SubscriberId, Effect> = IndexMap::new();
    for dep in store::deps_matching(target, |_| true) {
        collect(&mut to_run, Some(dep), running);
    }
    if to_run.is_empty() {
        return;
    }
    tracing::trace!(target_id = target.raw(), effects = to_run.len(), "trigger all");
    for effect in to_run.into_values() {
        effect.schedule();
    }
}

/// Add the subscribers of `dep` to `to_run`.
///
/// The running effect is skipped unless it has a scheduler: an inline
/// self-retrigger would recurse forever, a scheduled one runs later.
fn collect(to_run: &mut IndexMap<SubscriberId, Effect>, dep: Option<Dep>, running: Option<SubscriberId>) {
    let Some(dep) = dep else {
        return;
    };
    for effect in dep.subscribers() {
        let id = effect.subscriber_id();
        if Some(id) == running && !effect.has_scheduler() {
            continue;
        }
        to_run.entry(id).or_insert(effect);
    }
}
