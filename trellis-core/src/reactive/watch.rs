//! Watchers
//!
//! `watch` runs a callback with the new and previous value of a source
//! whenever a write reaches the source. The callback fires even when the
//! re-run source yields an equal value. The source is evaluated inside an effect;
//! the callback itself is never tracked.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;

use super::effect::{Effect, EffectOptions};
use super::proxy::Reactive;
use super::scheduler::next_tick;
use super::value::{ContainerKind, TargetId, Value};

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    /// A tracked getter; the watcher fires whenever it is re-run.
    Getter(Rc<dyn Fn() -> Value>),
    /// A value. Reactive views are traversed deeply; anything else is
    /// observed once and never fires.
    Value(Value),
}

impl WatchSource {
    pub fn getter<F, R>(f: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: Into<Value>,
    {
        WatchSource::Getter(Rc::new(move || f().into()))
    }
}

impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        WatchSource::Value(value)
    }
}

impl From<Reactive> for WatchSource {
    fn from(view: Reactive) -> Self {
        WatchSource::Value(Value::Reactive(view))
    }
}

impl From<&Reactive> for WatchSource {
    fn from(view: &Reactive) -> Self {
        WatchSource::Value(Value::Reactive(view.clone()))
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Getter(_) => f.write_str("WatchSource::Getter"),
            WatchSource::Value(v) => f.debug_tuple("WatchSource::Value").field(v).finish(),
        }
    }
}

/// When the callback runs relative to the mutation that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Inline, during the write.
    #[default]
    Sync,
    /// On the next microtask drain, once per drain.
    Post,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Run the callback once at registration, with a null old value.
    pub immediate: bool,
    /// Traverse the getter's result so nested writes fire too. Implied for
    /// reactive view sources.
    pub deep: bool,
    pub flush: FlushMode,
}

type Cleanup = Box<dyn FnOnce()>;

/// Passed to the callback to register a cleanup that runs before the next
/// callback invocation, or when the watcher is stopped.
#[derive(Clone, Default)]
pub struct OnInvalidate {
    slot: Rc<RefCell<Option<Cleanup>>>,
}

impl OnInvalidate {
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        *self.slot.borrow_mut() = Some(Box::new(cleanup));
    }

    fn run(&self) {
        let cleanup = self.slot.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

/// Handle returned by [`watch`].
#[derive(Clone)]
pub struct WatchHandle {
    effect: Effect,
    invalidate: OnInvalidate,
}

impl WatchHandle {
    /// Stop watching. A registered cleanup runs now.
    pub fn stop(&self) {
        self.effect.stop();
        self.invalidate.run();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    pub fn effect(&self) -> &Effect {
        &self.effect
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").field("effect", &self.effect).finish()
    }
}

/// Subscribe the running effect to every reachable key of `value`.
///
/// Cycles are cut with a seen set keyed on target identity.
pub fn traverse(value: &Value) -> Value {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
    value.clone()
}

fn traverse_inner(value: &Value, seen: &mut HashSet<TargetId>) {
    let Value::Reactive(view) = value else {
        return;
    };
    if !seen.insert(view.id()) {
        return;
    }
    match view.kind() {
        ContainerKind::Record => {
            for key in view.own_keys() {
                traverse_inner(&view.get(key), seen);
            }
        }
        ContainerKind::List => {
            if let Ok(items) = view.iter() {
                for item in items {
                    traverse_inner(&item, seen);
                }
            }
        }
        ContainerKind::Map | ContainerKind::Set => {
            if let Ok(entries) = view.entries() {
                for (key, item) in entries {
                    traverse_inner(&key, seen);
                    traverse_inner(&item, seen);
                }
            }
        }
        ContainerKind::Cell => {}
    }
}

struct WatchState<C> {
    callback: C,
    old: RefCell<Value>,
    invalidate: OnInvalidate,
}

impl<C> WatchState<C>
where
    C: Fn(&Value, &Value, &OnInvalidate),
{
    fn job(&self, effect: &Effect) {
        if !effect.is_active() {
            return;
        }
        let new = effect.run();
        self.invalidate.run();
        let old = self.old.replace(new.clone());
        (self.callback)(&new, &old, &self.invalidate);
    }
}

/// Watch `source` and call `callback(new, old, on_invalidate)` each time a
/// tracked write re-runs it.
pub fn watch<S, C>(source: S, callback: C, options: WatchOptions) -> WatchHandle
where
    S: Into<WatchSource>,
    C: Fn(&Value, &Value, &OnInvalidate) + 'static,
{
    let getter: Rc<dyn Fn() -> Value> = match source.into() {
        WatchSource::Getter(getter) if options.deep => Rc::new(move || traverse(&getter())),
        WatchSource::Getter(getter) => getter,
        WatchSource::Value(value @ Value::Reactive(_)) => Rc::new(move || traverse(&value)),
        WatchSource::Value(value) => {
            tracing::warn!(?value, "watch source is not reactive; the callback will never fire");
            Rc::new(move || value.clone())
        }
    };

    let invalidate = OnInvalidate::default();
    let state = Rc::new(WatchState {
        callback,
        old: RefCell::new(Value::Null),
        invalidate: invalidate.clone(),
    });

    let job_state = state.clone();
    let scheduler: Box<dyn Fn(&Effect)> = match options.flush {
        FlushMode::Sync => Box::new(move |effect: &Effect| job_state.job(effect)),
        FlushMode::Post => {
            let pending = Rc::new(Cell::new(false));
            Box::new(move |effect: &Effect| {
                if pending.replace(true) {
                    return;
                }
                let state = job_state.clone();
                let pending = pending.clone();
                let effect = effect.clone();
                next_tick(move || {
                    pending.set(false);
                    state.job(&effect);
                });
            })
        }
    };

    let effect = Effect::new(
        move || getter(),
        EffectOptions::lazy().with_scheduler(move |effect| scheduler(effect)),
    );

    if options.immediate {
        state.job(&effect);
    } else {
        *state.old.borrow_mut() = effect.run();
    }

    WatchHandle { effect, invalidate }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::proxy::reactive;
    use crate::reactive::scheduler::flush_microtasks;
    use crate::reactive::value::Target;

    fn record(value: Value) -> Target {
        value.as_target().cloned().unwrap()
    }

    type Log = Rc<RefCell<Vec<(Value, Value)>>>;

    fn logger() -> (Log, impl Fn(&Value, &Value, &OnInvalidate)) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |new: &Value, old: &Value, _: &OnInvalidate| {
            sink.borrow_mut().push((new.clone(), old.clone()))
        })
    }

    #[test]
    fn getter_watch_reports_new_and_old() {
        let state = reactive(record(Value::record([("n", 1)])));
        let (log, callback) = logger();
        let s = state.clone();
        let _handle = watch(WatchSource::getter(move || s.get("n")), callback, WatchOptions::default());

        assert!(log.borrow().is_empty());
        state.set("n", 2);
        state.set("n", 2);
        assert_eq!(*log.borrow(), vec![(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn immediate_runs_at_registration() {
        let state = reactive(record(Value::record([("n", 1)])));
        let (log, callback) = logger();
        let s = state.clone();
        let options = WatchOptions {
            immediate: true,
            ..WatchOptions::default()
        };
        let _handle = watch(WatchSource::getter(move || s.get("n")), callback, options);
        assert_eq!(*log.borrow(), vec![(Value::from(1), Value::Null)]);
    }

    #[test]
    fn immediate_fires_for_a_null_first_value() {
        let state = reactive(record(Value::record([("n", Value::Null)])));
        let (log, callback) = logger();
        let s = state.clone();
        let options = WatchOptions {
            immediate: true,
            ..WatchOptions::default()
        };
        let _handle = watch(WatchSource::getter(move || s.get("n")), callback, options);
        assert_eq!(*log.borrow(), vec![(Value::Null, Value::Null)]);
    }

    #[test]
    fn rerun_getter_fires_even_when_result_is_equal() {
        let state = reactive(record(Value::record([("n", 1)])));
        let (log, callback) = logger();
        let s = state.clone();
        let _handle = watch(
            WatchSource::getter(move || s.get("n").as_number().unwrap_or_default() > 0.0),
            callback,
            WatchOptions::default(),
        );

        state.set("n", 2);
        assert_eq!(*log.borrow(), vec![(Value::from(true), Value::from(true))]);
    }

    #[test]
    fn reactive_source_is_watched_deeply() {
        let state = reactive(record(Value::from(serde_json::json!({ "inner": { "x": 1 } }))));
        let (log, callback) = logger();
        let _handle = watch(&state, callback, WatchOptions::default());

        let inner = state.get("inner");
        inner.as_reactive().unwrap().set("x", 2);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn post_flush_batches_until_drain() {
        let state = reactive(record(Value::record([("n", 0)])));
        let (log, callback) = logger();
        let s = state.clone();
        let options = WatchOptions {
            flush: FlushMode::Post,
            ..WatchOptions::default()
        };
        let _handle = watch(WatchSource::getter(move || s.get("n")), callback, options);

        state.set("n", 1);
        state.set("n", 2);
        assert!(log.borrow().is_empty());
        flush_microtasks().unwrap();
        assert_eq!(*log.borrow(), vec![(Value::from(2), Value::from(0))]);
    }

    #[test]
    fn invalidation_runs_before_next_callback_and_on_stop() {
        let state = reactive(record(Value::record([("n", 0)])));
        let cleanups = Rc::new(Cell::new(0));
        let c = cleanups.clone();
        let s = state.clone();
        let handle = watch(
            WatchSource::getter(move || s.get("n")),
            move |_: &Value, _: &Value, on_invalidate: &OnInvalidate| {
                let c = c.clone();
                on_invalidate.register(move || c.set(c.get() + 1));
            },
            WatchOptions::default(),
        );

        state.set("n", 1);
        assert_eq!(cleanups.get(), 0);
        state.set("n", 2);
        assert_eq!(cleanups.get(), 1);

        handle.stop();
        assert_eq!(cleanups.get(), 2);
        state.set("n", 3);
        assert_eq!(cleanups.get(), 2);
    }

    #[test]
    fn options_deserialize() {
        let options: WatchOptions = serde_json::from_str(r#"{ "flush": "post" }"#).unwrap();
        assert_eq!(options.flush, FlushMode::Post);
        assert!(!options.immediate);
    }
}
