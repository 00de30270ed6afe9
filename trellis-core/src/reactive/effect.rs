//! Effect Implementation
//!
//! An Effect is a re-runnable computation whose reads are tracked.
//!
//! # How Effects Work
//!
//! 1. When created (unless lazy), the effect runs its body immediately to
//!    establish initial dependencies.
//!
//! 2. Before every run, the effect removes itself from every dep set it
//!    joined during the previous run. Dependencies from branches the body no
//!    longer takes therefore never survive a re-run.
//!
//! 3. While the body runs, the effect is the current reactive context, so
//!    every tracked read subscribes it afresh.
//!
//! 4. When a dependency changes, the effect is either run inline or handed
//!    to its scheduler, which decides when (and whether) to run it.
//!
//! # Lifetime
//!
//! Dep sets hold effects strongly; effects hold their dep sets weakly. An
//! effect stays alive while any live target still references it or a caller
//! holds the handle. [`Effect::stop`] detaches it explicitly.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::context::{self, ReactiveContext};
use super::store::{Dep, WeakDep};
use super::subscriber::SubscriberId;
use super::value::Value;

/// Callback that decides how a triggered effect is re-run.
pub type Scheduler = Rc<dyn Fn(&Effect)>;

/// Options accepted by [`effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run the body on creation.
    pub lazy: bool,
    /// Run this instead of the body when a dependency changes.
    pub scheduler: Option<Scheduler>,
}

impl EffectOptions {
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            scheduler: None,
        }
    }

    pub fn with_scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&Effect) + 'static,
    {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

struct EffectInner {
    id: SubscriberId,
    body: Rc<dyn Fn() -> Value>,
    scheduler: Option<Scheduler>,

    /// Dep sets joined during the last run.
    deps: RefCell<SmallVec<[WeakDep; 4]>>,

    /// Cleared by `stop`; a stopped effect runs untracked.
    active: Cell<bool>,

    run_count: Cell<usize>,
}

/// A re-runnable tracked computation.
///
/// Cloning an `Effect` clones the handle; all clones share state.
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect without running it.
    pub fn new<F, R>(body: F, options: EffectOptions) -> Self
    where
        F: Fn() -> R + 'static,
        R: Into<Value>,
    {
        Self {
            inner: Rc::new(EffectInner {
                id: SubscriberId::new(),
                body: Rc::new(move || body().into()),
                scheduler: options.scheduler,
                deps: RefCell::new(SmallVec::new()),
                active: Cell::new(true),
                run_count: Cell::new(0),
            }),
        }
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the body synchronously and return its result.
    ///
    /// Clears the previous run's subscriptions first, then tracks the reads
    /// made by this run.
    pub fn run(&self) -> Value {
        if !self.inner.active.get() {
            return (self.inner.body)();
        }

        self.cleanup();

        let _tracking = context::resume_tracking();
        let _ctx = ReactiveContext::enter(self);
        self.inner.run_count.set(self.inner.run_count.get() + 1);
        (self.inner.body)()
    }

    /// Hand the effect to its scheduler, or run it inline if it has none.
    pub fn schedule(&self) {
        match &self.inner.scheduler {
            Some(scheduler) => scheduler(self),
            None => {
                self.run();
            }
        }
    }

    /// Record that this effect joined `dep` during the current run.
    pub(crate) fn record_dep(&self, dep: &Dep) {
        self.inner.deps.borrow_mut().push(dep.downgrade());
    }

    /// Remove this effect from every dep set it belongs to.
    pub fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.inner.deps.borrow_mut());
        for dep in deps.iter().filter_map(WeakDep::upgrade) {
            dep.remove(self.inner.id);
        }
    }

    /// Detach the effect. It will not be triggered again; calling
    /// [`run`](Self::run) still executes the body, untracked.
    pub fn stop(&self) {
        if self.inner.active.get() {
            self.cleanup();
            self.inner.active.set(false);
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn has_scheduler(&self) -> bool {
        self.inner.scheduler.is_some()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of dep sets this effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .deps
            .borrow()
            .iter()
            .filter_map(WeakDep::upgrade)
            .filter(|dep| dep.contains(self.inner.id))
            .count()
    }

    pub fn ptr_eq(&self, other: &Effect) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("active", &self.is_active())
            .field("scheduler", &self.has_scheduler())
            .finish()
    }
}

/// Create an effect and run it once immediately.
pub fn effect<F, R>(body: F) -> Effect
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
{
    effect_with(body, EffectOptions::default())
}

/// Create an effect with options. Runs it immediately unless `lazy` is set.
pub fn effect_with<F, R>(body: F, options: EffectOptions) -> Effect
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
{
    let lazy = options.lazy;
    let effect = Effect::new(body, options);
    if !lazy {
        effect.run();
    }
    effect
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
