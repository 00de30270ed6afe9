//! Computed Values
//!
//! A Computed is a cached derived value that re-evaluates only when it is
//! read after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. The getter runs inside a lazy effect, so its reads are tracked like
//!    any other effect's.
//!
//! 2. When a dependency changes, the effect's scheduler does not recompute.
//!    It marks the cell dirty and triggers the cell's own `value` key, once,
//!    so that readers of the computed re-run.
//!
//! 3. `get` recomputes only if dirty, then returns the cached value.
//!
//! A computed that is never read never recomputes, no matter how often its
//! inputs change.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::effect::{Effect, EffectOptions};
use super::runtime::{self, TriggerOp};
use super::store::{self, DepKey};
use super::value::{ContainerKind, TargetId};

const VALUE_KEY: &str = "value";

struct ComputedInner<T> {
    /// Identity of the cell in the dependency store.
    id: TargetId,
    effect: Effect,
    value: Rc<RefCell<Option<T>>>,
    dirty: Rc<Cell<bool>>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
        store::dispose(self.id);
    }
}

/// A lazily evaluated, memoized derived value.
///
/// Cloning shares the cache.
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value. The getter does not run until the first `get`.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let id = TargetId::new();
        let value: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let dirty = Rc::new(Cell::new(true));

        let slot = value.clone();
        let body = move || {
            let next = getter();
            *slot.borrow_mut() = Some(next);
        };

        let flag = dirty.clone();
        let options = EffectOptions::lazy().with_scheduler(move |_| {
            if !flag.replace(true) {
                runtime::trigger(id, ContainerKind::Cell, &DepKey::prop(VALUE_KEY), TriggerOp::Set, None);
            }
        });

        Self {
            inner: Rc::new(ComputedInner {
                id,
                effect: Effect::new(body, options),
                value,
                dirty,
            }),
        }
    }

    /// Current value, recomputed first if any dependency changed.
    ///
    /// Always subscribes the running effect to this cell.
    pub fn get(&self) -> T {
        if self.inner.dirty.get() {
            self.inner.effect.run();
            self.inner.dirty.set(false);
        }
        runtime::track(self.inner.id, DepKey::prop(VALUE_KEY));
        self.inner
            .value
            .borrow()
            .clone()
            .expect("computed value present after evaluation")
    }

    /// Whether the next `get` will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// The effect that evaluates the getter.
    pub fn effect(&self) -> &Effect {
        &self.inner.effect
    }

    /// Stop reacting to dependency changes. The last value stays cached.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.inner.dirty.get())
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}

/// Create a computed value.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}
