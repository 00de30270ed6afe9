//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when a reactive view is read, the
//! current effect is registered as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack of running effects. When an effect runs, it
//! is pushed onto the stack; when its body returns (or unwinds), the guard
//! pops it and the enclosing effect becomes current again.
//!
//! A second thread-local flag suppresses tracking entirely. List mutators
//! such as `push` read the length internally, and those reads must not
//! subscribe the caller.

use std::cell::{Cell, RefCell};

use super::effect::Effect;
use super::subscriber::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Effect>> = const { RefCell::new(Vec::new()) };
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
}

/// Guard that pops the context when dropped.
///
/// This keeps the context stack consistent even if the effect body panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given effect.
    ///
    /// The context is exited when the returned guard is dropped.
    pub fn enter(effect: &Effect) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(effect.clone()));
        Self {
            subscriber_id: effect.subscriber_id(),
        }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The effect currently running, if any.
    pub fn current() -> Option<Effect> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(Effect::subscriber_id))
    }

    /// Number of nested effects currently running.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());
        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.subscriber_id(),
                self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id,
                effect.subscriber_id()
            );
        }
    }
}

/// Guard returned by [`pause_tracking`]; restores the previous state on drop.
pub struct TrackingPause {
    previous: bool,
}

impl Drop for TrackingPause {
    fn drop(&mut self) {
        SHOULD_TRACK.with(|flag| flag.set(self.previous));
    }
}

/// Suppress dependency tracking until the guard is dropped.
pub fn pause_tracking() -> TrackingPause {
    let previous = SHOULD_TRACK.with(|flag| flag.replace(false));
    TrackingPause { previous }
}

/// Turn tracking back on until the guard is dropped.
///
/// An effect always tracks its own reads, even when it runs from inside a
/// paused section (an inline re-run triggered by `push`, or a child effect
/// created under [`untracked`]).
pub(crate) fn resume_tracking() -> TrackingPause {
    let previous = SHOULD_TRACK.with(|flag| flag.replace(true));
    TrackingPause { previous }
}

/// Whether reads should currently be tracked.
pub fn should_track() -> bool {
    SHOULD_TRACK.with(Cell::get)
}

/// Run `f` without tracking any reads it performs.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _pause = pause_tracking();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect_with, EffectOptions};

    fn lazy_effect() -> Effect {
        effect_with(|| (), EffectOptions::lazy())
    }

    #[test]
    fn context_tracks_subscriber() {
        let effect = lazy_effect();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(&effect);
            assert!(ReactiveContext::is_active());
            assert_eq!(
                ReactiveContext::current_subscriber(),
                Some(effect.subscriber_id())
            );
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn nested_contexts() {
        let outer = lazy_effect();
        let inner = lazy_effect();

        {
            let _ctx1 = ReactiveContext::enter(&outer);
            assert_eq!(ReactiveContext::current_subscriber(), Some(outer.subscriber_id()));

            {
                let _ctx2 = ReactiveContext::enter(&inner);
                assert_eq!(ReactiveContext::current_subscriber(), Some(inner.subscriber_id()));
                assert_eq!(ReactiveContext::depth(), 2);
            }

            assert_eq!(ReactiveContext::current_subscriber(), Some(outer.subscriber_id()));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn context_restored_after_panic() {
        let effect = lazy_effect();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = ReactiveContext::enter(&effect);
            panic!("body failed");
        }));
        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn pause_nests_and_restores() {
        assert!(should_track());
        {
            let _outer = pause_tracking();
            assert!(!should_track());
            {
                let _inner = pause_tracking();
                assert!(!should_track());
            }
            assert!(!should_track());
        }
        assert!(should_track());
    }
}
