//! Job Scheduler
//!
//! Batches effect re-runs so that a burst of synchronous mutations produces
//! at most one re-run per affected effect.
//!
//! # Algorithm
//!
//! 1. `queue_job(effect)` inserts the effect into the pending set. The set is
//!    keyed by subscriber ID, so scheduling the same effect twice in one tick
//!    is a no-op.
//!
//! 2. The first job of a tick also queues one flush onto the microtask queue.
//!
//! 3. When the host drains microtasks (`flush_microtasks`), the flush takes
//!    the pending set, clears the pending flag and runs each job once, in
//!    insertion order. Jobs scheduled while that happens land in a fresh set
//!    with a fresh flush, so they see the state left by the previous one.
//!
//! The microtask queue is the only deferral mechanism: tasks never run until
//! the host calls [`flush_microtasks`] after its synchronous work unwinds.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use indexmap::IndexMap;

use super::effect::Effect;
use super::runtime::Runtime;
use super::subscriber::SubscriberId;
use crate::error::{ReactiveError, ReactiveResult};

type Microtask = Box<dyn FnOnce()>;

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Microtask>> = const { RefCell::new(VecDeque::new()) };
    static JOBS: RefCell<IndexMap<SubscriberId, Effect>> = RefCell::new(IndexMap::new());
    static FLUSH_PENDING: Cell<bool> = const { Cell::new(false) };
    static DRAINING: Cell<bool> = const { Cell::new(false) };
    static FLUSH_COUNT: Cell<usize> = const { Cell::new(0) };
    static LIMIT_HIT: Cell<bool> = const { Cell::new(false) };
}

/// Queue a callback to run on the next microtask drain.
pub fn queue_microtask<F>(task: F)
where
    F: FnOnce() + 'static,
{
    MICROTASKS.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Run `f` after the current synchronous work, on the next drain.
pub fn next_tick<F>(f: F)
where
    F: FnOnce() + 'static,
{
    queue_microtask(f);
}

/// Schedule `effect` to re-run on the next flush.
///
/// This is the standard scheduler for batched effects:
///
/// ```rust,ignore
/// let options = EffectOptions::default().with_scheduler(|e| queue_job(e));
/// ```
pub fn queue_job(effect: &Effect) {
    JOBS.with(|jobs| {
        jobs.borrow_mut()
            .entry(effect.subscriber_id())
            .or_insert_with(|| effect.clone());
    });

    if !FLUSH_PENDING.with(|pending| pending.replace(true)) {
        queue_microtask(flush_jobs);
    }
}

/// Number of jobs waiting for the next flush.
pub fn pending_jobs() -> usize {
    JOBS.with(|jobs| jobs.borrow().len())
}

/// Whether any microtask is waiting to run.
pub fn has_pending_microtasks() -> bool {
    MICROTASKS.with(|queue| !queue.borrow().is_empty())
}

fn flush_jobs() {
    let jobs = JOBS.with(|jobs| std::mem::take(&mut *jobs.borrow_mut()));
    FLUSH_PENDING.with(|pending| pending.set(false));

    let limit = Runtime::config().recursion_limit;
    let count = FLUSH_COUNT.with(|c| {
        c.set(c.get() + 1);
        c.get()
    });
    if count > limit {
        tracing::warn!(limit, dropped = jobs.len(), "job flush recursion limit exceeded");
        LIMIT_HIT.with(|hit| hit.set(true));
        return;
    }

    tracing::trace!(jobs = jobs.len(), flush = count, "flushing jobs");
    for effect in jobs.into_values() {
        if effect.is_active() {
            effect.run();
        }
    }
}

struct DrainGuard;

impl DrainGuard {
    fn enter() -> Option<Self> {
        if DRAINING.with(|d| d.replace(true)) {
            return None;
        }
        FLUSH_COUNT.with(|c| c.set(0));
        LIMIT_HIT.with(|hit| hit.set(false));
        Some(DrainGuard)
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|d| d.set(false));
    }
}

/// Run queued microtasks until the queue is empty, including tasks queued
/// while draining. Returns the number of tasks run.
///
/// Calling this from inside a microtask is a no-op; the outer drain picks up
/// anything newly queued.
pub fn flush_microtasks() -> ReactiveResult<usize> {
    let Some(_guard) = DrainGuard::enter() else {
        return Ok(0);
    };

    let mut ran = 0;
    loop {
        let task = MICROTASKS.with(|queue| queue.borrow_mut().pop_front());
        let Some(task) = task else {
            break;
        };
        task();
        ran += 1;

        if LIMIT_HIT.with(Cell::get) {
            let limit = Runtime::config().recursion_limit;
            let dropped = MICROTASKS.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
            let jobs = JOBS.with(|jobs| std::mem::take(&mut *jobs.borrow_mut()));
            FLUSH_PENDING.with(|pending| pending.set(false));
            drop((dropped, jobs));
            return Err(ReactiveError::RecursionLimit { limit });
        }
    }
    Ok(ran)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect_with, EffectOptions};
    use std::rc::Rc;

    fn counting_effect(counter: Rc<Cell<usize>>) -> Effect {
        effect_with(
            move || counter.set(counter.get() + 1),
            EffectOptions::lazy().with_scheduler(queue_job),
        )
    }

    #[test]
    fn duplicate_jobs_collapse() {
        let runs = Rc::new(Cell::new(0));
        let effect = counting_effect(runs.clone());

        queue_job(&effect);
        queue_job(&effect);
        queue_job(&effect);
        assert_eq!(pending_jobs(), 1);
        assert_eq!(runs.get(), 0);

        flush_microtasks().unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(pending_jobs(), 0);
    }

    #[test]
    fn microtasks_run_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            next_tick(move || log.borrow_mut().push(i));
        }
        assert!(has_pending_microtasks());
        assert_eq!(flush_microtasks().unwrap(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_next_flush() {
        let runs = Rc::new(Cell::new(0));
        let second = counting_effect(runs.clone());
        let first = {
            let second = second.clone();
            effect_with(
                move || queue_job(&second),
                EffectOptions::lazy().with_scheduler(queue_job),
            )
        };

        queue_job(&first);
        // one flush for `first`, then a second flush for `second`
        assert_eq!(flush_microtasks().unwrap(), 2);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn stopped_jobs_are_skipped() {
        let runs = Rc::new(Cell::new(0));
        let effect = counting_effect(runs.clone());
        queue_job(&effect);
        effect.stop();
        flush_microtasks().unwrap();
        assert_eq!(runs.get(), 0);
    }

    #[test]
    fn runaway_rescheduling_hits_limit() {
        let effect = Rc::new(RefCell::new(None::<Effect>));
        let slot = effect.clone();
        let looping = effect_with(
            move || {
                if let Some(e) = slot.borrow().as_ref() {
                    queue_job(e);
                }
            },
            EffectOptions::lazy().with_scheduler(queue_job),
        );
        *effect.borrow_mut() = Some(looping.clone());

        queue_job(&looping);
        let err = flush_microtasks().unwrap_err();
        assert_eq!(
            err,
            ReactiveError::RecursionLimit {
                limit: Runtime::config().recursion_limit
            }
        );
        assert!(!has_pending_microtasks());
        assert_eq!(pending_jobs(), 0);

        // break the self-reference
        effect.borrow_mut().take();
    }
}
