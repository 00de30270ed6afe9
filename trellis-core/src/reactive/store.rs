//! Dependency Store
//!
//! Maps each observed target to its per-key dependency sets:
//!
//! ```text
//! TargetId -> DepKey -> Dep { SubscriberId -> Effect }
//! ```
//!
//! The store holds effects strongly through their dep sets, and an effect
//! only holds weak references back to the sets it belongs to. Dropping a
//! target removes its entry, which in turn releases every effect that was
//! only reachable through it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::effect::Effect;
use super::subscriber::SubscriberId;
use super::value::{TargetId, Value};

/// A key in the dependency store.
///
/// Besides real property keys this includes the reserved markers that can
/// never collide with a property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named record field.
    Prop(Rc<str>),
    /// A list index.
    Index(usize),
    /// A map or set entry, keyed by the raw key value.
    Entry(Value),
    /// List length, also the literal `length` property.
    Length,
    /// The container's structure was enumerated.
    Iterate,
    /// A map's keys (and only its keys) were enumerated.
    MapKeyIterate,
}

impl DepKey {
    pub fn prop(name: &str) -> Self {
        DepKey::Prop(Rc::from(name))
    }
}

type Subscribers = IndexMap<SubscriberId, Effect>;

/// The set of effects subscribed to one (target, key) pair.
#[derive(Clone, Default)]
pub struct Dep(Rc<RefCell<Subscribers>>);

impl Dep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an effect. Returns `false` if it was already subscribed.
    pub fn insert(&self, effect: &Effect) -> bool {
        let mut subs = self.0.borrow_mut();
        if subs.contains_key(&effect.subscriber_id()) {
            return false;
        }
        subs.insert(effect.subscriber_id(), effect.clone());
        true
    }

    /// Unsubscribe `id`. O(n): the remaining subscribers keep their order,
    /// which is the order triggers run them in.
    pub fn remove(&self, id: SubscriberId) {
        let removed = self.0.borrow_mut().shift_remove(&id);
        drop(removed);
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.0.borrow().contains_key(&id)
    }

    /// Snapshot of the subscribers, in subscription order.
    pub fn subscribers(&self) -> Vec<Effect> {
        self.0.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn downgrade(&self) -> WeakDep {
        WeakDep(Rc::downgrade(&self.0))
    }
}

/// Weak back-reference from an effect to a dep set it belongs to.
#[derive(Clone)]
pub struct WeakDep(Weak<RefCell<Subscribers>>);

impl WeakDep {
    pub fn upgrade(&self) -> Option<Dep> {
        self.0.upgrade().map(Dep)
    }
}

type DepsMap = HashMap<DepKey, Dep>;

thread_local! {
    static STORE: RefCell<HashMap<TargetId, DepsMap>> = RefCell::new(HashMap::new());

    /// Targets dropped while the store was borrowed.
    static PENDING_DISPOSE: RefCell<Vec<TargetId>> = const { RefCell::new(Vec::new()) };
}

fn with_store<R>(f: impl FnOnce(&mut HashMap<TargetId, DepsMap>) -> R) -> R {
    let pending: Vec<TargetId> = PENDING_DISPOSE.with(|p| p.borrow_mut().drain(..).collect());
    let (result, removed) = STORE.with(|store| {
        let mut store = store.borrow_mut();
        let removed: Vec<DepsMap> = pending.iter().filter_map(|id| store.remove(id)).collect();
        (f(&mut store), removed)
    });
    drop(removed);
    result
}

/// Get the dep set for `(target, key)`, creating it if needed.
pub fn dep_for(target: TargetId, key: DepKey) -> Dep {
    with_store(|store| {
        store
            .entry(target)
            .or_default()
            .entry(key)
            .or_default()
            .clone()
    })
}

/// Get the dep set for `(target, key)` if one exists.
pub fn get(target: TargetId, key: &DepKey) -> Option<Dep> {
    with_store(|store| store.get(&target).and_then(|deps| deps.get(key)).cloned())
}

/// All dep sets of `target` whose key satisfies `pred`.
pub fn deps_matching(target: TargetId, pred: impl Fn(&DepKey) -> bool) -> Vec<Dep> {
    with_store(|store| {
        store
            .get(&target)
            .map(|deps| {
                deps.iter()
                    .filter(|(key, _)| pred(key))
                    .map(|(_, dep)| dep.clone())
                    .collect()
            })
            .unwrap_or_default()
    })
}

/// Whether any dependency data is recorded for `target`.
pub fn is_tracked(target: TargetId) -> bool {
    with_store(|store| store.contains_key(&target))
}

/// Number of effects subscribed to `(target, key)`.
pub fn subscriber_count(target: TargetId, key: &DepKey) -> usize {
    get(target, key).map(|dep| dep.len()).unwrap_or(0)
}

/// Remove every dependency recorded for `target`.
///
/// Called automatically when a target or computed cell is dropped; may also
/// be called explicitly to tear down a target that is still referenced.
pub fn dispose(target: TargetId) {
    let removed = STORE.try_with(|store| match store.try_borrow_mut() {
        Ok(mut store) => store.remove(&target),
        Err(_) => {
            let _ = PENDING_DISPOSE.try_with(|p| p.borrow_mut().push(target));
            None
        }
    });
    // Dropping the removed deps may drop effects, which may drop more targets.
    drop(removed);
}
