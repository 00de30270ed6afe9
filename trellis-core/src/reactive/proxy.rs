//! Reactive Views
//!
//! A [`Reactive`] is a view over a raw [`Target`] that intercepts reads and
//! writes: reads call [`track`](super::runtime::track), writes call
//! [`trigger`](super::runtime::trigger). Every container kind supports the
//! same four capabilities, dispatched on [`ContainerKind`]:
//!
//! - `get`: tracked read; nested containers come back wrapped (lazily, on
//!   access), except through shallow views which hand out raw values.
//! - `set`: classified as Set or Add, then triggered if the value changed.
//! - `delete`: triggered only if the key existed.
//! - `own_keys`: tracked against `Iterate` (records) or `Length` (lists).
//!
//! Readonly views never track and never mutate; attempted writes are logged
//! and report success. Lists, maps and sets get their method tables in the
//! `collections` module.
//!
//! # Identity
//!
//! At most one live view exists per (target, flags). The cache holds views
//! weakly; a view lives only as long as someone holds it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::untracked;
use super::runtime::{self, TriggerOp};
use super::store::DepKey;
use super::value::{Container, ContainerKind, PropKey, Target, TargetId, Value};

/// How a view treats nested values and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewFlags {
    /// Nested containers are returned raw instead of wrapped.
    pub shallow: bool,
    /// Writes and deletes are rejected; reads are not tracked.
    pub readonly: bool,
}

impl ViewFlags {
    pub const REACTIVE: ViewFlags = ViewFlags {
        shallow: false,
        readonly: false,
    };
    pub const SHALLOW_REACTIVE: ViewFlags = ViewFlags {
        shallow: true,
        readonly: false,
    };
    pub const READONLY: ViewFlags = ViewFlags {
        shallow: false,
        readonly: true,
    };
    pub const SHALLOW_READONLY: ViewFlags = ViewFlags {
        shallow: true,
        readonly: true,
    };
}

struct ReactiveInner {
    target: Target,
    flags: ViewFlags,
}

impl Drop for ReactiveInner {
    fn drop(&mut self) {
        let key = (self.target.id(), self.flags);
        let _ = VIEW_CACHE.try_with(|cache| {
            if let Ok(mut cache) = cache.try_borrow_mut() {
                if cache.get(&key).is_some_and(|weak| weak.strong_count() == 0) {
                    cache.remove(&key);
                }
            }
        });
    }
}

thread_local! {
    static VIEW_CACHE: RefCell<HashMap<(TargetId, ViewFlags), Weak<ReactiveInner>>> =
        RefCell::new(HashMap::new());
}

/// A tracked view over a target.
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ReactiveInner>,
}

/// Anything that names a target: a raw target or an existing view.
pub trait IntoTarget {
    fn into_target(self) -> Target;
}

impl IntoTarget for Target {
    fn into_target(self) -> Target {
        self
    }
}

impl IntoTarget for &Target {
    fn into_target(self) -> Target {
        self.clone()
    }
}

impl IntoTarget for Reactive {
    fn into_target(self) -> Target {
        self.inner.target.clone()
    }
}

impl IntoTarget for &Reactive {
    fn into_target(self) -> Target {
        self.inner.target.clone()
    }
}

/// Get or create the view for `(target, flags)`.
pub fn view(target: impl IntoTarget, flags: ViewFlags) -> Reactive {
    let target = target.into_target();
    let key = (target.id(), flags);

    let cached = VIEW_CACHE.with(|cache| cache.borrow().get(&key).and_then(Weak::upgrade));
    if let Some(inner) = cached {
        return Reactive { inner };
    }

    let inner = Rc::new(ReactiveInner { target, flags });
    VIEW_CACHE.with(|cache| cache.borrow_mut().insert(key, Rc::downgrade(&inner)));
    Reactive { inner }
}

/// Deep, mutable, tracked view.
pub fn reactive(target: impl IntoTarget) -> Reactive {
    view(target, ViewFlags::REACTIVE)
}

/// Tracked view whose nested containers are returned raw.
pub fn shallow_reactive(target: impl IntoTarget) -> Reactive {
    view(target, ViewFlags::SHALLOW_REACTIVE)
}

/// Deep, untracked view that rejects writes.
pub fn readonly(target: impl IntoTarget) -> Reactive {
    view(target, ViewFlags::READONLY)
}

/// Untracked view that rejects writes to its own keys only.
pub fn shallow_readonly(target: impl IntoTarget) -> Reactive {
    view(target, ViewFlags::SHALLOW_READONLY)
}

/// The raw value behind a possibly-wrapped value.
pub fn to_raw(value: &Value) -> Value {
    value.clone().into_raw()
}

pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Reactive(r) if !r.is_readonly())
}

pub fn is_readonly(value: &Value) -> bool {
    matches!(value, Value::Reactive(r) if r.is_readonly())
}

impl Reactive {
    /// The raw target behind this view.
    pub fn raw(&self) -> &Target {
        &self.inner.target
    }

    pub fn id(&self) -> TargetId {
        self.inner.target.id()
    }

    pub fn kind(&self) -> ContainerKind {
        self.inner.target.kind()
    }

    pub fn flags(&self) -> ViewFlags {
        self.inner.flags
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.flags.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.flags.shallow
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    /// Subscribe the running effect, unless this view is readonly.
    pub(crate) fn track(&self, key: DepKey) {
        if !self.inner.flags.readonly {
            runtime::track(self.id(), key);
        }
    }

    pub(crate) fn trigger(&self, key: DepKey, op: TriggerOp, new_value: Option<&Value>) {
        runtime::trigger(self.id(), self.kind(), &key, op, new_value);
    }

    /// Wrap a raw value read out of this view according to its flags.
    pub(crate) fn wrap(&self, value: Value) -> Value {
        if self.inner.flags.shallow {
            return value.into_raw();
        }
        match value {
            Value::Target(target) => Value::Reactive(self.child_view(target)),
            Value::Reactive(r) if r.flags() != self.child_flags() => {
                Value::Reactive(self.child_view(r.raw().clone()))
            }
            other => other,
        }
    }

    fn child_flags(&self) -> ViewFlags {
        ViewFlags {
            shallow: false,
            readonly: self.inner.flags.readonly,
        }
    }

    fn child_view(&self, target: Target) -> Reactive {
        view(target, self.child_flags())
    }

    /// Log a rejected write. Returns `true` so callers see success.
    pub(crate) fn reject_write(&self, op: &str, key: &dyn fmt::Display) -> bool {
        tracing::warn!(
            target_id = self.id().raw(),
            %key,
            op,
            "set operation on key failed: target is readonly"
        );
        true
    }

    /// Tracked read of `key`.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into();
        match self.kind() {
            ContainerKind::Record => {
                let name = key.to_name();
                self.track(DepKey::Prop(name.clone()));

                let (own, proto) = match &*self.raw().borrow() {
                    Container::Record(record) => {
                        (record.fields.get(&name).cloned(), record.proto.clone())
                    }
                    _ => (None, None),
                };
                let raw = match (own, proto) {
                    (Some(value), _) => value,
                    (None, Some(proto)) => proto.get(PropKey::Name(name)),
                    (None, None) => Value::Null,
                };
                self.wrap(raw)
            }
            ContainerKind::List => {
                if key.is_length() {
                    self.track(DepKey::Length);
                    return Value::from(self.raw_len());
                }
                let Some(index) = key.as_index() else {
                    return Value::Null;
                };
                self.track(DepKey::Index(index));
                let raw = match &*self.raw().borrow() {
                    Container::List(items) => items.get(index).cloned().unwrap_or_default(),
                    _ => Value::Null,
                };
                self.wrap(raw)
            }
            ContainerKind::Map | ContainerKind::Set => {
                if matches!(&key, PropKey::Name(name) if &**name == "size") {
                    self.track(DepKey::Iterate);
                    return Value::from(self.raw_len());
                }
                Value::Null
            }
            ContainerKind::Cell => Value::Null,
        }
    }

    /// Write `key`. Returns whether the write was accepted.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        let receiver = self.raw().clone();
        self.set_via(key.into(), value.into(), &receiver) != Write::Refused
    }

    /// Write `key` on behalf of `receiver`.
    ///
    /// A record without an own `key` forwards the write to its prototype with
    /// the original receiver; the value lands on the receiver and only the
    /// receiver's view triggers.
    pub(crate) fn set_via(&self, key: PropKey, value: Value, receiver: &Target) -> Write {
        if self.is_readonly() {
            self.reject_write("set", &key);
            return Write::Swallowed;
        }
        let value = value.into_raw();

        match self.kind() {
            ContainerKind::Record => {
                let name = key.to_name();
                let (had_own, own_old, proto) = match &*self.raw().borrow() {
                    Container::Record(record) => (
                        record.fields.contains_key(&name),
                        record.fields.get(&name).cloned(),
                        record.proto.clone(),
                    ),
                    _ => return Write::Refused,
                };
                let old = match (&own_old, &proto) {
                    (Some(value), _) => value.clone(),
                    (None, Some(proto)) => untracked(|| proto.get(PropKey::Name(name.clone()))).into_raw(),
                    (None, None) => Value::Null,
                };
                let op = if had_own { TriggerOp::Set } else { TriggerOp::Add };

                let outcome = match proto {
                    Some(proto) if !had_own => {
                        proto.set_via(PropKey::Name(name.clone()), value.clone(), receiver)
                    }
                    _ => write_field(receiver, name.clone(), value.clone()),
                };

                if outcome == Write::Landed
                    && self.raw().ptr_eq(receiver)
                    && (op == TriggerOp::Add || old != value)
                {
                    self.trigger(DepKey::Prop(name), op, Some(&value));
                }
                outcome
            }
            ContainerKind::List => {
                if key.is_length() {
                    return match value.as_number() {
                        Some(n) if n >= 0.0 && n.fract() == 0.0 => match self.set_len(n as usize) {
                            Ok(()) => Write::Landed,
                            Err(err) => {
                                tracing::warn!(target_id = self.id().raw(), error = %err, "length write refused");
                                Write::Refused
                            }
                        },
                        _ => Write::Refused,
                    };
                }
                let Some(index) = key.as_index() else {
                    return Write::Refused;
                };
                let (op, old) = {
                    let mut data = self.raw().borrow_mut();
                    let Container::List(items) = &mut *data else {
                        return Write::Refused;
                    };
                    if index < items.len() {
                        let old = std::mem::replace(&mut items[index], value.clone());
                        (TriggerOp::Set, old)
                    } else {
                        // Writing past the end pads with holes up to `index`.
                        let grow = (index - items.len()).saturating_add(1);
                        if items.try_reserve(grow).is_err() {
                            tracing::warn!(target_id = self.id().raw(), index, "list write past the end refused");
                            return Write::Refused;
                        }
                        items.resize(index, Value::Null);
                        items.push(value.clone());
                        (TriggerOp::Add, Value::Null)
                    }
                };
                if op == TriggerOp::Add || old != value {
                    self.trigger(DepKey::Index(index), op, Some(&value));
                }
                Write::Landed
            }
            ContainerKind::Map | ContainerKind::Set | ContainerKind::Cell => Write::Refused,
        }
    }

    /// Remove `key`. Triggers only if the key existed.
    pub fn delete(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        if self.is_readonly() {
            return self.reject_write("delete", &key);
        }

        match self.kind() {
            ContainerKind::Record => {
                let name = key.to_name();
                let removed = match &mut *self.raw().borrow_mut() {
                    Container::Record(record) => record.fields.shift_remove(&name),
                    _ => None,
                };
                if removed.is_some() {
                    self.trigger(DepKey::Prop(name), TriggerOp::Delete, None);
                }
                true
            }
            ContainerKind::List => {
                let Some(index) = key.as_index() else {
                    return false;
                };
                // Deleting an element leaves a hole; the length is unchanged.
                // Deleting a hole is a no-op.
                let existed = match &mut *self.raw().borrow_mut() {
                    Container::List(items) => items
                        .get_mut(index)
                        .map(std::mem::take)
                        .is_some_and(|old| !old.is_null()),
                    _ => false,
                };
                if existed {
                    self.trigger(DepKey::Index(index), TriggerOp::Delete, None);
                }
                true
            }
            ContainerKind::Map | ContainerKind::Set | ContainerKind::Cell => false,
        }
    }

    /// Tracked membership test for a property key.
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        match self.kind() {
            ContainerKind::Record => {
                let name = key.to_name();
                self.track(DepKey::Prop(name.clone()));
                let (own, proto) = match &*self.raw().borrow() {
                    Container::Record(record) => {
                        (record.fields.contains_key(&name), record.proto.clone())
                    }
                    _ => (false, None),
                };
                own || proto.is_some_and(|proto| proto.has(PropKey::Name(name)))
            }
            ContainerKind::List => {
                if key.is_length() {
                    return true;
                }
                let Some(index) = key.as_index() else {
                    return false;
                };
                self.track(DepKey::Index(index));
                index < self.raw_len()
            }
            ContainerKind::Map | ContainerKind::Set | ContainerKind::Cell => false,
        }
    }

    /// Tracked enumeration of own keys.
    pub fn own_keys(&self) -> Vec<PropKey> {
        match self.kind() {
            ContainerKind::Record => {
                self.track(DepKey::Iterate);
                match &*self.raw().borrow() {
                    Container::Record(record) => {
                        record.fields.keys().cloned().map(PropKey::Name).collect()
                    }
                    _ => Vec::new(),
                }
            }
            ContainerKind::List => {
                self.track(DepKey::Length);
                (0..self.raw_len()).map(PropKey::Index).collect()
            }
            ContainerKind::Map | ContainerKind::Set | ContainerKind::Cell => Vec::new(),
        }
    }

    /// Untracked element count of a list, map or set.
    pub(crate) fn raw_len(&self) -> usize {
        match &*self.raw().borrow() {
            Container::Record(record) => record.fields.len(),
            Container::List(items) => items.len(),
            Container::Map(entries) => entries.len(),
            Container::Set(items) => items.len(),
        }
    }
}

/// Outcome of [`Reactive::set_via`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Write {
    /// The value was stored.
    Landed,
    /// A readonly view dropped the write; callers still see success.
    Swallowed,
    /// The container cannot hold the key.
    Refused,
}

fn write_field(target: &Target, name: Rc<str>, value: Value) -> Write {
    match &mut *target.borrow_mut() {
        Container::Record(record) => {
            record.fields.insert(name, value);
            Write::Landed
        }
        _ => Write::Refused,
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.inner.target)
            .field("shallow", &self.inner.flags.shallow)
            .field("readonly", &self.inner.flags.readonly)
            .finish()
    }
}
