//! Value Model
//!
//! Everything the reactive layer observes is a [`Value`]. Primitive values
//! compare by value; containers compare by identity.
//!
//! # Targets
//!
//! A [`Target`] is a shared, mutable container (record, list, map or set)
//! with a process-unique [`TargetId`]. The dependency store and the view
//! cache are keyed on that id, never on the contents. When the last handle to
//! a target is dropped its dependency entries are dropped with it, which is
//! what a weak-keyed map would give us in a garbage-collected runtime.
//!
//! # Equality
//!
//! `Value` equality is SameValueZero: `NaN` equals `NaN`, `+0` equals `-0`,
//! and targets, views and callbacks are equal only to themselves. `Hash`
//! agrees with that, so values can key maps and sets directly.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use super::proxy::Reactive;
use super::store;

/// Unique identifier for an observed target.
///
/// Computed cells allocate one as well, since they are observable too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// The shape of an observable, used to pick which auxiliary dependency sets
/// a mutation fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// A plain keyed record.
    Record,
    /// An ordered list.
    List,
    /// An insertion-ordered associative map.
    Map,
    /// An insertion-ordered set.
    Set,
    /// A single-slot derived cell.
    Cell,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerKind::Record => "record",
            ContainerKind::List => "list",
            ContainerKind::Map => "map",
            ContainerKind::Set => "set",
            ContainerKind::Cell => "cell",
        };
        f.write_str(name)
    }
}

/// A property key on a record or list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Name(Rc<str>),
    Index(usize),
}

impl PropKey {
    /// The key as a list index, if it is one (`"3"` counts).
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PropKey::Index(i) => Some(*i),
            PropKey::Name(name) => name.parse().ok(),
        }
    }

    /// The key as a record field name.
    pub fn to_name(&self) -> Rc<str> {
        match self {
            PropKey::Name(name) => name.clone(),
            PropKey::Index(i) => Rc::from(i.to_string()),
        }
    }

    /// Whether this is the literal `length` key.
    pub fn is_length(&self) -> bool {
        matches!(self, PropKey::Name(name) if &**name == "length")
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Name(Rc::from(name))
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::Name(Rc::from(name))
    }
}

impl From<Rc<str>> for PropKey {
    fn from(name: Rc<str>) -> Self {
        PropKey::Name(name)
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        PropKey::Index(index)
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Name(name) => f.write_str(name),
            PropKey::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A callable value, used for event handlers and other function props.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&[Value]) -> Value>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Callback) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:#x})", self.addr())
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Func(Callback),
    /// A raw, unobserved container.
    Target(Target),
    /// A reactive view over a container.
    Reactive(Reactive),
}

impl Value {
    /// Build a raw record from key/value pairs.
    pub fn record<K, V, I>(fields: I) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into().into_raw()))
            .collect();
        Value::Target(Target::new(Container::Record(Record::new(fields))))
    }

    /// Build a raw list.
    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let items = items.into_iter().map(|v| v.into().into_raw()).collect();
        Value::Target(Target::new(Container::List(items)))
    }

    /// Build a raw map.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into().into_raw(), v.into().into_raw()))
            .collect();
        Value::Target(Target::new(Container::Map(entries)))
    }

    /// Build a raw set.
    pub fn set<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let items = items.into_iter().map(|v| v.into().into_raw()).collect();
        Value::Target(Target::new(Container::Set(items)))
    }

    /// Wrap a closure as a callable value.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        Value::Func(Callback::new(f))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Callback> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(r) => Some(r),
            _ => None,
        }
    }

    /// The underlying container, whether this is a raw target or a view.
    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Target(t) => Some(t),
            Value::Reactive(r) => Some(r.raw()),
            _ => None,
        }
    }

    /// Whether this value is a container (raw or wrapped).
    pub fn is_container(&self) -> bool {
        self.as_target().is_some()
    }

    /// Strip a reactive view down to its raw target. Containers always store
    /// raw values so that views never leak into raw data.
    pub fn into_raw(self) -> Value {
        match self {
            Value::Reactive(r) => Value::Target(r.raw().clone()),
            other => other,
        }
    }

    /// Snapshot this value as JSON. Cycles and callbacks become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = HashSet::new();
        to_json_inner(self, &mut seen)
    }
}

fn to_json_inner(value: &Value, seen: &mut HashSet<TargetId>) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null | Value::Func(_) => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Str(s) => Json::String(s.to_string()),
        Value::Target(_) | Value::Reactive(_) => {
            let Some(target) = value.as_target() else {
                return Json::Null;
            };
            if !seen.insert(target.id()) {
                return Json::Null;
            }
            let json = match &*target.borrow() {
                Container::Record(record) => Json::Object(
                    record
                        .fields
                        .iter()
                        .map(|(k, v)| (k.to_string(), to_json_inner(v, seen)))
                        .collect(),
                ),
                Container::List(items) => {
                    Json::Array(items.iter().map(|v| to_json_inner(v, seen)).collect())
                }
                Container::Set(items) => {
                    Json::Array(items.iter().map(|v| to_json_inner(v, seen)).collect())
                }
                Container::Map(entries) => {
                    if entries.keys().all(|k| matches!(k, Value::Str(_))) {
                        Json::Object(
                            entries
                                .iter()
                                .map(|(k, v)| {
                                    (k.as_str().unwrap_or_default().to_string(), to_json_inner(v, seen))
                                })
                                .collect(),
                        )
                    } else {
                        Json::Array(
                            entries
                                .iter()
                                .map(|(k, v)| {
                                    Json::Array(vec![to_json_inner(k, seen), to_json_inner(v, seen)])
                                })
                                .collect(),
                        )
                    }
                }
            };
            seen.remove(&target.id());
            json
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            (Value::Target(a), Value::Target(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                let bits = if *n == 0.0 {
                    0.0f64.to_bits()
                } else if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::Str(s) => s.hash(state),
            Value::Func(f) => f.addr().hash(state),
            Value::Target(t) => t.id().hash(state),
            Value::Reactive(r) => r.addr().hash(state),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_int!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Callback> for Value {
    fn from(f: Callback) -> Self {
        Value::Func(f)
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Value::Target(t)
    }
}

impl From<Reactive> for Value {
    fn from(r: Reactive) -> Self {
        Value::Reactive(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::list(items.into_iter().map(Value::from)),
            Json::Object(fields) => {
                Value::record(fields.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

/// A record: ordered fields plus an optional prototype consulted for keys
/// the record does not own.
#[derive(Debug, Default)]
pub struct Record {
    pub fields: IndexMap<Rc<str>, Value>,
    pub proto: Option<Reactive>,
}

impl Record {
    pub fn new(fields: IndexMap<Rc<str>, Value>) -> Self {
        Self { fields, proto: None }
    }
}

/// The data held by a target.
#[derive(Debug)]
pub enum Container {
    Record(Record),
    List(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

impl Container {
    pub fn kind(&self) -> ContainerKind {
        match self {
            Container::Record(_) => ContainerKind::Record,
            Container::List(_) => ContainerKind::List,
            Container::Map(_) => ContainerKind::Map,
            Container::Set(_) => ContainerKind::Set,
        }
    }
}

struct TargetInner {
    id: TargetId,
    data: RefCell<Container>,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        store::dispose(self.id);
    }
}

/// A shared, mutable container with stable identity.
#[derive(Clone)]
pub struct Target {
    inner: Rc<TargetInner>,
}

impl Target {
    pub fn new(data: Container) -> Self {
        Self {
            inner: Rc::new(TargetInner {
                id: TargetId::new(),
                data: RefCell::new(data),
            }),
        }
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.inner.data.borrow().kind()
    }

    pub fn borrow(&self) -> Ref<'_, Container> {
        self.inner.data.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Container> {
        self.inner.data.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Set the prototype of a record. Ignored for other containers.
    pub fn set_prototype(&self, proto: Option<Reactive>) {
        if let Container::Record(record) = &mut *self.borrow_mut() {
            record.proto = proto;
        }
    }

    pub fn prototype(&self) -> Option<Reactive> {
        match &*self.borrow() {
            Container::Record(record) => record.proto.clone(),
            _ => None,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.data.try_borrow() {
            Ok(data) => write!(f, "Target(#{}, {})", self.id().raw(), data.kind()),
            Err(_) => write!(f, "Target(#{})", self.id().raw()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn nan_equals_nan_and_zeroes_agree() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
        assert_eq!(hash_of(&Value::Number(0.0)), hash_of(&Value::Number(-0.0)));
        assert_ne!(Value::Number(1.0), Value::Number(2.0));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Value::record([("x", 1)]);
        let b = Value::record([("x", 1)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn json_round_trip_keeps_shape() {
        let json = serde_json::json!({ "name": "trellis", "tags": ["a", "b"], "n": 3.0 });
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn prop_key_index_parsing() {
        assert_eq!(PropKey::from("3").as_index(), Some(3));
        assert_eq!(PropKey::from(2usize).to_name().as_ref(), "2");
        assert!(PropKey::from("length").is_length());
    }
}
