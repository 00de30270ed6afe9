//! Collection Methods
//!
//! Method tables for list, map and set views. Each method checks the
//! container kind first and returns [`ReactiveError::WrongKind`] on a
//! mismatch.
//!
//! List mutators (`push`, `pop`, `shift`, `unshift`, `splice`) read the
//! length internally. Those reads run with tracking paused so that two
//! effects pushing onto the same list do not subscribe to its length and
//! retrigger each other forever.
//!
//! List searches (`includes`, `index_of`, `last_index_of`) run over the
//! wrapped elements first and fall back to the raw elements, so both a view
//! and its raw target are found.

use super::context::pause_tracking;
use super::proxy::Reactive;
use super::runtime::{self, TriggerOp};
use super::store::DepKey;
use super::value::{Container, ContainerKind, Value};
use crate::error::{ReactiveError, ReactiveResult};

impl Reactive {
    fn expect_kind(&self, op: &'static str, kinds: &[ContainerKind]) -> ReactiveResult<ContainerKind> {
        let kind = self.kind();
        if kinds.contains(&kind) {
            Ok(kind)
        } else {
            Err(ReactiveError::WrongKind { op, kind })
        }
    }

    // ------------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------------

    /// Tracked list length.
    pub fn len(&self) -> ReactiveResult<usize> {
        self.expect_kind("len", &[ContainerKind::List])?;
        self.track(DepKey::Length);
        Ok(self.raw_len())
    }

    pub fn is_empty(&self) -> ReactiveResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Write the list length. Shrinking drops the tail and re-runs effects
    /// that read `length` or any index at or past the new length. Growing
    /// pads with `Null`; a length that cannot be allocated is an error and
    /// leaves the list as it was.
    pub fn set_len(&self, new_len: usize) -> ReactiveResult<()> {
        self.expect_kind("set_len", &[ContainerKind::List])?;
        if self.is_readonly() {
            self.reject_write("set", &"length");
            return Ok(());
        }
        let changed = match &mut *self.raw().borrow_mut() {
            Container::List(items) if items.len() != new_len => {
                if new_len > items.len() && items.try_reserve(new_len - items.len()).is_err() {
                    return Err(ReactiveError::Capacity { len: new_len });
                }
                items.resize(new_len, Value::Null);
                true
            }
            _ => false,
        };
        if changed {
            self.trigger(DepKey::Length, TriggerOp::Set, Some(&Value::from(new_len)));
        }
        Ok(())
    }

    /// Tracked snapshot of the elements, wrapped.
    pub fn iter(&self) -> ReactiveResult<std::vec::IntoIter<Value>> {
        let len = self.len()?;
        let items: Vec<Value> = (0..len).map(|i| self.get(i)).collect();
        Ok(items.into_iter())
    }

    /// Append `value`. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> ReactiveResult<usize> {
        self.expect_kind("push", &[ContainerKind::List])?;
        let _pause = pause_tracking();
        let len = self.raw_len();
        self.splice_raw("push", len, 0, vec![value.into()]);
        Ok(self.raw_len())
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> ReactiveResult<Value> {
        self.expect_kind("pop", &[ContainerKind::List])?;
        let _pause = pause_tracking();
        let len = self.raw_len();
        if len == 0 {
            return Ok(Value::Null);
        }
        let removed = self.splice_raw("pop", len - 1, 1, Vec::new());
        Ok(removed.into_iter().next().unwrap_or_default())
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> ReactiveResult<Value> {
        self.expect_kind("shift", &[ContainerKind::List])?;
        let _pause = pause_tracking();
        if self.raw_len() == 0 {
            return Ok(Value::Null);
        }
        let removed = self.splice_raw("shift", 0, 1, Vec::new());
        Ok(removed.into_iter().next().unwrap_or_default())
    }

    /// Prepend `value`. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> ReactiveResult<usize> {
        self.expect_kind("unshift", &[ContainerKind::List])?;
        let _pause = pause_tracking();
        self.splice_raw("unshift", 0, 0, vec![value.into()]);
        Ok(self.raw_len())
    }

    /// Remove `delete_count` elements at `start` and insert `items` in their
    /// place. Returns the removed elements.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> ReactiveResult<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.expect_kind("splice", &[ContainerKind::List])?;
        let _pause = pause_tracking();
        let items = items.into_iter().map(Into::into).collect();
        Ok(self.splice_raw("splice", start, delete_count, items))
    }

    /// Apply a splice to the raw list, then trigger the indices that changed
    /// and the length if it moved.
    fn splice_raw(&self, op: &'static str, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        if self.is_readonly() {
            self.reject_write(op, &start);
            return Vec::new();
        }

        let (before, after, removed) = {
            let mut data = self.raw().borrow_mut();
            let Container::List(list) = &mut *data else {
                return Vec::new();
            };
            let before = list.clone();
            let start = start.min(list.len());
            let end = start.saturating_add(delete_count).min(list.len());
            let removed: Vec<Value> = list
                .splice(start..end, items.into_iter().map(Value::into_raw))
                .collect();
            (before, list.clone(), removed)
        };

        let (old_len, new_len) = (before.len(), after.len());
        for i in 0..old_len.min(new_len) {
            if before[i] != after[i] {
                self.trigger(DepKey::Index(i), TriggerOp::Set, Some(&after[i]));
            }
        }
        if new_len > old_len {
            for (i, value) in after.iter().enumerate().skip(old_len) {
                self.trigger(DepKey::Index(i), TriggerOp::Add, Some(value));
            }
        } else if new_len < old_len {
            // Covers `length` readers and every index past the new end.
            self.trigger(DepKey::Length, TriggerOp::Set, Some(&Value::from(new_len)));
        }

        removed.into_iter().map(|v| self.wrap(v)).collect()
    }

    /// Whether the list contains `value`.
    pub fn includes(&self, value: &Value) -> ReactiveResult<bool> {
        Ok(self.index_of(value)?.is_some())
    }

    /// Position of the first element equal to `value`.
    pub fn index_of(&self, value: &Value) -> ReactiveResult<Option<usize>> {
        self.expect_kind("index_of", &[ContainerKind::List])?;
        let wrapped: Vec<Value> = self.iter()?.collect();
        if let Some(i) = wrapped.iter().position(|v| v == value) {
            return Ok(Some(i));
        }
        Ok(self.raw_items().iter().position(|v| v == value))
    }

    /// Position of the last element equal to `value`.
    pub fn last_index_of(&self, value: &Value) -> ReactiveResult<Option<usize>> {
        self.expect_kind("last_index_of", &[ContainerKind::List])?;
        let wrapped: Vec<Value> = self.iter()?.collect();
        if let Some(i) = wrapped.iter().rposition(|v| v == value) {
            return Ok(Some(i));
        }
        Ok(self.raw_items().iter().rposition(|v| v == value))
    }

    fn raw_items(&self) -> Vec<Value> {
        match &*self.raw().borrow() {
            Container::List(items) => items.clone(),
            Container::Set(items) => items.iter().cloned().collect(),
            Container::Map(entries) => entries.values().cloned().collect(),
            Container::Record(record) => record.fields.values().cloned().collect(),
        }
    }

    // ------------------------------------------------------------------------
    // Maps and sets
    // ------------------------------------------------------------------------

    /// Tracked entry count of a map or set.
    pub fn size(&self) -> ReactiveResult<usize> {
        self.expect_kind("size", &[ContainerKind::Map, ContainerKind::Set])?;
        self.track(DepKey::Iterate);
        Ok(self.raw_len())
    }

    /// Tracked lookup of a map entry.
    pub fn map_get(&self, key: impl Into<Value>) -> ReactiveResult<Value> {
        self.expect_kind("map_get", &[ContainerKind::Map])?;
        let key = key.into().into_raw();
        self.track(DepKey::Entry(key.clone()));
        let raw = match &*self.raw().borrow() {
            Container::Map(entries) => entries.get(&key).cloned().unwrap_or_default(),
            _ => Value::Null,
        };
        Ok(self.wrap(raw))
    }

    /// Insert or overwrite a map entry.
    pub fn map_set(&self, key: impl Into<Value>, value: impl Into<Value>) -> ReactiveResult<()> {
        self.expect_kind("map_set", &[ContainerKind::Map])?;
        let key = key.into().into_raw();
        if self.is_readonly() {
            self.reject_write("map_set", &format_key(&key));
            return Ok(());
        }
        let value = value.into().into_raw();
        let old = match &mut *self.raw().borrow_mut() {
            Container::Map(entries) => entries.insert(key.clone(), value.clone()),
            _ => None,
        };
        match old {
            None => self.trigger(DepKey::Entry(key), TriggerOp::Add, Some(&value)),
            Some(old) if old != value => self.trigger(DepKey::Entry(key), TriggerOp::Set, Some(&value)),
            Some(_) => {}
        }
        Ok(())
    }

    /// Tracked membership test on a map key or set element.
    pub fn has_key(&self, key: impl Into<Value>) -> ReactiveResult<bool> {
        self.expect_kind("has_key", &[ContainerKind::Map, ContainerKind::Set])?;
        let key = key.into().into_raw();
        self.track(DepKey::Entry(key.clone()));
        Ok(match &*self.raw().borrow() {
            Container::Map(entries) => entries.contains_key(&key),
            Container::Set(items) => items.contains(&key),
            _ => false,
        })
    }

    /// Insert a set element. Returns whether it was newly added.
    pub fn add(&self, value: impl Into<Value>) -> ReactiveResult<bool> {
        self.expect_kind("add", &[ContainerKind::Set])?;
        let value = value.into().into_raw();
        if self.is_readonly() {
            self.reject_write("add", &format_key(&value));
            return Ok(false);
        }
        let added = match &mut *self.raw().borrow_mut() {
            Container::Set(items) => items.insert(value.clone()),
            _ => false,
        };
        if added {
            self.trigger(DepKey::Entry(value.clone()), TriggerOp::Add, Some(&value));
        }
        Ok(added)
    }

    /// Remove a map entry or set element. Returns whether it existed.
    pub fn remove(&self, key: impl Into<Value>) -> ReactiveResult<bool> {
        self.expect_kind("remove", &[ContainerKind::Map, ContainerKind::Set])?;
        let key = key.into().into_raw();
        if self.is_readonly() {
            self.reject_write("remove", &format_key(&key));
            return Ok(false);
        }
        let existed = match &mut *self.raw().borrow_mut() {
            Container::Map(entries) => entries.shift_remove(&key).is_some(),
            Container::Set(items) => items.shift_remove(&key),
            _ => false,
        };
        if existed {
            self.trigger(DepKey::Entry(key), TriggerOp::Delete, None);
        }
        Ok(existed)
    }

    /// Remove every entry. Every effect that read anything from this
    /// collection re-runs once.
    pub fn clear(&self) -> ReactiveResult<()> {
        self.expect_kind("clear", &[ContainerKind::Map, ContainerKind::Set])?;
        if self.is_readonly() {
            self.reject_write("clear", &"*");
            return Ok(());
        }
        let had_entries = match &mut *self.raw().borrow_mut() {
            Container::Map(entries) => {
                let had = !entries.is_empty();
                entries.clear();
                had
            }
            Container::Set(items) => {
                let had = !items.is_empty();
                items.clear();
                had
            }
            _ => false,
        };
        if had_entries {
            runtime::trigger_all(self.id());
        }
        Ok(())
    }

    /// Tracked `(key, value)` snapshot. A set yields each element as both.
    pub fn entries(&self) -> ReactiveResult<Vec<(Value, Value)>> {
        self.expect_kind("entries", &[ContainerKind::Map, ContainerKind::Set])?;
        self.track(DepKey::Iterate);
        let raw: Vec<(Value, Value)> = match &*self.raw().borrow() {
            Container::Map(entries) => entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Container::Set(items) => items.iter().map(|v| (v.clone(), v.clone())).collect(),
            _ => Vec::new(),
        };
        Ok(raw
            .into_iter()
            .map(|(k, v)| (self.wrap(k), self.wrap(v)))
            .collect())
    }

    /// Tracked snapshot of the values.
    pub fn values(&self) -> ReactiveResult<Vec<Value>> {
        Ok(self.entries()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Tracked snapshot of the keys. On a map this only subscribes to key
    /// changes, so overwriting a value does not re-run the reader.
    pub fn keys(&self) -> ReactiveResult<Vec<Value>> {
        match self.expect_kind("keys", &[ContainerKind::Map, ContainerKind::Set])? {
            ContainerKind::Map => {
                self.track(DepKey::MapKeyIterate);
                let raw: Vec<Value> = match &*self.raw().borrow() {
                    Container::Map(entries) => entries.keys().cloned().collect(),
                    _ => Vec::new(),
                };
                Ok(raw.into_iter().map(|k| self.wrap(k)).collect())
            }
            _ => Ok(self.entries()?.into_iter().map(|(k, _)| k).collect()),
        }
    }

    /// Call `f(value, key)` for every entry, tracked.
    pub fn for_each<F>(&self, mut f: F) -> ReactiveResult<()>
    where
        F: FnMut(Value, Value),
    {
        for (key, value) in self.entries()? {
            f(value, key);
        }
        Ok(())
    }
}

fn format_key(key: &Value) -> String {
    match key {
        Value::Str(s) => s.to_string(),
        Value::Number(n) => n.to_string(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use crate::reactive::effect::effect;
    use crate::reactive::proxy::{reactive, readonly};
    use crate::reactive::value::{ContainerKind, Target, Value};
    use crate::error::ReactiveError;
    use std::cell::Cell;
    use std::rc::Rc;

    fn target(value: Value) -> Target {
        value.as_target().cloned().expect("container")
    }

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        (runs.clone(), runs)
    }

    #[test]
    fn push_does_not_subscribe_to_length() {
        let list = reactive(target(Value::list([1, 2])));
        let (runs, c) = counter();
        let l = list.clone();
        let _pusher = effect(move || {
            c.set(c.get() + 1);
            l.push(0).unwrap();
        });
        let l = list.clone();
        let _other = effect(move || {
            l.push(0).unwrap();
        });
        assert_eq!(runs.get(), 1);
        assert_eq!(list.raw_len(), 4);
    }

    #[test]
    fn unallocatable_length_is_an_error() {
        let list = reactive(target(Value::list([1, 2])));
        assert_eq!(list.set_len(usize::MAX), Err(ReactiveError::Capacity { len: usize::MAX }));
        assert_eq!(list.raw_len(), 2);
        assert!(!list.set("length", usize::MAX as f64));
        assert_eq!(list.raw_len(), 2);
    }

    #[test]
    fn length_readers_rerun_on_push_and_truncate() {
        let list = reactive(target(Value::list([1, 2, 3])));
        let (runs, c) = counter();
        let l = list.clone();
        let _e = effect(move || {
            c.set(c.get() + 1);
            l.len().unwrap()
        });
        list.push(4).unwrap();
        assert_eq!(runs.get(), 2);
        list.set_len(1).unwrap();
        assert_eq!(runs.get(), 3);
        list.set_len(1).unwrap();
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn truncation_reaches_readers_past_new_end() {
        let list = reactive(target(Value::list([1, 2, 3])));
        let (runs, c) = counter();
        let l = list.clone();
        let _e = effect(move || {
            c.set(c.get() + 1);
            l.get(2usize)
        });
        list.set_len(3).unwrap();
        assert_eq!(runs.get(), 1);
        list.set_len(2).unwrap();
        assert_eq!(runs.get(), 2);
        assert_eq!(list.get(2usize), Value::Null);
    }

    #[test]
    fn search_finds_views_and_raw_targets() {
        let child = target(Value::record([("x", 1)]));
        let list = reactive(target(Value::list([Value::Target(child.clone())])));
        let wrapped = list.get(0usize);
        assert_eq!(list.index_of(&wrapped).unwrap(), Some(0));
        assert!(list.includes(&Value::Target(child)).unwrap());
        assert_eq!(list.last_index_of(&Value::from(7)).unwrap(), None);
    }

    #[test]
    fn splice_returns_removed_and_shifts() {
        let list = reactive(target(Value::list([1, 2, 3, 4])));
        let removed = list.splice(1, 2, [9]).unwrap();
        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(list.shift().unwrap(), Value::from(1));
        assert_eq!(list.unshift(0).unwrap(), 3);
        assert_eq!(list.pop().unwrap(), Value::from(4));
        let items: Vec<Value> = list.iter().unwrap().collect();
        assert_eq!(items, vec![Value::from(0), Value::from(9)]);
    }

    #[test]
    fn map_value_overwrite_skips_key_readers() {
        let map = reactive(target(Value::map([("a", 1)])));
        let (key_runs, k) = counter();
        let (value_runs, v) = counter();
        let m = map.clone();
        let _keys = effect(move || {
            k.set(k.get() + 1);
            m.keys().unwrap().len()
        });
        let m = map.clone();
        let _values = effect(move || {
            v.set(v.get() + 1);
            m.values().unwrap().len()
        });

        map.map_set("a", 2).unwrap();
        assert_eq!((key_runs.get(), value_runs.get()), (1, 2));

        map.map_set("b", 3).unwrap();
        assert_eq!((key_runs.get(), value_runs.get()), (2, 3));

        map.map_set("b", 3).unwrap();
        assert_eq!((key_runs.get(), value_runs.get()), (2, 3));
    }

    #[test]
    fn set_membership_is_tracked_per_entry() {
        let set = reactive(target(Value::set(["a"])));
        let (runs, c) = counter();
        let s = set.clone();
        let _e = effect(move || {
            c.set(c.get() + 1);
            s.has_key("b").unwrap()
        });
        assert!(set.add("c").unwrap());
        assert_eq!(runs.get(), 1);
        assert!(set.add("b").unwrap());
        assert!(!set.add("b").unwrap());
        assert_eq!(runs.get(), 2);
        assert!(set.remove("b").unwrap());
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn clear_reruns_each_reader_once() {
        let map = reactive(target(Value::map([("a", 1), ("b", 2)])));
        let (runs, c) = counter();
        let m = map.clone();
        let _e = effect(move || {
            c.set(c.get() + 1);
            m.map_get("a").unwrap();
            m.map_get("b").unwrap();
            m.size().unwrap()
        });
        map.clear().unwrap();
        assert_eq!(runs.get(), 2);
        assert_eq!(map.size().unwrap(), 0);
    }

    #[test]
    fn nested_map_values_are_wrapped() {
        let inner = Value::record([("x", 1)]);
        let map = reactive(target(Value::map([("k", inner.clone())])));
        let got = map.map_get("k").unwrap();
        assert!(got.as_reactive().is_some());
        assert!(got.as_target().unwrap().ptr_eq(inner.as_target().unwrap()));

        let frozen = readonly(map.raw());
        assert!(frozen.map_get("k").unwrap().as_reactive().is_some_and(|r| r.is_readonly()));
        frozen.map_set("k", 1).unwrap();
        assert_eq!(map.size().unwrap(), 1);
    }

    #[test]
    fn wrong_kind_is_an_error() {
        let record = reactive(target(Value::record([("a", 1)])));
        assert_eq!(
            record.push(1).unwrap_err(),
            ReactiveError::WrongKind {
                op: "push",
                kind: ContainerKind::Record
            }
        );
        assert!(record.size().is_err());
    }
}
