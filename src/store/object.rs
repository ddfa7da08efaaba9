// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Store object types: `Host`, `Service`, `Metric`, `Attribute`, and the
//! shared `NodeRef`/`ObjectMeta` machinery that gives them monotonic
//! `last_update`, interval smoothing, and backend tracking.
//!
//! Grounded on `original_source/src/include/core/store.h` (the
//! `sdb_store_obj_t` super-type and its queryable fields).

use crate::avltree::{AvlTree, Named};
use crate::error::{Error, Result, WriteOutcome};
use crate::time::{self, SdbTime};
use crate::values::{ArrayValue, DataValue};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The four store object kinds (spec.md §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectType {
    Host,
    Service,
    Metric,
    Attribute,
}

impl ObjectType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Service => "service",
            Self::Metric => "metric",
            Self::Attribute => "attribute",
        }
    }
}

/// The queryable fields common to every store object (spec.md §4.D).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Field {
    LastUpdate,
    Age,
    Interval,
    Backend,
    Name,
    Value,
}

/// A shared handle to a store object. The name is immutable once created
/// (mirroring the original's `sdb_object_t`, whose name is fixed at
/// construction) so it can be read without taking the payload lock; only
/// the mutable bookkeeping (`last_update`/`interval`/`backends`/children)
/// lives behind the `RwLock`.
///
/// Cloning a `NodeRef` is the refcount-safety mechanism from spec.md §8:
/// a clone keeps the payload alive even after the tree's own reference is
/// dropped by `store_clear` or a parent removal.
pub struct NodeRef<T> {
    name: String,
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> NodeRef<T> {
    pub fn new(name: String, value: T) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(value)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().expect("store lock is poisoned")
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().expect("store lock is poisoned")
    }

    /// The number of outstanding handles (this one included), i.e. the
    /// refcount from spec.md §8.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<T> Named for NodeRef<T> {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Shared mutable bookkeeping for every store object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub last_update: SdbTime,
    /// Exponentially smoothed update-interval estimate; 0 means "unseeded".
    pub interval: SdbTime,
    pub backends: Vec<String>,
}

impl ObjectMeta {
    fn new(ts: SdbTime, backend: Option<&str>) -> Self {
        Self {
            last_update: ts,
            interval: 0,
            backends: backend.map(|b| vec![b.to_string()]).unwrap_or_default(),
        }
    }

    /// Applies an update, following spec.md §4.D's monotonicity and
    /// interval-smoothing rules. Returns `Stale` (no-op) if `ts` is not
    /// strictly newer than the current `last_update`.
    fn touch(&mut self, ts: SdbTime, interval_hint: SdbTime, backend: Option<&str>) -> WriteOutcome {
        if ts <= self.last_update {
            return WriteOutcome::Stale;
        }
        let delta = ts - self.last_update;
        if interval_hint != 0 {
            self.interval = interval_hint;
        } else if self.interval == 0 {
            self.interval = delta;
        } else {
            self.interval = (self.interval * 9 + delta) / 10;
        }
        self.last_update = ts;
        self.merge_backend(backend);
        WriteOutcome::Refreshed
    }

    fn merge_backend(&mut self, backend: Option<&str>) {
        if let Some(b) = backend {
            if !self.backends.iter().any(|existing| existing == b) {
                self.backends.push(b.to_string());
            }
        }
    }

    fn get_field(&self, name: &str, field: Field) -> Result<DataValue> {
        match field {
            Field::LastUpdate => Ok(DataValue::DateTime(self.last_update)),
            Field::Interval => Ok(DataValue::DateTime(self.interval)),
            Field::Age => Ok(DataValue::DateTime(time::now().saturating_sub(self.last_update))),
            Field::Backend => Ok(DataValue::Array(ArrayValue::String(self.backends.clone()))),
            Field::Name => Ok(DataValue::String(name.to_string())),
            Field::Value => Err(Error::InvalidField {
                object_type: "object",
                field: "value",
            }),
        }
    }
}

/// A host: the top-level store object, with services/metrics/attributes as
/// ordered child indexes.
pub struct Host {
    pub meta: ObjectMeta,
    pub services: AvlTree<NodeRef<Service>>,
    pub metrics: AvlTree<NodeRef<Metric>>,
    pub attributes: AvlTree<NodeRef<Attribute>>,
}

impl Host {
    fn new(ts: SdbTime, backend: Option<&str>) -> Self {
        Self {
            meta: ObjectMeta::new(ts, backend),
            services: AvlTree::new(),
            metrics: AvlTree::new(),
            attributes: AvlTree::new(),
        }
    }
}

pub struct Service {
    pub meta: ObjectMeta,
    pub attributes: AvlTree<NodeRef<Attribute>>,
}

impl Service {
    fn new(ts: SdbTime, backend: Option<&str>) -> Self {
        Self {
            meta: ObjectMeta::new(ts, backend),
            attributes: AvlTree::new(),
        }
    }
}

/// A descriptor for a metric's backing time-series store (spec.md §3:
/// "optional reference to a backing metric store descriptor (type+id
/// strings)"). The backing store itself is out of scope (spec.md §1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricStoreDescriptor {
    pub store_type: String,
    pub id: String,
}

pub struct Metric {
    pub meta: ObjectMeta,
    pub attributes: AvlTree<NodeRef<Attribute>>,
    pub store_desc: Option<MetricStoreDescriptor>,
}

impl Metric {
    fn new(ts: SdbTime, backend: Option<&str>, store_desc: Option<MetricStoreDescriptor>) -> Self {
        Self {
            meta: ObjectMeta::new(ts, backend),
            attributes: AvlTree::new(),
            store_desc,
        }
    }
}

pub struct Attribute {
    pub meta: ObjectMeta,
    pub value: DataValue,
}

impl Attribute {
    fn new(value: DataValue, ts: SdbTime, backend: Option<&str>) -> Self {
        Self {
            meta: ObjectMeta::new(ts, backend),
            value,
        }
    }
}

/// A type-erased reference to any store object, used by the matcher and
/// expression engine (spec.md §4.E) to evaluate fields/attributes without
/// needing to know the concrete object type up front.
#[derive(Clone)]
pub enum ObjectRef {
    Host(NodeRef<Host>),
    Service(NodeRef<Service>),
    Metric(NodeRef<Metric>),
    Attribute(NodeRef<Attribute>),
}

impl ObjectRef {
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Host(_) => ObjectType::Host,
            Self::Service(_) => ObjectType::Service,
            Self::Metric(_) => ObjectType::Metric,
            Self::Attribute(_) => ObjectType::Attribute,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Host(h) => h.name(),
            Self::Service(s) => s.name(),
            Self::Metric(m) => m.name(),
            Self::Attribute(a) => a.name(),
        }
    }

    /// Projects one of the object's queryable fields (spec.md §4.D).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] for combinations that don't apply,
    /// e.g. `Value` on anything but an `Attribute`.
    pub fn get_field(&self, field: Field) -> Result<DataValue> {
        if field == Field::Value {
            return match self {
                Self::Attribute(a) => Ok(a.read().value.clone()),
                other => Err(Error::InvalidField {
                    object_type: other.object_type().name(),
                    field: "value",
                }),
            };
        }

        match self {
            Self::Host(h) => h.read().meta.get_field(self.name(), field),
            Self::Service(s) => s.read().meta.get_field(self.name(), field),
            Self::Metric(m) => m.read().meta.get_field(self.name(), field),
            Self::Attribute(a) => a.read().meta.get_field(self.name(), field),
        }
    }

    /// Looks up a named attribute child of this object (spec.md §4.E
    /// `AttrRef`). `Attribute` objects have no attributes of their own.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<NodeRef<Attribute>> {
        match self {
            Self::Host(h) => h.read().attributes.lookup(name).cloned(),
            Self::Service(s) => s.read().attributes.lookup(name).cloned(),
            Self::Metric(m) => m.read().attributes.lookup(name).cloned(),
            Self::Attribute(_) => None,
        }
    }
}

pub(crate) fn create_host(name: String, ts: SdbTime, backend: Option<&str>) -> NodeRef<Host> {
    NodeRef::new(name, Host::new(ts, backend))
}

pub(crate) fn create_service(name: String, ts: SdbTime, backend: Option<&str>) -> NodeRef<Service> {
    NodeRef::new(name, Service::new(ts, backend))
}

pub(crate) fn create_metric(
    name: String,
    ts: SdbTime,
    backend: Option<&str>,
    store_desc: Option<MetricStoreDescriptor>,
) -> NodeRef<Metric> {
    NodeRef::new(name, Metric::new(ts, backend, store_desc))
}

pub(crate) fn create_attribute(
    name: String,
    value: DataValue,
    ts: SdbTime,
    backend: Option<&str>,
) -> NodeRef<Attribute> {
    NodeRef::new(name, Attribute::new(value, ts, backend))
}

pub(crate) fn touch(meta: &mut ObjectMeta, ts: SdbTime, interval_hint: SdbTime, backend: Option<&str>) -> WriteOutcome {
    meta.touch(ts, interval_hint, backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_seeds_interval_on_first_refresh() {
        let mut meta = ObjectMeta::new(1, None);
        assert_eq!(meta.touch(2, 0, None), WriteOutcome::Refreshed);
        assert_eq!(meta.interval, 1);
        assert_eq!(meta.last_update, 2);
    }

    #[test]
    fn touch_smooths_subsequent_intervals() {
        let mut meta = ObjectMeta::new(0, None);
        meta.touch(10, 0, None); // interval = 10
        meta.touch(20, 0, None); // delta = 10, interval = (10*9+10)/10 = 10
        assert_eq!(meta.interval, 10);
    }

    #[test]
    fn touch_rejects_stale_update() {
        let mut meta = ObjectMeta::new(5, None);
        assert_eq!(meta.touch(5, 0, None), WriteOutcome::Stale);
        assert_eq!(meta.touch(4, 0, None), WriteOutcome::Stale);
        assert_eq!(meta.last_update, 5);
    }

    #[test]
    fn touch_merges_backends_without_duplicates() {
        let mut meta = ObjectMeta::new(1, Some("plugin-a"));
        meta.touch(2, 0, Some("plugin-a"));
        meta.touch(3, 0, Some("plugin-b"));
        assert_eq!(meta.backends, vec!["plugin-a", "plugin-b"]);
    }

    #[test]
    fn interval_hint_overrides_smoothing() {
        let mut meta = ObjectMeta::new(0, None);
        meta.touch(10, 0, None);
        meta.touch(20, 42, None);
        assert_eq!(meta.interval, 42);
    }
}
