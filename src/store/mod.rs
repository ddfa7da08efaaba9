// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The hierarchical object store (spec.md §4.D): hosts → services/metrics/
//! attributes, with monotonic `last_update`, interval smoothing, backend
//! merging and a single reader/writer lock over the whole tree.
//!
//! Grounded on `original_source/src/include/core/store.h`. Per spec.md §5
//! ("a single reader/writer lock protecting the whole tree; finer-grained
//! locking is an explicit non-goal"), every writer — even one mutating a
//! service two levels below a host — takes the *outer* lock for its whole
//! duration. The inner `RwLock` wrapping each object (see [`object::NodeRef`])
//! exists only so a shared `Arc` handle can still be mutated while the outer
//! lock is held, and so it can keep a subtree alive after `store_clear` or a
//! parent removal drops the tree's own reference (the refcount-safety
//! property in spec.md §8) — it is never used as an independent source of
//! concurrency.

pub mod object;

use crate::avltree::AvlTree;
use crate::error::{Error, Result, WriteOutcome};
use crate::time::SdbTime;
use crate::values::DataValue;
use object::{Attribute, Field, Host, Metric, MetricStoreDescriptor, NodeRef, ObjectRef, ObjectType, Service};
use std::sync::RwLock;

/// Implemented by the matcher/expression engine's `Matcher` type. Kept as a
/// trait here (rather than the store depending on `crate::matcher`) so the
/// dependency runs the other way: the matcher engine depends on the store,
/// not vice versa.
pub trait Matches {
    /// Evaluates `self` against `obj`. `filter`, if present, is threaded
    /// through to every sub-evaluation a combinator performs (spec.md §4.E:
    /// "a filter, if supplied, is conjoined at every sub-evaluation").
    fn matches(&self, obj: &ObjectRef, filter: Option<&dyn Matches>) -> bool;
}

/// Whether a [`Store::scan`] callback wants to keep going.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// The top-level, process-wide object store.
///
/// spec.md §9 re-architects the original's implicit global store as "an
/// explicit store handle passed into every writer/reader"; `sysdbd` holds
/// one behind an `Arc` and clones it into every worker thread.
#[derive(Default)]
pub struct Store {
    hosts: RwLock<AvlTree<NodeRef<Host>>>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the entire store. Outstanding `NodeRef` handles held by
    /// readers keep their subtrees alive (spec.md §8 refcount-safety).
    pub fn store_clear(&self) {
        self.hosts.write().expect("store lock is poisoned").clear();
    }

    #[must_use]
    pub fn has_host(&self, name: &str) -> bool {
        self.hosts.read().expect("store lock is poisoned").contains(name)
    }

    #[must_use]
    pub fn get_host(&self, name: &str) -> Option<NodeRef<Host>> {
        self.hosts
            .read()
            .expect("store lock is poisoned")
            .lookup(name)
            .cloned()
    }

    /// Adds or refreshes a host.
    ///
    /// # Errors
    ///
    /// Never fails (hosts have no parent); kept fallible for uniformity
    /// with the other writers.
    pub fn store_host(
        &self,
        name: &str,
        ts: SdbTime,
        interval_hint: SdbTime,
        backend: Option<&str>,
    ) -> Result<WriteOutcome> {
        let mut hosts = self.hosts.write().expect("store lock is poisoned");
        if let Some(existing) = hosts.lookup(name) {
            let mut h = existing.write();
            Ok(object::touch(&mut h.meta, ts, interval_hint, backend))
        } else {
            hosts
                .insert(object::create_host(name.to_string(), ts, backend))
                .expect("absence just confirmed by lookup under the same write lock");
            Ok(WriteOutcome::Created)
        }
    }

    /// Adds or refreshes a service of `host`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParent`] if `host` does not exist.
    pub fn store_service(
        &self,
        host: &str,
        name: &str,
        ts: SdbTime,
        interval_hint: SdbTime,
        backend: Option<&str>,
    ) -> Result<WriteOutcome> {
        let hosts = self.hosts.write().expect("store lock is poisoned");
        let host_ref = hosts
            .lookup(host)
            .ok_or_else(|| Error::MissingParent(host.to_string()))?;
        let mut h = host_ref.write();
        if let Some(existing) = h.services.lookup(name) {
            let mut s = existing.write();
            Ok(object::touch(&mut s.meta, ts, interval_hint, backend))
        } else {
            h.services
                .insert(object::create_service(name.to_string(), ts, backend))
                .expect("absence just confirmed under the same write lock");
            Ok(WriteOutcome::Created)
        }
    }

    /// Adds or refreshes a metric of `host`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParent`] if `host` does not exist.
    pub fn store_metric(
        &self,
        host: &str,
        name: &str,
        store_desc: Option<MetricStoreDescriptor>,
        ts: SdbTime,
        interval_hint: SdbTime,
        backend: Option<&str>,
    ) -> Result<WriteOutcome> {
        let hosts = self.hosts.write().expect("store lock is poisoned");
        let host_ref = hosts
            .lookup(host)
            .ok_or_else(|| Error::MissingParent(host.to_string()))?;
        let mut h = host_ref.write();
        if let Some(existing) = h.metrics.lookup(name) {
            let mut m = existing.write();
            if store_desc.is_some() {
                m.store_desc = store_desc;
            }
            Ok(object::touch(&mut m.meta, ts, interval_hint, backend))
        } else {
            h.metrics
                .insert(object::create_metric(name.to_string(), ts, backend, store_desc))
                .expect("absence just confirmed under the same write lock");
            Ok(WriteOutcome::Created)
        }
    }

    /// Adds or refreshes a host attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParent`] if `host` does not exist.
    pub fn store_attribute(
        &self,
        host: &str,
        key: &str,
        value: DataValue,
        ts: SdbTime,
        interval_hint: SdbTime,
        backend: Option<&str>,
    ) -> Result<WriteOutcome> {
        let hosts = self.hosts.write().expect("store lock is poisoned");
        let host_ref = hosts
            .lookup(host)
            .ok_or_else(|| Error::MissingParent(host.to_string()))?;
        let mut h = host_ref.write();
        Self::store_attr_in(&mut h.attributes, key, value, ts, interval_hint, backend)
    }

    /// Adds or refreshes a service attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParent`] if `host` or `service` does not exist.
    pub fn store_service_attr(
        &self,
        host: &str,
        service: &str,
        key: &str,
        value: DataValue,
        ts: SdbTime,
        interval_hint: SdbTime,
        backend: Option<&str>,
    ) -> Result<WriteOutcome> {
        let hosts = self.hosts.write().expect("store lock is poisoned");
        let host_ref = hosts
            .lookup(host)
            .ok_or_else(|| Error::MissingParent(host.to_string()))?;
        let h = host_ref.write();
        let service_ref = h
            .services
            .lookup(service)
            .ok_or_else(|| Error::MissingParent(format!("{host}/{service}")))?;
        let mut s = service_ref.write();
        Self::store_attr_in(&mut s.attributes, key, value, ts, interval_hint, backend)
    }

    /// Adds or refreshes a metric attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParent`] if `host` or `metric` does not exist.
    pub fn store_metric_attr(
        &self,
        host: &str,
        metric: &str,
        key: &str,
        value: DataValue,
        ts: SdbTime,
        interval_hint: SdbTime,
        backend: Option<&str>,
    ) -> Result<WriteOutcome> {
        let hosts = self.hosts.write().expect("store lock is poisoned");
        let host_ref = hosts
            .lookup(host)
            .ok_or_else(|| Error::MissingParent(host.to_string()))?;
        let h = host_ref.write();
        let metric_ref = h
            .metrics
            .lookup(metric)
            .ok_or_else(|| Error::MissingParent(format!("{host}/{metric}")))?;
        let mut m = metric_ref.write();
        Self::store_attr_in(&mut m.attributes, key, value, ts, interval_hint, backend)
    }

    fn store_attr_in(
        attrs: &mut AvlTree<NodeRef<Attribute>>,
        key: &str,
        value: DataValue,
        ts: SdbTime,
        interval_hint: SdbTime,
        backend: Option<&str>,
    ) -> Result<WriteOutcome> {
        if let Some(existing) = attrs.lookup(key) {
            let mut a = existing.write();
            a.value = value;
            Ok(object::touch(&mut a.meta, ts, interval_hint, backend))
        } else {
            attrs
                .insert(object::create_attribute(key.to_string(), value, ts, backend))
                .expect("absence just confirmed under the same write lock");
            Ok(WriteOutcome::Created)
        }
    }

    /// Looks up a named child of `parent` by type (spec.md §4.D `get_child`).
    #[must_use]
    pub fn get_child(&self, parent: &NodeRef<Host>, object_type: ObjectType, name: &str) -> Option<ObjectRef> {
        let h = parent.read();
        match object_type {
            ObjectType::Host => None,
            ObjectType::Service => h.services.lookup(name).cloned().map(ObjectRef::Service),
            ObjectType::Metric => h.metrics.lookup(name).cloned().map(ObjectRef::Metric),
            ObjectType::Attribute => h.attributes.lookup(name).cloned().map(ObjectRef::Attribute),
        }
    }

    /// Projects a queryable field off an [`ObjectRef`] (spec.md §4.D
    /// `get_field`, thin pass-through to [`ObjectRef::get_field`]).
    ///
    /// # Errors
    ///
    /// See [`ObjectRef::get_field`].
    pub fn get_field(obj: &ObjectRef, field: Field) -> Result<DataValue> {
        obj.get_field(field)
    }

    /// Walks all hosts in name order, invoking `visit` for every object of
    /// `object_type` that matches `matcher` and (if present) `filter`
    /// (spec.md §4.D `scan`). A `Host` scan visits hosts directly; any other
    /// type descends into each host's children of that type.
    pub fn scan(
        &self,
        object_type: ObjectType,
        matcher: &dyn Matches,
        filter: Option<&dyn Matches>,
        mut visit: impl FnMut(&ObjectRef) -> ScanControl,
    ) {
        let hosts = self.hosts.read().expect("store lock is poisoned");
        for host in hosts.iter() {
            let accept = |candidate: &ObjectRef| -> bool {
                matcher.matches(candidate, filter) && filter.is_none_or(|f| f.matches(candidate, None))
            };

            if object_type == ObjectType::Host {
                let candidate = ObjectRef::Host(host.clone());
                if accept(&candidate) && visit(&candidate) == ScanControl::Stop {
                    return;
                }
                continue;
            }

            let h = host.read();
            let children: Vec<ObjectRef> = match object_type {
                ObjectType::Service => h.services.iter().cloned().map(ObjectRef::Service).collect(),
                ObjectType::Metric => h.metrics.iter().cloned().map(ObjectRef::Metric).collect(),
                ObjectType::Attribute => h.attributes.iter().cloned().map(ObjectRef::Attribute).collect(),
                ObjectType::Host => unreachable!("handled above"),
            };
            drop(h);

            for candidate in &children {
                if accept(candidate) && visit(candidate) == ScanControl::Stop {
                    return;
                }
            }
        }
    }
}

pub use object::{Field as StoreField, MetricStoreDescriptor as StoreMetricDescriptor, ObjectRef as StoreObjectRef, ObjectType as StoreObjectType};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_host_upsert_scenario() {
        let store = Store::new();
        assert_eq!(store.store_host("a", 1, 0, None).unwrap(), WriteOutcome::Created);
        assert_eq!(store.store_host("a", 2, 0, None).unwrap(), WriteOutcome::Refreshed);
        assert_eq!(store.get_host("a").unwrap().read().meta.last_update, 2);
        assert_eq!(store.get_host("a").unwrap().read().meta.interval, 1);
        assert_eq!(store.store_host("a", 2, 0, None).unwrap(), WriteOutcome::Stale);
        assert!(store.has_host("A"));
    }

    #[test]
    fn store_service_on_missing_host_is_missing_parent() {
        let store = Store::new();
        let err = store.store_service("k", "s", 1, 0, None).unwrap_err();
        assert!(matches!(err, Error::MissingParent(ref h) if h == "k"));
        assert!(!store.has_host("k"));
    }

    #[test]
    fn refcount_outlives_clear() {
        let store = Store::new();
        store.store_host("a", 1, 0, None).unwrap();
        let handle = store.get_host("a").unwrap();
        assert_eq!(handle.strong_count(), 2);
        store.store_clear();
        assert!(!store.has_host("a"));
        assert_eq!(handle.read().meta.last_update, 1);
    }

    struct AlwaysTrue;
    impl Matches for AlwaysTrue {
        fn matches(&self, _obj: &ObjectRef, _filter: Option<&dyn Matches>) -> bool {
            true
        }
    }

    #[test]
    fn scan_visits_hosts_in_name_order() {
        let store = Store::new();
        for name in ["charlie", "alpha", "bravo"] {
            store.store_host(name, 1, 0, None).unwrap();
        }
        let mut seen = Vec::new();
        store.scan(ObjectType::Host, &AlwaysTrue, None, |obj| {
            seen.push(obj.name().to_string());
            ScanControl::Continue
        });
        assert_eq!(seen, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn scan_descends_into_services() {
        let store = Store::new();
        store.store_host("a", 1, 0, None).unwrap();
        store.store_service("a", "s1", 1, 0, None).unwrap();
        store.store_service("a", "s2", 1, 0, None).unwrap();
        let mut seen = Vec::new();
        store.scan(ObjectType::Service, &AlwaysTrue, None, |obj| {
            seen.push(obj.name().to_string());
            ScanControl::Continue
        });
        assert_eq!(seen, vec!["s1", "s2"]);
    }
}
