// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Parse-tree node types produced by [`super::parser`].

use crate::matcher::Matcher;
use crate::store::object::ObjectType;
use crate::time::SdbTime;

/// A single statement of the `query` grammar (spec.md §4.F).
#[derive(Clone, Debug)]
pub enum Stmt {
    ListHosts,
    ListServices,
    ListMetrics,
    FetchHost(String),
    FetchService(String, String),
    FetchMetric(String, String),
    Lookup {
        object_type: ObjectType,
        matching: Option<Matcher>,
        filter: Option<Matcher>,
    },
    Timeseries {
        host: String,
        metric: String,
        start: Option<SdbTime>,
        end: Option<SdbTime>,
    },
}
