//! Integration coverage over the public `store`/`query`/`json` surface.
//!
//! `sysdb::server::Connection` is only reachable from within the crate
//! (its constructors are `pub(super)`), so these tests drive the same
//! store → matcher → JSON pipeline `execute`/`dump` use internally, but
//! through the crate's public API only.

use sysdb::query::{parse_matcher, parse_query, Stmt};
use sysdb::store::{Matches, ScanControl, Store, StoreObjectRef as ObjectRef, StoreObjectType as ObjectType};
use sysdb::json::{Flags, JsonFormatter};
use sysdb::values::DataValue;

fn populate() -> Store {
    let store = Store::new();
    store.store_host("a", 1, 0, Some("test")).unwrap();
    store.store_host("b", 1, 0, Some("test")).unwrap();
    store.store_host("c", 1, 0, Some("test")).unwrap();
    store
        .store_attribute("a", "k1", DataValue::String("v1".to_string()), 1, 0, Some("test"))
        .unwrap();
    store.store_service("a", "s1", 1, 0, Some("test")).unwrap();
    store.store_service("a", "s2", 1, 0, Some("test")).unwrap();
    store.store_service("b", "s1", 1, 0, Some("test")).unwrap();
    store.store_service("b", "s3", 1, 0, Some("test")).unwrap();
    store
}

struct AlwaysTrue;

impl Matches for AlwaysTrue {
    fn matches(&self, _obj: &ObjectRef, _filter: Option<&dyn Matches>) -> bool {
        true
    }
}

#[test]
fn json_full_dump_nests_attributes_and_services() {
    let store = populate();

    let mut formatter = JsonFormatter::new(Flags { want_array: true });
    store.scan(ObjectType::Host, &AlwaysTrue, None, |obj| {
        formatter.emit_full(obj, None).unwrap();
        ScanControl::Continue
    });
    let text = String::from_utf8(formatter.finish().into_vec()).unwrap();

    assert!(text.starts_with('['), "{text}");
    assert!(text.ends_with(']'), "{text}");
    assert!(text.contains("\"name\": \"a\""), "{text}");
    assert!(text.contains("\"k1\""), "{text}");
    assert!(text.contains("\"v1\""), "{text}");
    assert!(text.contains("\"s1\""), "{text}");
    assert!(text.contains("\"s2\""), "{text}");
    assert!(text.contains("\"s3\""), "{text}");

    let host_count = text.matches("\"services\"").count();
    assert_eq!(host_count, 2, "only a and b have services: {text}");
}

#[test]
fn lookup_matches_host_with_named_service() {
    let store = populate();

    let stmts = parse_query("LOOKUP hosts MATCHING host.name =~ '^a$' AND ANY service service.name = 's1';").unwrap();
    let Some(Stmt::Lookup { object_type, matching, filter }) = stmts.into_iter().next() else {
        panic!("expected a single LOOKUP statement");
    };
    assert_eq!(object_type, ObjectType::Host);
    let matcher = matching.expect("lookup carries a MATCHING clause");
    assert!(filter.is_none());

    let mut found = Vec::new();
    store.scan(ObjectType::Host, &matcher, None, |obj| {
        found.push(obj.name().to_string());
        ScanControl::Continue
    });

    assert_eq!(found, vec!["a".to_string()]);
}

#[test]
fn lookup_excludes_host_without_matching_service() {
    let store = populate();

    let matcher = parse_matcher("ANY service service.name = 's2'").unwrap();

    let mut found = Vec::new();
    store.scan(ObjectType::Host, &matcher, None, |obj| {
        found.push(obj.name().to_string());
        ScanControl::Continue
    });

    assert_eq!(found, vec!["a".to_string()]);
}

#[test]
fn list_hosts_statement_parses_and_matches_all() {
    let store = populate();
    let stmts = parse_query("LIST hosts;").unwrap();
    assert!(matches!(stmts.as_slice(), [Stmt::ListHosts]));

    let mut names = Vec::new();
    store.scan(ObjectType::Host, &AlwaysTrue, None, |obj| {
        names.push(obj.name().to_string());
        ScanControl::Continue
    });
    names.sort();
    assert_eq!(names, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
}
