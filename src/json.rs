// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The incremental JSON formatter (spec.md §4.G): a pushdown state machine
//! that emits a nested JSON document as store objects are visited in
//! host → attributes → metrics(+attrs) → services(+attrs) order.
//!
//! Grounded almost line-for-line on `original_source/src/core/store_json.c`
//! (`json_emit`, `sdb_store_json_emit`, `sdb_store_json_emit_full`,
//! `sdb_store_json_finish`), with the `int context[8]` array replaced by a
//! `Vec<ObjectType>` (the original's fixed depth-8 cap comes from its own
//! static array; SysDB's stack is unbounded but never exceeds depth 3 in
//! practice since the object model has no type below `Attribute`).

use crate::bytebuf::ByteBuf;
use crate::error::{Error, Result};
use crate::store::object::{Field, ObjectRef, ObjectType};
use crate::store::Matches;
use crate::time;
use crate::values::Quoting;

/// Wraps the emitted document in a top-level JSON array (spec.md §4.G
/// `WANT_ARRAY`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Flags {
    pub want_array: bool,
}

/// Incremental JSON serializer over a [`ByteBuf`].
pub struct JsonFormatter {
    buf: ByteBuf,
    context: Vec<ObjectType>,
    want_array: bool,
}

impl JsonFormatter {
    #[must_use]
    pub fn new(flags: Flags) -> Self {
        Self {
            buf: ByteBuf::new(),
            context: Vec::new(),
            want_array: flags.want_array,
        }
    }

    /// Emits one object, transitioning the context stack as needed (spec.md
    /// §4.G's three cases: same-type sibling, deeper nesting, or rewinding
    /// to a shallower level).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `obj`'s type cannot appear at the
    /// current nesting level (a host-type object nested under anything, or
    /// a type that isn't a child of the current context).
    pub fn emit(&mut self, obj: &ObjectRef) -> Result<()> {
        let obj_type = obj.object_type();

        let Some(&top) = self.context.last() else {
            if self.want_array {
                self.buf.append_str("[");
            }
            self.context.push(ObjectType::Host);
            return self.json_emit(obj);
        };

        if obj_type == top {
            self.buf.append_str("},");
        } else if top == ObjectType::Host || obj_type == ObjectType::Attribute {
            self.buf.append(format_args!(", \"{}s\": [", obj_type.name()));
            self.context.push(obj_type);
        } else if self.context.len() >= 2 {
            while self.context.len() > 1 {
                if *self.context.last().expect("len >= 1 checked by loop condition") == obj_type {
                    break;
                }
                self.buf.append_str("}]");
                self.context.pop();
            }
            return self.emit(obj);
        } else {
            return Err(Error::Protocol(format!(
                "unexpected object of type {} during JSON serialization",
                obj_type.name()
            )));
        }

        self.json_emit(obj)?;
        *self.context.last_mut().expect("just pushed or matched above") = obj_type;
        Ok(())
    }

    /// Emits `obj` and recursively its attributes, then (for hosts) its
    /// metrics and their attributes, then its services and their
    /// attributes. Children rejected by `filter` are skipped entirely
    /// (spec.md §4.G: "a filter may be applied during traversal").
    ///
    /// # Errors
    ///
    /// See [`Self::emit`].
    pub fn emit_full(&mut self, obj: &ObjectRef, filter: Option<&dyn Matches>) -> Result<()> {
        self.emit(obj)?;

        let children: Vec<Vec<ObjectRef>> = match obj {
            ObjectRef::Host(h) => {
                let h = h.read();
                vec![
                    h.attributes.iter().cloned().map(ObjectRef::Attribute).collect(),
                    h.metrics.iter().cloned().map(ObjectRef::Metric).collect(),
                    h.services.iter().cloned().map(ObjectRef::Service).collect(),
                ]
            }
            ObjectRef::Service(s) => {
                vec![s.read().attributes.iter().cloned().map(ObjectRef::Attribute).collect()]
            }
            ObjectRef::Metric(m) => {
                vec![m.read().attributes.iter().cloned().map(ObjectRef::Attribute).collect()]
            }
            ObjectRef::Attribute(_) => return Ok(()),
        };

        for group in children {
            for child in &group {
                if filter.is_some_and(|f| !f.matches(child, None)) {
                    continue;
                }
                self.emit_full(child, filter)?;
            }
        }
        Ok(())
    }

    /// Closes every open level, and the outer `[ ... ]` if `want_array` was
    /// set, and returns the finished buffer.
    #[must_use]
    pub fn finish(mut self) -> ByteBuf {
        if self.context.is_empty() {
            if self.want_array {
                self.buf.append_str("[]");
            }
            return self.buf;
        }

        while self.context.len() > 1 {
            self.buf.append_str("}]");
            self.context.pop();
        }
        self.buf.append_str("}");
        if self.want_array {
            self.buf.append_str("]");
        }
        self.buf
    }

    fn json_emit(&mut self, obj: &ObjectRef) -> Result<()> {
        self.buf.append(format_args!("{{\"name\": {}, ", escape_json_string(obj.name())));

        if let ObjectRef::Attribute(a) = obj {
            let value = a.read().value.clone();
            self.buf.append(format_args!("\"value\": {}, ", value.format(Quoting::Double)));
        }

        let last_update = obj.get_field(Field::LastUpdate)?;
        let interval = obj.get_field(Field::Interval)?;
        let backends = obj.get_field(Field::Backend)?;

        let crate::values::DataValue::DateTime(ts) = last_update else {
            return Err(Error::Protocol("last_update field did not project to a DateTime".to_string()));
        };
        let crate::values::DataValue::DateTime(interval_ns) = interval else {
            return Err(Error::Protocol("interval field did not project to a DateTime".to_string()));
        };

        self.buf.append(format_args!(
            "\"last_update\": \"{}\", \"update_interval\": \"{}\", \"backends\": [",
            time::format_datetime(ts),
            time::format_interval(interval_ns),
        ));

        if let crate::values::DataValue::Array(crate::values::ArrayValue::String(names)) = backends {
            for (i, name) in names.iter().enumerate() {
                if i > 0 {
                    self.buf.append_str(",");
                }
                self.buf.append(format_args!("{}", escape_json_string(name)));
            }
        }
        self.buf.append_str("]");
        Ok(())
    }
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::values::DataValue;

    fn host(store: &Store, name: &str) -> ObjectRef {
        store.store_host(name, 1, 0, None).unwrap();
        ObjectRef::Host(store.get_host(name).unwrap())
    }

    #[test]
    fn full_dump_matches_scenario_3() {
        let store = Store::new();
        let a = host(&store, "a");
        store.store_attribute("a", "k1", DataValue::String("v1".into()), 1, 0, None).unwrap();
        store.store_service("a", "s1", 1, 0, None).unwrap();
        store.store_service("a", "s2", 1, 0, None).unwrap();
        host(&store, "b");
        store.store_service("b", "s1", 1, 0, None).unwrap();
        store.store_service("b", "s3", 1, 0, None).unwrap();
        host(&store, "c");

        let mut f = JsonFormatter::new(Flags { want_array: true });
        f.emit_full(&a, None).unwrap();
        let b = ObjectRef::Host(store.get_host("b").unwrap());
        f.emit_full(&b, None).unwrap();
        let c = ObjectRef::Host(store.get_host("c").unwrap());
        f.emit_full(&c, None).unwrap();
        let out = f.finish();
        let text = out.as_str_lossy().into_owned();

        assert!(text.starts_with('['));
        assert!(text.ends_with(']'));
        assert!(text.contains("\"name\": \"a\""));
        assert!(text.contains("\"attributes\": [{\"name\": \"k1\", \"value\": \"v1\""));
        assert!(text.contains("\"services\": [{\"name\": \"s1\""));
        assert!(text.contains("\"name\": \"s2\""));

        assert!(is_balanced(&text));
    }

    #[test]
    fn empty_store_emits_empty_array() {
        let f = JsonFormatter::new(Flags { want_array: true });
        assert_eq!(f.finish().as_str_lossy(), "[]");
    }

    /// Cheap well-formedness smoke test (spec.md §8 "parses as JSON") without
    /// pulling in a JSON parser just for tests: brace/bracket nesting must
    /// balance, respecting string literals and their escapes.
    fn is_balanced(text: &str) -> bool {
        let mut stack = Vec::new();
        let mut in_string = false;
        let mut escaped = false;
        for c in text.chars() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' | '[' => stack.push(c),
                '}' => {
                    if stack.pop() != Some('{') {
                        return false;
                    }
                }
                ']' => {
                    if stack.pop() != Some('[') {
                        return false;
                    }
                }
                _ => {}
            }
        }
        stack.is_empty() && !in_string
    }
}
