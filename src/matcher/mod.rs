// Copyright (c) 2026-present, the sysdb authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The matcher / expression engine (spec.md §4.E): boxed recursive enums
//! evaluated bottom-up against store objects.
//!
//! Grounded on `original_source/src/include/core/store.h` (`sdb_store_expr_t`/
//! `sdb_store_cond_t`/`sdb_store_matcher_t`). Trees are built once by the
//! query parser/analyzer and never mutated afterward (spec.md §9): every
//! node here is a plain, `Clone`-able, immutable enum.

use crate::store::object::{Field, ObjectRef, ObjectType};
use crate::store::Matches;
use crate::values::{DataValue, RegexValue};
use std::sync::Arc;

/// A literal used by name/attribute-value matchers: either an exact,
/// case-insensitive string or a compiled regular expression.
#[derive(Clone, Debug)]
pub enum Literal {
    Exact(String),
    Regex(Arc<RegexValue>),
}

impl Literal {
    fn matches_text(&self, text: &str) -> bool {
        match self {
            Self::Exact(s) => s.eq_ignore_ascii_case(text),
            Self::Regex(re) => re.is_match(text),
        }
    }
}

/// Arithmetic/concatenation operators for [`Expression::BinOp`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

/// A first-order arithmetic/string expression tree (spec.md §4.E).
#[derive(Clone, Debug)]
pub enum Expression {
    Const(DataValue),
    FieldRef(Field),
    AttrRef(String),
    BinOp(BinOp, Box<Expression>, Box<Expression>),
}

impl Expression {
    #[must_use]
    pub fn constant(value: DataValue) -> Self {
        Self::Const(value)
    }

    /// Evaluates the expression against `context`. Bottom-up; a type
    /// mismatch anywhere yields `Null` rather than an error (spec.md §7:
    /// "Type error in expr/matcher: evaluates to Null / false — silent").
    #[must_use]
    pub fn eval(&self, context: &ObjectRef) -> DataValue {
        match self {
            Self::Const(v) => v.clone(),
            Self::FieldRef(field) => context.get_field(*field).unwrap_or(DataValue::Null),
            Self::AttrRef(name) => context
                .get_attr(name)
                .map(|a| a.read().value.clone())
                .unwrap_or(DataValue::Null),
            Self::BinOp(op, left, right) => eval_binop(*op, left.eval(context), right.eval(context)),
        }
    }
}

fn eval_binop(op: BinOp, left: DataValue, right: DataValue) -> DataValue {
    use DataValue::{Binary, DateTime, Decimal, Integer, String as Str};

    if op == BinOp::Concat {
        return match (left, right) {
            (Str(a), Str(b)) => Str(a + &b),
            (Binary(a), Binary(b)) => Binary([a, b].concat()),
            _ => DataValue::Null,
        };
    }

    match (left, right) {
        (Integer(a), Integer(b)) => match apply_int(op, a, b) {
            Some(v) => Integer(v),
            None => DataValue::Null,
        },
        (Decimal(a), Decimal(b)) => apply_float(op, a, b).map_or(DataValue::Null, Decimal),
        (DateTime(a), DateTime(b)) => apply_int(op, a as i64, b as i64)
            .map_or(DataValue::Null, |v| DateTime(v as u64)),
        _ => DataValue::Null,
    }
}

fn apply_int(op: BinOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => (b != 0).then(|| a / b),
        BinOp::Mod => (b != 0).then(|| a % b),
        BinOp::Concat => unreachable!("handled by eval_binop"),
    }
}

fn apply_float(op: BinOp, a: f64, b: f64) -> Option<f64> {
    match op {
        BinOp::Add => Some(a + b),
        BinOp::Sub => Some(a - b),
        BinOp::Mul => Some(a * b),
        BinOp::Div => (b != 0.0).then(|| a / b),
        BinOp::Mod => (b != 0.0).then(|| a % b),
        BinOp::Concat => unreachable!("handled by eval_binop"),
    }
}

/// A comparison operand: either a named attribute's value or a queryable
/// field (spec.md §4.E).
#[derive(Clone, Debug)]
pub enum Condition {
    Attr(String, Expression),
    Field(Field, Expression),
}

impl Condition {
    fn eval(&self, context: &ObjectRef) -> (DataValue, DataValue) {
        match self {
            Self::Attr(name, expr) => {
                let lhs = context
                    .get_attr(name)
                    .map(|a| a.read().value.clone())
                    .unwrap_or(DataValue::Null);
                (lhs, expr.eval(context))
            }
            Self::Field(field, expr) => {
                let lhs = context.get_field(*field).unwrap_or(DataValue::Null);
                (lhs, expr.eval(context))
            }
        }
    }
}

/// A boolean predicate over a store object (spec.md §4.E).
#[derive(Clone, Debug)]
pub enum Matcher {
    NameMatch(ObjectType, Literal),
    AttrValueMatch(String, Literal),
    IsNull(String),
    Lt(Condition),
    Le(Condition),
    Eq(Condition),
    Ge(Condition),
    Gt(Condition),
    And(Box<Matcher>, Box<Matcher>),
    Or(Box<Matcher>, Box<Matcher>),
    Not(Box<Matcher>),
    AnyService(Box<Matcher>),
    AnyMetric(Box<Matcher>),
    AnyAttribute(Box<Matcher>),
}

impl Matches for Matcher {
    fn matches(&self, obj: &ObjectRef, filter: Option<&dyn Matches>) -> bool {
        match self {
            Self::NameMatch(object_type, literal) => {
                obj.object_type() == *object_type && literal.matches_text(obj.name())
            }
            Self::AttrValueMatch(name, literal) => obj
                .get_attr(name)
                .is_some_and(|a| literal.matches_text(&a.read().value.format(crate::values::Quoting::Bare))),
            Self::IsNull(name) => obj.get_attr(name).is_none(),
            Self::Lt(cond) => compare(cond, obj, std::cmp::Ordering::is_lt),
            Self::Le(cond) => compare(cond, obj, std::cmp::Ordering::is_le),
            Self::Eq(cond) => compare(cond, obj, std::cmp::Ordering::is_eq),
            Self::Ge(cond) => compare(cond, obj, std::cmp::Ordering::is_ge),
            Self::Gt(cond) => compare(cond, obj, std::cmp::Ordering::is_gt),
            Self::And(l, r) => l.matches(obj, filter) && r.matches(obj, filter),
            Self::Or(l, r) => l.matches(obj, filter) || r.matches(obj, filter),
            Self::Not(m) => !m.matches(obj, filter),
            Self::AnyService(inner) => any_child(obj, ObjectType::Service, inner, filter),
            Self::AnyMetric(inner) => any_child(obj, ObjectType::Metric, inner, filter),
            Self::AnyAttribute(inner) => any_child(obj, ObjectType::Attribute, inner, filter),
        }
    }
}

fn compare(cond: &Condition, obj: &ObjectRef, accept: fn(std::cmp::Ordering) -> bool) -> bool {
    let (lhs, rhs) = cond.eval(obj);
    accept(lhs.cmp(&rhs))
}

fn any_child(obj: &ObjectRef, child_type: ObjectType, inner: &Matcher, filter: Option<&dyn Matches>) -> bool {
    let host = match obj {
        ObjectRef::Host(h) => h.clone(),
        _ => return false,
    };
    let h = host.read();
    let children: Vec<ObjectRef> = match child_type {
        ObjectType::Service => h.services.iter().cloned().map(ObjectRef::Service).collect(),
        ObjectType::Metric => h.metrics.iter().cloned().map(ObjectRef::Metric).collect(),
        ObjectType::Attribute => h.attributes.iter().cloned().map(ObjectRef::Attribute).collect(),
        ObjectType::Host => return false,
    };
    drop(h);
    children.iter().any(|child| {
        filter.is_none_or(|f| f.matches(child, None)) && inner.matches(child, filter)
    })
}

/// Comparison operators accepted by `parse_cmp`/`parse_field_cmp` (spec.md
/// §4.F `cmp`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Ge,
    Gt,
    Match,
    NotMatch,
}

/// An unsupported `parse_cmp`/`parse_field_cmp` combination (spec.md §8
/// scenario 4: `parse_cmp("host","attr","=","foo")` → null/unsupported).
#[derive(Debug)]
pub struct UnsupportedCmp(pub String);

impl std::fmt::Display for UnsupportedCmp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported comparison: {}", self.0)
    }
}
impl std::error::Error for UnsupportedCmp {}

fn literal_from_expr(expr: &Expression, regex: bool) -> Option<Literal> {
    let Expression::Const(DataValue::String(s)) = expr else {
        return None;
    };
    if regex {
        RegexValue::new(s).ok().map(|r| Literal::Regex(Arc::new(r)))
    } else {
        Some(Literal::Exact(s.clone()))
    }
}

/// Builds a matcher from the lexical tuple `obj_type.attr op expr` (spec.md
/// §4.E `parse_cmp`). Only `host.name` and `<type>.<attr>` value matches are
/// supported directly here; comparison operators fall back to a generic
/// `Condition`-based matcher.
///
/// # Errors
///
/// Returns [`UnsupportedCmp`] for combinations the original also rejects,
/// e.g. `host.attr = ...` (spec.md §8 scenario 4).
pub fn parse_cmp(obj_type: &str, attr: &str, op: CmpOp, expr: Expression) -> Result<Matcher, UnsupportedCmp> {
    let is_name = attr.eq_ignore_ascii_case("name");
    let is_regex_op = matches!(op, CmpOp::Match | CmpOp::NotMatch);

    if is_name && matches!(op, CmpOp::Eq | CmpOp::Match) {
        let object_type = parse_object_type(obj_type)
            .ok_or_else(|| UnsupportedCmp(format!("{obj_type}.{attr}")))?;
        let literal = literal_from_expr(&expr, is_regex_op)
            .ok_or_else(|| UnsupportedCmp(format!("{obj_type}.{attr} {op:?} <non-literal>")))?;
        return Ok(Matcher::NameMatch(object_type, literal));
    }

    if !is_name && matches!(op, CmpOp::Eq | CmpOp::Match) && obj_type.eq_ignore_ascii_case("host") {
        // spec.md §8 scenario 4: host.<non-name-attr> = ... is unsupported.
        return Err(UnsupportedCmp(format!("{obj_type}.{attr}")));
    }

    match op {
        CmpOp::Eq | CmpOp::Match if !obj_type.eq_ignore_ascii_case("host") => {
            let literal = literal_from_expr(&expr, is_regex_op)
                .ok_or_else(|| UnsupportedCmp(format!("{obj_type}.{attr} {op:?} <non-literal>")))?;
            Ok(Matcher::AttrValueMatch(attr.to_string(), literal))
        }
        CmpOp::Ne => Ok(Matcher::Not(Box::new(parse_cmp(obj_type, attr, CmpOp::Eq, expr)?))),
        CmpOp::Lt => Ok(Matcher::Lt(Condition::Attr(attr.to_string(), expr))),
        CmpOp::Le => Ok(Matcher::Le(Condition::Attr(attr.to_string(), expr))),
        CmpOp::Ge => Ok(Matcher::Ge(Condition::Attr(attr.to_string(), expr))),
        CmpOp::Gt => Ok(Matcher::Gt(Condition::Attr(attr.to_string(), expr))),
        _ => Err(UnsupportedCmp(format!("{obj_type}.{attr} {op:?} <expr>"))),
    }
}

/// Builds a matcher from a queryable-field comparison `field op expr`
/// (spec.md §4.E `parse_field_cmp`, `sdb_store_matcher_parse_field_cmp` in
/// `original_source`).
///
/// # Errors
///
/// Returns [`UnsupportedCmp`] if `field` is not a known queryable field.
pub fn parse_field_cmp(field: &str, op: CmpOp, expr: Expression) -> Result<Matcher, UnsupportedCmp> {
    let field = parse_field(field).ok_or_else(|| UnsupportedCmp(field.to_string()))?;
    Ok(match op {
        CmpOp::Eq => Matcher::Eq(Condition::Field(field, expr)),
        CmpOp::Ne => Matcher::Not(Box::new(Matcher::Eq(Condition::Field(field, expr)))),
        CmpOp::Lt => Matcher::Lt(Condition::Field(field, expr)),
        CmpOp::Le => Matcher::Le(Condition::Field(field, expr)),
        CmpOp::Ge => Matcher::Ge(Condition::Field(field, expr)),
        CmpOp::Gt => Matcher::Gt(Condition::Field(field, expr)),
        CmpOp::Match | CmpOp::NotMatch => return Err(UnsupportedCmp("field regex match".to_string())),
    })
}

fn parse_object_type(s: &str) -> Option<ObjectType> {
    match s.to_ascii_lowercase().as_str() {
        "host" | "hosts" => Some(ObjectType::Host),
        "service" | "services" => Some(ObjectType::Service),
        "metric" | "metrics" => Some(ObjectType::Metric),
        "attribute" | "attributes" => Some(ObjectType::Attribute),
        _ => None,
    }
}

fn parse_field(s: &str) -> Option<Field> {
    match s.to_ascii_lowercase().as_str() {
        "last-update" | "last_update" => Some(Field::LastUpdate),
        "age" => Some(Field::Age),
        "interval" => Some(Field::Interval),
        "backend" => Some(Field::Backend),
        "name" => Some(Field::Name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::object::ObjectType;
    use crate::store::Store;

    #[test]
    fn parse_cmp_name_match() {
        let m = parse_cmp("host", "name", CmpOp::Eq, Expression::constant(DataValue::String("foo".into()))).unwrap();
        assert!(matches!(m, Matcher::NameMatch(ObjectType::Host, Literal::Exact(ref s)) if s == "foo"));
    }

    #[test]
    fn parse_cmp_host_attr_is_unsupported() {
        let err = parse_cmp("host", "attr", CmpOp::Eq, Expression::constant(DataValue::String("foo".into())))
            .unwrap_err();
        assert_eq!(err.0, "host.attr");
    }

    #[test]
    fn matcher_algebra_holds() {
        let store = Store::new();
        store.store_host("a", 1, 0, None).unwrap();
        let obj = ObjectRef::Host(store.get_host("a").unwrap());

        let x = Matcher::NameMatch(ObjectType::Host, Literal::Exact("a".into()));
        let y = Matcher::NameMatch(ObjectType::Host, Literal::Exact("b".into()));

        assert_eq!(
            Matcher::And(Box::new(x.clone()), Box::new(y.clone())).matches(&obj, None),
            Matcher::And(Box::new(y.clone()), Box::new(x.clone())).matches(&obj, None),
        );
        assert_eq!(
            Matcher::Or(Box::new(x.clone()), Box::new(y.clone())).matches(&obj, None),
            Matcher::Or(Box::new(y.clone()), Box::new(x.clone())).matches(&obj, None),
        );
        assert_eq!(
            Matcher::Not(Box::new(Matcher::Not(Box::new(x.clone())))).matches(&obj, None),
            x.matches(&obj, None),
        );
        assert!(!Matcher::And(Box::new(x.clone()), Box::new(Matcher::Not(Box::new(x.clone())))).matches(&obj, None));
        assert!(Matcher::Or(Box::new(x.clone()), Box::new(Matcher::Not(Box::new(x.clone())))).matches(&obj, None));
    }

    #[test]
    fn any_service_matches_when_any_child_matches() {
        let store = Store::new();
        store.store_host("a", 1, 0, None).unwrap();
        store.store_service("a", "s1", 1, 0, None).unwrap();
        let obj = ObjectRef::Host(store.get_host("a").unwrap());

        let inner = Matcher::NameMatch(ObjectType::Service, Literal::Exact("s1".into()));
        assert!(Matcher::AnyService(Box::new(inner)).matches(&obj, None));

        let inner_miss = Matcher::NameMatch(ObjectType::Service, Literal::Exact("nope".into()));
        assert!(!Matcher::AnyService(Box::new(inner_miss)).matches(&obj, None));
    }

    #[test]
    fn isnull_matches_absent_attribute() {
        let store = Store::new();
        store.store_host("a", 1, 0, None).unwrap();
        let obj = ObjectRef::Host(store.get_host("a").unwrap());
        assert!(Matcher::IsNull("missing".into()).matches(&obj, None));

        store
            .store_attribute("a", "present", DataValue::Integer(1), 1, 0, None)
            .unwrap();
        let obj = ObjectRef::Host(store.get_host("a").unwrap());
        assert!(!Matcher::IsNull("present".into()).matches(&obj, None));
    }
}
