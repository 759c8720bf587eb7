// SPDX-License-Identifier: MIT

//! Evaluates `when` expressions against workflow state

use super::ast::{CompareOp, Expression, Literal};
use crate::weft::workflow::state::WorkflowState;
use serde_json::Value;

/// Evaluate an expression against state. Missing fields read as null.
pub fn evaluate(expr: &Expression, state: &WorkflowState) -> bool {
    match expr {
        Expression::True => true,
        Expression::False => false,
        Expression::Truthy(path) => state.get_path(path).is_some_and(truthy),
        Expression::Compare { path, op, value } => compare(state.get_path(path), *op, value),
        Expression::And(left, right) => evaluate(left, state) && evaluate(right, state),
        Expression::Or(left, right) => evaluate(left, state) || evaluate(right, state),
        Expression::Not(inner) => !evaluate(inner, state),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn compare(left: Option<&Value>, op: CompareOp, right: &Literal) -> bool {
    match op {
        CompareOp::Eq => equals(left, right),
        CompareOp::NotEq => !equals(left, right),
        CompareOp::Gt => numbers(left, right, |a, b| a > b),
        CompareOp::Gte => numbers(left, right, |a, b| a >= b),
        CompareOp::Lt => numbers(left, right, |a, b| a < b),
        CompareOp::Lte => numbers(left, right, |a, b| a <= b),
        CompareOp::Contains => contains(left, right),
    }
}

fn equals(left: Option<&Value>, right: &Literal) -> bool {
    match left {
        None | Some(Value::Null) => *right == Literal::Null,
        Some(value) => matches(value, right),
    }
}

fn matches(value: &Value, literal: &Literal) -> bool {
    match (value, literal) {
        (Value::String(s), Literal::String(expected)) => s == expected,
        (Value::Number(n), Literal::Number(expected)) => {
            n.as_f64().is_some_and(|f| (f - expected).abs() < f64::EPSILON)
        }
        (Value::Bool(b), Literal::Boolean(expected)) => b == expected,
        (Value::Null, Literal::Null) => true,
        _ => false,
    }
}

fn numbers(left: Option<&Value>, right: &Literal, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (left.and_then(Value::as_f64), right) {
        (Some(a), Literal::Number(b)) => cmp(a, *b),
        _ => false,
    }
}

fn contains(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        (Some(Value::String(s)), Literal::String(needle)) => s.contains(needle.as_str()),
        (Some(Value::Array(items)), literal) => items.iter().any(|item| matches(item, literal)),
        (Some(Value::Object(map)), Literal::String(key)) => map.contains_key(key),
        _ => false,
    }
}
