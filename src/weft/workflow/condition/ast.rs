// SPDX-License-Identifier: MIT

//! Syntax tree for `when` expressions

use std::fmt;

/// A parsed `when` expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `path op literal`
    Compare {
        path: String,
        op: CompareOp,
        value: Literal,
    },
    /// Bare field path, true when the value is truthy
    Truthy(String),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    True,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring or array membership
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Contains => "contains",
        };
        f.write_str(symbol)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => f.write_str("null"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Compare { path, op, value } => write!(f, "{} {} {}", path, op, value),
            Expression::Truthy(path) => f.write_str(path),
            Expression::And(l, r) => write!(f, "({} and {})", l, r),
            Expression::Or(l, r) => write!(f, "({} or {})", l, r),
            Expression::Not(inner) => write!(f, "not {}", inner),
            Expression::True => f.write_str("true"),
            Expression::False => f.write_str("false"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_makes_grouping_explicit() {
        let expr = Expression::Or(
            Box::new(Expression::Truthy("done".to_string())),
            Box::new(Expression::And(
                Box::new(Expression::Compare {
                    path: "intent".to_string(),
                    op: CompareOp::Eq,
                    value: Literal::String("search".to_string()),
                }),
                Box::new(Expression::Not(Box::new(Expression::True))),
            )),
        );
        assert_eq!(
            expr.to_string(),
            "(done or (intent == 'search' and not true))"
        );
    }
}
