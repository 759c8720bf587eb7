// SPDX-License-Identifier: MIT

//! Declarative routing conditions
//!
//! A workflow file can describe a routing condition as ordered `when`
//! cases instead of code:
//!
//! ```yaml
//! routes:
//!   triage:
//!     cases:
//!       - when: "intent == 'search' and confidence > 0.5"
//!         outcome: search
//!       - when: "not done"
//!         outcome: retry
//!     default: END
//! ```

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::parse;

use crate::adk::error::{BoxError, CompileError};
use crate::weft::workflow::node::{RoutingCondition, END};
use crate::weft::workflow::state::WorkflowState;
use thiserror::Error;

/// Why a `when` expression failed to parse
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConditionError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { found: String, expected: String },

    #[error("unexpected end of expression")]
    UnexpectedEnd,
}

/// `END` spelled the way workflow files write it
fn outcome_label(outcome: &str) -> String {
    if outcome == "END" {
        END.to_string()
    } else {
        outcome.to_string()
    }
}

/// Routing condition built from ordered `when` cases; the first matching
/// case picks the outcome
#[derive(Debug, Clone)]
pub struct ExprCondition {
    cases: Vec<(Expression, String)>,
    default: String,
}

impl ExprCondition {
    /// Compile `(when, outcome)` pairs. `default` is taken when no case
    /// matches; `None` ends the workflow.
    pub fn new<'a>(
        cases: impl IntoIterator<Item = (&'a str, &'a str)>,
        default: Option<&str>,
    ) -> Result<Self, CompileError> {
        let cases = cases
            .into_iter()
            .map(|(when, outcome)| {
                parse(when)
                    .map(|expr| (expr, outcome_label(outcome)))
                    .map_err(|e| CompileError::InvalidExpression {
                        expr: when.to_string(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            cases,
            default: default.map(outcome_label).unwrap_or_else(|| END.to_string()),
        })
    }

    /// Outcome labels this condition can produce, [`END`] excluded
    pub fn outcomes(&self) -> Vec<&str> {
        let mut outcomes: Vec<&str> = Vec::new();
        for label in self
            .cases
            .iter()
            .map(|(_, outcome)| outcome.as_str())
            .chain(std::iter::once(self.default.as_str()))
        {
            if label != END && !outcomes.contains(&label) {
                outcomes.push(label);
            }
        }
        outcomes
    }
}

impl RoutingCondition for ExprCondition {
    fn route(&self, state: &WorkflowState) -> Result<String, BoxError> {
        let outcome = self
            .cases
            .iter()
            .find(|(expr, _)| evaluate(expr, state))
            .map(|(_, outcome)| outcome)
            .unwrap_or(&self.default);
        Ok(outcome.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn triage() -> ExprCondition {
        ExprCondition::new(
            [
                ("intent == 'search' and confidence > 0.5", "search"),
                ("not done", "retry"),
            ],
            Some("END"),
        )
        .unwrap()
    }

    #[test]
    fn test_first_matching_case_wins() {
        let condition = triage();
        let mut state = WorkflowState::empty();
        state.set("intent", json!("search"));
        state.set("confidence", json!(0.9));
        assert_eq!(condition.route(&state).unwrap(), "search");

        state.set("confidence", json!(0.1));
        assert_eq!(condition.route(&state).unwrap(), "retry");

        state.set("done", json!(true));
        assert_eq!(condition.route(&state).unwrap(), END);
    }

    #[test]
    fn test_missing_default_ends_workflow() {
        let condition = ExprCondition::new([("false", "never")], None).unwrap();
        assert_eq!(condition.route(&WorkflowState::empty()).unwrap(), END);
    }

    #[test]
    fn test_outcomes_skip_end() {
        assert_eq!(triage().outcomes(), vec!["search", "retry"]);
    }

    #[test]
    fn test_invalid_case_is_compile_error() {
        let err = ExprCondition::new([("score >", "high")], None).unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidExpression {
                expr: "score >".to_string(),
                message: "unexpected end of expression".to_string(),
            }
        );
    }
}
