// SPDX-License-Identifier: MIT

//! Graph assembly - turns a normalized, deduplicated spec into runtime calls
//!
//! Wiring rules:
//! - `START` feeds every node of the first layer;
//! - a conditional layer routes to the next layer through one conditional
//!   edge, every other layer is joined to the next by the full cross product
//!   of plain edges;
//! - every node of the last layer feeds `END`, except a trailing conditional,
//!   whose `END` outcome already terminates the run.

use std::sync::Arc;

use crate::adk::error::CompileError;
use crate::weft::workflow::dedup::Deduplicated;
use crate::weft::workflow::diff::StateDiff;
use crate::weft::workflow::graph::{GraphBuilder, OutcomeMap, END, START};
use crate::weft::workflow::registry::FunctionRegistry;
use crate::weft::workflow::spec::{Layer, RouteTarget};

/// Register nodes and edges for `spec` on `builder` and compile it
pub fn assemble<B: GraphBuilder>(
    spec: &Deduplicated,
    registry: &FunctionRegistry,
    mut builder: B,
) -> Result<B::Compiled, CompileError> {
    let layers = spec.spec().layers();
    let (first, last) = match (layers.first(), layers.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(CompileError::EmptySpec),
    };

    for (name, step) in registry.defaults() {
        if !builder.has_node(name) {
            builder.add_node(name, Arc::new(StateDiff::new(name, step)))?;
        }
    }

    // A generated id always runs the step it was generated from. A plain id
    // may name a default node that is already on the graph.
    for id in spec.node_ids() {
        let generated = spec.aliases().contains_key(id);
        if builder.has_node(id) {
            if generated {
                return Err(CompileError::DuplicateNode(id.to_string()));
            }
            continue;
        }
        let name = spec.base_name(id);
        let step = if generated {
            registry.step(name)
        } else {
            registry.step(id)
        }
        .ok_or_else(|| CompileError::UnknownStep(name.to_string()))?;
        builder.add_node(id, Arc::new(StateDiff::new(id, step)))?;
    }

    for id in first.nodes() {
        builder.add_edge(START, id)?;
    }

    for pair in layers.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        if current.is_conditional() {
            add_routing(&mut builder, registry, current)?;
        } else {
            for source in current.nodes() {
                for target in next.nodes() {
                    builder.add_edge(source, target)?;
                }
            }
        }
    }

    if last.is_conditional() {
        add_routing(&mut builder, registry, last)?;
    } else {
        for id in last.nodes() {
            builder.add_edge(id, END)?;
        }
    }

    log::debug!("Assembled {} layers: {}", layers.len(), spec.spec());
    builder.compile()
}

fn add_routing<B: GraphBuilder>(
    builder: &mut B,
    registry: &FunctionRegistry,
    layer: &Layer,
) -> Result<(), CompileError> {
    let (step, condition, routes) = match layer {
        Layer::Conditional {
            step,
            condition,
            routes: Some(routes),
        } => (step, condition, routes),
        other => {
            return Err(CompileError::MalformedConditional(format!(
                "'{}' has no completed route map",
                other
            )))
        }
    };

    let route = registry
        .condition(condition)
        .ok_or_else(|| CompileError::UnknownCondition(condition.clone()))?;

    let outcomes: OutcomeMap = routes
        .iter()
        .map(|(outcome, target)| {
            let targets = match target {
                RouteTarget::End => vec![END.to_string()],
                other => other.steps().into_iter().map(str::to_string).collect(),
            };
            (outcome.clone(), targets)
        })
        .collect();

    builder.add_conditional_edges(step, route, outcomes)
}
