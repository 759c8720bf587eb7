// SPDX-License-Identifier: MIT

//! In-process graph runtime
//!
//! Runs in supersteps: every node triggered by the previous step runs
//! concurrently on its own copy of the state, the resulting updates are
//! merged through the reducers, then edges and routing conditions decide
//! the next step.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::runtime::{GraphBuilder, GraphNode, OutcomeMap, END, START};
use crate::adk::error::{CompileError, WorkflowError};
use crate::weft::workflow::node::RoutingCondition;
use crate::weft::workflow::state::WorkflowState;

/// Superstep limit used when none is configured
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

struct Branch {
    condition: Arc<dyn RoutingCondition>,
    routes: OutcomeMap,
}

/// Graph under construction
pub struct StateGraph {
    nodes: Vec<(String, Arc<dyn GraphNode>)>,
    index: HashMap<String, usize>,
    edges: Vec<(String, String)>,
    branches: HashMap<String, Branch>,
    recursion_limit: usize,
}

impl StateGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            branches: HashMap::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Set the maximum number of supersteps one invocation may take
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Node ids in registration order
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Plain edges in insertion order
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.edges.iter().any(|(s, t)| s == source && t == target)
    }

    /// Outcome map of the conditional edge leaving `source`, if any
    pub fn routes(&self, source: &str) -> Option<&OutcomeMap> {
        self.branches.get(source).map(|branch| &branch.routes)
    }

    fn check_endpoint(&self, id: &str, virtual_id: &str) -> Result<(), CompileError> {
        if id == virtual_id || self.index.contains_key(id) {
            Ok(())
        } else {
            Err(CompileError::UnregisteredNode(id.to_string()))
        }
    }
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder for StateGraph {
    type Compiled = CompiledGraph;

    fn add_node(&mut self, id: &str, node: Arc<dyn GraphNode>) -> Result<(), CompileError> {
        if id == START || id == END || self.index.contains_key(id) {
            return Err(CompileError::DuplicateNode(id.to_string()));
        }
        self.index.insert(id.to_string(), self.nodes.len());
        self.nodes.push((id.to_string(), node));
        Ok(())
    }

    fn has_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    fn add_edge(&mut self, source: &str, target: &str) -> Result<(), CompileError> {
        self.check_endpoint(source, START)?;
        self.check_endpoint(target, END)?;
        if !self.has_edge(source, target) {
            self.edges.push((source.to_string(), target.to_string()));
        }
        Ok(())
    }

    fn add_conditional_edges(
        &mut self,
        source: &str,
        condition: Arc<dyn RoutingCondition>,
        routes: OutcomeMap,
    ) -> Result<(), CompileError> {
        self.check_endpoint(source, START)?;
        for (_, targets) in &routes {
            for target in targets {
                self.check_endpoint(target, END)?;
            }
        }
        self.branches
            .insert(source.to_string(), Branch { condition, routes });
        Ok(())
    }

    fn compile(self) -> Result<CompiledGraph, CompileError> {
        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        for (source, target) in &self.edges {
            successors
                .entry(source.clone())
                .or_default()
                .push(target.clone());
        }

        if successors.get(START).map_or(true, Vec::is_empty) {
            return Err(CompileError::EmptySpec);
        }

        log::info!(
            "Compiled graph with {} nodes, {} edges, {} conditional edges",
            self.nodes.len(),
            self.edges.len(),
            self.branches.len()
        );

        Ok(CompiledGraph {
            graph: self,
            successors,
        })
    }
}

/// What happened during one invocation
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Node ids executed in each superstep
    pub steps: Vec<Vec<String>>,
    /// Final state
    pub state: WorkflowState,
}

/// Invocable graph
pub struct CompiledGraph {
    graph: StateGraph,
    successors: HashMap<String, Vec<String>>,
}

impl CompiledGraph {
    /// The graph this was compiled from, for inspection
    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    /// Run to completion and return the final state
    pub async fn invoke(&self, state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
        Ok(self.invoke_with_report(state).await?.state)
    }

    /// Run to completion and return the final state with an execution trace
    pub async fn invoke_with_report(
        &self,
        mut state: WorkflowState,
    ) -> Result<RunReport, WorkflowError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut steps: Vec<Vec<String>> = Vec::new();

        log::info!("Starting run {}", run_id);

        let mut active = self.next_nodes(&[START.to_string()], &state)?;

        while !active.is_empty() {
            if steps.len() >= self.graph.recursion_limit {
                log::error!("Run {} exceeded {} supersteps", run_id, steps.len());
                return Err(WorkflowError::RecursionLimit(self.graph.recursion_limit));
            }

            log::info!(
                "Run {} superstep {}: executing {} nodes: {:?}",
                run_id,
                steps.len() + 1,
                active.len(),
                active
            );

            let runs = active.iter().map(|id| {
                let node = self.graph.nodes[self.graph.index[id]].1.clone();
                let snapshot = state.clone();
                async move { node.invoke(snapshot).await }
            });
            let results = join_all(runs).await;

            for (id, result) in active.iter().zip(results) {
                let update = result?;
                log::debug!("Node {} updated {:?}", id, update.iter().map(|(k, _)| k).collect::<Vec<_>>());
                state.apply(&update);
            }

            let next = self.next_nodes(&active, &state)?;
            steps.push(active);
            active = next;
        }

        log::info!("Run {} finished after {} supersteps", run_id, steps.len());

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            steps,
            state,
        })
    }

    /// Nodes triggered by the ones that just completed, first trigger first
    fn next_nodes(
        &self,
        completed: &[String],
        state: &WorkflowState,
    ) -> Result<Vec<String>, WorkflowError> {
        let mut next: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut push = |target: &String| {
            if target != END && seen.insert(target.clone()) {
                next.push(target.clone());
            }
        };

        for id in completed {
            for target in self.successors.get(id).into_iter().flatten() {
                push(target);
            }

            if let Some(branch) = self.graph.branches.get(id) {
                let outcome = branch.condition.route(state).map_err(|source| {
                    WorkflowError::RoutingFailed {
                        node: id.clone(),
                        source,
                    }
                })?;
                log::debug!("Node {} routed to outcome '{}'", id, outcome);

                if outcome == END {
                    continue;
                }
                let targets = branch
                    .routes
                    .iter()
                    .find(|(label, _)| *label == outcome)
                    .map(|(_, targets)| targets)
                    .ok_or_else(|| WorkflowError::UnknownOutcome {
                        node: id.clone(),
                        outcome: outcome.clone(),
                    })?;
                for target in targets {
                    push(target);
                }
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::BoxError;
    use crate::weft::workflow::state::StateUpdate;
    use async_trait::async_trait;
    use serde_json::json;

    /// Appends its own id to the `trail` field
    struct TrailNode(&'static str);

    #[async_trait]
    impl GraphNode for TrailNode {
        async fn invoke(&self, state: WorkflowState) -> Result<StateUpdate, WorkflowError> {
            let mut trail = state
                .get("trail")
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            trail.push(json!(self.0));
            Ok(StateUpdate::new().set("trail", json!(trail)))
        }
    }

    struct FailingNode;

    #[async_trait]
    impl GraphNode for FailingNode {
        async fn invoke(&self, _state: WorkflowState) -> Result<StateUpdate, WorkflowError> {
            Err(WorkflowError::NodeFailed {
                node: "broken".to_string(),
                source: "boom".into(),
            })
        }
    }

    fn trail(state: &WorkflowState) -> Vec<String> {
        state
            .get("trail")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn linear(ids: &[&'static str]) -> StateGraph {
        let mut graph = StateGraph::new();
        for id in ids {
            graph.add_node(id, Arc::new(TrailNode(id))).unwrap();
        }
        graph.add_edge(START, ids[0]).unwrap();
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1]).unwrap();
        }
        graph.add_edge(ids[ids.len() - 1], END).unwrap();
        graph
    }

    #[tokio::test]
    async fn test_linear_run() {
        let compiled = linear(&["a", "b", "c"]).compile().unwrap();
        let report = compiled
            .invoke_with_report(WorkflowState::empty())
            .await
            .unwrap();

        assert_eq!(trail(&report.state), vec!["a", "b", "c"]);
        assert_eq!(report.steps.len(), 3);
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn test_duplicate_edge_is_idempotent() {
        let mut graph = linear(&["a", "b"]);
        graph.add_edge("a", "b").unwrap();
        assert_eq!(graph.edges().len(), 3);
    }

    #[test]
    fn test_edge_to_unregistered_node_fails() {
        let mut graph = linear(&["a"]);
        assert_eq!(
            graph.add_edge("a", "ghost"),
            Err(CompileError::UnregisteredNode("ghost".to_string()))
        );
        assert_eq!(
            graph.add_edge(END, "a"),
            Err(CompileError::UnregisteredNode(END.to_string()))
        );
    }

    #[test]
    fn test_duplicate_node_fails() {
        let mut graph = linear(&["a"]);
        assert_eq!(
            graph.add_node("a", Arc::new(TrailNode("a"))).err(),
            Some(CompileError::DuplicateNode("a".to_string()))
        );
    }

    #[test]
    fn test_compile_without_entry_fails() {
        let mut graph = StateGraph::new();
        graph.add_node("a", Arc::new(TrailNode("a"))).unwrap();
        assert_eq!(graph.compile().err(), Some(CompileError::EmptySpec));
    }

    #[tokio::test]
    async fn test_fan_out_runs_in_one_superstep() {
        let mut graph = StateGraph::new();
        for id in ["a", "b", "c", "d"] {
            graph.add_node(id, Arc::new(TrailNode(id))).unwrap();
        }
        graph.add_edge(START, "a").unwrap();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("a", "c").unwrap();
        graph.add_edge("b", "d").unwrap();
        graph.add_edge("c", "d").unwrap();
        graph.add_edge("d", END).unwrap();

        let report = graph
            .compile()
            .unwrap()
            .invoke_with_report(WorkflowState::empty())
            .await
            .unwrap();

        assert_eq!(
            report.steps,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_conditional_routing() {
        let mut graph = linear(&["a"]);
        graph.add_node("b", Arc::new(TrailNode("b"))).unwrap();
        graph.add_node("c", Arc::new(TrailNode("c"))).unwrap();
        graph.edges.retain(|(s, _)| s != "a");
        graph
            .add_conditional_edges(
                "a",
                Arc::new(|_: &WorkflowState| "go_c".to_string()),
                vec![
                    ("go_b".to_string(), vec!["b".to_string()]),
                    ("go_c".to_string(), vec!["c".to_string()]),
                ],
            )
            .unwrap();

        let state = graph
            .compile()
            .unwrap()
            .invoke(WorkflowState::empty())
            .await
            .unwrap();
        assert_eq!(trail(&state), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_end_outcome_stops_run() {
        let mut graph = linear(&["a"]);
        graph.add_node("b", Arc::new(TrailNode("b"))).unwrap();
        graph
            .add_conditional_edges(
                "a",
                Arc::new(|_: &WorkflowState| END.to_string()),
                vec![("next".to_string(), vec!["b".to_string()])],
            )
            .unwrap();

        let state = graph
            .compile()
            .unwrap()
            .invoke(WorkflowState::empty())
            .await
            .unwrap();
        assert_eq!(trail(&state), vec!["a"]);
    }

    #[tokio::test]
    async fn test_unknown_outcome_is_fatal() {
        let mut graph = linear(&["a"]);
        graph
            .add_conditional_edges(
                "a",
                Arc::new(|_: &WorkflowState| "nowhere".to_string()),
                vec![],
            )
            .unwrap();

        let err = graph
            .compile()
            .unwrap()
            .invoke(WorkflowState::empty())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::UnknownOutcome { ref node, ref outcome } if node == "a" && outcome == "nowhere"
        ));
    }

    #[tokio::test]
    async fn test_routing_error_names_node() {
        struct Broken;
        impl RoutingCondition for Broken {
            fn route(&self, _state: &WorkflowState) -> Result<String, BoxError> {
                Err("no intent".into())
            }
        }

        let mut graph = linear(&["a"]);
        graph
            .add_conditional_edges("a", Arc::new(Broken), vec![])
            .unwrap();

        let err = graph
            .compile()
            .unwrap()
            .invoke(WorkflowState::empty())
            .await
            .unwrap_err();
        assert_eq!(err.node(), Some("a"));
    }

    #[tokio::test]
    async fn test_loop_hits_recursion_limit() {
        let mut graph = linear(&["a"]).with_recursion_limit(5);
        graph
            .add_conditional_edges(
                "a",
                Arc::new(|_: &WorkflowState| "again".to_string()),
                vec![("again".to_string(), vec!["a".to_string()])],
            )
            .unwrap();

        let err = graph
            .compile()
            .unwrap()
            .invoke(WorkflowState::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::RecursionLimit(5)));
    }

    #[tokio::test]
    async fn test_node_failure_aborts_run() {
        let mut graph = StateGraph::new();
        graph.add_node("broken", Arc::new(FailingNode)).unwrap();
        graph.add_edge(START, "broken").unwrap();

        let err = graph
            .compile()
            .unwrap()
            .invoke(WorkflowState::empty())
            .await
            .unwrap_err();
        assert_eq!(err.node(), Some("broken"));
    }
}
