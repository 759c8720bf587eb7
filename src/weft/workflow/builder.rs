// SPDX-License-Identifier: MIT

//! Workflow builder - drives a spec through the compile pipeline
//!
//! ```text
//! resolve → normalize → deduplicate → assemble → compiled graph
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::adk::error::{CompileError, WeftError};
use crate::adk::model::GenerationConfig;
use crate::weft::steps::LlmStep;
use crate::weft::workflow::assembler::assemble;
use crate::weft::workflow::condition::ExprCondition;
use crate::weft::workflow::dedup::{deduplicate_reserving, Deduplicated};
use crate::weft::workflow::graph::{
    CompiledGraph, GraphBuilder, StateGraph, DEFAULT_RECURSION_LIMIT,
};
use crate::weft::workflow::loader::WorkflowLoader;
use crate::weft::workflow::normalizer::normalize;
use crate::weft::workflow::registry::FunctionRegistry;
use crate::weft::workflow::spec::{Layer, RouteTarget, Spec};
use crate::weft::workflow::types::WorkflowDefinition;

/// Compiles specs against a shared, fully populated registry
pub struct Builder {
    registry: Arc<FunctionRegistry>,
    recursion_limit: usize,
}

impl Builder {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Check that every name the spec uses is registered
    pub fn resolve(&self, spec: &Spec) -> Result<(), CompileError> {
        resolve(spec, &self.registry)
    }

    /// Resolve, normalize and deduplicate without touching a runtime.
    /// Generated ids never shadow a registered step name.
    pub fn prepare(&self, spec: &Spec) -> Result<Deduplicated, CompileError> {
        self.resolve(spec)?;
        Ok(deduplicate_reserving(
            &normalize(spec),
            self.registry.step_names(),
        ))
    }

    /// Compile a spec onto the in-process runtime
    pub fn compile(&self, spec: &Spec) -> Result<CompiledGraph, CompileError> {
        let graph = StateGraph::new().with_recursion_limit(self.recursion_limit);
        self.compile_with(spec, graph)
    }

    /// Compile a spec onto any runtime
    pub fn compile_with<B: GraphBuilder>(
        &self,
        spec: &Spec,
        builder: B,
    ) -> Result<B::Compiled, CompileError> {
        let prepared = self.prepare(spec)?;
        log::info!(
            "Compiling {} layers ({} after normalization)",
            spec.len(),
            prepared.spec().len()
        );
        assemble(&prepared, &self.registry, builder)
    }

    /// Build a workflow from a parsed definition. Its `routes:` and
    /// `prompts:` are registered on a copy of the shared registry.
    pub fn build_from_def(&self, def: &WorkflowDefinition) -> Result<CompiledGraph, CompileError> {
        let mut registry = (*self.registry).clone();
        let mut declared = HashMap::new();

        for (name, route) in &def.routes {
            let condition = Arc::new(ExprCondition::new(
                route
                    .cases
                    .iter()
                    .map(|case| (case.when.as_str(), case.outcome.as_str())),
                route.default.as_deref(),
            )?);
            registry.register_condition(name.clone(), condition.clone());
            declared.insert(name.as_str(), condition);
        }

        let config = GenerationConfig {
            temperature: def.model.temperature,
            max_output_tokens: def.model.max_output_tokens,
            top_p: None,
        };
        for (name, prompt) in &def.prompts {
            let mut step = LlmStep::new(prompt.template.clone(), prompt.output.clone())
                .with_config(config.clone());
            if let Some(system) = &prompt.system {
                step = step.with_system(system.clone());
            }
            registry.register_node(name.clone(), Arc::new(step));
        }

        log::info!("Building workflow '{}'", def.name);
        let limit = def.recursion_limit.unwrap_or(self.recursion_limit);
        let builder = Builder::new(Arc::new(registry)).with_recursion_limit(limit);
        let prepared = builder.prepare(&def.nodes)?;
        check_outcomes(&prepared, &declared)?;
        assemble(
            &prepared,
            &builder.registry,
            StateGraph::new().with_recursion_limit(limit),
        )
    }

    /// Load a YAML workflow file and build it
    pub fn build_from_file<P: AsRef<Path>>(&self, path: P) -> Result<CompiledGraph, WeftError> {
        let def = WorkflowLoader::new().load_workflow(path)?;
        Ok(self.build_from_def(&def)?)
    }
}

/// Every outcome a declarative route can return must be mapped by each
/// conditional layer that uses it
fn check_outcomes(
    prepared: &Deduplicated,
    declared: &HashMap<&str, Arc<ExprCondition>>,
) -> Result<(), CompileError> {
    for layer in prepared.spec().layers() {
        let Layer::Conditional {
            step,
            condition,
            routes: Some(routes),
        } = layer
        else {
            continue;
        };
        let Some(expr) = declared.get(condition.as_str()) else {
            continue;
        };
        if let Some(outcome) = expr
            .outcomes()
            .into_iter()
            .find(|outcome| !routes.contains_key(outcome))
        {
            log::error!(
                "Route '{}' on '{}' can return unmapped outcome '{}'",
                condition,
                step,
                outcome
            );
            return Err(CompileError::UnroutedOutcome {
                step: step.clone(),
                condition: condition.clone(),
                outcome: outcome.to_string(),
            });
        }
    }
    Ok(())
}

fn resolve(spec: &Spec, registry: &FunctionRegistry) -> Result<(), CompileError> {
    if spec.is_empty() {
        return Err(CompileError::EmptySpec);
    }

    for layer in spec.layers() {
        if let Layer::Conditional {
            step,
            condition,
            routes,
        } = layer
        {
            if step.is_empty() || condition.is_empty() {
                return Err(CompileError::MalformedConditional(layer.to_string()));
            }
            let empty_group = routes.iter().flat_map(|r| r.iter()).any(|(_, target)| {
                matches!(target, RouteTarget::Group(names) if names.is_empty())
            });
            if empty_group {
                return Err(CompileError::MalformedConditional(format!(
                    "'{}' routes an outcome to an empty group",
                    step
                )));
            }
        }
    }

    if let Some(name) = spec
        .step_names()
        .into_iter()
        .find(|name| !registry.contains_step(name))
    {
        log::error!("Step '{}' is not registered", name);
        return Err(CompileError::UnknownStep(name.to_string()));
    }

    if let Some(name) = spec
        .condition_names()
        .into_iter()
        .find(|name| !registry.contains_condition(name))
    {
        log::error!("Routing condition '{}' is not registered", name);
        return Err(CompileError::UnknownCondition(name.to_string()));
    }

    Ok(())
}
