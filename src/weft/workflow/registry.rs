// SPDX-License-Identifier: MIT

//! Function registry - resolves step and routing names to business logic
//!
//! Populate it at setup time, either with explicit `register_*` calls or by
//! loading [`NodeModule`]s, then share it read-only with the builder.

use crate::weft::workflow::dedup::strip_suffix;
use crate::weft::workflow::node::{NoopStep, RoutingCondition, StepFn};
use crate::weft::workflow::normalizer::SYNC_STEP;
use crate::weft::workflow::spec::Layer;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

static NOOP_STEP: Lazy<Arc<dyn StepFn>> = Lazy::new(|| Arc::new(NoopStep));

/// Tag carried by a module export, deciding how it is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Ordinary step, registered when a spec names it
    GraphNode,
    /// Step added to every graph regardless of the spec
    DefaultNode,
    /// Function from state to an outcome label
    RoutingCondition,
}

enum Exported {
    Node(Arc<dyn StepFn>),
    DefaultNode(Arc<dyn StepFn>),
    Condition(Arc<dyn RoutingCondition>),
}

/// One named item a module offers to the registry
pub struct Export {
    name: String,
    item: Exported,
}

impl Export {
    pub fn node(name: impl Into<String>, step: Arc<dyn StepFn>) -> Self {
        Self {
            name: name.into(),
            item: Exported::Node(step),
        }
    }

    pub fn default_node(name: impl Into<String>, step: Arc<dyn StepFn>) -> Self {
        Self {
            name: name.into(),
            item: Exported::DefaultNode(step),
        }
    }

    pub fn condition(name: impl Into<String>, condition: Arc<dyn RoutingCondition>) -> Self {
        Self {
            name: name.into(),
            item: Exported::Condition(condition),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn marker(&self) -> Marker {
        match self.item {
            Exported::Node(_) => Marker::GraphNode,
            Exported::DefaultNode(_) => Marker::DefaultNode,
            Exported::Condition(_) => Marker::RoutingCondition,
        }
    }
}

/// A collaborator module exposing tagged steps and conditions
pub trait NodeModule: Send + Sync {
    /// Module name; loading the same name twice is a no-op
    fn name(&self) -> &str;

    /// Everything the module offers
    fn exports(&self) -> Vec<Export>;
}

/// Typed handle to a registered step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepHandle(String);

impl StepHandle {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&StepHandle> for Layer {
    fn from(handle: &StepHandle) -> Self {
        Layer::Step(handle.0.clone())
    }
}

/// Typed handle to a registered routing condition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionHandle(String);

impl ConditionHandle {
    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Clone)]
struct RegisteredStep {
    step: Arc<dyn StepFn>,
    is_default: bool,
}

/// Name → function tables for steps and routing conditions
#[derive(Clone)]
pub struct FunctionRegistry {
    steps: HashMap<String, RegisteredStep>,
    defaults: Vec<String>,
    conditions: HashMap<String, Arc<dyn RoutingCondition>>,
    loaded_modules: HashSet<String>,
}

impl FunctionRegistry {
    /// Create a registry holding only the built-in synchronizer step
    pub fn new() -> Self {
        let mut registry = Self {
            steps: HashMap::new(),
            defaults: Vec::new(),
            conditions: HashMap::new(),
            loaded_modules: HashSet::new(),
        };
        registry.register_default(SYNC_STEP, NOOP_STEP.clone());
        registry
    }

    /// Register an ordinary step
    pub fn register_node(&mut self, name: impl Into<String>, step: Arc<dyn StepFn>) -> StepHandle {
        self.insert_step(name.into(), step, false)
    }

    /// Register a step that every compiled graph carries
    pub fn register_default(
        &mut self,
        name: impl Into<String>,
        step: Arc<dyn StepFn>,
    ) -> StepHandle {
        self.insert_step(name.into(), step, true)
    }

    /// Register a routing condition
    pub fn register_condition(
        &mut self,
        name: impl Into<String>,
        condition: Arc<dyn RoutingCondition>,
    ) -> ConditionHandle {
        let name = name.into();
        if self.conditions.insert(name.clone(), condition).is_some() {
            log::debug!("Replaced routing condition: {}", name);
        }
        ConditionHandle(name)
    }

    fn insert_step(&mut self, name: String, step: Arc<dyn StepFn>, is_default: bool) -> StepHandle {
        self.defaults.retain(|d| *d != name);
        if is_default {
            self.defaults.push(name.clone());
        }
        if self
            .steps
            .insert(name.clone(), RegisteredStep { step, is_default })
            .is_some()
        {
            log::debug!("Replaced step: {}", name);
        }
        StepHandle(name)
    }

    /// Register every export of `module` tagged with `marker`, returning the
    /// registered names
    pub fn scan(&mut self, marker: Marker, module: &dyn NodeModule) -> Vec<String> {
        let mut names = Vec::new();
        for export in module.exports() {
            if export.marker() != marker {
                continue;
            }
            match export.item {
                Exported::Node(step) => {
                    self.register_node(export.name.clone(), step);
                }
                Exported::DefaultNode(step) => {
                    self.register_default(export.name.clone(), step);
                }
                Exported::Condition(condition) => {
                    self.register_condition(export.name.clone(), condition);
                }
            }
            names.push(export.name);
        }
        names
    }

    /// Register everything a module exports. Loading a module twice is a no-op.
    pub fn load(&mut self, module: &dyn NodeModule) -> Vec<String> {
        if !self.loaded_modules.insert(module.name().to_string()) {
            log::debug!("Module already loaded: {}", module.name());
            return Vec::new();
        }

        let mut names = Vec::new();
        for marker in [Marker::DefaultNode, Marker::GraphNode, Marker::RoutingCondition] {
            names.extend(self.scan(marker, module));
        }
        log::info!("Loaded module '{}': {:?}", module.name(), names);
        names
    }

    /// Resolve a step name or a deduplicated id (`name_2`) to its function
    pub fn step(&self, id: &str) -> Option<Arc<dyn StepFn>> {
        self.steps
            .get(id)
            .or_else(|| self.steps.get(strip_suffix(id)))
            .map(|registered| registered.step.clone())
    }

    pub fn contains_step(&self, id: &str) -> bool {
        self.step(id).is_some()
    }

    /// Every registered step name, defaults included
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    pub fn is_default(&self, name: &str) -> bool {
        self.steps.get(name).is_some_and(|s| s.is_default)
    }

    /// Default steps in registration order
    pub fn defaults(&self) -> Vec<(&str, Arc<dyn StepFn>)> {
        self.defaults
            .iter()
            .filter_map(|name| {
                self.steps
                    .get(name)
                    .map(|registered| (name.as_str(), registered.step.clone()))
            })
            .collect()
    }

    pub fn condition(&self, name: &str) -> Option<Arc<dyn RoutingCondition>> {
        self.conditions.get(name).cloned()
    }

    pub fn contains_condition(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    /// Number of registered steps (defaults included)
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
