// SPDX-License-Identifier: MIT

//! Layered workflow spec types
//!
//! A spec is an ordered list of layers. In YAML a layer is written as
//! - a string: one step (`transcribe`)
//! - a list of strings: a parallel group (`[resume_analysis, qa_analysis]`)
//! - a mapping: a conditional step
//!   (`{ step: check, condition: early_stop, routes: { continue: report } }`)

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::node::END;

/// Where a routing outcome leads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTarget", into = "RawTarget")]
pub enum RouteTarget {
    /// A single step
    Step(String),
    /// Several steps started together
    Group(Vec<String>),
    /// Finish the workflow
    End,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawTarget {
    One(String),
    Many(Vec<String>),
}

impl From<RawTarget> for RouteTarget {
    fn from(raw: RawTarget) -> Self {
        match raw {
            RawTarget::One(name) => RouteTarget::from(name),
            RawTarget::Many(names) => RouteTarget::Group(names),
        }
    }
}

impl From<RouteTarget> for RawTarget {
    fn from(target: RouteTarget) -> Self {
        match target {
            RouteTarget::Step(name) => RawTarget::One(name),
            RouteTarget::Group(names) => RawTarget::Many(names),
            RouteTarget::End => RawTarget::One("END".to_string()),
        }
    }
}

impl From<String> for RouteTarget {
    fn from(name: String) -> Self {
        if name == "END" || name == END {
            RouteTarget::End
        } else {
            RouteTarget::Step(name)
        }
    }
}

impl From<&str> for RouteTarget {
    fn from(name: &str) -> Self {
        RouteTarget::from(name.to_string())
    }
}

impl<const N: usize> From<[&str; N]> for RouteTarget {
    fn from(names: [&str; N]) -> Self {
        RouteTarget::Group(names.iter().map(|s| s.to_string()).collect())
    }
}

impl RouteTarget {
    /// Step names this target starts (empty for `End`)
    pub fn steps(&self) -> Vec<&str> {
        match self {
            RouteTarget::Step(name) => vec![name.as_str()],
            RouteTarget::Group(names) => names.iter().map(String::as_str).collect(),
            RouteTarget::End => vec![],
        }
    }
}

/// Ordered mapping from outcome label to target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMap {
    entries: Vec<(String, RouteTarget)>,
}

impl RouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an outcome, builder style
    pub fn route(mut self, outcome: impl Into<String>, target: impl Into<RouteTarget>) -> Self {
        self.insert(outcome, target);
        self
    }

    /// Add or replace an outcome, keeping its original position
    pub fn insert(&mut self, outcome: impl Into<String>, target: impl Into<RouteTarget>) {
        let outcome = outcome.into();
        let target = target.into();
        match self.entries.iter_mut().find(|(key, _)| *key == outcome) {
            Some(entry) => entry.1 = target,
            None => self.entries.push((outcome, target)),
        }
    }

    pub fn get(&self, outcome: &str) -> Option<&RouteTarget> {
        self.entries
            .iter()
            .find(|(key, _)| key == outcome)
            .map(|(_, target)| target)
    }

    pub fn contains_key(&self, outcome: &str) -> bool {
        self.get(outcome).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RouteTarget)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut RouteTarget)> {
        self.entries.iter_mut().map(|(k, v)| (&*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every step any outcome leads to, first appearance first, no repeats
    pub fn targets(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for (_, target) in &self.entries {
            for step in target.steps() {
                if !seen.contains(&step) {
                    seen.push(step);
                }
            }
        }
        seen
    }
}

impl Serialize for RouteMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (outcome, target) in &self.entries {
            map.serialize_entry(outcome, target)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RouteMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RouteMapVisitor;

        impl<'de> Visitor<'de> for RouteMapVisitor {
            type Value = RouteMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of outcome labels to steps")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RouteMap, A::Error> {
                let mut routes = RouteMap::new();
                while let Some((outcome, target)) = access.next_entry::<String, RouteTarget>()? {
                    routes.insert(outcome, target);
                }
                Ok(routes)
            }
        }

        deserializer.deserialize_map(RouteMapVisitor)
    }
}

/// One element of a spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawLayer", into = "RawLayer")]
pub enum Layer {
    /// A single step
    Step(String),
    /// Steps that run side by side
    Parallel(Vec<String>),
    /// A step followed by a routing decision
    Conditional {
        step: String,
        condition: String,
        routes: Option<RouteMap>,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawLayer {
    Step(String),
    Parallel(Vec<String>),
    Conditional {
        step: String,
        condition: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        routes: Option<RouteMap>,
    },
}

impl From<RawLayer> for Layer {
    fn from(raw: RawLayer) -> Self {
        match raw {
            RawLayer::Step(name) => Layer::Step(name),
            RawLayer::Parallel(names) => Layer::Parallel(names),
            RawLayer::Conditional {
                step,
                condition,
                routes,
            } => Layer::Conditional {
                step,
                condition,
                routes,
            },
        }
    }
}

impl From<Layer> for RawLayer {
    fn from(layer: Layer) -> Self {
        match layer {
            Layer::Step(name) => RawLayer::Step(name),
            Layer::Parallel(names) => RawLayer::Parallel(names),
            Layer::Conditional {
                step,
                condition,
                routes,
            } => RawLayer::Conditional {
                step,
                condition,
                routes,
            },
        }
    }
}

impl Layer {
    /// Build the layer holding `names`: a `Step` for one name, else `Parallel`
    pub fn of(mut names: Vec<String>) -> Self {
        if names.len() == 1 {
            Layer::Step(names.remove(0))
        } else {
            Layer::Parallel(names)
        }
    }

    /// The graph nodes this layer contributes, in order
    pub fn nodes(&self) -> Vec<&str> {
        match self {
            Layer::Step(name) => vec![name.as_str()],
            Layer::Parallel(names) => names.iter().map(String::as_str).collect(),
            Layer::Conditional { step, .. } => vec![step.as_str()],
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Layer::Parallel(_))
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Layer::Conditional { .. })
    }
}

impl From<&str> for Layer {
    fn from(name: &str) -> Self {
        Layer::Step(name.to_string())
    }
}

impl From<String> for Layer {
    fn from(name: String) -> Self {
        Layer::Step(name)
    }
}

impl<const N: usize> From<[&str; N]> for Layer {
    fn from(names: [&str; N]) -> Self {
        Layer::Parallel(names.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<&str>> for Layer {
    fn from(names: Vec<&str>) -> Self {
        Layer::Parallel(names.into_iter().map(str::to_string).collect())
    }
}

impl From<(&str, &str)> for Layer {
    fn from((step, condition): (&str, &str)) -> Self {
        Layer::Conditional {
            step: step.to_string(),
            condition: condition.to_string(),
            routes: None,
        }
    }
}

impl From<(&str, &str, RouteMap)> for Layer {
    fn from((step, condition, routes): (&str, &str, RouteMap)) -> Self {
        Layer::Conditional {
            step: step.to_string(),
            condition: condition.to_string(),
            routes: Some(routes),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Step(name) => write!(f, "{}", name),
            Layer::Parallel(names) => write!(f, "[{}]", names.join(", ")),
            Layer::Conditional {
                step,
                condition,
                routes,
            } => {
                write!(f, "{} ?{}", step, condition)?;
                if let Some(routes) = routes {
                    let rendered: Vec<String> = routes
                        .iter()
                        .map(|(outcome, target)| {
                            let to = match target {
                                RouteTarget::End => "END".to_string(),
                                other => other.steps().join("+"),
                            };
                            format!("{}: {}", outcome, to)
                        })
                        .collect();
                    write!(f, " {{{}}}", rendered.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered sequence of layers describing one workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Spec {
    layers: Vec<Layer>,
}

impl Spec {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn into_layers(self) -> Vec<Layer> {
        self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Every step name the spec references, including route targets
    pub fn step_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for layer in &self.layers {
            for node in layer.nodes() {
                push_unique(&mut names, node);
            }
            if let Layer::Conditional {
                routes: Some(routes),
                ..
            } = layer
            {
                for target in routes.targets() {
                    push_unique(&mut names, target);
                }
            }
        }
        names
    }

    /// Every routing condition name the spec references
    pub fn condition_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for layer in &self.layers {
            if let Layer::Conditional { condition, .. } = layer {
                push_unique(&mut names, condition);
            }
        }
        names
    }
}

fn push_unique<'a>(names: &mut Vec<&'a str>, name: &'a str) {
    if !names.contains(&name) {
        names.push(name);
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.layers.iter().map(Layer::to_string).collect();
        write!(f, "{}", rendered.join(" -> "))
    }
}
