// SPDX-License-Identifier: MIT

//! Node deduplication - gives every occurrence of a step its own graph id
//!
//! The first occurrence of a step keeps its name; the k-th repeat becomes
//! `name_k`. Every generated id still resolves to the original step.

use std::collections::{HashMap, HashSet};

use super::spec::{Layer, RouteTarget, Spec};

/// A spec whose node names are unique graph ids
#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicated {
    spec: Spec,
    aliases: HashMap<String, String>,
}

impl Deduplicated {
    /// The rewritten spec
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Step name a graph id was generated from (the id itself if it was
    /// never renamed)
    pub fn base_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.aliases.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Generated id → step name, for every renamed occurrence
    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }

    /// Every node id in layer order
    pub fn node_ids(&self) -> Vec<&str> {
        self.spec.layers().iter().flat_map(Layer::nodes).collect()
    }
}

/// Strip a trailing `_<digits>` suffix: `transcribe_3` → `transcribe`
pub fn strip_suffix(id: &str) -> &str {
    match id.rsplit_once('_') {
        Some((base, digits))
            if !base.is_empty()
                && !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => id,
    }
}

struct IdAllocator {
    counts: HashMap<String, usize>,
    used: HashSet<String>,
    reserved: HashSet<String>,
    aliases: HashMap<String, String>,
}

impl IdAllocator {
    fn new<'a>(spec: &Spec, extra: impl IntoIterator<Item = &'a str>) -> Self {
        let reserved = spec
            .layers()
            .iter()
            .flat_map(Layer::nodes)
            .map(str::to_string)
            .chain(extra.into_iter().map(str::to_string))
            .collect();
        Self {
            counts: HashMap::new(),
            used: HashSet::new(),
            reserved,
            aliases: HashMap::new(),
        }
    }

    fn assign(&mut self, name: &str) -> String {
        let count = self.counts.entry(name.to_string()).or_insert(0);
        *count += 1;

        if *count == 1 && !self.used.contains(name) {
            self.used.insert(name.to_string());
            return name.to_string();
        }

        let mut k = (*count).max(2);
        let id = loop {
            let candidate = format!("{}_{}", name, k);
            if !self.used.contains(&candidate) && !self.reserved.contains(&candidate) {
                break candidate;
            }
            k += 1;
        };
        *count = k;

        log::debug!("Renamed repeated step '{}' to '{}'", name, id);
        self.used.insert(id.clone());
        self.aliases.insert(id.clone(), name.to_string());
        id
    }
}

/// Assign unique ids to every node occurrence in a normalized spec
pub fn deduplicate(spec: &Spec) -> Deduplicated {
    deduplicate_reserving(spec, std::iter::empty())
}

/// Like [`deduplicate`], but never generate an id listed in `reserved`
/// (registered step names, for example)
pub fn deduplicate_reserving<'a>(
    spec: &Spec,
    reserved: impl IntoIterator<Item = &'a str>,
) -> Deduplicated {
    let mut ids = IdAllocator::new(spec, reserved);

    let mut layers: Vec<Layer> = spec
        .layers()
        .iter()
        .map(|layer| match layer {
            Layer::Step(name) => Layer::Step(ids.assign(name)),
            Layer::Parallel(names) => {
                Layer::Parallel(names.iter().map(|name| ids.assign(name)).collect())
            }
            Layer::Conditional {
                step,
                condition,
                routes,
            } => Layer::Conditional {
                step: ids.assign(step),
                condition: condition.clone(),
                routes: routes.clone(),
            },
        })
        .collect();

    // Route targets name nodes of the following layer; point them at the
    // ids that layer received. A name repeated in that layer maps to its
    // first occurrence.
    for i in 0..layers.len() {
        let mut renamed: HashMap<String, String> = HashMap::new();
        if let (Some(original), Some(rewritten)) = (spec.layers().get(i + 1), layers.get(i + 1)) {
            for (from, to) in original.nodes().into_iter().zip(rewritten.nodes()) {
                renamed
                    .entry(from.to_string())
                    .or_insert_with(|| to.to_string());
            }
        }

        if let Layer::Conditional {
            routes: Some(routes),
            ..
        } = &mut layers[i]
        {
            for (_, target) in routes.iter_mut() {
                rename_target(target, &renamed);
            }
        }
    }

    Deduplicated {
        spec: Spec::new(layers),
        aliases: ids.aliases,
    }
}

fn rename_target(target: &mut RouteTarget, renamed: &HashMap<String, String>) {
    let rename = |name: &mut String| {
        if let Some(id) = renamed.get(name.as_str()) {
            *name = id.clone();
        }
    };
    match target {
        RouteTarget::Step(name) => rename(name),
        RouteTarget::Group(names) => names.iter_mut().for_each(rename),
        RouteTarget::End => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weft::workflow::normalizer::normalize;
    use crate::weft::workflow::spec::RouteMap;

    #[test]
    fn test_unique_names_are_untouched() {
        let spec = Spec::new(vec!["a".into(), ["b", "c"].into(), ("d", "route").into()]);
        let deduped = deduplicate(&spec);

        assert_eq!(deduped.spec(), &spec);
        assert!(deduped.aliases().is_empty());
    }

    #[test]
    fn test_repeats_get_numbered_suffixes() {
        let spec = Spec::new(vec![
            "say".into(),
            ["say", "other"].into(),
            "say".into(),
            ("say", "route").into(),
        ]);
        let deduped = deduplicate(&spec);

        assert_eq!(
            deduped.node_ids(),
            vec!["say", "say_2", "other", "say_3", "say_4"]
        );
        for id in ["say", "say_2", "say_3", "say_4"] {
            assert_eq!(deduped.base_name(id), "say");
        }
        assert_eq!(deduped.base_name("other"), "other");
    }

    #[test]
    fn test_repeats_within_one_parallel_group() {
        let spec = Spec::new(vec![["worker", "worker", "worker"].into()]);
        let deduped = deduplicate(&spec);
        assert_eq!(deduped.node_ids(), vec!["worker", "worker_2", "worker_3"]);
    }

    #[test]
    fn test_generated_ids_avoid_literal_names() {
        let spec = Spec::new(vec!["a".into(), "a_2".into(), "a".into()]);
        let deduped = deduplicate(&spec);

        assert_eq!(deduped.node_ids(), vec!["a", "a_2", "a_3"]);
        assert_eq!(deduped.base_name("a_2"), "a_2");
        assert_eq!(deduped.base_name("a_3"), "a");
    }

    #[test]
    fn test_route_targets_follow_renamed_layer() {
        let routes = RouteMap::new()
            .route("again", "a")
            .route("stop", RouteTarget::End);
        let spec = normalize(&Spec::new(vec![
            "a".into(),
            ("check", "decide", routes).into(),
        ]));
        let deduped = deduplicate(&spec);

        assert_eq!(deduped.node_ids(), vec!["a", "check", "a_2"]);
        match &deduped.spec().layers()[1] {
            Layer::Conditional {
                routes: Some(routes),
                ..
            } => {
                assert_eq!(routes.get("again"), Some(&RouteTarget::Step("a_2".to_string())));
                assert_eq!(routes.get("stop"), Some(&RouteTarget::End));
            }
            other => panic!("Expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_group_targets_are_renamed() {
        let spec = normalize(&Spec::new(vec![
            ["x", "y"].into(),
            ("check", "decide", RouteMap::new().route("both", ["x", "y"])).into(),
        ]));
        let deduped = deduplicate(&spec);

        match &deduped.spec().layers()[1] {
            Layer::Conditional {
                routes: Some(routes),
                ..
            } => assert_eq!(
                routes.get("both"),
                Some(&RouteTarget::Group(vec!["x_2".to_string(), "y_2".to_string()]))
            ),
            other => panic!("Expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_generated_ids_avoid_reserved_names() {
        let spec = Spec::new(vec!["phase".into(), "phase".into()]);
        let deduped = deduplicate_reserving(&spec, ["phase", "phase_2"]);

        assert_eq!(deduped.node_ids(), vec!["phase", "phase_3"]);
        assert_eq!(deduped.base_name("phase_3"), "phase");
    }

    #[test]
    fn test_route_target_picks_first_of_repeated_names() {
        let spec = normalize(&Spec::new(vec![
            "w".into(),
            ("check", "decide", RouteMap::new().route("go", "w")).into(),
            ["w", "w"].into(),
        ]));
        let deduped = deduplicate(&spec);

        assert_eq!(deduped.node_ids(), vec!["w", "check", "w_2", "w_3"]);
        match &deduped.spec().layers()[1] {
            Layer::Conditional {
                routes: Some(routes),
                ..
            } => assert_eq!(routes.get("go"), Some(&RouteTarget::Step("w_2".to_string()))),
            other => panic!("Expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_strip_suffix() {
        assert_eq!(strip_suffix("transcribe_3"), "transcribe");
        assert_eq!(strip_suffix("say_hello"), "say_hello");
        assert_eq!(strip_suffix("plain"), "plain");
        assert_eq!(strip_suffix("trailing_"), "trailing_");
        assert_eq!(strip_suffix("_2"), "_2");
    }
}
