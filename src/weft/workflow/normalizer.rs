// SPDX-License-Identifier: MIT

//! Spec normalization - makes a hand-written spec structurally wireable
//!
//! Two rewrites are applied in one left-to-right pass:
//! - a synchronizer step goes between two adjacent parallel groups, so the
//!   fan-in completes before the next fan-out starts;
//! - every conditional layer ends up with a route map whose targets are
//!   exactly the nodes of the layer that follows it.

use super::spec::{Layer, RouteMap, RouteTarget, Spec};

/// Name of the placeholder step inserted between parallel groups
pub const SYNC_STEP: &str = "sync";

/// Normalize a spec. Deterministic and idempotent.
pub fn normalize(spec: &Spec) -> Spec {
    let mut layers: Vec<Layer> = spec.layers().to_vec();
    let mut i = 0;

    while i < layers.len() {
        let next_nodes: Vec<String> = layers
            .get(i + 1)
            .map(|next| next.nodes().into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        let next_is_parallel = layers.get(i + 1).is_some_and(Layer::is_parallel);

        let inserted = match &mut layers[i] {
            Layer::Parallel(_) if next_is_parallel => Some(Layer::Step(SYNC_STEP.to_string())),
            Layer::Conditional { step, routes, .. } => {
                let extra = complete_routes(routes, &next_nodes);
                if let Some(layer) = &extra {
                    log::debug!("Inserting route target layer '{}' after '{}'", layer, step);
                }
                extra
            }
            _ => None,
        };

        if let Some(layer) = inserted {
            layers.insert(i + 1, layer);
        }
        i += 1;
    }

    Spec::new(layers)
}

/// Reconcile a conditional's route map with the nodes of the following layer.
/// Returns a layer to insert right after the conditional when the map's
/// targets reach outside that layer.
fn complete_routes(routes: &mut Option<RouteMap>, next_nodes: &[String]) -> Option<Layer> {
    let map = match routes {
        Some(map) => map,
        None => {
            *routes = Some(identity_routes(next_nodes));
            return None;
        }
    };

    let targets: Vec<String> = map.targets().into_iter().map(str::to_string).collect();

    if targets.iter().all(|t| next_nodes.contains(t)) {
        for node in next_nodes {
            if !map.contains_key(node) && !targets.contains(node) {
                map.insert(node.clone(), RouteTarget::Step(node.clone()));
            }
        }
        None
    } else {
        Some(Layer::of(targets))
    }
}

/// Every node of the following layer is reachable under its own name
fn identity_routes(next_nodes: &[String]) -> RouteMap {
    next_nodes.iter().fold(RouteMap::new(), |map, node| {
        map.route(node.clone(), RouteTarget::Step(node.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_names(spec: &Spec) -> Vec<String> {
        spec.layers().iter().map(Layer::to_string).collect()
    }

    #[test]
    fn test_single_parallel_group_untouched() {
        let spec = Spec::new(vec!["start".into(), ["p1", "p2"].into(), "end".into()]);
        assert_eq!(normalize(&spec), spec);
    }

    #[test]
    fn test_sync_inserted_between_parallel_groups() {
        let spec = Spec::new(vec![
            "a".into(),
            ["b", "c"].into(),
            ["d", "e"].into(),
            "f".into(),
        ]);
        let normalized = normalize(&spec);
        assert_eq!(
            layer_names(&normalized),
            vec!["a", "[b, c]", "sync", "[d, e]", "f"]
        );
    }

    #[test]
    fn test_sync_inserted_for_each_adjacent_pair() {
        let spec = Spec::new(vec![["a", "b"].into(), ["c", "d"].into(), ["e", "f"].into()]);
        let normalized = normalize(&spec);
        assert_eq!(
            layer_names(&normalized),
            vec!["[a, b]", "sync", "[c, d]", "sync", "[e, f]"]
        );
    }

    #[test]
    fn test_conditional_without_routes_gets_identity_map() {
        let spec = Spec::new(vec![("check", "early_stop").into(), ["b", "c"].into()]);
        let normalized = normalize(&spec);

        match &normalized.layers()[0] {
            Layer::Conditional {
                routes: Some(routes),
                ..
            } => {
                assert_eq!(routes.get("b"), Some(&RouteTarget::Step("b".to_string())));
                assert_eq!(routes.get("c"), Some(&RouteTarget::Step("c".to_string())));
                assert_eq!(routes.len(), 2);
            }
            other => panic!("Expected completed conditional, got {:?}", other),
        }
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn test_trailing_conditional_without_routes_gets_empty_map() {
        let spec = Spec::new(vec!["a".into(), ("check", "early_stop").into()]);
        let normalized = normalize(&spec);
        assert_eq!(
            normalized.layers()[1],
            Layer::Conditional {
                step: "check".to_string(),
                condition: "early_stop".to_string(),
                routes: Some(RouteMap::new()),
            }
        );
    }

    #[test]
    fn test_subset_routes_are_completed_with_identity() {
        let routes = RouteMap::new().route("yes", "c").route("stop", RouteTarget::End);
        let spec = Spec::new(vec![("b", "decide", routes).into(), ["c", "d"].into()]);
        let normalized = normalize(&spec);

        match &normalized.layers()[0] {
            Layer::Conditional {
                routes: Some(routes),
                ..
            } => {
                assert_eq!(routes.get("yes"), Some(&RouteTarget::Step("c".to_string())));
                assert_eq!(routes.get("d"), Some(&RouteTarget::Step("d".to_string())));
                assert_eq!(routes.get("stop"), Some(&RouteTarget::End));
                assert!(!routes.contains_key("c"));
            }
            other => panic!("Expected completed conditional, got {:?}", other),
        }
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn test_outside_targets_insert_union_layer() {
        let routes = RouteMap::new().route("x", "c").route("y", "d");
        let spec = Spec::new(vec!["a".into(), ("b", "decide", routes).into(), "e".into()]);
        let normalized = normalize(&spec);

        assert_eq!(
            layer_names(&normalized),
            vec!["a", "b ?decide {x: c, y: d}", "[c, d]", "e"]
        );
    }

    #[test]
    fn test_union_layer_of_one_target_is_a_step() {
        let routes = RouteMap::new().route("retry", "a").route("done", RouteTarget::End);
        let spec = Spec::new(vec!["a".into(), ("b", "decide", routes).into()]);
        let normalized = normalize(&spec);

        assert_eq!(normalized.layers()[2], Layer::Step("a".to_string()));
    }

    #[test]
    fn test_union_layer_followed_by_parallel_gets_sync() {
        let routes = RouteMap::new().route("x", "c").route("y", "d");
        let spec = Spec::new(vec![("b", "decide", routes).into(), ["e", "f"].into()]);
        let normalized = normalize(&spec);

        assert_eq!(
            layer_names(&normalized),
            vec!["b ?decide {x: c, y: d}", "[c, d]", "sync", "[e, f]"]
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let specs = vec![
            Spec::new(vec!["a".into(), ["b", "c"].into(), ["d", "e"].into(), "f".into()]),
            Spec::new(vec![("a", "route").into(), ["b", "c"].into(), ["d", "e"].into()]),
            Spec::new(vec![
                ("a", "route", RouteMap::new().route("x", "z").route("y", ["p", "q"])).into(),
                ["b", "c"].into(),
            ]),
            Spec::new(vec![
                ("a", "route", RouteMap::new().route("x", "b")).into(),
                ["b", "c"].into(),
                ("d", "route").into(),
            ]),
            Spec::new(vec![]),
        ];

        for spec in specs {
            let once = normalize(&spec);
            let twice = normalize(&once);
            assert_eq!(once, twice, "normalize not idempotent for {}", spec);
        }
    }

    #[test]
    fn test_every_outcome_targets_the_following_layer() {
        let spec = Spec::new(vec![
            ("a", "route", RouteMap::new().route("x", "z").route("y", "b")).into(),
            "b".into(),
        ]);
        let normalized = normalize(&spec);

        let layers = normalized.layers();
        for (i, layer) in layers.iter().enumerate() {
            if let Layer::Conditional {
                routes: Some(routes),
                ..
            } = layer
            {
                let following = layers.get(i + 1).map(Layer::nodes).unwrap_or_default();
                for target in routes.targets() {
                    assert!(following.contains(&target));
                }
            }
        }
    }
}
