use async_trait::async_trait;
use preflight_core::context::Context;
use preflight_core::resolver::{
    render_dependency_graph, render_execution_plan, DependencyResolver, ExecutionGroup,
};
use preflight_core::validation::{Validator, ValidatorMetadata, ValidatorResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct StubValidator {
    name: &'static str,
    run_after: Vec<&'static str>,
}

fn stub(name: &'static str, run_after: Vec<&'static str>) -> Arc<dyn Validator> {
    Arc::new(StubValidator { name, run_after })
}

#[async_trait]
impl Validator for StubValidator {
    fn metadata(&self) -> ValidatorMetadata {
        ValidatorMetadata {
            name: self.name.to_string(),
            description: String::new(),
            run_after: self.run_after.iter().map(|s| s.to_string()).collect(),
            tags: vec![],
        }
    }

    fn enabled(&self, _ctx: &Context) -> bool {
        true
    }

    async fn validate(&self, _cancel: CancellationToken, _ctx: Arc<Context>) -> ValidatorResult {
        ValidatorResult::success("OK", "ok")
    }
}

fn group_names(group: &ExecutionGroup) -> Vec<String> {
    group.validators.iter().map(|v| v.metadata().name).collect()
}

#[test]
fn single_validator_lands_at_level_zero() {
    let resolver = DependencyResolver::new(vec![stub("solo", vec![])]);
    let groups = resolver.resolve_execution_groups().unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].level, 0);
    assert_eq!(group_names(&groups[0]), vec!["solo"]);
}

#[test]
fn linear_chain_produces_one_level_per_validator() {
    let resolver = DependencyResolver::new(vec![
        stub("c", vec!["b"]),
        stub("a", vec![]),
        stub("b", vec!["a"]),
    ]);
    let groups = resolver.resolve_execution_groups().unwrap();

    assert_eq!(groups.len(), 3);
    assert_eq!(group_names(&groups[0]), vec!["a"]);
    assert_eq!(group_names(&groups[1]), vec!["b"]);
    assert_eq!(group_names(&groups[2]), vec!["c"]);
}

#[test]
fn diamond_groups_independent_validators_together() {
    let resolver = DependencyResolver::new(vec![
        stub("top", vec!["left", "mid"]),
        stub("left", vec!["root"]),
        stub("mid", vec!["root"]),
        stub("root", vec![]),
    ]);
    let groups = resolver.resolve_execution_groups().unwrap();

    assert_eq!(groups.len(), 3);
    assert_eq!(group_names(&groups[0]), vec!["root"]);
    assert_eq!(group_names(&groups[1]), vec!["left", "mid"]);
    assert_eq!(group_names(&groups[2]), vec!["top"]);
}

#[test]
fn validators_within_a_level_sort_alphabetically() {
    let resolver = DependencyResolver::new(vec![
        stub("zeta", vec![]),
        stub("alpha", vec![]),
        stub("mike", vec![]),
    ]);
    let groups = resolver.resolve_execution_groups().unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(group_names(&groups[0]), vec!["alpha", "mike", "zeta"]);
}

#[test]
fn unknown_dependency_is_dropped() {
    let resolver = DependencyResolver::new(vec![stub("b", vec!["ghost"])]);
    let groups = resolver.resolve_execution_groups().unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].level, 0);
    assert_eq!(group_names(&groups[0]), vec!["b"]);
}

#[test]
fn level_comes_from_known_dependencies_only() {
    let resolver = DependencyResolver::new(vec![
        stub("a", vec![]),
        stub("c", vec!["a", "ghost"]),
    ]);
    let groups = resolver.resolve_execution_groups().unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(group_names(&groups[0]), vec!["a"]);
    assert_eq!(group_names(&groups[1]), vec!["c"]);
}

#[test]
fn two_node_cycle_is_an_error() {
    let resolver = DependencyResolver::new(vec![stub("a", vec!["b"]), stub("b", vec!["a"])]);
    let err = resolver.resolve_execution_groups().unwrap_err();

    assert!(err.to_string().contains("circular dependency detected"));
}

#[test]
fn self_edge_is_a_cycle() {
    let resolver = DependencyResolver::new(vec![stub("a", vec!["a"])]);
    let err = resolver.resolve_execution_groups().unwrap_err();

    assert!(err.to_string().contains("circular dependency detected"));
    assert!(err.to_string().contains("a -> a"));
}

#[test]
fn cycle_behind_valid_validators_still_fails_resolution() {
    let resolver = DependencyResolver::new(vec![
        stub("ok", vec![]),
        stub("x", vec!["y"]),
        stub("y", vec!["x"]),
    ]);
    assert!(resolver.resolve_execution_groups().is_err());
}

#[test]
fn every_edge_points_to_a_lower_level() {
    let validators = vec![
        stub("top", vec!["left", "mid"]),
        stub("left", vec!["root"]),
        stub("mid", vec!["root", "absent"]),
        stub("root", vec![]),
    ];
    let resolver = DependencyResolver::new(validators.clone());
    let groups = resolver.resolve_execution_groups().unwrap();

    let mut level_of: HashMap<String, usize> = HashMap::new();
    for group in &groups {
        for v in &group.validators {
            level_of.insert(v.metadata().name, group.level);
        }
    }

    for v in &validators {
        let meta = v.metadata();
        for dep in &meta.run_after {
            if let (Some(from), Some(to)) = (level_of.get(&meta.name), level_of.get(dep)) {
                assert!(from > to, "{} (level {from}) must be above {dep} (level {to})", meta.name);
            }
        }
    }
}

#[test]
fn dependency_graph_rendering_lists_edges() {
    let validators = vec![stub("b", vec!["a", "ghost"]), stub("a", vec![])];
    let diagram = render_dependency_graph(&validators);

    assert!(diagram.starts_with("digraph validators {"));
    assert!(diagram.contains("\"a\";"));
    assert!(diagram.contains("\"b\" -> \"a\";"));
    assert!(diagram.contains("\"b\" -> \"ghost\" [style=dashed];"));
}

#[test]
fn execution_plan_rendering_groups_by_level() {
    let resolver = DependencyResolver::new(vec![stub("b", vec!["a"]), stub("a", vec![])]);
    let groups = resolver.resolve_execution_groups().unwrap();
    let diagram = render_execution_plan(&groups);

    assert!(diagram.contains("subgraph cluster_level_0"));
    assert!(diagram.contains("subgraph cluster_level_1"));
    assert!(diagram.contains("label=\"level 0\";"));
    assert!(diagram.contains("\"a\";"));
    assert!(diagram.contains("\"b\";"));
}
