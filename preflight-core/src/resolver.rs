use crate::validation::Validator;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Validators that may run in parallel. Groups execute in level order;
/// level 0 first.
pub struct ExecutionGroup {
    pub level: usize,
    pub validators: Vec<Arc<dyn Validator>>,
}

impl std::fmt::Debug for ExecutionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGroup")
            .field("level", &self.level)
            .field(
                "validators",
                &self
                    .validators
                    .iter()
                    .map(|v| v.metadata().name)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("circular dependency detected: {from} -> {to}")]
    CircularDependency { from: String, to: String },
}

/// Builds the execution plan from validator `run_after` declarations.
///
/// Edges pointing at names absent from the input (for example, a
/// disabled dependency) are dropped: dependency declarations describe
/// ordering, not requirement, so a disabled dependency must not cripple
/// its dependents.
pub struct DependencyResolver {
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl DependencyResolver {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        let mut map = HashMap::new();
        for v in validators {
            map.insert(v.metadata().name, v);
        }
        Self { validators: map }
    }

    /// Organise validators into parallel execution groups. Fails when
    /// the dependency graph contains a cycle, naming the edge that
    /// closed it.
    pub fn resolve_execution_groups(&self) -> Result<Vec<ExecutionGroup>, ResolveError> {
        self.detect_cycles()?;

        let levels = self.assign_levels();

        let mut groups = Vec::new();
        for level in 0.. {
            let mut members: Vec<Arc<dyn Validator>> = self
                .validators
                .values()
                .filter(|v| levels.get(&v.metadata().name) == Some(&level))
                .cloned()
                .collect();
            if members.is_empty() {
                break;
            }
            // Alphabetical within a level for deterministic logs and
            // tie-breaking; execution within the group is concurrent.
            members.sort_by_key(|v| v.metadata().name);
            groups.push(ExecutionGroup {
                level,
                validators: members,
            });
        }

        Ok(groups)
    }

    /// level = 1 + max(level of each known dependency), or 0 with none.
    fn assign_levels(&self) -> HashMap<String, usize> {
        let mut levels = HashMap::new();
        for name in self.validators.keys() {
            self.calc_level(name, &mut levels);
        }
        levels
    }

    fn calc_level(&self, name: &str, levels: &mut HashMap<String, usize>) -> usize {
        if let Some(level) = levels.get(name) {
            return *level;
        }

        let meta = self.validators[name].metadata();
        let mut level = 0;
        for dep in &meta.run_after {
            if self.validators.contains_key(dep) {
                level = level.max(self.calc_level(dep, levels) + 1);
            }
        }

        levels.insert(name.to_string(), level);
        level
    }

    fn detect_cycles(&self) -> Result<(), ResolveError> {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();

        let mut names: Vec<&String> = self.validators.keys().collect();
        names.sort();
        for name in names {
            if !visited.contains(name.as_str()) {
                self.dfs(name, &mut visited, &mut on_path)?;
            }
        }
        Ok(())
    }

    fn dfs(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        on_path: &mut HashSet<String>,
    ) -> Result<(), ResolveError> {
        visited.insert(name.to_string());
        on_path.insert(name.to_string());

        let meta = self.validators[name].metadata();
        for dep in &meta.run_after {
            if !self.validators.contains_key(dep) {
                continue;
            }
            if !visited.contains(dep.as_str()) {
                self.dfs(dep, visited, on_path)?;
            } else if on_path.contains(dep.as_str()) {
                return Err(ResolveError::CircularDependency {
                    from: name.to_string(),
                    to: dep.clone(),
                });
            }
        }

        on_path.remove(name);
        Ok(())
    }
}

/// Render declared dependency edges as a Graphviz digraph. Edges to
/// unknown names are kept but dashed. Documentation aid only.
pub fn render_dependency_graph(validators: &[Arc<dyn Validator>]) -> String {
    let known: HashSet<String> = validators.iter().map(|v| v.metadata().name).collect();
    let mut metas: Vec<_> = validators.iter().map(|v| v.metadata()).collect();
    metas.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::from("digraph validators {\n");
    for meta in &metas {
        if meta.run_after.is_empty() {
            out.push_str(&format!("  \"{}\";\n", meta.name));
            continue;
        }
        for dep in &meta.run_after {
            if known.contains(dep) {
                out.push_str(&format!("  \"{}\" -> \"{}\";\n", meta.name, dep));
            } else {
                out.push_str(&format!(
                    "  \"{}\" -> \"{}\" [style=dashed];\n",
                    meta.name, dep
                ));
            }
        }
    }
    out.push_str("}\n");
    out
}

/// Render resolved execution groups as level subgraphs.
pub fn render_execution_plan(groups: &[ExecutionGroup]) -> String {
    let mut out = String::from("digraph execution_plan {\n");
    for group in groups {
        out.push_str(&format!("  subgraph cluster_level_{} {{\n", group.level));
        out.push_str(&format!("    label=\"level {}\";\n", group.level));
        for v in &group.validators {
            out.push_str(&format!("    \"{}\";\n", v.metadata().name));
        }
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    out
}
