//! Dependency analysis over a project's migration plans.
//!
//! Edges are never stored: plan A depends on plan B exactly when A uses the
//! domino strategy and A's source cluster is B's target cluster. The graph
//! is rebuilt from the current plan set on every validation pass, so edits
//! to any plan are reflected immediately.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::plan::ClusterMigrationPlan;

/// One dependency cycle, reported with every plan on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularDependency {
    /// Plan ids along the cycle, in traversal order, first repeated last.
    pub cycle: Vec<String>,
    pub description: String,
}

/// Outcome of a dependency validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyValidationResult {
    pub is_valid: bool,
    pub circular_dependencies: Vec<CircularDependency>,
    /// Safe execution order, suppliers before dependents. Empty when the
    /// graph has a cycle.
    pub execution_order: Vec<String>,
    /// Longest dependency chain, as plan ids from first supplier to final
    /// dependent. Empty when the graph has a cycle.
    pub critical_path: Vec<String>,
    pub warnings: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

/// Derived dependency graph over one project's plans.
pub struct DependencyGraph<'a> {
    plans: &'a [ClusterMigrationPlan],
    /// plan id -> ids of the plans it depends on (its hardware suppliers)
    edges: BTreeMap<&'a str, Vec<&'a str>>,
    warnings: Vec<String>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the graph from the plan set. A domino source that matches no
    /// plan's target cluster is recorded as a warning, not an edge.
    pub fn build(plans: &'a [ClusterMigrationPlan]) -> Self {
        let by_target: HashMap<&str, &ClusterMigrationPlan> = plans
            .iter()
            .map(|plan| (plan.target_cluster.as_str(), plan))
            .collect();

        let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut warnings = Vec::new();
        for plan in plans {
            let deps = edges.entry(plan.id.as_str()).or_default();
            if let Some(source) = plan.strategy.domino_source() {
                match by_target.get(source) {
                    Some(supplier) if supplier.id != plan.id => {
                        deps.push(supplier.id.as_str());
                    }
                    Some(_) => {
                        // Self-loop: a plan sourcing hardware from its own
                        // target cluster, reported by cycle detection below.
                        deps.push(plan.id.as_str());
                    }
                    None => {
                        warnings.push(format!(
                            "plan '{}' sources hardware from cluster '{}' which no plan in this project migrates",
                            plan.id, source
                        ));
                    }
                }
            }
        }

        Self {
            plans,
            edges,
            warnings,
        }
    }

    /// Run cycle detection and, when the graph is acyclic, compute the
    /// execution order and critical path.
    pub fn validate(&self) -> DependencyValidationResult {
        let circular_dependencies = self.find_cycles();
        let is_valid = circular_dependencies.is_empty();

        let (execution_order, critical_path) = if is_valid {
            (self.execution_order(), self.critical_path())
        } else {
            warn!(
                cycles = circular_dependencies.len(),
                "dependency validation found circular dependencies"
            );
            (Vec::new(), Vec::new())
        };

        debug!(
            plans = self.plans.len(),
            is_valid,
            warnings = self.warnings.len(),
            "dependency validation pass complete"
        );

        DependencyValidationResult {
            is_valid,
            circular_dependencies,
            execution_order,
            critical_path,
            warnings: self.warnings.clone(),
            validated_at: Utc::now(),
        }
    }

    /// Depth-first search with an explicit recursion stack. When a back edge
    /// is found, the cycle is cut out of the current path so the report
    /// names every plan on it.
    fn find_cycles(&self) -> Vec<CircularDependency> {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut cycles = Vec::new();

        for plan in self.plans {
            if !visited.contains(plan.id.as_str()) {
                let mut path: Vec<&str> = Vec::new();
                let mut on_path: BTreeSet<&str> = BTreeSet::new();
                self.dfs(
                    plan.id.as_str(),
                    &mut visited,
                    &mut path,
                    &mut on_path,
                    &mut cycles,
                );
            }
        }

        cycles
    }

    fn dfs(
        &self,
        node: &'a str,
        visited: &mut BTreeSet<&'a str>,
        path: &mut Vec<&'a str>,
        on_path: &mut BTreeSet<&'a str>,
        cycles: &mut Vec<CircularDependency>,
    ) {
        visited.insert(node);
        path.push(node);
        on_path.insert(node);

        if let Some(deps) = self.edges.get(node) {
            for &dep in deps {
                if on_path.contains(dep) {
                    let start = path.iter().position(|&p| p == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|p| p.to_string()).collect();
                    cycle.push(dep.to_string());
                    let description = format!(
                        "circular hardware dependency: {}",
                        cycle.join(" -> ")
                    );
                    cycles.push(CircularDependency { cycle, description });
                } else if !visited.contains(dep) {
                    self.dfs(dep, visited, path, on_path, cycles);
                }
            }
        }

        on_path.remove(node);
        path.pop();
    }

    /// Kahn's algorithm. The ready set is ordered, so equal-depth plans
    /// always come out in the same order.
    fn execution_order(&self) -> Vec<String> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (&plan_id, deps) in &self.edges {
            in_degree.entry(plan_id).or_insert(0);
            for &dep in deps {
                *in_degree.entry(plan_id).or_insert(0) += 1;
                dependents.entry(dep).or_default().push(plan_id);
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(&next) = ready.iter().next() {
            ready.remove(next);
            order.push(next.to_string());
            if let Some(deps) = dependents.get(next) {
                for &dependent in deps {
                    let degree = in_degree
                        .get_mut(dependent)
                        .filter(|deg| **deg > 0);
                    if let Some(deg) = degree {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.insert(dependent);
                        }
                    }
                }
            }
        }

        order
    }

    /// Longest supplier-to-dependent chain. Only meaningful on an acyclic
    /// graph; callers gate on cycle detection first.
    fn critical_path(&self) -> Vec<String> {
        let order = self.execution_order();

        // depth[p] = length of the longest chain ending at p
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut prev: HashMap<&str, &str> = HashMap::new();
        for plan_id in &order {
            let plan_id = plan_id.as_str();
            let mut best = 0usize;
            let mut best_dep: Option<&str> = None;
            if let Some(deps) = self.edges.get(plan_id) {
                for &dep in deps {
                    let d = depth.get(dep).copied().unwrap_or(0) + 1;
                    if d > best {
                        best = d;
                        best_dep = Some(dep);
                    }
                }
            }
            depth.insert(plan_id, best);
            if let Some(dep) = best_dep {
                prev.insert(plan_id, dep);
            }
        }

        // Deepest chain wins; ties go to the lexicographically first plan.
        let Some(tail) = depth
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&id, _)| id)
        else {
            return Vec::new();
        };

        let mut chain = vec![tail.to_string()];
        let mut cursor = tail;
        while let Some(&dep) = prev.get(cursor) {
            chain.push(dep.to_string());
            cursor = dep;
        }
        chain.reverse();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::MigrationStrategy;

    fn plan(id: &str, target: &str, strategy: MigrationStrategy) -> ClusterMigrationPlan {
        let mut p = ClusterMigrationPlan::new("proj-1", target, strategy, vec![]);
        p.id = id.to_string();
        p
    }

    fn domino(source: &str) -> MigrationStrategy {
        MigrationStrategy::Domino {
            source_cluster: source.to_string(),
        }
    }

    #[test]
    fn test_chain_orders_suppliers_first() {
        // plan-c frees DEV-02 for plan-b, plan-b frees DEV-01 for plan-a
        let plans = vec![
            plan("plan-a", "PROD-01", domino("DEV-01")),
            plan("plan-b", "DEV-01", domino("DEV-02")),
            plan("plan-c", "DEV-02", MigrationStrategy::ExistingFreeHardware),
        ];
        let result = DependencyGraph::build(&plans).validate();
        assert!(result.is_valid);
        assert_eq!(result.execution_order, vec!["plan-c", "plan-b", "plan-a"]);
        assert_eq!(result.critical_path, vec!["plan-c", "plan-b", "plan-a"]);
    }

    #[test]
    fn test_two_plan_cycle_names_both_plans() {
        let plans = vec![
            plan("plan-a", "CLUSTER-A", domino("CLUSTER-B")),
            plan("plan-b", "CLUSTER-B", domino("CLUSTER-A")),
        ];
        let result = DependencyGraph::build(&plans).validate();
        assert!(!result.is_valid);
        assert_eq!(result.circular_dependencies.len(), 1);
        let cycle = &result.circular_dependencies[0].cycle;
        assert!(cycle.contains(&"plan-a".to_string()));
        assert!(cycle.contains(&"plan-b".to_string()));
        assert_eq!(cycle.first(), cycle.last());
        assert!(result.execution_order.is_empty());
    }

    #[test]
    fn test_self_referential_plan_is_a_cycle() {
        let plans = vec![plan("plan-a", "CLUSTER-A", domino("CLUSTER-A"))];
        let result = DependencyGraph::build(&plans).validate();
        assert!(!result.is_valid);
        assert_eq!(
            result.circular_dependencies[0].cycle,
            vec!["plan-a", "plan-a"]
        );
    }

    #[test]
    fn test_missing_domino_source_warns_but_validates() {
        let plans = vec![plan("plan-a", "PROD-01", domino("RETIRED-99"))];
        let result = DependencyGraph::build(&plans).validate();
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("RETIRED-99"));
        assert_eq!(result.execution_order, vec!["plan-a"]);
    }

    #[test]
    fn test_independent_plans_order_deterministically() {
        let plans = vec![
            plan("plan-b", "PROD-02", MigrationStrategy::ExistingFreeHardware),
            plan("plan-a", "PROD-01", MigrationStrategy::ExistingFreeHardware),
        ];
        let first = DependencyGraph::build(&plans).validate();
        let second = DependencyGraph::build(&plans).validate();
        assert_eq!(first.execution_order, second.execution_order);
        assert_eq!(first.execution_order, vec!["plan-a", "plan-b"]);
    }

    #[test]
    fn test_critical_path_picks_longest_chain() {
        // Two chains share a supplier: c -> b -> a is longer than c -> d.
        let plans = vec![
            plan("plan-a", "PROD-01", domino("DEV-01")),
            plan("plan-b", "DEV-01", domino("DEV-02")),
            plan("plan-c", "DEV-02", MigrationStrategy::ExistingFreeHardware),
            plan("plan-d", "PROD-02", domino("DEV-02")),
        ];
        let result = DependencyGraph::build(&plans).validate();
        assert!(result.is_valid);
        assert_eq!(result.critical_path, vec!["plan-c", "plan-b", "plan-a"]);
    }
}
