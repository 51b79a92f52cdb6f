//! Bounded local-search refinement of an existing placement.
//!
//! Pairwise workload swaps between clusters are accepted only when they
//! strictly reduce the utilization spread (max minus min mean utilization
//! across clusters) and both clusters stay feasible. The pass cap guarantees
//! termination regardless of input.

use std::collections::HashMap;

use crate::error::{MigwaveError, MigwaveResult};
use crate::types::{ClusterSupply, PlacementResult, WorkloadDemand};

use super::{ClusterState, PlacementScheduler, PlacementStrategy};

/// Upper bound on full swap-search passes; each accepted swap strictly
/// reduces the spread, so this is a safety cap rather than a tuning knob.
const MAX_OPTIMIZER_PASSES: usize = 64;

const IMPROVEMENT_EPSILON: f64 = 1e-9;

impl PlacementScheduler {
    /// Refine placements for a project by bounded pairwise swap search.
    ///
    /// Idempotent: re-running on inputs whose placement is already optimal
    /// returns the identical result.
    pub fn optimize_placements(
        &self,
        project_id: &str,
        workloads: &[WorkloadDemand],
        clusters: &[ClusterSupply],
    ) -> MigwaveResult<PlacementResult> {
        let baseline =
            self.calculate_placements(project_id, workloads, clusters, PlacementStrategy::Balanced)?;

        let demand_by_id: HashMap<&str, &WorkloadDemand> =
            workloads.iter().map(|w| (w.id.as_str(), w)).collect();

        let mut states = self.build_states(clusters);
        let index_by_cluster: HashMap<String, usize> = states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        // Re-apply the baseline assignments onto fresh state.
        let mut placed: Vec<(WorkloadDemand, usize)> = Vec::with_capacity(baseline.assignments.len());
        for assignment in &baseline.assignments {
            let demand = demand_by_id
                .get(assignment.workload_id.as_str())
                .ok_or_else(|| MigwaveError::Internal {
                    message: format!(
                        "assignment references unknown workload '{}'",
                        assignment.workload_id
                    ),
                })?;
            let index = index_by_cluster[&assignment.cluster_id];
            states[index].assign(demand);
            placed.push(((*demand).clone(), index));
        }

        let mut swaps = 0usize;
        for _pass in 0..MAX_OPTIMIZER_PASSES {
            let mut improved = false;

            for i in 0..placed.len() {
                for j in (i + 1)..placed.len() {
                    if placed[i].1 == placed[j].1 {
                        continue;
                    }
                    if try_swap(&mut states, &mut placed, i, j) {
                        improved = true;
                        swaps += 1;
                    }
                }
            }

            if !improved {
                break;
            }
        }

        tracing::info!(project_id, swaps, "placement optimization complete");

        // Rebuild assignments against the final state; a moved workload gets
        // a rationale naming the optimizer as the deciding step.
        let mut assignments = Vec::with_capacity(placed.len());
        for (assignment, (demand, index)) in baseline.assignments.iter().zip(placed.iter()) {
            let state = &states[*index];
            let mut updated = assignment.clone();
            if updated.cluster_id != state.id {
                updated.reason = format!(
                    "Rebalanced by optimizer: moved '{}' to cluster '{}' to reduce utilization spread",
                    demand.id, state.id
                );
                updated.cluster_id = state.id.clone();
                updated.cluster_name = state.name.clone();
            }
            assignments.push(updated);
        }

        Ok(self.finalize(
            states,
            assignments,
            baseline.unplaced,
            baseline.warnings,
            "Balanced (optimized)",
        ))
    }
}

/// Spread of mean utilization across all clusters in the run.
fn utilization_spread(states: &[ClusterState]) -> f64 {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for state in states {
        let mean = state.utilization().mean_percent();
        min = min.min(mean);
        max = max.max(mean);
    }
    if states.is_empty() {
        0.0
    } else {
        max - min
    }
}

/// True when moving `placed[mover]` onto `target` would put it next to
/// another member of its anti-affinity group (ignoring `departing`, which
/// leaves `target` in the same swap).
fn anti_affinity_conflict(
    placed: &[(WorkloadDemand, usize)],
    mover: usize,
    target: usize,
    departing: usize,
) -> bool {
    let group = match &placed[mover].0.anti_affinity_group {
        Some(group) => group,
        None => return false,
    };
    placed.iter().enumerate().any(|(k, (workload, cluster))| {
        k != mover
            && k != departing
            && *cluster == target
            && workload.anti_affinity_group.as_deref() == Some(group)
    })
}

/// Attempt one pairwise swap; returns true and keeps it only if it strictly
/// reduces the spread without making either cluster infeasible.
fn try_swap(
    states: &mut [ClusterState],
    placed: &mut [(WorkloadDemand, usize)],
    i: usize,
    j: usize,
) -> bool {
    let (ci, cj) = (placed[i].1, placed[j].1);

    // A swap must not reunite an anti-affinity group the initial pass
    // separated.
    if anti_affinity_conflict(placed, i, cj, j) || anti_affinity_conflict(placed, j, ci, i) {
        return false;
    }

    let before = utilization_spread(states);

    let demand_i = placed[i].0.clone();
    let demand_j = placed[j].0.clone();

    states[ci].unassign(&demand_i);
    states[cj].unassign(&demand_j);

    if !states[ci].fits(&demand_j) || !states[cj].fits(&demand_i) {
        states[ci].assign(&demand_i);
        states[cj].assign(&demand_j);
        return false;
    }

    states[ci].assign(&demand_j);
    states[cj].assign(&demand_i);

    let after = utilization_spread(states);
    if after + IMPROVEMENT_EPSILON < before {
        placed[i].1 = cj;
        placed[j].1 = ci;
        true
    } else {
        // Revert
        states[ci].unassign(&demand_j);
        states[cj].unassign(&demand_i);
        states[ci].assign(&demand_i);
        states[cj].assign(&demand_j);
        false
    }
}
