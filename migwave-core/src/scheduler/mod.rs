//! Placement scheduler: assigns workloads to clusters under the capacity
//! policy, using the capacity validator's arithmetic as its feasibility
//! oracle.
//!
//! One invocation is a single-threaded, deterministic pass: workloads are
//! ordered (critical first, then descending normalized demand, then id),
//! each is scored against every eligible cluster, and the winning cluster's
//! availability is decremented before the next workload is considered.

pub mod optimizer;
pub mod strategies;

use std::collections::{BTreeMap, HashMap};

use crate::capacity::CapacityPolicy;
use crate::error::MigwaveResult;
use crate::types::{
    ClusterSupply, ClusterUtilization, FeasibilityReport, PlacementAssignment, PlacementResult,
    PlacementSummary, ResourceKind, UnplacedWorkload, WorkloadDemand,
};

pub use strategies::PlacementStrategy;

/// Mutable per-run view of one cluster: effective capacity in demand units
/// and the demand allocated so far (existing consumers plus this run's
/// assignments).
#[derive(Debug, Clone)]
pub(crate) struct ClusterState {
    pub id: String,
    pub name: String,
    effective_cpu: f64,
    effective_memory: f64,
    effective_storage: f64,
    allocated_cpu: f64,
    allocated_memory: f64,
    allocated_storage: f64,
    pub assigned_count: usize,
}

impl ClusterState {
    fn from_supply(supply: &ClusterSupply, policy: &CapacityPolicy) -> Self {
        Self {
            id: supply.id.clone(),
            name: supply.name.clone(),
            effective_cpu: policy.effective_capacity(supply, ResourceKind::Cpu),
            effective_memory: policy.effective_capacity(supply, ResourceKind::Memory),
            effective_storage: policy.effective_capacity(supply, ResourceKind::Storage),
            allocated_cpu: policy.allocated_demand(supply, ResourceKind::Cpu),
            allocated_memory: policy.allocated_demand(supply, ResourceKind::Memory),
            allocated_storage: policy.allocated_demand(supply, ResourceKind::Storage),
            assigned_count: 0,
        }
    }

    fn capacity(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Cpu => self.effective_cpu,
            ResourceKind::Memory => self.effective_memory,
            ResourceKind::Storage => self.effective_storage,
        }
    }

    fn allocated(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Cpu => self.allocated_cpu,
            ResourceKind::Memory => self.allocated_memory,
            ResourceKind::Storage => self.allocated_storage,
        }
    }

    fn demand_of(demand: &WorkloadDemand, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Cpu => demand.cpu_cores,
            ResourceKind::Memory => demand.memory_gb,
            ResourceKind::Storage => demand.storage_gb,
        }
    }

    fn utilization_percent(&self, kind: ResourceKind) -> f64 {
        let capacity = self.capacity(kind);
        if capacity > 0.0 {
            self.allocated(kind) / capacity * 100.0
        } else if self.allocated(kind) > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn post_utilization_percent(&self, demand: &WorkloadDemand, kind: ResourceKind) -> f64 {
        let capacity = self.capacity(kind);
        if capacity > 0.0 {
            (self.allocated(kind) + Self::demand_of(demand, kind)) / capacity * 100.0
        } else {
            f64::INFINITY
        }
    }

    /// First resource that would exceed effective capacity, if any.
    /// `None` means the cluster is eligible for this workload.
    pub(crate) fn limiting_resource(&self, demand: &WorkloadDemand) -> Option<ResourceKind> {
        [ResourceKind::Cpu, ResourceKind::Memory, ResourceKind::Storage]
            .into_iter()
            .find(|&kind| self.post_utilization_percent(demand, kind) > 100.0)
    }

    pub(crate) fn fits(&self, demand: &WorkloadDemand) -> bool {
        self.limiting_resource(demand).is_none()
    }

    /// Worst current utilization across the three resources.
    pub(crate) fn max_utilization(&self) -> f64 {
        self.utilization()
            .max_percent()
    }

    /// Worst utilization across resources after tentatively adding `demand`.
    pub(crate) fn max_post_utilization(&self, demand: &WorkloadDemand) -> f64 {
        [ResourceKind::Cpu, ResourceKind::Memory, ResourceKind::Storage]
            .into_iter()
            .map(|kind| self.post_utilization_percent(demand, kind))
            .fold(0.0, f64::max)
    }

    /// Total leftover headroom fraction after tentatively adding `demand`.
    /// Smaller means a tighter fit.
    pub(crate) fn leftover_headroom(&self, demand: &WorkloadDemand) -> f64 {
        [ResourceKind::Cpu, ResourceKind::Memory, ResourceKind::Storage]
            .into_iter()
            .map(|kind| {
                let capacity = self.capacity(kind);
                if capacity > 0.0 {
                    (capacity - self.allocated(kind) - Self::demand_of(demand, kind)) / capacity
                } else {
                    0.0
                }
            })
            .sum()
    }

    pub(crate) fn assign(&mut self, demand: &WorkloadDemand) {
        self.allocated_cpu += demand.cpu_cores;
        self.allocated_memory += demand.memory_gb;
        self.allocated_storage += demand.storage_gb;
        self.assigned_count += 1;
    }

    pub(crate) fn unassign(&mut self, demand: &WorkloadDemand) {
        self.allocated_cpu -= demand.cpu_cores;
        self.allocated_memory -= demand.memory_gb;
        self.allocated_storage -= demand.storage_gb;
        self.assigned_count = self.assigned_count.saturating_sub(1);
    }

    pub(crate) fn utilization(&self) -> ClusterUtilization {
        ClusterUtilization {
            cpu_percent: self.utilization_percent(ResourceKind::Cpu),
            memory_percent: self.utilization_percent(ResourceKind::Memory),
            storage_percent: self.utilization_percent(ResourceKind::Storage),
        }
    }
}

/// Cluster ids already hosting each affinity/anti-affinity group, updated as
/// the run commits assignments.
#[derive(Debug, Default)]
struct GroupSites {
    affinity: HashMap<String, Vec<String>>,
    anti_affinity: HashMap<String, Vec<String>>,
}

impl GroupSites {
    fn record(&mut self, demand: &WorkloadDemand, cluster_id: &str) {
        if let Some(group) = &demand.affinity_group {
            self.affinity
                .entry(group.clone())
                .or_default()
                .push(cluster_id.to_string());
        }
        if let Some(group) = &demand.anti_affinity_group {
            self.anti_affinity
                .entry(group.clone())
                .or_default()
                .push(cluster_id.to_string());
        }
    }

    /// Clusters the workload must not land on.
    fn excluded_for(&self, demand: &WorkloadDemand) -> Option<&Vec<String>> {
        demand
            .anti_affinity_group
            .as_ref()
            .and_then(|group| self.anti_affinity.get(group))
    }

    /// Clusters already hosting the workload's affinity group.
    fn preferred_for(&self, demand: &WorkloadDemand) -> Option<&Vec<String>> {
        demand
            .affinity_group
            .as_ref()
            .and_then(|group| self.affinity.get(group))
    }
}

/// Aggregate cluster totals used to normalize workload demand for ordering.
#[derive(Debug, Clone, Copy)]
struct AggregateTotals {
    cpu: f64,
    memory: f64,
    storage: f64,
}

impl AggregateTotals {
    fn of(clusters: &[ClusterSupply]) -> Self {
        Self {
            cpu: clusters.iter().map(|c| c.total_cpu_cores).sum::<f64>().max(1.0),
            memory: clusters.iter().map(|c| c.total_memory_gb).sum::<f64>().max(1.0),
            storage: clusters.iter().map(|c| c.total_storage_gb).sum::<f64>().max(1.0),
        }
    }

    /// Scale-free demand size: each resource weighted equally against the
    /// aggregate capacity on offer.
    fn normalized_demand(&self, demand: &WorkloadDemand) -> f64 {
        demand.cpu_cores / self.cpu
            + demand.memory_gb / self.memory
            + demand.storage_gb / self.storage
    }
}

/// Placement scheduler. Stateless apart from the capacity policy; every
/// invocation works on its own copy of the supply records.
#[derive(Debug, Clone)]
pub struct PlacementScheduler {
    policy: CapacityPolicy,
}

impl Default for PlacementScheduler {
    fn default() -> Self {
        Self::new(CapacityPolicy::default())
    }
}

impl PlacementScheduler {
    pub fn new(policy: CapacityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CapacityPolicy {
        &self.policy
    }

    /// Assign every workload to the best-scoring eligible cluster.
    ///
    /// Fails with `InvalidInput` before any computation if a demand or supply
    /// record is malformed; individual workloads that fit nowhere are
    /// reported in `unplaced`, never as a call failure.
    pub fn calculate_placements(
        &self,
        project_id: &str,
        workloads: &[WorkloadDemand],
        clusters: &[ClusterSupply],
        strategy: PlacementStrategy,
    ) -> MigwaveResult<PlacementResult> {
        self.validate_inputs(workloads, clusters)?;

        let mut states = self.build_states(clusters);
        let ordered = self.order_workloads(workloads, clusters);

        let mut assignments = Vec::new();
        let mut unplaced = Vec::new();
        let mut warnings = Vec::new();
        let mut sites = GroupSites::default();

        for demand in &ordered {
            match self.place_one(&mut states, demand, strategy, &sites) {
                Some(assignment) => {
                    tracing::debug!(
                        project_id,
                        workload = %demand.id,
                        cluster = %assignment.cluster_id,
                        "placed workload"
                    );
                    sites.record(demand, &assignment.cluster_id);
                    assignments.push(assignment);
                }
                None => {
                    let reason = self.unplaced_reason(&states, demand, &sites);
                    tracing::warn!(project_id, workload = %demand.id, %reason, "workload unplaced");
                    warnings.push(format!(
                        "Unable to place workload '{}' ({:.0}C/{:.0}GB/{:.0}GB): {}",
                        demand.name, demand.cpu_cores, demand.memory_gb, demand.storage_gb, reason
                    ));
                    unplaced.push(UnplacedWorkload {
                        workload_id: demand.id.clone(),
                        reason,
                    });
                }
            }
        }

        let result = self.finalize(states, assignments, unplaced, warnings, strategy.name());
        tracing::info!(
            project_id,
            placed = result.summary.placed,
            unplaced = result.summary.unplaced,
            strategy = strategy.name(),
            "placement run complete"
        );
        Ok(result)
    }

    /// Validate-only variant: runs the identical algorithm on scratch state
    /// and reports feasibility plus warnings; supply records are untouched.
    pub fn validate_placements(
        &self,
        workloads: &[WorkloadDemand],
        clusters: &[ClusterSupply],
        strategy: PlacementStrategy,
    ) -> MigwaveResult<FeasibilityReport> {
        let result = self.calculate_placements("validate-only", workloads, clusters, strategy)?;
        Ok(FeasibilityReport {
            is_feasible: result.unplaced.is_empty(),
            warnings: result.warnings,
        })
    }

    fn validate_inputs(
        &self,
        workloads: &[WorkloadDemand],
        clusters: &[ClusterSupply],
    ) -> MigwaveResult<()> {
        self.policy.validate()?;
        for demand in workloads {
            demand.validate()?;
        }
        for supply in clusters {
            supply.validate()?;
        }
        Ok(())
    }

    fn build_states(&self, clusters: &[ClusterSupply]) -> Vec<ClusterState> {
        let mut states: Vec<ClusterState> = clusters
            .iter()
            .map(|supply| ClusterState::from_supply(supply, &self.policy))
            .collect();
        states.sort_by(|a, b| a.id.cmp(&b.id));
        states
    }

    fn order_workloads(
        &self,
        workloads: &[WorkloadDemand],
        clusters: &[ClusterSupply],
    ) -> Vec<WorkloadDemand> {
        let totals = AggregateTotals::of(clusters);
        let mut ordered = workloads.to_vec();
        ordered.sort_by(|a, b| {
            b.is_critical
                .cmp(&a.is_critical)
                .then_with(|| {
                    totals
                        .normalized_demand(b)
                        .partial_cmp(&totals.normalized_demand(a))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        ordered
    }

    fn place_one(
        &self,
        states: &mut [ClusterState],
        demand: &WorkloadDemand,
        strategy: PlacementStrategy,
        sites: &GroupSites,
    ) -> Option<PlacementAssignment> {
        let mut candidates: Vec<usize> = states
            .iter()
            .enumerate()
            .filter(|(_, state)| state.fits(demand))
            .map(|(index, _)| index)
            .collect();

        // Anti-affinity is a hard constraint: never share a cluster with
        // the same group.
        if let Some(excluded) = sites.excluded_for(demand) {
            candidates.retain(|&index| !excluded.contains(&states[index].id));
        }

        // Affinity is a preference: narrow to clusters already hosting the
        // group, but only when at least one of them still fits.
        if let Some(preferred) = sites.preferred_for(demand) {
            let co_located: Vec<usize> = candidates
                .iter()
                .filter(|&&index| preferred.contains(&states[index].id))
                .copied()
                .collect();
            if !co_located.is_empty() {
                candidates = co_located;
            }
        }

        let best = candidates
            .into_iter()
            .min_by(|&a, &b| {
                strategy
                    .score(&states[a], demand)
                    .partial_cmp(&strategy.score(&states[b], demand))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| states[a].id.cmp(&states[b].id))
            })?;

        let score = strategy.score(&states[best], demand);
        states[best].assign(demand);

        Some(PlacementAssignment {
            workload_id: demand.id.clone(),
            workload_name: demand.name.clone(),
            cluster_id: states[best].id.clone(),
            cluster_name: states[best].name.clone(),
            reason: format!(
                "{} strategy selected cluster '{}': {}",
                strategy.name(),
                states[best].id,
                strategy.deciding_metric(score)
            ),
            consumed_cpu_cores: demand.cpu_cores / self.policy.cpu_overcommit,
            consumed_memory_gb: demand.memory_gb / self.policy.memory_overcommit,
            consumed_storage_gb: demand.storage_gb,
        })
    }

    /// Name the resource that blocks placement on the largest number of
    /// clusters; deterministic across runs.
    fn unplaced_reason(
        &self,
        states: &[ClusterState],
        demand: &WorkloadDemand,
        sites: &GroupSites,
    ) -> String {
        if states.is_empty() {
            return "no candidate clusters were offered".to_string();
        }

        // If capacity alone would have admitted the workload, the blocker
        // was the anti-affinity rule.
        if let (Some(group), Some(excluded)) =
            (&demand.anti_affinity_group, sites.excluded_for(demand))
        {
            if states
                .iter()
                .any(|state| state.fits(demand) && excluded.contains(&state.id))
                && !states
                    .iter()
                    .any(|state| state.fits(demand) && !excluded.contains(&state.id))
            {
                return format!(
                    "every cluster with headroom already hosts anti-affinity group '{}'",
                    group
                );
            }
        }

        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for state in states {
            if let Some(kind) = state.limiting_resource(demand) {
                let label = match kind {
                    ResourceKind::Cpu => "CPU",
                    ResourceKind::Memory => "memory",
                    ResourceKind::Storage => "storage",
                };
                *counts.entry(label).or_insert(0) += 1;
            }
        }

        match counts.iter().max_by_key(|(_, &count)| count) {
            Some((label, _)) => format!("no cluster has sufficient {} headroom", label),
            None => "no cluster has sufficient headroom".to_string(),
        }
    }

    fn finalize(
        &self,
        states: Vec<ClusterState>,
        assignments: Vec<PlacementAssignment>,
        unplaced: Vec<UnplacedWorkload>,
        warnings: Vec<String>,
        strategy_used: &str,
    ) -> PlacementResult {
        let cluster_utilization: BTreeMap<String, ClusterUtilization> = states
            .iter()
            .map(|state| (state.id.clone(), state.utilization()))
            .collect();

        let used: Vec<&ClusterState> = states.iter().filter(|s| s.assigned_count > 0).collect();
        let clusters_used = used.len();
        let average_utilization_percent = if clusters_used > 0 {
            used.iter().map(|s| s.utilization().mean_percent()).sum::<f64>() / clusters_used as f64
        } else {
            0.0
        };

        let summary = PlacementSummary {
            total_workloads: assignments.len() + unplaced.len(),
            placed: assignments.len(),
            unplaced: unplaced.len(),
            clusters_used,
            average_utilization_percent,
            strategy_used: strategy_used.to_string(),
        };

        PlacementResult {
            assignments,
            unplaced,
            cluster_utilization,
            warnings,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand(id: &str, cpu: f64, mem: f64, storage: f64, critical: bool) -> WorkloadDemand {
        WorkloadDemand {
            id: id.to_string(),
            name: id.to_uppercase(),
            cpu_cores: cpu,
            memory_gb: mem,
            storage_gb: storage,
            is_critical: critical,
            affinity_group: None,
            anti_affinity_group: None,
        }
    }

    fn grouped(
        id: &str,
        cpu: f64,
        affinity: Option<&str>,
        anti_affinity: Option<&str>,
    ) -> WorkloadDemand {
        WorkloadDemand {
            affinity_group: affinity.map(str::to_string),
            anti_affinity_group: anti_affinity.map(str::to_string),
            ..demand(id, cpu, 8.0, 50.0, false)
        }
    }

    fn cluster(id: &str, cpu: f64, mem: f64, storage: f64) -> ClusterSupply {
        ClusterSupply {
            id: id.to_string(),
            name: id.to_uppercase(),
            host_count: 4,
            total_cpu_cores: cpu,
            total_memory_gb: mem,
            total_storage_gb: storage,
            available_cpu_cores: cpu,
            available_memory_gb: mem,
            available_storage_gb: storage,
        }
    }

    fn strict_policy() -> CapacityPolicy {
        CapacityPolicy {
            cpu_overcommit: 1.0,
            memory_overcommit: 1.0,
            growth_buffer_percent: 0.0,
            target_utilization_percent: 80.0,
            ha_reserved_hosts: 0,
        }
    }

    #[test]
    fn test_critical_workloads_placed_first() {
        let scheduler = PlacementScheduler::new(strict_policy());
        // Only one slot; the critical workload must win it even though it is
        // smaller and later in the input order.
        let workloads = vec![
            demand("big", 8.0, 32.0, 200.0, false),
            demand("crit", 2.0, 8.0, 50.0, true),
        ];
        let clusters = vec![cluster("c1", 8.0, 32.0, 200.0)];
        let result = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Balanced)
            .unwrap();

        assert_eq!(result.assignments[0].workload_id, "crit");
        assert_eq!(result.summary.unplaced, 1);
        assert_eq!(result.unplaced[0].workload_id, "big");
    }

    #[test]
    fn test_invalid_demand_rejects_whole_call() {
        let scheduler = PlacementScheduler::new(strict_policy());
        let workloads = vec![
            demand("ok", 2.0, 8.0, 50.0, false),
            demand("bad", -1.0, 8.0, 50.0, false),
        ];
        let clusters = vec![cluster("c1", 32.0, 128.0, 1000.0)];
        let err = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Balanced)
            .unwrap_err();
        assert!(matches!(err, crate::error::MigwaveError::InvalidInput { .. }));
    }

    #[test]
    fn test_zero_overcommit_policy_rejects_whole_call() {
        let policy = CapacityPolicy {
            cpu_overcommit: 0.0,
            ..strict_policy()
        };
        let scheduler = PlacementScheduler::new(policy);
        let workloads = vec![demand("ok", 2.0, 8.0, 50.0, false)];
        let clusters = vec![cluster("c1", 32.0, 128.0, 1000.0)];
        let err = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Balanced)
            .unwrap_err();
        assert!(
            matches!(err, crate::error::MigwaveError::InvalidInput { ref field, .. } if field == "cpu_overcommit")
        );
    }

    #[test]
    fn test_no_double_assignment() {
        let scheduler = PlacementScheduler::new(strict_policy());
        let workloads: Vec<_> = (0..10)
            .map(|i| demand(&format!("vm{:02}", i), 2.0, 8.0, 50.0, i % 3 == 0))
            .collect();
        let clusters = vec![
            cluster("c1", 16.0, 64.0, 500.0),
            cluster("c2", 16.0, 64.0, 500.0),
        ];
        let result = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Consolidate)
            .unwrap();

        let mut seen = std::collections::HashSet::new();
        for assignment in &result.assignments {
            assert!(seen.insert(assignment.workload_id.clone()));
        }
    }

    #[test]
    fn test_performance_strategy_spreads_load() {
        let scheduler = PlacementScheduler::new(strict_policy());
        let workloads = vec![
            demand("vm1", 4.0, 16.0, 100.0, false),
            demand("vm2", 4.0, 16.0, 100.0, false),
        ];
        let clusters = vec![
            cluster("c1", 16.0, 64.0, 500.0),
            cluster("c2", 16.0, 64.0, 500.0),
        ];
        let result = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Performance)
            .unwrap();

        assert_eq!(result.summary.clusters_used, 2);
    }

    #[test]
    fn test_consolidate_strategy_packs_one_cluster() {
        let scheduler = PlacementScheduler::new(strict_policy());
        let workloads = vec![
            demand("vm1", 4.0, 16.0, 100.0, false),
            demand("vm2", 4.0, 16.0, 100.0, false),
        ];
        let clusters = vec![
            cluster("c1", 16.0, 64.0, 500.0),
            cluster("c2", 32.0, 128.0, 1000.0),
        ];
        let result = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Consolidate)
            .unwrap();

        assert_eq!(result.summary.clusters_used, 1);
        assert!(result.assignments.iter().all(|a| a.cluster_id == "c1"));
    }

    #[test]
    fn test_saturated_clusters_report_limiting_resource() {
        let scheduler = PlacementScheduler::new(strict_policy());
        let mut a = cluster("a", 16.0, 64.0, 500.0);
        a.available_cpu_cores = 0.0;
        a.available_memory_gb = 0.0;
        a.available_storage_gb = 0.0;
        let mut b = cluster("b", 16.0, 64.0, 500.0);
        b.available_cpu_cores = 0.0;
        b.available_memory_gb = 0.0;
        b.available_storage_gb = 0.0;

        let workloads = vec![demand("vm1", 1.0, 1.0, 1.0, false)];
        let result = scheduler
            .calculate_placements("p1", &workloads, &[a, b], PlacementStrategy::Balanced)
            .unwrap();

        assert_eq!(result.summary.placed, 0);
        assert_eq!(result.unplaced.len(), 1);
        assert!(result.unplaced[0].reason.contains("CPU"));
    }

    #[test]
    fn test_anti_affinity_never_shares_a_cluster() {
        let scheduler = PlacementScheduler::new(strict_policy());
        // Consolidate would pack both onto c1; the anti-affinity group
        // forces them apart.
        let workloads = vec![
            grouped("vm1", 2.0, None, Some("db")),
            grouped("vm2", 2.0, None, Some("db")),
        ];
        let clusters = vec![
            cluster("c1", 16.0, 64.0, 500.0),
            cluster("c2", 16.0, 64.0, 500.0),
        ];
        let result = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Consolidate)
            .unwrap();

        assert_eq!(result.summary.placed, 2);
        assert_ne!(
            result.assignments[0].cluster_id,
            result.assignments[1].cluster_id
        );
    }

    #[test]
    fn test_anti_affinity_exhaustion_reports_the_group() {
        let scheduler = PlacementScheduler::new(strict_policy());
        let workloads = vec![
            grouped("vm1", 2.0, None, Some("db")),
            grouped("vm2", 2.0, None, Some("db")),
        ];
        let clusters = vec![cluster("c1", 16.0, 64.0, 500.0)];
        let result = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Balanced)
            .unwrap();

        assert_eq!(result.summary.placed, 1);
        assert_eq!(result.unplaced.len(), 1);
        assert!(result.unplaced[0].reason.contains("anti-affinity group 'db'"));
    }

    #[test]
    fn test_affinity_co_locates_against_spreading_strategy() {
        let scheduler = PlacementScheduler::new(strict_policy());
        // Performance alone would spread these across the empty clusters.
        let workloads = vec![
            grouped("vm1", 2.0, Some("web"), None),
            grouped("vm2", 2.0, Some("web"), None),
            grouped("vm3", 2.0, Some("web"), None),
        ];
        let clusters = vec![
            cluster("c1", 16.0, 64.0, 500.0),
            cluster("c2", 16.0, 64.0, 500.0),
        ];
        let result = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Performance)
            .unwrap();

        let first = &result.assignments[0].cluster_id;
        assert!(result.assignments.iter().all(|a| &a.cluster_id == first));
    }

    #[test]
    fn test_affinity_falls_back_when_preferred_cluster_is_full() {
        let scheduler = PlacementScheduler::new(strict_policy());
        let workloads = vec![
            grouped("vm1", 10.0, Some("web"), None),
            grouped("vm2", 10.0, Some("web"), None),
        ];
        let clusters = vec![
            cluster("c1", 12.0, 64.0, 500.0),
            cluster("c2", 12.0, 64.0, 500.0),
        ];
        let result = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Balanced)
            .unwrap();

        // Co-location is impossible; the preference must not strand vm2.
        assert_eq!(result.summary.placed, 2);
        assert_ne!(
            result.assignments[0].cluster_id,
            result.assignments[1].cluster_id
        );
    }

    #[test]
    fn test_validate_matches_calculate() {
        let scheduler = PlacementScheduler::new(strict_policy());
        let workloads = vec![
            demand("vm1", 4.0, 16.0, 100.0, false),
            demand("vm2", 30.0, 16.0, 100.0, false),
        ];
        let clusters = vec![cluster("c1", 16.0, 64.0, 500.0)];

        let report = scheduler
            .validate_placements(&workloads, &clusters, PlacementStrategy::Balanced)
            .unwrap();
        let result = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Balanced)
            .unwrap();

        assert_eq!(report.is_feasible, result.unplaced.is_empty());
        assert!(!report.is_feasible);
    }

    #[test]
    fn test_determinism() {
        let scheduler = PlacementScheduler::new(CapacityPolicy::moderate());
        let workloads: Vec<_> = (0..20)
            .map(|i| {
                demand(
                    &format!("vm{:02}", i),
                    1.0 + (i % 5) as f64,
                    4.0 * (1 + i % 4) as f64,
                    50.0 * (1 + i % 3) as f64,
                    i % 7 == 0,
                )
            })
            .collect();
        let clusters = vec![
            cluster("c1", 24.0, 96.0, 800.0),
            cluster("c2", 24.0, 96.0, 800.0),
            cluster("c3", 48.0, 192.0, 1600.0),
        ];

        let first = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Balanced)
            .unwrap();
        let second = scheduler
            .calculate_placements("p1", &workloads, &clusters, PlacementStrategy::Balanced)
            .unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
