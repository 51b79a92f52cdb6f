//! Orchestration of plan lifecycle: creation with capacity checks,
//! project-wide dependency validation, and the hardware timeline.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capacity::{validate_capacity, CapacityPolicy, CapacityValidationResult, ResourceStatus};
use crate::dependency_graph::{DependencyGraph, DependencyValidationResult};
use crate::error::{MigwaveError, MigwaveResult};
use crate::plan::{
    ClusterMigrationPlan, MigrationStrategy, PlanValidationStatus, StrategyRequest,
};
use crate::plan_store::PlanStore;
use crate::types::{ClusterSupply, WorkloadDemand};

/// Per-project mutual exclusion for planning passes. Two concurrent passes
/// over the same project would race on plan validation statuses.
#[derive(Clone, Default)]
pub struct ProjectLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the project lock, or fail fast if a pass is already running.
    pub fn acquire(&self, project_id: &str) -> MigwaveResult<ProjectLockGuard> {
        let mut active = self.active.lock();
        if !active.insert(project_id.to_string()) {
            return Err(MigwaveError::PlanningInProgress {
                project_id: project_id.to_string(),
            });
        }
        Ok(ProjectLockGuard {
            locks: Arc::clone(&self.active),
            project_id: project_id.to_string(),
        })
    }
}

/// Releases the project lock on drop.
pub struct ProjectLockGuard {
    locks: Arc<Mutex<HashSet<String>>>,
    project_id: String,
}

impl Drop for ProjectLockGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.project_id);
    }
}

/// One step of the hardware timeline: where each plan's hardware comes from,
/// in safe execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareTimelineEntry {
    pub step: usize,
    pub plan_id: String,
    pub target_cluster: String,
    pub hardware_source: String,
}

/// Coordinates the plan store, capacity checks, and dependency validation.
pub struct MigrationPlanner {
    store: PlanStore,
    locks: ProjectLocks,
    policy: CapacityPolicy,
}

impl MigrationPlanner {
    pub fn new(store: PlanStore) -> Self {
        Self {
            store,
            locks: ProjectLocks::new(),
            policy: CapacityPolicy::default(),
        }
    }

    pub fn with_policy(store: PlanStore, policy: CapacityPolicy) -> Self {
        Self {
            store,
            locks: ProjectLocks::new(),
            policy,
        }
    }

    pub fn store(&self) -> &PlanStore {
        &self.store
    }

    /// Create a plan from a strategy request. For the existing-free-hardware
    /// strategy the target cluster is capacity-checked up front; a Critical
    /// result marks the plan Invalid but still persists it, so the caller
    /// can inspect the numbers and revise.
    pub fn create_cluster_plan(
        &self,
        project_id: &str,
        target_cluster: &ClusterSupply,
        workloads: &[WorkloadDemand],
        request: StrategyRequest,
    ) -> MigwaveResult<(ClusterMigrationPlan, Option<CapacityValidationResult>)> {
        let _guard = self.locks.acquire(project_id)?;

        self.policy.validate()?;
        let strategy = request.into_strategy()?;
        target_cluster.validate()?;
        for workload in workloads {
            workload.validate()?;
        }
        if let MigrationStrategy::Domino { source_cluster } = &strategy {
            if source_cluster == &target_cluster.id {
                return Err(MigwaveError::invalid_input(
                    "domino_source_cluster",
                    "a plan cannot source hardware from its own target cluster",
                ));
            }
        }

        let workload_ids = workloads.iter().map(|w| w.id.clone()).collect();
        let mut plan =
            ClusterMigrationPlan::new(project_id, &target_cluster.id, strategy, workload_ids);

        let capacity = match &plan.strategy {
            MigrationStrategy::ExistingFreeHardware => {
                let result = validate_capacity(target_cluster, workloads, &self.policy);
                plan.validation_status = match result.status {
                    ResourceStatus::Validated => PlanValidationStatus::Valid,
                    ResourceStatus::Warning => PlanValidationStatus::Warning,
                    ResourceStatus::Critical => PlanValidationStatus::Invalid,
                };
                if plan.validation_status == PlanValidationStatus::Invalid {
                    warn!(
                        plan_id = %plan.id,
                        cluster_id = %target_cluster.id,
                        "existing hardware cannot absorb the planned workloads"
                    );
                }
                Some(result)
            }
            // Hardware that does not exist yet cannot be capacity-checked.
            _ => None,
        };

        self.store.create_plan(&plan)?;
        info!(
            plan_id = %plan.id,
            project_id,
            target_cluster = %target_cluster.id,
            strategy = %plan.strategy.kind(),
            "created cluster migration plan"
        );
        Ok((plan, capacity))
    }

    /// Validate the dependency graph across all of a project's plans and
    /// write the outcome back onto each plan's validation status.
    pub fn validate_dependencies(
        &self,
        project_id: &str,
    ) -> MigwaveResult<DependencyValidationResult> {
        let _guard = self.locks.acquire(project_id)?;

        let plans = self.store.list_plans(project_id)?;
        let result = DependencyGraph::build(&plans).validate();

        let cyclic: HashSet<&str> = result
            .circular_dependencies
            .iter()
            .flat_map(|c| c.cycle.iter().map(String::as_str))
            .collect();

        for plan in &plans {
            let status = if cyclic.contains(plan.id.as_str()) {
                PlanValidationStatus::Invalid
            } else if plan.validation_status == PlanValidationStatus::NotValidated {
                if result
                    .warnings
                    .iter()
                    .any(|w| w.contains(plan.id.as_str()))
                {
                    PlanValidationStatus::Warning
                } else {
                    PlanValidationStatus::Valid
                }
            } else {
                // Capacity-derived statuses stand; dependency validation
                // only overrides them for plans on a cycle.
                plan.validation_status
            };

            if status != plan.validation_status {
                let mut updated = plan.clone();
                updated.validation_status = status;
                self.store.update_plan(&updated)?;
            }
        }

        debug!(
            project_id,
            is_valid = result.is_valid,
            plans = plans.len(),
            "dependency validation written back to plans"
        );
        Ok(result)
    }

    /// Hardware sourcing timeline in safe execution order. Fails while the
    /// project's dependency graph has a cycle.
    pub fn hardware_timeline(
        &self,
        project_id: &str,
    ) -> MigwaveResult<Vec<HardwareTimelineEntry>> {
        let plans = self.store.list_plans(project_id)?;
        let result = DependencyGraph::build(&plans).validate();
        if !result.is_valid {
            let cycles: Vec<&str> = result
                .circular_dependencies
                .iter()
                .map(|c| c.description.as_str())
                .collect();
            return Err(MigwaveError::SchedulingError {
                message: format!(
                    "cannot build a hardware timeline: {}",
                    cycles.join("; ")
                ),
            });
        }

        let timeline = result
            .execution_order
            .iter()
            .enumerate()
            .filter_map(|(index, plan_id)| {
                plans.iter().find(|p| &p.id == plan_id).map(|plan| {
                    let hardware_source = match &plan.strategy {
                        MigrationStrategy::ExistingFreeHardware => {
                            format!("free capacity on cluster '{}'", plan.target_cluster)
                        }
                        MigrationStrategy::NewHardwareProcurement {
                            hardware_basket_id,
                            procurement_order_id,
                        } => format!(
                            "procurement order '{}' (basket '{}')",
                            procurement_order_id, hardware_basket_id
                        ),
                        MigrationStrategy::Domino { source_cluster } => {
                            format!("hardware freed from cluster '{}'", source_cluster)
                        }
                    };
                    HardwareTimelineEntry {
                        step: index + 1,
                        plan_id: plan.id.clone(),
                        target_cluster: plan.target_cluster.clone(),
                        hardware_source,
                    }
                })
            })
            .collect();

        Ok(timeline)
    }

    /// Delete a plan, subject to the store's domino-dependent check.
    pub fn delete_plan(&self, plan_id: &str) -> MigwaveResult<()> {
        self.store.delete_plan(plan_id)
    }
}
