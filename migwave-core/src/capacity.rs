//! Capacity validation under overcommit, growth-buffer, and HA policies.
//!
//! Everything here is side-effect free: the validator can be called
//! repeatedly for what-if checks without touching the supply records. The
//! placement scheduler uses the same arithmetic (via [`CapacityPolicy`]) as
//! its per-assignment feasibility oracle, so a validate-only pass and a
//! committing pass always agree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigwaveError, MigwaveResult};
use crate::types::{ClusterSupply, ResourceKind, WorkloadDemand};

/// Graded outcome for a single resource. Ordering is severity:
/// `Critical > Warning > Validated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Projected utilization is at or below the target
    Validated,
    /// Above target but still fits within effective capacity
    Warning,
    /// Does not fit even after overcommit
    Critical,
}

/// Overcommit and reservation policy applied when judging cluster headroom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityPolicy {
    /// CPU overcommit ratio (e.g. 2.0 = allow 2x CPU allocation)
    pub cpu_overcommit: f64,
    /// Memory overcommit ratio (e.g. 1.2 = allow 20% memory overcommit)
    pub memory_overcommit: f64,
    /// Capacity held back for future growth, in percent of effective capacity
    pub growth_buffer_percent: f64,
    /// Utilization above this is graded Warning instead of Validated
    pub target_utilization_percent: f64,
    /// Number of host failures the cluster must tolerate (N+1, N+2, ...).
    ///
    /// Clusters with `host_count <= ha_reserved_hosts` cannot honour the
    /// reservation at all, so their entire capacity is held back and every
    /// non-empty demand set is graded Critical. Set this to 0 to place onto
    /// single-host clusters.
    pub ha_reserved_hosts: u32,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self::moderate()
    }
}

impl CapacityPolicy {
    /// No overcommit, generous growth buffer, N+1 tolerance.
    pub fn conservative() -> Self {
        Self {
            cpu_overcommit: 1.0,
            memory_overcommit: 1.0,
            growth_buffer_percent: 20.0,
            target_utilization_percent: 70.0,
            ha_reserved_hosts: 1,
        }
    }

    /// Common virtualization defaults: 2x CPU, 20% memory overcommit, N+1.
    pub fn moderate() -> Self {
        Self {
            cpu_overcommit: 2.0,
            memory_overcommit: 1.2,
            growth_buffer_percent: 10.0,
            target_utilization_percent: 80.0,
            ha_reserved_hosts: 1,
        }
    }

    /// Dense consolidation: 4x CPU, 50% memory overcommit, no HA reserve.
    pub fn aggressive() -> Self {
        Self {
            cpu_overcommit: 4.0,
            memory_overcommit: 1.5,
            growth_buffer_percent: 0.0,
            target_utilization_percent: 90.0,
            ha_reserved_hosts: 0,
        }
    }

    /// Reject policies whose arithmetic cannot produce meaningful results.
    /// Called at every planning entry point before any computation.
    pub fn validate(&self) -> MigwaveResult<()> {
        for (field, value) in [
            ("cpu_overcommit", self.cpu_overcommit),
            ("memory_overcommit", self.memory_overcommit),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MigwaveError::invalid_input(
                    field,
                    format!("overcommit ratio must be positive, got {}", value),
                ));
            }
        }
        if !self.growth_buffer_percent.is_finite()
            || self.growth_buffer_percent < 0.0
            || self.growth_buffer_percent >= 100.0
        {
            return Err(MigwaveError::invalid_input(
                "growth_buffer_percent",
                format!(
                    "growth buffer must be in [0, 100), got {}",
                    self.growth_buffer_percent
                ),
            ));
        }
        if !self.target_utilization_percent.is_finite()
            || self.target_utilization_percent <= 0.0
            || self.target_utilization_percent > 100.0
        {
            return Err(MigwaveError::invalid_input(
                "target_utilization_percent",
                format!(
                    "target utilization must be in (0, 100], got {}",
                    self.target_utilization_percent
                ),
            ));
        }
        Ok(())
    }

    /// Overcommit ratio for a resource. Storage is never overcommitted.
    pub fn overcommit_for(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Cpu => self.cpu_overcommit,
            ResourceKind::Memory => self.memory_overcommit,
            ResourceKind::Storage => 1.0,
        }
    }

    /// Fraction of total capacity reserved for HA failover.
    ///
    /// A cluster too small to honour the reservation keeps nothing usable:
    /// a single host cannot satisfy an N+1 policy.
    pub fn ha_fraction(&self, host_count: u32) -> f64 {
        if self.ha_reserved_hosts == 0 {
            0.0
        } else if host_count > self.ha_reserved_hosts {
            self.ha_reserved_hosts as f64 / host_count as f64
        } else {
            1.0
        }
    }

    /// Effective capacity of one resource in demand units:
    /// `total × overcommit × (1 − ha) × (1 − growth_buffer)`.
    pub fn effective_capacity(&self, supply: &ClusterSupply, kind: ResourceKind) -> f64 {
        let total = match kind {
            ResourceKind::Cpu => supply.total_cpu_cores,
            ResourceKind::Memory => supply.total_memory_gb,
            ResourceKind::Storage => supply.total_storage_gb,
        };
        let growth_factor = 1.0 - self.growth_buffer_percent / 100.0;
        total * self.overcommit_for(kind) * (1.0 - self.ha_fraction(supply.host_count)) * growth_factor
    }

    /// Demand already allocated to existing consumers, in demand units.
    /// Supply figures are physical, so the overcommit ratio converts back.
    pub fn allocated_demand(&self, supply: &ClusterSupply, kind: ResourceKind) -> f64 {
        let (total, available) = match kind {
            ResourceKind::Cpu => (supply.total_cpu_cores, supply.available_cpu_cores),
            ResourceKind::Memory => (supply.total_memory_gb, supply.available_memory_gb),
            ResourceKind::Storage => (supply.total_storage_gb, supply.available_storage_gb),
        };
        (total - available).max(0.0) * self.overcommit_for(kind)
    }
}

/// Validation detail for one resource dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCheck {
    pub resource: ResourceKind,
    /// New demand being judged, in demand units
    pub required: f64,
    /// Effective capacity after overcommit, HA reserve, and growth buffer
    pub capacity: f64,
    pub projected_percent: f64,
    pub status: ResourceStatus,
    pub message: String,
}

/// Result of validating a demand set against one cluster's supply.
///
/// The overall status is always the worst of the per-resource statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityValidationResult {
    pub cluster_id: String,
    pub cpu: ResourceCheck,
    pub memory: ResourceCheck,
    pub storage: ResourceCheck,
    pub status: ResourceStatus,
    pub recommendations: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

impl CapacityValidationResult {
    pub fn is_feasible(&self) -> bool {
        self.status != ResourceStatus::Critical
    }
}

/// Judge whether a demand set fits one cluster's supply under the policy.
///
/// Projected utilization per resource is
/// `(currently_allocated + new_demand) / effective_capacity`, where effective
/// capacity already excludes the HA reservation and growth buffer.
pub fn validate_capacity(
    supply: &ClusterSupply,
    demands: &[WorkloadDemand],
    policy: &CapacityPolicy,
) -> CapacityValidationResult {
    let required_cpu: f64 = demands.iter().map(|d| d.cpu_cores).sum();
    let required_memory: f64 = demands.iter().map(|d| d.memory_gb).sum();
    let required_storage: f64 = demands.iter().map(|d| d.storage_gb).sum();

    let cpu = check_resource(supply, policy, ResourceKind::Cpu, required_cpu);
    let memory = check_resource(supply, policy, ResourceKind::Memory, required_memory);
    let storage = check_resource(supply, policy, ResourceKind::Storage, required_storage);

    let status = cpu.status.max(memory.status).max(storage.status);
    let recommendations = build_recommendations(supply, policy, &[&cpu, &memory, &storage]);

    CapacityValidationResult {
        cluster_id: supply.id.clone(),
        cpu,
        memory,
        storage,
        status,
        recommendations,
        validated_at: Utc::now(),
    }
}

fn check_resource(
    supply: &ClusterSupply,
    policy: &CapacityPolicy,
    kind: ResourceKind,
    required: f64,
) -> ResourceCheck {
    let capacity = policy.effective_capacity(supply, kind);
    let allocated = policy.allocated_demand(supply, kind);

    let projected_percent = if capacity > 0.0 {
        (allocated + required) / capacity * 100.0
    } else if allocated + required > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let (status, message) = if projected_percent <= policy.target_utilization_percent {
        (
            ResourceStatus::Validated,
            format!(
                "{} fits on cluster '{}' at {:.1}% projected utilization",
                kind, supply.id, projected_percent
            ),
        )
    } else if projected_percent <= 100.0 {
        (
            ResourceStatus::Warning,
            format!(
                "{} on cluster '{}' exceeds the {:.0}% target: {:.1}% projected utilization",
                kind, supply.id, policy.target_utilization_percent, projected_percent
            ),
        )
    } else {
        (
            ResourceStatus::Critical,
            format!(
                "{} insufficient on cluster '{}': requires {:.1}, effective capacity {:.1} ({:.1} already allocated)",
                kind, supply.id, required, capacity, allocated
            ),
        )
    };

    ResourceCheck {
        resource: kind,
        required,
        capacity,
        projected_percent,
        status,
        message,
    }
}

fn build_recommendations(
    supply: &ClusterSupply,
    policy: &CapacityPolicy,
    checks: &[&ResourceCheck],
) -> Vec<String> {
    let mut recommendations = Vec::new();

    for check in checks {
        match check.status {
            ResourceStatus::Critical => {
                // projected% * capacity / 100 = allocated + required
                let shortfall = if check.capacity > 0.0 {
                    check.capacity * (check.projected_percent / 100.0 - 1.0)
                } else {
                    check.required
                };
                recommendations.push(format!(
                    "Add {:.1} more {} capacity to cluster '{}' to cover the shortfall",
                    shortfall, check.resource, supply.id
                ));
            }
            ResourceStatus::Warning => {
                recommendations.push(format!(
                    "Consider adding {} headroom on cluster '{}' ({:.1}% projected)",
                    check.resource, supply.id, check.projected_percent
                ));
            }
            ResourceStatus::Validated => {}
        }
    }

    if policy.ha_reserved_hosts > 0 && supply.host_count <= policy.ha_reserved_hosts {
        recommendations.push(format!(
            "Cluster '{}' has {} host(s) but the policy reserves {} for HA; the entire cluster is held back",
            supply.id, supply.host_count, policy.ha_reserved_hosts
        ));
    }

    if recommendations.is_empty() {
        recommendations.push(format!(
            "Cluster '{}' is well-sized for this workload set",
            supply.id
        ));
    }

    recommendations
}
