//! Core capacity model: workload demand and cluster supply records, plus the
//! placement output types shared by the scheduler and the migration planner.
//!
//! These are pure data structures. All policy decisions (overcommit, HA
//! reservation, headroom grading) live in [`crate::capacity`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{MigwaveError, MigwaveResult};

/// Resource dimensions tracked for every workload and cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cpu,
    Memory,
    Storage,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Cpu => write!(f, "CPU"),
            ResourceKind::Memory => write!(f, "memory"),
            ResourceKind::Storage => write!(f, "storage"),
        }
    }
}

/// Resource requirements for a single VM workload to be migrated.
///
/// Immutable once submitted to a planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadDemand {
    /// Unique workload identifier (stable across runs, used for tie-breaks)
    pub id: String,
    /// Display name
    pub name: String,
    /// Required CPU cores
    pub cpu_cores: f64,
    /// Required memory in GB
    pub memory_gb: f64,
    /// Required storage in GB
    pub storage_gb: f64,
    /// Critical workloads are placed before all others
    #[serde(default)]
    pub is_critical: bool,
    /// Workloads sharing an affinity group are co-located when possible
    #[serde(default)]
    pub affinity_group: Option<String>,
    /// Workloads sharing an anti-affinity group never share a cluster
    #[serde(default)]
    pub anti_affinity_group: Option<String>,
}

impl WorkloadDemand {
    /// Reject malformed demand records before any scheduling work begins.
    pub fn validate(&self) -> MigwaveResult<()> {
        if self.id.is_empty() {
            return Err(MigwaveError::invalid_input("id", "workload id is empty"));
        }
        for (field, value) in [
            ("cpu_cores", self.cpu_cores),
            ("memory_gb", self.memory_gb),
            ("storage_gb", self.storage_gb),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MigwaveError::invalid_input(
                    field,
                    format!("workload '{}' has non-positive {}: {}", self.id, field, value),
                ));
            }
        }
        Ok(())
    }
}

/// Capacity of a candidate target cluster.
///
/// `available_*` figures are net of existing consumers. A supply record is
/// mutated only within the scope of a single scheduling run; concurrent runs
/// for the same project must be serialized (see [`crate::planner::ProjectLocks`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSupply {
    pub id: String,
    pub name: String,
    /// Number of hosts (failure domains) backing the cluster
    pub host_count: u32,
    pub total_cpu_cores: f64,
    pub total_memory_gb: f64,
    pub total_storage_gb: f64,
    pub available_cpu_cores: f64,
    pub available_memory_gb: f64,
    pub available_storage_gb: f64,
}

impl ClusterSupply {
    pub fn validate(&self) -> MigwaveResult<()> {
        if self.id.is_empty() {
            return Err(MigwaveError::invalid_input("id", "cluster id is empty"));
        }
        for (field, value) in [
            ("total_cpu_cores", self.total_cpu_cores),
            ("total_memory_gb", self.total_memory_gb),
            ("total_storage_gb", self.total_storage_gb),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MigwaveError::invalid_input(
                    field,
                    format!("cluster '{}' has non-positive {}: {}", self.id, field, value),
                ));
            }
        }
        for (field, value) in [
            ("available_cpu_cores", self.available_cpu_cores),
            ("available_memory_gb", self.available_memory_gb),
            ("available_storage_gb", self.available_storage_gb),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MigwaveError::invalid_input(
                    field,
                    format!("cluster '{}' has negative {}: {}", self.id, field, value),
                ));
            }
        }
        Ok(())
    }
}

/// A single workload-to-cluster assignment produced by the scheduler.
///
/// Immutable after creation. The `consumed_*` figures are the physical
/// footprint after overcommit accounting (raw demand divided by the
/// overcommit ratio; storage is never overcommitted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementAssignment {
    pub workload_id: String,
    pub workload_name: String,
    pub cluster_id: String,
    pub cluster_name: String,
    /// Human-readable rationale naming the strategy and the deciding metric
    pub reason: String,
    pub consumed_cpu_cores: f64,
    pub consumed_memory_gb: f64,
    pub consumed_storage_gb: f64,
}

/// A workload that could not be placed, with the limiting resource named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnplacedWorkload {
    pub workload_id: String,
    pub reason: String,
}

/// Post-run utilization of a cluster, in percent of effective capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterUtilization {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub storage_percent: f64,
}

impl ClusterUtilization {
    /// Mean utilization across the three resources
    pub fn mean_percent(&self) -> f64 {
        (self.cpu_percent + self.memory_percent + self.storage_percent) / 3.0
    }

    /// Worst (highest) utilization across the three resources
    pub fn max_percent(&self) -> f64 {
        self.cpu_percent.max(self.memory_percent).max(self.storage_percent)
    }
}

/// Summary counters for one placement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementSummary {
    pub total_workloads: usize,
    pub placed: usize,
    pub unplaced: usize,
    pub clusters_used: usize,
    pub average_utilization_percent: f64,
    pub strategy_used: String,
}

/// Complete outcome of one placement invocation. Never mutated after
/// construction; optimization produces a fresh result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementResult {
    pub assignments: Vec<PlacementAssignment>,
    pub unplaced: Vec<UnplacedWorkload>,
    /// Keyed by cluster id; BTreeMap keeps serialization deterministic
    pub cluster_utilization: BTreeMap<String, ClusterUtilization>,
    pub warnings: Vec<String>,
    pub summary: PlacementSummary,
}

/// Outcome of a validate-only pass: feasibility plus advisory warnings,
/// with no assignments committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub is_feasible: bool,
    pub warnings: Vec<String>,
}
