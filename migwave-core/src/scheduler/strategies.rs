//! Placement strategies and their scoring functions.
//!
//! Every strategy scores eligible clusters with "lower is better" semantics;
//! ties are broken by ascending cluster id so identical inputs always yield
//! identical placements.

use serde::{Deserialize, Serialize};

use crate::types::WorkloadDemand;

use super::ClusterState;

/// Strategy for choosing among eligible target clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Minimize the maximum post-assignment utilization across resources
    Balanced,
    /// Tightest fit: minimize leftover headroom (bin packing)
    Consolidate,
    /// Spread load: prefer the least-utilized cluster
    Performance,
}

impl PlacementStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            PlacementStrategy::Balanced => "Balanced",
            PlacementStrategy::Consolidate => "Consolidate",
            PlacementStrategy::Performance => "Performance",
        }
    }

    /// Score an eligible cluster for this workload. Lower wins.
    pub(super) fn score(&self, state: &ClusterState, demand: &WorkloadDemand) -> f64 {
        match self {
            PlacementStrategy::Balanced => state.max_post_utilization(demand),
            PlacementStrategy::Consolidate => state.leftover_headroom(demand),
            PlacementStrategy::Performance => state.max_utilization(),
        }
    }

    /// Rationale fragment naming the deciding metric for an accepted score.
    pub(super) fn deciding_metric(&self, score: f64) -> String {
        match self {
            PlacementStrategy::Balanced => {
                format!("peak post-assignment utilization {:.1}%", score)
            }
            PlacementStrategy::Consolidate => {
                format!("leftover headroom {:.1}%", score * 100.0)
            }
            PlacementStrategy::Performance => {
                format!("current utilization {:.1}%", score)
            }
        }
    }
}

impl std::str::FromStr for PlacementStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "balanced" => Ok(PlacementStrategy::Balanced),
            "consolidate" => Ok(PlacementStrategy::Consolidate),
            "performance" => Ok(PlacementStrategy::Performance),
            other => Err(format!(
                "unknown placement strategy '{}' (expected balanced, consolidate, or performance)",
                other
            )),
        }
    }
}
