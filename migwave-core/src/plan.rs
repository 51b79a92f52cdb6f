//! Cluster migration plans and hardware-sourcing strategies.
//!
//! `MigrationStrategy` is a closed sum type: the payload a strategy needs is
//! part of its variant, so a plan whose payload disagrees with its tag is
//! unrepresentable. Callers submit a flat [`StrategyRequest`] (the wire
//! shape) which is validated into the sum type on construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MigwaveError, MigwaveResult};

/// How the hardware for a target cluster is sourced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// The target cluster already has enough idle capacity
    ExistingFreeHardware,
    /// New equipment is ordered
    NewHardwareProcurement {
        hardware_basket_id: String,
        procurement_order_id: String,
    },
    /// Hardware freed by decommissioning another cluster
    Domino { source_cluster: String },
}

impl MigrationStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            MigrationStrategy::ExistingFreeHardware => StrategyKind::ExistingFreeHardware,
            MigrationStrategy::NewHardwareProcurement { .. } => StrategyKind::NewHardwareProcurement,
            MigrationStrategy::Domino { .. } => StrategyKind::Domino,
        }
    }

    /// Source cluster for domino plans; the basis of the dependency graph.
    pub fn domino_source(&self) -> Option<&str> {
        match self {
            MigrationStrategy::Domino { source_cluster } => Some(source_cluster),
            _ => None,
        }
    }
}

/// Strategy discriminant without payload, as selected by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ExistingFreeHardware,
    NewHardwareProcurement,
    Domino,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::ExistingFreeHardware => write!(f, "existing free hardware"),
            StrategyKind::NewHardwareProcurement => write!(f, "new hardware procurement"),
            StrategyKind::Domino => write!(f, "domino hardware swap"),
        }
    }
}

/// Flat strategy selection as received from the calling layer. Payload
/// fields are optional here and checked against the chosen kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyRequest {
    pub kind: Option<StrategyKind>,
    pub domino_source_cluster: Option<String>,
    pub hardware_basket_id: Option<String>,
    pub procurement_order_id: Option<String>,
}

impl StrategyRequest {
    /// Enforce the tag/payload invariant: each strategy requires exactly the
    /// payload its variant carries, and nothing else.
    pub fn into_strategy(self) -> MigwaveResult<MigrationStrategy> {
        let kind = self.kind.ok_or_else(|| {
            MigwaveError::invalid_input("kind", "a migration strategy must be selected")
        })?;

        match kind {
            StrategyKind::ExistingFreeHardware => {
                if self.domino_source_cluster.is_some()
                    || self.hardware_basket_id.is_some()
                    || self.procurement_order_id.is_some()
                {
                    return Err(MigwaveError::invalid_input(
                        "strategy",
                        "existing free hardware strategy carries no payload fields",
                    ));
                }
                Ok(MigrationStrategy::ExistingFreeHardware)
            }
            StrategyKind::NewHardwareProcurement => {
                if self.domino_source_cluster.is_some() {
                    return Err(MigwaveError::invalid_input(
                        "domino_source_cluster",
                        "procurement strategy does not take a domino source",
                    ));
                }
                let hardware_basket_id = self.hardware_basket_id.ok_or_else(|| {
                    MigwaveError::invalid_input(
                        "hardware_basket_id",
                        "a hardware basket must be referenced for new hardware procurement",
                    )
                })?;
                let procurement_order_id = self.procurement_order_id.ok_or_else(|| {
                    MigwaveError::invalid_input(
                        "procurement_order_id",
                        "a procurement order must be referenced for new hardware procurement",
                    )
                })?;
                Ok(MigrationStrategy::NewHardwareProcurement {
                    hardware_basket_id,
                    procurement_order_id,
                })
            }
            StrategyKind::Domino => {
                if self.hardware_basket_id.is_some() || self.procurement_order_id.is_some() {
                    return Err(MigwaveError::invalid_input(
                        "strategy",
                        "domino strategy takes only a source cluster",
                    ));
                }
                let source_cluster = self.domino_source_cluster.ok_or_else(|| {
                    MigwaveError::invalid_input(
                        "domino_source_cluster",
                        "a source cluster must be specified for the domino strategy",
                    )
                })?;
                Ok(MigrationStrategy::Domino { source_cluster })
            }
        }
    }
}

/// Validation state of a plan, updated as validation proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanValidationStatus {
    NotValidated,
    Valid,
    Warning,
    Invalid,
}

/// A per-cluster migration plan. Persisted by the plan store; `version` is
/// the optimistic-concurrency stamp and advances on every committed update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMigrationPlan {
    pub id: String,
    pub project_id: String,
    pub target_cluster: String,
    pub strategy: MigrationStrategy,
    pub workload_ids: Vec<String>,
    pub validation_status: PlanValidationStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClusterMigrationPlan {
    pub fn new(
        project_id: impl Into<String>,
        target_cluster: impl Into<String>,
        strategy: MigrationStrategy,
        workload_ids: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            target_cluster: target_cluster.into(),
            strategy,
            workload_ids,
            validation_status: PlanValidationStatus::NotValidated,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
