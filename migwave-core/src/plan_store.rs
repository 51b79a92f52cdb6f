//! Durable storage for cluster migration plans.
//!
//! Plans live in a single redb table keyed by plan id, with JSON values so
//! the tagged strategy enum keeps its wire shape at rest. Updates are
//! optimistic: callers present the version they read, and the store rejects
//! the write if the stored version has moved on.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use crate::error::{MigwaveError, MigwaveResult};
use crate::plan::ClusterMigrationPlan;

const PLAN_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cluster_migration_plans");

/// Persistent store of [`ClusterMigrationPlan`] records.
#[derive(Clone)]
pub struct PlanStore {
    database: Arc<Database>,
}

impl PlanStore {
    /// Open (or create) the plan database at `path`.
    pub fn open(path: impl AsRef<Path>) -> MigwaveResult<Self> {
        let database = Database::create(path.as_ref())
            .map_err(|e| MigwaveError::storage("open plan database", e))?;

        // Ensure the table exists so reads on a fresh database succeed.
        let write_txn = database
            .begin_write()
            .map_err(|e| MigwaveError::storage("begin write transaction", e))?;
        write_txn
            .open_table(PLAN_TABLE)
            .map_err(|e| MigwaveError::storage("create plan table", e))?;
        write_txn
            .commit()
            .map_err(|e| MigwaveError::storage("commit transaction", e))?;

        info!(path = %path.as_ref().display(), "opened plan store");
        Ok(Self {
            database: Arc::new(database),
        })
    }

    /// Persist a new plan. Fails if a plan with the same id already exists.
    pub fn create_plan(&self, plan: &ClusterMigrationPlan) -> MigwaveResult<()> {
        let write_txn = self
            .database
            .begin_write()
            .map_err(|e| MigwaveError::storage("begin write transaction", e))?;
        {
            let mut table = write_txn
                .open_table(PLAN_TABLE)
                .map_err(|e| MigwaveError::storage("open plan table", e))?;

            let exists = table
                .get(plan.id.as_str())
                .map_err(|e| MigwaveError::storage("read plan", e))?
                .is_some();
            if exists {
                return Err(MigwaveError::invalid_input(
                    "id",
                    format!("plan '{}' already exists", plan.id),
                ));
            }

            let bytes = serde_json::to_vec(plan)
                .map_err(|e| MigwaveError::serialization("serialize plan", e))?;
            table
                .insert(plan.id.as_str(), bytes.as_slice())
                .map_err(|e| MigwaveError::storage("insert plan", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| MigwaveError::storage("commit transaction", e))?;

        debug!(plan_id = %plan.id, project_id = %plan.project_id, "created migration plan");
        Ok(())
    }

    /// Load a plan by id.
    pub fn get_plan(&self, plan_id: &str) -> MigwaveResult<ClusterMigrationPlan> {
        let read_txn = self
            .database
            .begin_read()
            .map_err(|e| MigwaveError::storage("begin read transaction", e))?;
        let table = read_txn
            .open_table(PLAN_TABLE)
            .map_err(|e| MigwaveError::storage("open plan table", e))?;

        let value = table
            .get(plan_id)
            .map_err(|e| MigwaveError::storage("read plan", e))?
            .ok_or_else(|| MigwaveError::PlanNotFound {
                plan_id: plan_id.to_string(),
            })?;

        serde_json::from_slice(value.value())
            .map_err(|e| MigwaveError::serialization("deserialize plan", e))
    }

    /// All plans belonging to a project, ordered by plan id.
    pub fn list_plans(&self, project_id: &str) -> MigwaveResult<Vec<ClusterMigrationPlan>> {
        let read_txn = self
            .database
            .begin_read()
            .map_err(|e| MigwaveError::storage("begin read transaction", e))?;
        let table = read_txn
            .open_table(PLAN_TABLE)
            .map_err(|e| MigwaveError::storage("open plan table", e))?;

        let mut plans = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| MigwaveError::storage("iterate plans", e))?
        {
            let (_, value) = entry.map_err(|e| MigwaveError::storage("iterate plans", e))?;
            let plan: ClusterMigrationPlan = serde_json::from_slice(value.value())
                .map_err(|e| MigwaveError::serialization("deserialize plan", e))?;
            if plan.project_id == project_id {
                plans.push(plan);
            }
        }
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plans)
    }

    /// Commit an updated plan. `plan.version` must match the stored version;
    /// on success the stored copy carries `version + 1` and a fresh
    /// `updated_at`, and the committed plan is returned.
    pub fn update_plan(
        &self,
        plan: &ClusterMigrationPlan,
    ) -> MigwaveResult<ClusterMigrationPlan> {
        let write_txn = self
            .database
            .begin_write()
            .map_err(|e| MigwaveError::storage("begin write transaction", e))?;
        let committed;
        {
            let mut table = write_txn
                .open_table(PLAN_TABLE)
                .map_err(|e| MigwaveError::storage("open plan table", e))?;

            let stored = {
                let value = table
                    .get(plan.id.as_str())
                    .map_err(|e| MigwaveError::storage("read plan", e))?
                    .ok_or_else(|| MigwaveError::PlanNotFound {
                        plan_id: plan.id.clone(),
                    })?;
                serde_json::from_slice::<ClusterMigrationPlan>(value.value())
                    .map_err(|e| MigwaveError::serialization("deserialize plan", e))?
            };

            if stored.version != plan.version {
                return Err(MigwaveError::VersionConflict {
                    plan_id: plan.id.clone(),
                    expected: plan.version,
                    found: stored.version,
                });
            }

            let mut next = plan.clone();
            next.version = plan.version + 1;
            next.updated_at = chrono::Utc::now();

            let bytes = serde_json::to_vec(&next)
                .map_err(|e| MigwaveError::serialization("serialize plan", e))?;
            table
                .insert(next.id.as_str(), bytes.as_slice())
                .map_err(|e| MigwaveError::storage("update plan", e))?;
            committed = next;
        }
        write_txn
            .commit()
            .map_err(|e| MigwaveError::storage("commit transaction", e))?;

        debug!(plan_id = %committed.id, version = committed.version, "updated migration plan");
        Ok(committed)
    }

    /// Delete a plan. Refused while another plan in the same project sources
    /// its hardware from this plan's target cluster via the domino strategy.
    pub fn delete_plan(&self, plan_id: &str) -> MigwaveResult<()> {
        let plan = self.get_plan(plan_id)?;
        let dependents: Vec<String> = self
            .list_plans(&plan.project_id)?
            .into_iter()
            .filter(|other| {
                other.id != plan.id
                    && other.strategy.domino_source() == Some(plan.target_cluster.as_str())
            })
            .map(|other| other.id)
            .collect();
        if !dependents.is_empty() {
            return Err(MigwaveError::PlanInUse {
                plan_id: plan_id.to_string(),
                referenced_by: dependents,
            });
        }

        let write_txn = self
            .database
            .begin_write()
            .map_err(|e| MigwaveError::storage("begin write transaction", e))?;
        {
            let mut table = write_txn
                .open_table(PLAN_TABLE)
                .map_err(|e| MigwaveError::storage("open plan table", e))?;
            table
                .remove(plan_id)
                .map_err(|e| MigwaveError::storage("delete plan", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| MigwaveError::storage("commit transaction", e))?;

        debug!(plan_id, "deleted migration plan");
        Ok(())
    }
}
