pub mod capacity;
pub mod dependency_graph;
pub mod error;
pub mod plan;
pub mod plan_store;
pub mod planner;
pub mod scheduler;
pub mod types;

pub use capacity::{validate_capacity, CapacityPolicy, CapacityValidationResult, ResourceStatus};
pub use dependency_graph::{CircularDependency, DependencyGraph, DependencyValidationResult};
pub use error::{MigwaveError, MigwaveResult};
pub use plan::{ClusterMigrationPlan, MigrationStrategy, PlanValidationStatus, StrategyRequest};
pub use plan_store::PlanStore;
pub use planner::{HardwareTimelineEntry, MigrationPlanner, ProjectLocks};
pub use scheduler::{PlacementScheduler, PlacementStrategy};
pub use types::{
    ClusterSupply, FeasibilityReport, PlacementResult, UnplacedWorkload, WorkloadDemand,
};
