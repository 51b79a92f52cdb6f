//! End-to-end migration planning: plans persisted through the store,
//! dependency validation across a project, and the hardware timeline.

use migwave_core::plan::StrategyKind;
use migwave_core::{
    CapacityPolicy, ClusterSupply, MigrationPlanner, MigwaveError, PlanStore,
    PlanValidationStatus, StrategyRequest, WorkloadDemand,
};
use tempfile::TempDir;

fn planner() -> (MigrationPlanner, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = PlanStore::open(dir.path().join("plans.redb")).unwrap();
    let policy = CapacityPolicy {
        cpu_overcommit: 2.0,
        memory_overcommit: 1.2,
        growth_buffer_percent: 0.0,
        target_utilization_percent: 80.0,
        ha_reserved_hosts: 0,
    };
    (MigrationPlanner::with_policy(store, policy), dir)
}

fn cluster(id: &str, cpu: f64, mem: f64, storage: f64) -> ClusterSupply {
    ClusterSupply {
        id: id.to_string(),
        name: id.to_string(),
        host_count: 4,
        total_cpu_cores: cpu,
        total_memory_gb: mem,
        total_storage_gb: storage,
        available_cpu_cores: cpu,
        available_memory_gb: mem,
        available_storage_gb: storage,
    }
}

fn workload(id: &str, cpu: f64, mem: f64, storage: f64) -> WorkloadDemand {
    WorkloadDemand {
        id: id.to_string(),
        name: id.to_string(),
        cpu_cores: cpu,
        memory_gb: mem,
        storage_gb: storage,
        is_critical: false,
        affinity_group: None,
        anti_affinity_group: None,
    }
}

fn existing_hardware() -> StrategyRequest {
    StrategyRequest {
        kind: Some(StrategyKind::ExistingFreeHardware),
        ..Default::default()
    }
}

fn domino(source: &str) -> StrategyRequest {
    StrategyRequest {
        kind: Some(StrategyKind::Domino),
        domino_source_cluster: Some(source.to_string()),
        ..Default::default()
    }
}

fn procurement(basket: &str, order: &str) -> StrategyRequest {
    StrategyRequest {
        kind: Some(StrategyKind::NewHardwareProcurement),
        hardware_basket_id: Some(basket.to_string()),
        procurement_order_id: Some(order.to_string()),
        ..Default::default()
    }
}

#[test]
fn test_domino_chain_validates_and_produces_timeline() {
    let (planner, _dir) = planner();

    // New hardware lands in DEV-02; its old hardware moves to DEV-01;
    // DEV-01's old hardware finally rebuilds PROD-01.
    let (first, _) = planner
        .create_cluster_plan(
            "proj-1",
            &cluster("DEV-02", 32.0, 128.0, 2000.0),
            &[workload("vm-001", 4.0, 16.0, 200.0)],
            procurement("basket-7", "po-42"),
        )
        .unwrap();
    let (second, _) = planner
        .create_cluster_plan(
            "proj-1",
            &cluster("DEV-01", 32.0, 128.0, 2000.0),
            &[workload("vm-002", 4.0, 16.0, 200.0)],
            domino("DEV-02"),
        )
        .unwrap();
    let (third, _) = planner
        .create_cluster_plan(
            "proj-1",
            &cluster("PROD-01", 32.0, 128.0, 2000.0),
            &[workload("vm-003", 4.0, 16.0, 200.0)],
            domino("DEV-01"),
        )
        .unwrap();

    let result = planner.validate_dependencies("proj-1").unwrap();
    assert!(result.is_valid);
    assert_eq!(
        result.execution_order,
        vec![first.id.clone(), second.id.clone(), third.id.clone()]
    );
    assert_eq!(result.critical_path.len(), 3);

    let timeline = planner.hardware_timeline("proj-1").unwrap();
    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline[0].plan_id, first.id);
    assert!(timeline[0].hardware_source.contains("po-42"));
    assert_eq!(timeline[2].plan_id, third.id);
    assert!(timeline[2].hardware_source.contains("DEV-01"));
}

#[test]
fn test_cycle_is_detected_and_plans_marked_invalid() {
    let (planner, _dir) = planner();

    let (plan_a, _) = planner
        .create_cluster_plan(
            "proj-1",
            &cluster("CLUSTER-A", 32.0, 128.0, 2000.0),
            &[],
            domino("CLUSTER-B"),
        )
        .unwrap();
    let (plan_b, _) = planner
        .create_cluster_plan(
            "proj-1",
            &cluster("CLUSTER-B", 32.0, 128.0, 2000.0),
            &[],
            domino("CLUSTER-A"),
        )
        .unwrap();

    let result = planner.validate_dependencies("proj-1").unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.circular_dependencies.len(), 1);
    let cycle = &result.circular_dependencies[0].cycle;
    assert!(cycle.contains(&plan_a.id));
    assert!(cycle.contains(&plan_b.id));
    assert!(result.execution_order.is_empty());

    for id in [&plan_a.id, &plan_b.id] {
        let stored = planner.store().get_plan(id).unwrap();
        assert_eq!(stored.validation_status, PlanValidationStatus::Invalid);
    }

    // The timeline is unavailable until the cycle is broken.
    assert!(matches!(
        planner.hardware_timeline("proj-1"),
        Err(MigwaveError::SchedulingError { .. })
    ));
}

#[test]
fn test_breaking_a_cycle_restores_the_timeline() {
    let (planner, _dir) = planner();

    let (plan_a, _) = planner
        .create_cluster_plan(
            "proj-1",
            &cluster("CLUSTER-A", 32.0, 128.0, 2000.0),
            &[],
            domino("CLUSTER-B"),
        )
        .unwrap();
    planner
        .create_cluster_plan(
            "proj-1",
            &cluster("CLUSTER-B", 32.0, 128.0, 2000.0),
            &[],
            domino("CLUSTER-A"),
        )
        .unwrap();

    assert!(planner.hardware_timeline("proj-1").is_err());

    // Resourcing plan A from procurement breaks the loop. Dependents of A
    // block its deletion, so the edit goes through update, not delete.
    let mut revised = planner.store().get_plan(&plan_a.id).unwrap();
    revised.strategy = StrategyRequest {
        kind: Some(StrategyKind::NewHardwareProcurement),
        hardware_basket_id: Some("basket-1".to_string()),
        procurement_order_id: Some("po-1".to_string()),
        ..Default::default()
    }
    .into_strategy()
    .unwrap();
    planner.store().update_plan(&revised).unwrap();

    let result = planner.validate_dependencies("proj-1").unwrap();
    assert!(result.is_valid);
    let timeline = planner.hardware_timeline("proj-1").unwrap();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].plan_id, plan_a.id);
}

#[test]
fn test_capacity_check_gates_existing_hardware_plans() {
    let (planner, _dir) = planner();

    // 16 GB * 1.2 = 19.2 GB effective memory against 32 GB of demand.
    let (plan, capacity) = planner
        .create_cluster_plan(
            "proj-1",
            &cluster("SMALL-01", 4.0, 16.0, 1000.0),
            &[workload("vm-001", 8.0, 32.0, 500.0)],
            existing_hardware(),
        )
        .unwrap();

    let capacity = capacity.expect("existing hardware plans are capacity checked");
    assert!(!capacity.is_feasible());
    assert_eq!(plan.validation_status, PlanValidationStatus::Invalid);
    assert!(!capacity.recommendations.is_empty());
}

#[test]
fn test_plans_survive_reopening_the_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plans.redb");

    let plan_id = {
        let store = PlanStore::open(&path).unwrap();
        let planner = MigrationPlanner::new(store);
        let (plan, _) = planner
            .create_cluster_plan(
                "proj-1",
                &cluster("PROD-01", 32.0, 128.0, 2000.0),
                &[workload("vm-001", 2.0, 8.0, 100.0)],
                existing_hardware(),
            )
            .unwrap();
        plan.id
    };

    let store = PlanStore::open(&path).unwrap();
    let reloaded = store.get_plan(&plan_id).unwrap();
    assert_eq!(reloaded.project_id, "proj-1");
    assert_eq!(reloaded.workload_ids, vec!["vm-001".to_string()]);
}

#[test]
fn test_deleting_a_domino_supplier_is_refused() {
    let (planner, _dir) = planner();

    let (supplier, _) = planner
        .create_cluster_plan(
            "proj-1",
            &cluster("DEV-01", 32.0, 128.0, 2000.0),
            &[],
            existing_hardware(),
        )
        .unwrap();
    let (dependent, _) = planner
        .create_cluster_plan(
            "proj-1",
            &cluster("PROD-01", 32.0, 128.0, 2000.0),
            &[],
            domino("DEV-01"),
        )
        .unwrap();

    match planner.delete_plan(&supplier.id) {
        Err(MigwaveError::PlanInUse { referenced_by, .. }) => {
            assert_eq!(referenced_by, vec![dependent.id.clone()]);
        }
        other => panic!("expected PlanInUse, got {:?}", other),
    }

    planner.delete_plan(&dependent.id).unwrap();
    planner.delete_plan(&supplier.id).unwrap();
}
