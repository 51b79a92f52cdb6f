use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::de::DeserializeOwned;

use migwave_core::{
    CapacityPolicy, ClusterSupply, MigrationPlanner, PlacementScheduler, PlacementStrategy,
    PlanStore, StrategyRequest, WorkloadDemand,
};
use migwave_core::plan::StrategyKind;
use migwave_core::validate_capacity;

#[derive(Parser)]
#[command(name = "migwave")]
#[command(about = "Placement scheduling and migration planning for virtualization clusters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct PolicyArgs {
    /// Capacity policy preset
    #[arg(long, default_value = "moderate", value_parser = ["conservative", "moderate", "aggressive"])]
    policy: String,

    /// Override the preset's CPU overcommit ratio
    #[arg(long)]
    cpu_overcommit: Option<f64>,

    /// Override the preset's memory overcommit ratio
    #[arg(long)]
    memory_overcommit: Option<f64>,

    /// Override the preset's growth buffer (percent)
    #[arg(long)]
    growth_buffer: Option<f64>,

    /// Override the preset's target utilization (percent)
    #[arg(long)]
    target_utilization: Option<f64>,

    /// Override the preset's HA host reservation
    #[arg(long)]
    ha_reserved_hosts: Option<u32>,
}

impl PolicyArgs {
    fn build(&self) -> CapacityPolicy {
        let mut policy = match self.policy.as_str() {
            "conservative" => CapacityPolicy::conservative(),
            "aggressive" => CapacityPolicy::aggressive(),
            _ => CapacityPolicy::moderate(),
        };
        if let Some(v) = self.cpu_overcommit {
            policy.cpu_overcommit = v;
        }
        if let Some(v) = self.memory_overcommit {
            policy.memory_overcommit = v;
        }
        if let Some(v) = self.growth_buffer {
            policy.growth_buffer_percent = v;
        }
        if let Some(v) = self.target_utilization {
            policy.target_utilization_percent = v;
        }
        if let Some(v) = self.ha_reserved_hosts {
            policy.ha_reserved_hosts = v;
        }
        policy
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Compute workload placements across clusters
    Place {
        /// Project identifier, used in logs and results
        #[arg(long, default_value = "default")]
        project: String,

        /// JSON file with the workload demands
        #[arg(long)]
        workloads: PathBuf,

        /// JSON file with the candidate clusters
        #[arg(long)]
        clusters: PathBuf,

        /// Placement strategy (balanced, consolidate, performance)
        #[arg(long, default_value = "balanced")]
        strategy: PlacementStrategy,

        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Check feasibility without committing a placement
    Validate {
        #[arg(long)]
        workloads: PathBuf,

        #[arg(long)]
        clusters: PathBuf,

        #[arg(long, default_value = "balanced")]
        strategy: PlacementStrategy,

        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Compute a balanced placement and rebalance it with swap search
    Optimize {
        #[arg(long, default_value = "default")]
        project: String,

        #[arg(long)]
        workloads: PathBuf,

        #[arg(long)]
        clusters: PathBuf,

        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Validate one cluster's capacity against a set of workloads
    Capacity {
        /// JSON file with a single cluster's supply figures
        #[arg(long)]
        cluster: PathBuf,

        #[arg(long)]
        workloads: PathBuf,

        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Migration plan operations
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(clap::Subcommand)]
enum PlanCommands {
    /// Create a migration plan for a target cluster
    Create {
        /// Plan database path
        #[arg(long, default_value = "./migwave.redb")]
        db: PathBuf,

        #[arg(long)]
        project: String,

        /// JSON file with the target cluster's supply figures
        #[arg(long)]
        cluster: PathBuf,

        /// JSON file with the workloads migrating onto the cluster
        #[arg(long)]
        workloads: PathBuf,

        /// Hardware strategy (existing-free-hardware, new-hardware-procurement, domino)
        #[arg(long)]
        strategy: String,

        /// Source cluster for the domino strategy
        #[arg(long)]
        domino_source: Option<String>,

        /// Hardware basket reference for procurement
        #[arg(long)]
        hardware_basket: Option<String>,

        /// Procurement order reference
        #[arg(long)]
        procurement_order: Option<String>,

        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// List a project's plans
    List {
        #[arg(long, default_value = "./migwave.redb")]
        db: PathBuf,

        #[arg(long)]
        project: String,
    },
    /// Validate the dependency graph across a project's plans
    ValidateDeps {
        #[arg(long, default_value = "./migwave.redb")]
        db: PathBuf,

        #[arg(long)]
        project: String,
    },
    /// Print the hardware sourcing timeline in execution order
    Timeline {
        #[arg(long, default_value = "./migwave.redb")]
        db: PathBuf,

        #[arg(long)]
        project: String,
    },
    /// Delete a plan
    Delete {
        #[arg(long, default_value = "./migwave.redb")]
        db: PathBuf,

        #[arg(long)]
        plan_id: String,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    tracing::debug!("Reading JSON input from {}", path.display());
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_strategy_kind(value: &str) -> anyhow::Result<StrategyKind> {
    match value {
        "existing-free-hardware" => Ok(StrategyKind::ExistingFreeHardware),
        "new-hardware-procurement" => Ok(StrategyKind::NewHardwareProcurement),
        "domino" => Ok(StrategyKind::Domino),
        other => anyhow::bail!(
            "unknown strategy '{}': expected existing-free-hardware, new-hardware-procurement or domino",
            other
        ),
    }
}

fn open_planner(db: &Path, policy: CapacityPolicy) -> anyhow::Result<MigrationPlanner> {
    let store = PlanStore::open(db)
        .with_context(|| format!("failed to open plan database {}", db.display()))?;
    Ok(MigrationPlanner::with_policy(store, policy))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("migwave=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Place {
            project,
            workloads,
            clusters,
            strategy,
            policy,
        } => {
            let workloads: Vec<WorkloadDemand> = read_json(&workloads)?;
            let clusters: Vec<ClusterSupply> = read_json(&clusters)?;
            tracing::info!(
                "Placing {} workloads across {} clusters with {} strategy",
                workloads.len(),
                clusters.len(),
                strategy.name()
            );
            let scheduler = PlacementScheduler::new(policy.build());
            let result = scheduler.calculate_placements(&project, &workloads, &clusters, strategy)?;
            print_json(&result)?;
        }
        Commands::Validate {
            workloads,
            clusters,
            strategy,
            policy,
        } => {
            let workloads: Vec<WorkloadDemand> = read_json(&workloads)?;
            let clusters: Vec<ClusterSupply> = read_json(&clusters)?;
            let scheduler = PlacementScheduler::new(policy.build());
            let report = scheduler.validate_placements(&workloads, &clusters, strategy)?;
            print_json(&report)?;
            if !report.is_feasible {
                std::process::exit(1);
            }
        }
        Commands::Optimize {
            project,
            workloads,
            clusters,
            policy,
        } => {
            let workloads: Vec<WorkloadDemand> = read_json(&workloads)?;
            let clusters: Vec<ClusterSupply> = read_json(&clusters)?;
            let scheduler = PlacementScheduler::new(policy.build());
            let result = scheduler.optimize_placements(&project, &workloads, &clusters)?;
            print_json(&result)?;
        }
        Commands::Capacity {
            cluster,
            workloads,
            policy,
        } => {
            let cluster: ClusterSupply = read_json(&cluster)?;
            let workloads: Vec<WorkloadDemand> = read_json(&workloads)?;
            let policy = policy.build();
            policy.validate()?;
            cluster.validate()?;
            for workload in &workloads {
                workload.validate()?;
            }
            tracing::info!(
                "Validating cluster {} against {} workloads",
                cluster.id,
                workloads.len()
            );
            let result = validate_capacity(&cluster, &workloads, &policy);
            print_json(&result)?;
        }
        Commands::Plan { command } => match command {
            PlanCommands::Create {
                db,
                project,
                cluster,
                workloads,
                strategy,
                domino_source,
                hardware_basket,
                procurement_order,
                policy,
            } => {
                let cluster: ClusterSupply = read_json(&cluster)?;
                let workloads: Vec<WorkloadDemand> = read_json(&workloads)?;
                let request = StrategyRequest {
                    kind: Some(parse_strategy_kind(&strategy)?),
                    domino_source_cluster: domino_source,
                    hardware_basket_id: hardware_basket,
                    procurement_order_id: procurement_order,
                };
                let planner = open_planner(&db, policy.build())?;
                tracing::info!(
                    "Creating {} plan for cluster {} in project {}",
                    strategy,
                    cluster.id,
                    project
                );
                let (plan, capacity) =
                    planner.create_cluster_plan(&project, &cluster, &workloads, request)?;
                print_json(&plan)?;
                if let Some(capacity) = capacity {
                    print_json(&capacity)?;
                }
            }
            PlanCommands::List { db, project } => {
                let planner = open_planner(&db, CapacityPolicy::default())?;
                let plans = planner.store().list_plans(&project)?;
                print_json(&plans)?;
            }
            PlanCommands::ValidateDeps { db, project } => {
                let planner = open_planner(&db, CapacityPolicy::default())?;
                let result = planner.validate_dependencies(&project)?;
                print_json(&result)?;
                if !result.is_valid {
                    std::process::exit(1);
                }
            }
            PlanCommands::Timeline { db, project } => {
                let planner = open_planner(&db, CapacityPolicy::default())?;
                let timeline = planner.hardware_timeline(&project)?;
                print_json(&timeline)?;
            }
            PlanCommands::Delete { db, plan_id } => {
                let planner = open_planner(&db, CapacityPolicy::default())?;
                planner.delete_plan(&plan_id)?;
                tracing::info!("Deleted plan {}", plan_id);
                println!("deleted plan {}", plan_id);
            }
        },
    }

    Ok(())
}
