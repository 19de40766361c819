//! `waypost simulate` - run a create-cluster workflow against the local engine.
//!
//! The workflow opens a process for the cluster, records one event per
//! provisioning step and starts a `create-node-pool` child execution per
//! worker pool. A step named by `--fail-step` fails, which fails its
//! process and every ancestor.

use anyhow::{Result, anyhow};
use clap::Args;
use std::sync::Arc;
use uuid::Uuid;

use waypost_audit::{AuditService, ProcessService};
use waypost_core::WaypostConfig;
use waypost_runtime::{
    Clock, CollectingWarnings, EventRecorder, ExecutionInfo, LocalDispatcher, NonFatal,
    ProcessRecorder, SystemClock, WorkflowContext, process_log_registry,
};

use super::processes::{event_line, process_line};

pub const CLUSTER_WORKFLOW: &str = "create-cluster";
pub const NODE_POOL_WORKFLOW: &str = "create-node-pool";

const CLUSTER_STEPS: [&str; 3] = ["create-vpc", "create-master", "wait-for-master"];
const NODE_POOL_STEPS: [&str; 2] = ["create-stack", "wait-for-nodes"];

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Organization owning the cluster.
    #[arg(long, default_value_t = 7)]
    pub org: u32,

    /// Cluster resource id.
    #[arg(long, default_value = "cluster-42")]
    pub resource: String,

    /// Number of worker pools, each run as a child execution.
    #[arg(long, default_value_t = 2)]
    pub pools: usize,

    /// Step name that should fail.
    #[arg(long)]
    pub fail_step: Option<String>,
}

/// What a simulated run left behind.
#[derive(Debug)]
pub struct Simulation {
    pub execution_id: String,
    pub outcome: Result<(), String>,
    pub warnings: Vec<NonFatal>,
}

pub async fn run(
    service: Arc<AuditService>,
    config: &WaypostConfig,
    args: &SimulateArgs,
) -> Result<()> {
    let simulation = simulate(service.clone(), config, args, Arc::new(SystemClock)).await?;

    match &simulation.outcome {
        Ok(()) => println!("Workflow {} finished", simulation.execution_id),
        Err(e) => println!("Workflow {} failed: {}", simulation.execution_id, e),
    }

    if let Some(details) = service.process_details(&simulation.execution_id).await? {
        println!("{}", process_line(&details.process));
        for event in &details.events {
            println!("  {}", event_line(event));
        }
    }
    for child in service.children(&simulation.execution_id).await? {
        println!("{}", process_line(&child));
        for event in service.list_events(&child.id).await? {
            println!("  {}", event_line(&event));
        }
    }

    if !simulation.warnings.is_empty() {
        println!("\n{} audit write(s) failed:", simulation.warnings.len());
        for warning in &simulation.warnings {
            println!("  {}", warning);
        }
    }

    Ok(())
}

/// Run one simulated workflow and collect its outcome.
pub async fn simulate(
    service: Arc<AuditService>,
    config: &WaypostConfig,
    args: &SimulateArgs,
    clock: Arc<dyn Clock>,
) -> Result<Simulation> {
    let service: Arc<dyn ProcessService> = service;
    let registry = Arc::new(process_log_registry(service)?);
    let dispatcher = Arc::new(LocalDispatcher::from_config(registry, &config.activities));
    let warnings = Arc::new(CollectingWarnings::new());

    let execution_id = Uuid::new_v4().to_string();
    let ctx = WorkflowContext::builder(
        ExecutionInfo::root(execution_id.clone(), CLUSTER_WORKFLOW),
        dispatcher,
    )
    .clock(clock)
    .warnings(warnings.clone())
    .build();

    tracing::info!(execution_id = %execution_id, pools = args.pools, "Starting simulated workflow");
    let outcome = create_cluster(&ctx, args).await.map_err(|e| e.to_string());

    Ok(Simulation {
        execution_id,
        outcome,
        warnings: warnings.warnings(),
    })
}

async fn create_cluster(ctx: &WorkflowContext, args: &SimulateArgs) -> Result<()> {
    let process = ProcessRecorder::open(ctx, args.org, &args.resource).await;

    let outcome: Result<()> = async {
        for name in CLUSTER_STEPS {
            step(ctx, name, args.fail_step.as_deref()).await?;
        }
        for pool in 0..args.pools {
            let child = ctx.child(Uuid::new_v4().to_string(), NODE_POOL_WORKFLOW);
            create_node_pool(&child, args)
                .await
                .map_err(|e| anyhow!("node pool {} failed: {}", pool, e))?;
        }
        Ok(())
    }
    .await;

    process.close(ctx, &outcome).await;
    outcome
}

async fn create_node_pool(ctx: &WorkflowContext, args: &SimulateArgs) -> Result<()> {
    let process = ProcessRecorder::open(ctx, args.org, &args.resource).await;

    let outcome: Result<()> = async {
        for name in NODE_POOL_STEPS {
            step(ctx, name, args.fail_step.as_deref()).await?;
        }
        Ok(())
    }
    .await;

    process.close(ctx, &outcome).await;
    outcome
}

async fn step(ctx: &WorkflowContext, name: &str, fail_step: Option<&str>) -> Result<()> {
    let event = EventRecorder::open(ctx, name).await;

    let outcome = if fail_step == Some(name) {
        Err(anyhow!("{}: simulated provider error", name))
    } else {
        Ok(())
    };

    event.close(ctx, &outcome).await;
    outcome
}
