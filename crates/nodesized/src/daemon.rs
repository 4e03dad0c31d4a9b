//! Wires the catalog, calculator, and one poll supervisor per queue.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use nodesize_calc::ServerCalculator;
use nodesize_core::{DemandSnapshot, NodesizeConfig, QueuedJob};
use nodesize_poll::{FileSource, PollConfig, PollSupervisor, QueueSource, SupervisorHandle};

use crate::output;

/// Build the calculator described by `[calculator]` and `[[sizes]]`.
pub fn build_calculator(config: &NodesizeConfig) -> anyhow::Result<ServerCalculator> {
    let catalog = Arc::new(config.catalog()?);
    info!(sizes = catalog.len(), "size catalog loaded");

    let mut calculator =
        ServerCalculator::new(catalog).with_unsatisfiable_policy(config.unsatisfiable_policy());
    if let Some(max) = config.max_nodes() {
        calculator = calculator.with_max_nodes(max);
    }
    Ok(calculator)
}

/// Poll every configured queue until ctrl-c.
pub async fn run(config: NodesizeConfig) -> anyhow::Result<()> {
    info!("nodesize daemon starting");

    let calculator = Arc::new(build_calculator(&config)?);
    let poll = PollConfig::from(&config.poll_settings()?);
    info!(
        interval = ?poll.interval,
        max_backoff = ?poll.max_backoff,
        queues = config.queues.len(),
        "poll settings loaded"
    );

    let mut handles: Vec<SupervisorHandle<DemandSnapshot>> = Vec::new();
    let mut consumers = Vec::new();

    for queue in &config.queues {
        let source = QueueSource::from_config(&queue.source)
            .with_context(|| format!("queue {}: invalid source", queue.name))?;
        info!(queue = %queue.name, location = %source.location(), "monitoring queue");

        let calc = calculator.clone();
        let supervisor = PollSupervisor::new(
            queue.name.clone(),
            source,
            Box::new(move |jobs: Vec<QueuedJob>| calc.servers_for_queue(&jobs)),
            poll.clone(),
        );

        // Subscribe before the first cycle so nothing is missed.
        let subscription = supervisor.subscribe();
        let status = supervisor.status();
        consumers.push(tokio::spawn(output::emit_demand(
            queue.name.clone(),
            subscription,
        )));
        consumers.push(tokio::spawn(output::emit_health(queue.name.clone(), status)));

        handles.push(supervisor.spawn());
    }

    info!("nodesize daemon ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");

    for handle in handles {
        handle.stop().await;
    }
    // Stopped supervisors drop their senders, which ends the consumers.
    for consumer in consumers {
        let _ = consumer.await;
    }

    info!("nodesize daemon stopped");
    Ok(())
}

/// Size one queue document and print the plan as JSON.
pub async fn plan(config: &NodesizeConfig, queue_file: &Path) -> anyhow::Result<()> {
    let calculator = build_calculator(config)?;
    let jobs = FileSource::new(queue_file)
        .read()
        .await
        .with_context(|| format!("failed to read queue {}", queue_file.display()))?;

    let plan = calculator.plan(&jobs);
    info!(
        jobs = jobs.len(),
        slots = plan.snapshot.len(),
        dropped = plan.dropped.len(),
        "queue sized"
    );

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
