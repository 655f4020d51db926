//! Command handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use keel_core::app::{ReadOutcome, Reconciler, ReconcilerBuilder, ReconcilerConfig, ResourceConfig};
use keel_core::impls::{HttpSchedulerClient, InMemoryScheduler};
use keel_core::ports::SimulatedClock;
use serde::Serialize;
use tracing::info;

use crate::state_file::StateFile;

pub fn load_config(path: Option<&Path>) -> anyhow::Result<ReconcilerConfig> {
    let config = match path {
        Some(path) => ReconcilerConfig::load(path)?,
        None => ReconcilerConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn http_reconciler(config: &ReconcilerConfig) -> anyhow::Result<Reconciler> {
    let scheduler = HttpSchedulerClient::new(&config.scheduler)?;
    let reconciler = ReconcilerBuilder::new()
        .scheduler(Arc::new(scheduler))
        .config(config.clone())
        .build()?;
    Ok(reconciler)
}

fn load_resource(resource: &Path) -> anyhow::Result<ResourceConfig> {
    ResourceConfig::load(resource)
        .with_context(|| format!("failed to load resource {}", resource.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn plan(config: &ReconcilerConfig, resource: &Path) -> anyhow::Result<()> {
    let desired = load_resource(resource)?;
    let state = StateFile::for_resource(resource).load()?;
    let reconciler = http_reconciler(config)?;

    let plan = reconciler.resource().plan(state.as_ref(), &desired).await?;
    print_json(&plan)
}

pub async fn apply(config: &ReconcilerConfig, resource: &Path) -> anyhow::Result<()> {
    let desired = load_resource(resource)?;
    let state_file = StateFile::for_resource(resource);
    let state = state_file.load()?;
    let reconciler = http_reconciler(config)?;

    match reconciler.resource().apply(state, &desired).await {
        Ok(state) => {
            state_file.save(&state)?;
            info!(job = %state.identity, version = ?state.version, "applied");
            print_json(&state)
        }
        Err(failure) => {
            // Whatever got registered before the failure must be remembered.
            if let Some(state) = &failure.state {
                state_file.save(state)?;
            }
            Err(anyhow::Error::new(failure.error).context("apply failed"))
        }
    }
}

pub async fn refresh(config: &ReconcilerConfig, resource: &Path) -> anyhow::Result<()> {
    let state_file = StateFile::for_resource(resource);
    let Some(mut state) = state_file.load()? else {
        println!("no state at {}", state_file.path().display());
        return Ok(());
    };
    let reconciler = http_reconciler(config)?;

    match reconciler.resource().read(&mut state).await? {
        ReadOutcome::Gone => {
            info!(job = %state.identity, "job is gone, dropping state");
            state_file.remove()
        }
        ReadOutcome::Present(report) => {
            state_file.save(&state)?;
            print_json(&report)
        }
    }
}

pub async fn destroy(config: &ReconcilerConfig, resource: &Path) -> anyhow::Result<()> {
    let state_file = StateFile::for_resource(resource);
    let Some(state) = state_file.load()? else {
        println!("nothing to destroy");
        return Ok(());
    };
    let reconciler = http_reconciler(config)?;

    let outcome = reconciler.resource().delete(&state).await?;
    state_file.remove()?;
    print_json(&outcome)
}

/// create → read → destroy against an in-memory scheduler with virtual time.
pub async fn demo(resource: &Path) -> anyhow::Result<()> {
    let desired = load_resource(resource)?;
    let scheduler = Arc::new(InMemoryScheduler::new());
    let reconciler = ReconcilerBuilder::new()
        .scheduler(scheduler.clone())
        .clock(Arc::new(SimulatedClock::default()))
        .build()?;
    let resource = reconciler.resource();

    let mut state = resource
        .create(&desired)
        .await
        .map_err(|failure| anyhow::Error::new(failure.error).context("create failed"))?;
    println!("created:");
    print_json(&state)?;

    match resource.read(&mut state).await? {
        ReadOutcome::Gone => println!("read: job is gone"),
        ReadOutcome::Present(report) => {
            println!("read:");
            print_json(&report)?;
        }
    }

    let plan = resource.plan(Some(&state), &desired).await?;
    println!("plan after create:");
    print_json(&plan)?;

    let outcome = resource.delete(&state).await?;
    println!("destroyed:");
    print_json(&outcome)?;
    if let Some(job) = scheduler.job(&state.identity).await {
        println!("remote after destroy: status={} stop={}", job.status.as_str(), job.stop);
    }
    println!("scheduler calls: {:?}", scheduler.calls().await);
    Ok(())
}
