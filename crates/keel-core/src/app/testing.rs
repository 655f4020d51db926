//! Test fixtures shared by the app unit tests.

use std::sync::Arc;

use super::builder::{Reconciler, ReconcilerBuilder};
use super::context::Context;
use crate::domain::{JobIdentity, JobSpecification, ParsedJob, ReconciliationState, ResourcePolicy};
use crate::impls::inmem_scheduler::InMemoryScheduler;
use crate::ports::{JobspecParser, RegisterRequest, SchedulerClient, SimulatedClock};

pub fn reconciler(scheduler: Arc<InMemoryScheduler>) -> Reconciler {
    ReconcilerBuilder::new()
        .scheduler(scheduler)
        .clock(Arc::new(SimulatedClock::default()))
        .build()
        .unwrap()
}

pub fn context(scheduler: Arc<InMemoryScheduler>) -> Context {
    reconciler(scheduler).context().clone()
}

pub fn state_for(id: &str, namespace: &str) -> ReconciliationState {
    ReconciliationState::new(JobIdentity::new(id, namespace), ResourcePolicy::default())
}

/// Register directly on the scheduler, bypassing the managers.
pub async fn register(scheduler: &InMemoryScheduler, job: ParsedJob, namespace: &str) -> u64 {
    scheduler
        .register_job(RegisterRequest {
            namespace: namespace.to_string(),
            source: String::new(),
            format: Default::default(),
            variables: Default::default(),
            job,
            policy_override: false,
        })
        .await
        .unwrap()
        .version
}

pub async fn register_spec(scheduler: &InMemoryScheduler, spec: &JobSpecification, namespace: &str) -> u64 {
    let job = crate::impls::parser::DefaultJobspecParser::new()
        .parse(spec)
        .unwrap();
    scheduler
        .register_job(RegisterRequest {
            namespace: namespace.to_string(),
            job,
            source: spec.source.clone(),
            format: spec.format,
            variables: spec.variables.clone(),
            policy_override: false,
        })
        .await
        .unwrap()
        .version
}
