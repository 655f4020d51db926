//! Teardown Manager - job の停止と削除
//!
//! | policy                   | remote action          | 完了条件                    |
//! |--------------------------|------------------------|-----------------------------|
//! | deregister=false         | なし                   | 即成功                      |
//! | deregister, purge=false  | DeregisterJob          | status=dead or not found    |
//! | deregister, purge=true   | DeregisterJob(purge)   | 即成功（ポーリングなし）    |
//!
//! DeregisterJob の not-found は成功（冪等）。

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::context::Context;
use super::poll::{Deadline, Tick};
use crate::domain::{JobIdentity, JobStatus, ReconcileError, SchedulerError, TeardownPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// `deregister = false`: left running remotely.
    Skipped,
    AlreadyAbsent,
    Purged,
    Stopped,
}

pub struct TeardownManager {
    ctx: Context,
}

impl TeardownManager {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    #[instrument(
        skip_all,
        fields(job_id = %identity.id, namespace = %identity.namespace, purge = policy.purge)
    )]
    pub async fn teardown(
        &self,
        identity: &JobIdentity,
        policy: TeardownPolicy,
        deadline: Deadline,
    ) -> Result<TeardownOutcome, ReconcileError> {
        if !policy.deregister {
            info!("deregister_on_destroy is off, leaving the job running");
            return Ok(TeardownOutcome::Skipped);
        }

        let deregistration = self.ctx.scheduler.deregister_job(identity, policy.purge);
        match self.ctx.call(deadline, "deregistration", deregistration).await? {
            Ok(eval_id) => {
                debug!(eval_id = eval_id.as_ref().map(|id| id.as_str()), "job deregistered");
            }
            Err(SchedulerError::NotFound) => {
                info!("job already absent");
                return Ok(TeardownOutcome::AlreadyAbsent);
            }
            Err(err) => return Err(err.into()),
        }

        if policy.purge {
            info!("job purged");
            return Ok(TeardownOutcome::Purged);
        }

        self.wait_dead(identity, deadline).await?;
        info!("job stopped");
        Ok(TeardownOutcome::Stopped)
    }

    async fn wait_dead(
        &self,
        identity: &JobIdentity,
        deadline: Deadline,
    ) -> Result<(), ReconcileError> {
        let mut poller = self
            .ctx
            .poller(self.ctx.config.teardown, deadline, "job to stop");
        loop {
            match poller.tick().await? {
                Tick::Exhausted(attempts) => {
                    debug!(attempts, "job did not reach dead");
                    return Err(ReconcileError::JobNotStopped(identity.clone()));
                }
                Tick::Attempt(attempt) => match poller
                    .call(self.ctx.scheduler.job_info(identity))
                    .await?
                {
                    Ok(job) if job.status == JobStatus::Dead => return Ok(()),
                    Ok(job) => debug!(attempt, status = job.status.as_str(), "job still stopping"),
                    // Garbage-collected between polls.
                    Err(SchedulerError::NotFound) => return Ok(()),
                    Err(err) => return Err(err.into()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{context, register};
    use crate::domain::{DEFAULT_NAMESPACE, ParsedJob};
    use crate::impls::inmem_scheduler::{InMemoryScheduler, SimBehavior};
    use std::sync::Arc;

    #[tokio::test]
    async fn keep_running_makes_no_remote_call() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let identity = JobIdentity::in_default_namespace("foo");
        register(&scheduler, ParsedJob::service("foo"), DEFAULT_NAMESPACE).await;
        let manager = TeardownManager::new(context(scheduler.clone()));

        let outcome = manager
            .teardown(&identity, TeardownPolicy::keep_running(), Deadline::default())
            .await
            .unwrap();

        assert_eq!(outcome, TeardownOutcome::Skipped);
        assert_eq!(scheduler.calls().await.deregister, 0);
        assert!(scheduler.job(&identity).await.is_some());
    }

    #[tokio::test]
    async fn deregister_waits_for_dead() {
        let scheduler = Arc::new(InMemoryScheduler::new().with_behavior(SimBehavior {
            stop_polls: 3,
            ..SimBehavior::default()
        }));
        let identity = JobIdentity::in_default_namespace("foo");
        register(&scheduler, ParsedJob::service("foo"), DEFAULT_NAMESPACE).await;
        let manager = TeardownManager::new(context(scheduler.clone()));

        let outcome = manager
            .teardown(&identity, TeardownPolicy::deregister(), Deadline::default())
            .await
            .unwrap();

        assert_eq!(outcome, TeardownOutcome::Stopped);
        assert_eq!(scheduler.calls().await.info, 3);
        let job = scheduler.job(&identity).await.unwrap();
        assert_eq!(job.status, JobStatus::Dead);
        assert!(job.stop);
    }

    #[tokio::test]
    async fn unknown_job_is_already_absent() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let manager = TeardownManager::new(context(scheduler));

        let outcome = manager
            .teardown(
                &JobIdentity::in_default_namespace("ghost"),
                TeardownPolicy::purge(),
                Deadline::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, TeardownOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn unreachable_scheduler_is_not_swallowed() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        scheduler.set_unreachable(true).await;
        let manager = TeardownManager::new(context(scheduler));

        let err = manager
            .teardown(
                &JobIdentity::in_default_namespace("foo"),
                TeardownPolicy::deregister(),
                Deadline::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Scheduler(SchedulerError::Unavailable(_))));
        assert!(err.is_retryable());
    }
}
