//! Drift Detector - 観測したリモート状態と desired state の比較
//!
//! 読み取り専用: `ReconciliationState` を変更しない。
//! ソースの差分は報告するだけで、修正は通常の update 経路に任せる。

use tracing::{debug, instrument, warn};

use super::context::Context;
use crate::domain::{
    DriftDecider, DriftDecision, DriftReport, JobIdentity, JobSpecification, ReconcileError,
    SchedulerError, SourceDrift,
};

pub struct DriftDetector {
    ctx: Context,
}

impl DriftDetector {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    #[instrument(
        skip_all,
        fields(job_id = %identity.id, namespace = %identity.namespace, desired_version = ?desired_version)
    )]
    pub async fn check_drift(
        &self,
        identity: &JobIdentity,
        desired_version: Option<u64>,
        desired: &JobSpecification,
        decider: &dyn DriftDecider,
    ) -> Result<DriftReport, ReconcileError> {
        let deadline = self.ctx.deadline();
        let remote = match self
            .ctx
            .call(deadline, "job info", self.ctx.scheduler.job_info(identity))
            .await?
        {
            Ok(remote) => remote,
            Err(SchedulerError::NotFound) => {
                debug!("job not found on the scheduler");
                return Ok(DriftReport::absent());
            }
            Err(err) => return Err(err.into()),
        };

        let decision = decider.decide(Some(&remote));
        match decision {
            DriftDecision::ExternallyStopped => {
                debug!("job was stopped outside this reconciler, leaving it stopped")
            }
            DriftDecision::RerunRequired => {
                warn!("job was stopped outside this reconciler and will be resubmitted")
            }
            _ => {}
        }

        let submission = self.ctx.scheduler.job_submission(identity, remote.version);
        let source_drift = match self.ctx.call(deadline, "job submission", submission).await? {
            Ok(submission) => Some(SourceDrift {
                expected_version: desired_version,
                remote_version: remote.version,
                source_differs: submission.source != desired.source,
                variables_differ: submission.variables != desired.variables,
            }),
            // Jobs registered without a source have nothing to compare against.
            Err(SchedulerError::NotFound) => None,
            Err(err) => return Err(err.into()),
        };

        if let Some(drift) = source_drift.as_ref().filter(|drift| drift.is_drifted()) {
            warn!(
                remote_version = drift.remote_version,
                source_differs = drift.source_differs,
                variables_differ = drift.variables_differ,
                "remote job differs from the desired jobspec"
            );
        }

        Ok(DriftReport {
            decision,
            remote: Some(remote),
            source_drift,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{context, register_spec};
    use crate::domain::DefaultDriftDecider;
    use crate::impls::inmem_scheduler::InMemoryScheduler;
    use std::sync::Arc;

    const FOO: &str = r#"{"ID": "foo", "Name": "foo"}"#;

    #[tokio::test]
    async fn absent_job_requires_recreate() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let detector = DriftDetector::new(context(scheduler));

        let report = detector
            .check_drift(
                &JobIdentity::in_default_namespace("foo"),
                Some(1),
                &JobSpecification::json(FOO),
                &DefaultDriftDecider::new(false),
            )
            .await
            .unwrap();

        assert_eq!(report.decision, DriftDecision::Absent);
        assert!(report.decision.requires_submission());
    }

    #[tokio::test]
    async fn out_of_band_source_change_is_reported() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let identity = JobIdentity::in_default_namespace("foo");
        register_spec(&scheduler, &JobSpecification::json(FOO), "default").await;
        let edited = JobSpecification::json(r#"{"ID": "foo", "Name": "foo", "Type": "batch"}"#);
        register_spec(&scheduler, &edited, "default").await;
        let detector = DriftDetector::new(context(scheduler.clone()));

        let report = detector
            .check_drift(
                &identity,
                Some(1),
                &JobSpecification::json(FOO),
                &DefaultDriftDecider::new(false),
            )
            .await
            .unwrap();

        assert_eq!(report.decision, DriftDecision::None);
        let drift = report.source_drift.unwrap();
        assert!(drift.source_differs);
        assert_eq!(drift.remote_version, 2);
        assert!(drift.is_drifted());
        // reported only: nothing was resubmitted
        assert_eq!(scheduler.calls().await.register, 2);
    }

    #[tokio::test]
    async fn in_sync_job_has_no_drift() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let identity = JobIdentity::in_default_namespace("foo");
        register_spec(&scheduler, &JobSpecification::json(FOO), "default").await;
        let detector = DriftDetector::new(context(scheduler));

        let report = detector
            .check_drift(
                &identity,
                Some(1),
                &JobSpecification::json(FOO),
                &DefaultDriftDecider::new(true),
            )
            .await
            .unwrap();

        assert_eq!(report.decision, DriftDecision::None);
        assert!(!report.source_drift.unwrap().is_drifted());
    }
}
