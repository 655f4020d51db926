//! Submission Manager - jobspec の検証と登録
//!
//! # フロー
//! 1. parse（失敗は local validation error、リモート呼び出しなし）
//! 2. RegisterJob
//!    - soft-mandatory ポリシー違反 + override 有効 → override 付きで 1 回だけ再送
//!    - それ以外の違反 → メッセージをそのまま返す
//! 3. state に新しい version を記録（減ることはない）
//! 4. detach=false なら evaluation 完了まで待つ

use tracing::{debug, info, instrument, warn};

use super::context::Context;
use super::poll::{Deadline, Tick};
use crate::domain::{
    EvalId, Evaluation, JobIdentity, JobSpecification, ParsedJob, PolicyLevel, ReconcileError,
    ReconciliationState, RemoteJobVersion, ResourcePolicy, SchedulerError,
};
use crate::ports::RegisterRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitOptions {
    pub policy_override: bool,
    pub detach: bool,

    /// Shared with whatever runs after the submission in the same operation.
    pub deadline: Deadline,
}

impl SubmitOptions {
    pub fn within(self, deadline: Deadline) -> Self {
        Self { deadline, ..self }
    }
}

impl From<&ResourcePolicy> for SubmitOptions {
    fn from(policy: &ResourcePolicy) -> Self {
        Self {
            policy_override: policy.policy_override,
            detach: policy.detach,
            deadline: Deadline::default(),
        }
    }
}

/// Result of one successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub version: RemoteJobVersion,
    pub job: ParsedJob,
    pub eval_id: Option<EvalId>,
    pub modify_index: u64,
    pub warnings: Vec<String>,

    /// Final evaluation, when the submission waited for it.
    pub evaluation: Option<Evaluation>,

    /// The registration only went through on the override resubmission.
    pub overridden: bool,
}

pub struct SubmissionManager {
    ctx: Context,
}

impl SubmissionManager {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Parse the jobspec without touching the scheduler.
    pub fn validate(&self, spec: &JobSpecification) -> Result<ParsedJob, ReconcileError> {
        Ok(self.ctx.parser.parse(spec)?)
    }

    /// Register `spec` under `state.identity` and record the new version.
    ///
    /// On failure `state` is left untouched, except when the registration
    /// succeeded and only the evaluation wait failed: the version is recorded
    /// before waiting.
    #[instrument(
        skip_all,
        fields(job_id = %state.identity.id, namespace = %state.identity.namespace)
    )]
    pub async fn submit(
        &self,
        spec: &JobSpecification,
        state: &mut ReconciliationState,
        options: SubmitOptions,
    ) -> Result<Submission, ReconcileError> {
        let identity = state.identity.clone();
        let job = self.validate(spec)?;
        if job.id != identity.id {
            return Err(ReconcileError::IdentityMismatch {
                declared: job.id,
                identity,
            });
        }

        let mut request = RegisterRequest {
            namespace: identity.namespace.clone(),
            job: job.clone(),
            source: spec.source.clone(),
            format: spec.format,
            variables: spec.variables.clone(),
            policy_override: false,
        };

        let mut overridden = false;
        let registration = self.ctx.scheduler.register_job(request.clone());
        let response = match self
            .ctx
            .call(options.deadline, "registration", registration)
            .await?
        {
            Ok(response) => response,
            Err(SchedulerError::PolicyViolation {
                level: PolicyLevel::SoftMandatory,
                message,
            }) if options.policy_override => {
                warn!(%message, "soft-mandatory policy failed, resubmitting with override");
                request.policy_override = true;
                overridden = true;
                let registration = self.ctx.scheduler.register_job(request);
                self.ctx
                    .call(options.deadline, "registration", registration)
                    .await?
                    .map_err(surface)?
            }
            Err(err) => return Err(surface(err)),
        };

        for warning in &response.warnings {
            warn!(%warning, "scheduler returned a warning for the registration");
        }

        if let Some(previous) = state.version
            && response.version <= previous
        {
            warn!(
                previous,
                version = response.version,
                "scheduler reported a version that does not advance the recorded one"
            );
        }

        let version = RemoteJobVersion {
            identity: identity.clone(),
            version: response.version,
            submitted_source: spec.source.clone(),
            submitted_variables: spec.variables.clone(),
        };
        state.record_submission(&version, &job, spec.format, response.modify_index);
        info!(
            version = response.version,
            eval_id = response.eval_id.as_ref().map(|id| id.as_str()),
            "job registered"
        );

        let evaluation = match &response.eval_id {
            Some(eval_id) if !options.detach && job.creates_evaluation() => {
                Some(
                    self.wait_for_evaluation(eval_id, &identity, options.deadline)
                        .await?,
                )
            }
            _ => None,
        };

        Ok(Submission {
            version,
            job,
            eval_id: response.eval_id,
            modify_index: response.modify_index,
            warnings: response.warnings,
            evaluation,
            overridden,
        })
    }

    /// Block until the scheduler has processed the registration.
    pub async fn wait_for_evaluation(
        &self,
        eval_id: &EvalId,
        identity: &JobIdentity,
        deadline: Deadline,
    ) -> Result<Evaluation, ReconcileError> {
        let mut poller = self
            .ctx
            .poller(self.ctx.config.evaluation, deadline, "evaluation");
        loop {
            match poller.tick().await? {
                Tick::Exhausted(attempts) => {
                    return Err(ReconcileError::timeout(poller.operation(), attempts));
                }
                Tick::Attempt(attempt) => {
                    let evaluation = poller
                        .call(self.ctx.scheduler.evaluation(eval_id, &identity.namespace))
                        .await??;
                    if evaluation.status.is_evaluated() {
                        debug!(%eval_id, status = ?evaluation.status, "evaluation finished");
                        return Ok(evaluation);
                    }
                    if evaluation.status.is_failure() {
                        return Err(ReconcileError::EvaluationFailed {
                            eval_id: eval_id.clone(),
                            status: evaluation.status,
                            description: evaluation.status_description.unwrap_or_default(),
                        });
                    }
                    debug!(%eval_id, attempt, "evaluation still pending");
                }
            }
        }
    }
}

/// Policy rejections are passed through with their original text.
fn surface(err: SchedulerError) -> ReconcileError {
    match err {
        SchedulerError::PolicyViolation { message, .. } => ReconcileError::Policy(message),
        other => ReconcileError::Scheduler(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{context, state_for};
    use crate::domain::{DEFAULT_NAMESPACE, EvalStatus};
    use crate::impls::inmem_scheduler::{InMemoryScheduler, SimBehavior, SimPolicy};
    use std::sync::Arc;

    const FOO: &str = r#"{"Job": {"ID": "foo", "Name": "foo", "Type": "service"}}"#;

    #[tokio::test]
    async fn first_submission_is_version_one() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let manager = SubmissionManager::new(context(scheduler.clone()));
        let mut state = state_for("foo", DEFAULT_NAMESPACE);

        let submission = manager
            .submit(&JobSpecification::json(FOO), &mut state, SubmitOptions::default())
            .await
            .unwrap();

        assert_eq!(submission.version.version, 1);
        assert_eq!(state.version, Some(1));
        assert_eq!(state.name, "foo");
        assert_eq!(scheduler.calls().await.register, 1);
    }

    #[tokio::test]
    async fn invalid_json_never_reaches_the_scheduler() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let manager = SubmissionManager::new(context(scheduler.clone()));
        let mut state = state_for("foo", DEFAULT_NAMESPACE);

        let err = manager
            .submit(&JobSpecification::json("{not json"), &mut state, SubmitOptions::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("error parsing jobspec"));
        assert!(err.is_local());
        assert_eq!(scheduler.calls().await.register, 0);
        assert!(state.is_pending_submission());
    }

    #[tokio::test]
    async fn jobspec_for_another_job_is_rejected_locally() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let manager = SubmissionManager::new(context(scheduler.clone()));
        let mut state = state_for("bar", DEFAULT_NAMESPACE);

        let err = manager
            .submit(&JobSpecification::json(FOO), &mut state, SubmitOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::IdentityMismatch { .. }));
        assert_eq!(scheduler.calls().await.register, 0);
    }

    #[tokio::test]
    async fn hard_mandatory_policy_is_never_overridden() {
        let scheduler =
            Arc::new(InMemoryScheduler::new().with_policy(SimPolicy::hard_mandatory("no-foo")));
        let manager = SubmissionManager::new(context(scheduler.clone()));
        let mut state = state_for("foo", DEFAULT_NAMESPACE);
        let options = SubmitOptions {
            policy_override: true,
            detach: true,
            ..SubmitOptions::default()
        };

        let err = manager
            .submit(&JobSpecification::json(FOO), &mut state, options)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Policy(ref msg) if msg.contains("hard-mandatory")));
        assert_eq!(scheduler.calls().await.register, 1);
    }

    #[tokio::test]
    async fn registration_warnings_are_returned() {
        let scheduler =
            Arc::new(InMemoryScheduler::new().with_policy(SimPolicy::advisory("prefer-canary")));
        let manager = SubmissionManager::new(context(scheduler.clone()));
        let mut state = state_for("foo", DEFAULT_NAMESPACE);

        let submission = manager
            .submit(&JobSpecification::json(FOO), &mut state, SubmitOptions::default())
            .await
            .unwrap();

        assert_eq!(submission.warnings.len(), 1);
        assert!(submission.warnings[0].contains("prefer-canary"));
    }

    #[tokio::test]
    async fn attached_submission_waits_for_evaluation() {
        let scheduler = Arc::new(InMemoryScheduler::new().with_behavior(SimBehavior {
            eval_polls: 3,
            ..SimBehavior::default()
        }));
        let manager = SubmissionManager::new(context(scheduler.clone()));
        let mut state = state_for("foo", DEFAULT_NAMESPACE);
        let options = SubmitOptions {
            policy_override: false,
            detach: false,
            ..SubmitOptions::default()
        };

        let submission = manager
            .submit(&JobSpecification::json(FOO), &mut state, options)
            .await
            .unwrap();

        assert_eq!(
            submission.evaluation.map(|e| e.status),
            Some(EvalStatus::Complete)
        );
        assert_eq!(scheduler.calls().await.evaluation, 3);
    }

    #[tokio::test]
    async fn failed_evaluation_fails_the_submission_but_keeps_the_version() {
        let scheduler = Arc::new(InMemoryScheduler::new().with_behavior(SimBehavior {
            eval_outcome: EvalStatus::Failed,
            ..SimBehavior::default()
        }));
        let manager = SubmissionManager::new(context(scheduler.clone()));
        let mut state = state_for("foo", DEFAULT_NAMESPACE);
        let options = SubmitOptions {
            policy_override: false,
            detach: false,
            ..SubmitOptions::default()
        };

        let err = manager
            .submit(&JobSpecification::json(FOO), &mut state, options)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::EvaluationFailed { .. }));
        assert_eq!(state.version, Some(1));
    }

    #[tokio::test]
    async fn detached_submission_does_not_poll_evaluation() {
        let scheduler = Arc::new(InMemoryScheduler::new());
        let manager = SubmissionManager::new(context(scheduler.clone()));
        let mut state = state_for("foo", DEFAULT_NAMESPACE);

        manager
            .submit(&JobSpecification::json(FOO), &mut state, SubmitOptions {
                policy_override: false,
                detach: true,
                ..SubmitOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(scheduler.calls().await.evaluation, 0);
    }
}
