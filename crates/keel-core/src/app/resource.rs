//! JobResource - managed-resource lifecycle (Create / Read / Update / Delete /
//! Exists) plus plan-time validation.
//!
//! This is the surface a declarative tool drives. Each operation takes the
//! caller-owned `ReconciliationState`; nothing is cached between calls.
//!
//! Not-found handling per operation:
//! - `read`: job gone ⇒ `ReadOutcome::Gone` (caller drops the record, next
//!   apply recreates)
//! - `plan`: job gone ⇒ `PlanAction::Create`
//! - `delete`: job gone ⇒ success

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::builder::Reconciler;
use super::config::ResourceConfig;
use super::deployment::ObserveMode;
use super::submission::{Submission, SubmitOptions};
use super::teardown::TeardownOutcome;
use crate::domain::{
    DEFAULT_NAMESPACE, DefaultDriftDecider, DriftDecision, DriftReport, JobIdentity,
    JobSpecification, JobType, ParsedJob, ReconcileError, ReconciliationState, SchedulerError,
};

/// Why an existing job will be resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    /// Desired jobspec or variables changed.
    SpecChanged,
    /// Stopped externally and `rerun_if_dead` is set.
    Rerun,
    /// Someone changed the job on the scheduler.
    RemoteDrift,
    /// An earlier migration registered nothing under the new identity yet.
    PendingSubmission,
    /// Scheduler could not be asked; assume the job needs attention.
    RemoteUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    Create,
    Update { reason: UpdateReason },
    /// Identity change: destroy under `from`, create under `to`.
    Replace { from: JobIdentity, to: JobIdentity },
    /// Only local flags (teardown, rerun, detach) changed.
    UpdateSettings,
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub identity: JobIdentity,
    pub action: PlanAction,
    pub remote_unavailable: bool,
}

impl Plan {
    fn new(identity: JobIdentity, action: PlanAction) -> Self {
        Self {
            identity,
            action,
            remote_unavailable: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.action == PlanAction::NoOp
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// No job behind the record; drop it so the next apply recreates.
    Gone,
    Present(DriftReport),
}

/// Failed create/apply. `state` holds whatever was registered before the
/// failure and must be persisted by the caller.
#[derive(Debug, thiserror::Error)]
#[error("apply failed")]
pub struct ApplyFailure {
    pub state: Option<ReconciliationState>,
    #[source]
    pub error: ReconcileError,
}

impl ApplyFailure {
    fn new(state: Option<ReconciliationState>, error: ReconcileError) -> Self {
        Self { state, error }
    }
}

pub struct JobResource<'a> {
    reconciler: &'a Reconciler,
}

impl<'a> JobResource<'a> {
    pub fn new(reconciler: &'a Reconciler) -> Self {
        Self { reconciler }
    }

    /// Parse the jobspec and work out which identity it targets.
    ///
    /// Namespace: resource option, else the jobspec's, else `default`.
    pub fn resolve(&self, config: &ResourceConfig) -> Result<(ParsedJob, JobIdentity), ReconcileError> {
        let job = self
            .reconciler
            .submission()
            .validate(&config.specification())?;
        let namespace = config
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| job.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let identity = JobIdentity::new(job.id.clone(), namespace);
        Ok((job, identity))
    }

    #[instrument(skip_all)]
    pub async fn create(&self, config: &ResourceConfig) -> Result<ReconciliationState, ApplyFailure> {
        let (_, identity) = self
            .resolve(config)
            .map_err(|error| ApplyFailure::new(None, error))?;
        let mut state = ReconciliationState::new(identity, config.policy());
        let deadline = self.reconciler.context().deadline();
        let options = SubmitOptions::from(&state.policy).within(deadline);

        let result = match self
            .reconciler
            .submission()
            .submit(&config.specification(), &mut state, options)
            .await
        {
            Ok(submission) => self.observe_rollout(&mut state, &submission, options).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => Ok(state),
            Err(error) if state.is_pending_submission() => Err(ApplyFailure::new(None, error)),
            Err(error) => Err(ApplyFailure::new(Some(state), error)),
        }
    }

    /// Refresh the record from the scheduler and run the drift check.
    #[instrument(
        skip_all,
        fields(job_id = %state.identity.id, namespace = %state.identity.namespace)
    )]
    pub async fn read(&self, state: &mut ReconciliationState) -> Result<ReadOutcome, ReconcileError> {
        if state.is_pending_submission() {
            debug!("nothing registered under this identity yet");
            return Ok(ReadOutcome::Gone);
        }

        let applied = JobSpecification {
            source: state.source.clone(),
            format: state.format,
            variables: state.variables.clone(),
            allow_fs: false,
        };
        let decider = DefaultDriftDecider::new(state.policy.rerun_if_dead);
        let report = self
            .reconciler
            .drift()
            .check_drift(&state.identity, state.version, &applied, &decider)
            .await?;

        let Some(remote) = report.remote.as_ref() else {
            info!("job no longer exists on the scheduler");
            return Ok(ReadOutcome::Gone);
        };
        state.record_remote(remote);

        if remote.job_type == JobType::Service && !remote.parameterized {
            let deadline = self.reconciler.context().deadline();
            let deployment = self
                .reconciler
                .deployments()
                .observe(&state.identity, remote.version, ObserveMode::Once, deadline)
                .await?;
            state.record_deployment(deployment.as_ref());
        } else {
            state.clear_deployment();
        }

        Ok(ReadOutcome::Present(report))
    }

    /// Resubmit the desired jobspec. An identity change runs as a migration.
    #[instrument(
        skip_all,
        fields(job_id = %state.identity.id, namespace = %state.identity.namespace)
    )]
    pub async fn update(
        &self,
        state: &mut ReconciliationState,
        config: &ResourceConfig,
    ) -> Result<(), ReconcileError> {
        let (_, desired) = self.resolve(config)?;
        let spec = config.specification();
        let policy = config.policy();
        // One deadline covers teardown, submission and the rollout wait.
        let deadline = self.reconciler.context().deadline();
        let options = SubmitOptions::from(&policy).within(deadline);

        let result = if desired != state.identity && !state.is_pending_submission() {
            self.reconciler
                .migration()
                .migrate(state, desired, &spec, options)
                .await
        } else {
            if desired != state.identity {
                state.retarget(desired);
            }
            self.reconciler.submission().submit(&spec, state, options).await
        };
        // The old teardown flags apply to the migration; the new ones from here on.
        state.policy = policy;

        let submission = result?;
        self.observe_rollout(state, &submission, options).await
    }

    #[instrument(
        skip_all,
        fields(job_id = %state.identity.id, namespace = %state.identity.namespace)
    )]
    pub async fn delete(&self, state: &ReconciliationState) -> Result<TeardownOutcome, ReconcileError> {
        if state.is_pending_submission() {
            return Ok(TeardownOutcome::AlreadyAbsent);
        }
        let deadline = self.reconciler.context().deadline();
        self.reconciler
            .teardown()
            .teardown(&state.identity, state.teardown_policy(), deadline)
            .await
    }

    pub async fn exists(&self, state: &ReconciliationState) -> Result<bool, ReconcileError> {
        if state.is_pending_submission() {
            return Ok(false);
        }
        let ctx = self.reconciler.context();
        let lookup = ctx.scheduler.job_info(&state.identity);
        match ctx.call(ctx.deadline(), "job info", lookup).await? {
            Ok(_) => Ok(true),
            Err(SchedulerError::NotFound) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Decide what `apply` would do. Local parse errors fail the plan; an
    /// unreachable scheduler does not.
    #[instrument(skip_all)]
    pub async fn plan(
        &self,
        state: Option<&ReconciliationState>,
        config: &ResourceConfig,
    ) -> Result<Plan, ReconcileError> {
        let spec = config.specification();
        let (_, desired) = self.resolve(config)?;

        let Some(state) = state else {
            return Ok(Plan::new(desired, PlanAction::Create));
        };
        if state.is_pending_submission() {
            return Ok(Plan::new(
                desired,
                PlanAction::Update {
                    reason: UpdateReason::PendingSubmission,
                },
            ));
        }
        if desired != state.identity {
            return Ok(Plan::new(
                desired.clone(),
                PlanAction::Replace {
                    from: state.identity.clone(),
                    to: desired,
                },
            ));
        }

        let decider = DefaultDriftDecider::new(config.rerun_if_dead);
        let report = match self
            .reconciler
            .drift()
            .check_drift(&state.identity, state.version, &spec, &decider)
            .await
        {
            Ok(report) => report,
            Err(ReconcileError::Scheduler(SchedulerError::Unavailable(message))) => {
                warn!(%message, "scheduler unreachable while planning");
                return Ok(Plan {
                    identity: desired,
                    action: PlanAction::Update {
                        reason: UpdateReason::RemoteUnavailable,
                    },
                    remote_unavailable: true,
                });
            }
            Err(err) => return Err(err),
        };

        let update = |reason| Plan::new(desired.clone(), PlanAction::Update { reason });
        let plan = match report.decision {
            DriftDecision::Absent => Plan::new(desired.clone(), PlanAction::Create),
            DriftDecision::RerunRequired => update(UpdateReason::Rerun),
            _ if state.source != spec.source
                || state.variables != spec.variables
                || state.format != spec.format =>
            {
                update(UpdateReason::SpecChanged)
            }
            _ if report.source_drift.as_ref().is_some_and(|d| d.is_drifted()) => {
                update(UpdateReason::RemoteDrift)
            }
            _ if state.policy != config.policy() => {
                Plan::new(desired.clone(), PlanAction::UpdateSettings)
            }
            _ => Plan::new(desired.clone(), PlanAction::NoOp),
        };
        debug!(action = ?plan.action, "plan computed");
        Ok(plan)
    }

    /// Plan, then carry the plan out.
    pub async fn apply(
        &self,
        state: Option<ReconciliationState>,
        config: &ResourceConfig,
    ) -> Result<ReconciliationState, ApplyFailure> {
        let plan = match self.plan(state.as_ref(), config).await {
            Ok(plan) => plan,
            Err(error) => return Err(ApplyFailure::new(state, error)),
        };
        self.execute(&plan, state, config).await
    }

    #[instrument(skip_all, fields(action = ?plan.action))]
    pub async fn execute(
        &self,
        plan: &Plan,
        state: Option<ReconciliationState>,
        config: &ResourceConfig,
    ) -> Result<ReconciliationState, ApplyFailure> {
        match (&plan.action, state) {
            (PlanAction::NoOp, Some(state)) => Ok(state),
            (PlanAction::UpdateSettings, Some(mut state)) => {
                state.policy = config.policy();
                Ok(state)
            }
            (PlanAction::Create, _) | (_, None) => self.create(config).await,
            (_, Some(mut state)) => match self.update(&mut state, config).await {
                Ok(()) => Ok(state),
                Err(error) => Err(ApplyFailure::new(Some(state), error)),
            },
        }
    }

    async fn observe_rollout(
        &self,
        state: &mut ReconciliationState,
        submission: &Submission,
        options: SubmitOptions,
    ) -> Result<(), ReconcileError> {
        let Some(mode) = ObserveMode::after_submission(&submission.job, options.detach) else {
            state.clear_deployment();
            return Ok(());
        };
        let observed = self
            .reconciler
            .deployments()
            .observe(&state.identity, submission.version.version, mode, options.deadline)
            .await;
        match observed {
            Ok(deployment) => {
                state.record_deployment(deployment.as_ref());
                Ok(())
            }
            Err(ReconcileError::DeploymentFailed { deployment }) => {
                state.record_deployment(Some(&deployment));
                Err(ReconcileError::DeploymentFailed { deployment })
            }
            Err(err) => Err(err),
        }
    }
}
