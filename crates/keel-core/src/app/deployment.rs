//! Deployment Monitor - 登録した version の rollout を観測
//!
//! - `Once`: 1 回だけ問い合わせる（detach=true、multi-region、read）
//! - `UntilTerminal`: 発見フェーズ → 終端待ちフェーズ
//!   - 発見フェーズを使い切ったら「deployment なし」（エラーではない）
//!   - 終端待ちを使い切ったら Timeout

use tracing::{debug, info, instrument, warn};

use super::context::Context;
use super::poll::{Deadline, Tick};
use crate::domain::{Deployment, JobIdentity, ParsedJob, ReconcileError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveMode {
    Once,
    UntilTerminal,
}

impl ObserveMode {
    /// How a freshly submitted job is observed, or `None` when the job never
    /// produces a deployment.
    pub fn after_submission(job: &ParsedJob, detach: bool) -> Option<Self> {
        if !job.produces_deployments() {
            None
        } else if detach || job.multiregion {
            Some(ObserveMode::Once)
        } else {
            Some(ObserveMode::UntilTerminal)
        }
    }
}

pub struct DeploymentMonitor {
    ctx: Context,
}

impl DeploymentMonitor {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    #[instrument(
        skip_all,
        fields(job_id = %identity.id, namespace = %identity.namespace, version = version, mode = ?mode)
    )]
    pub async fn observe(
        &self,
        identity: &JobIdentity,
        version: u64,
        mode: ObserveMode,
        deadline: Deadline,
    ) -> Result<Option<Deployment>, ReconcileError> {
        match mode {
            ObserveMode::Once => {
                let latest = self
                    .ctx
                    .call(deadline, "deployment", self.ctx.scheduler.latest_deployment(identity))
                    .await??;
                Ok(latest.filter(|deployment| deployment.job_version == version))
            }
            ObserveMode::UntilTerminal => {
                let Some(found) = self.discover(identity, version, deadline).await? else {
                    return Ok(None);
                };
                self.wait_terminal(identity, found, deadline).await.map(Some)
            }
        }
    }

    async fn discover(
        &self,
        identity: &JobIdentity,
        version: u64,
        deadline: Deadline,
    ) -> Result<Option<Deployment>, ReconcileError> {
        let mut poller = self.ctx.poller(
            self.ctx.config.deployment_discovery,
            deadline,
            "deployment discovery",
        );
        loop {
            match poller.tick().await? {
                Tick::Exhausted(attempts) => {
                    debug!(attempts, "no deployment for this version");
                    return Ok(None);
                }
                Tick::Attempt(_) => {
                    match poller
                        .call(self.ctx.scheduler.latest_deployment(identity))
                        .await??
                    {
                        Some(deployment) if deployment.job_version == version => {
                            info!(deployment_id = %deployment.id, "deployment found");
                            return Ok(Some(deployment));
                        }
                        Some(deployment) if deployment.job_version > version => {
                            warn!(
                                deployment_id = %deployment.id,
                                job_version = deployment.job_version,
                                "job was updated again before its deployment appeared"
                            );
                            return Ok(None);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn wait_terminal(
        &self,
        identity: &JobIdentity,
        mut current: Deployment,
        deadline: Deadline,
    ) -> Result<Deployment, ReconcileError> {
        let mut poller = self
            .ctx
            .poller(self.ctx.config.deployment, deadline, "deployment")
            .delayed();
        loop {
            if current.status.is_success() {
                info!(deployment_id = %current.id, "deployment successful");
                return Ok(current);
            }
            if current.status.is_failure() {
                return Err(ReconcileError::DeploymentFailed {
                    deployment: current,
                });
            }

            match poller.tick().await? {
                Tick::Exhausted(attempts) => {
                    return Err(ReconcileError::timeout(poller.operation(), attempts));
                }
                Tick::Attempt(_) => match poller
                    .call(self.ctx.scheduler.latest_deployment(identity))
                    .await??
                {
                    Some(latest) if latest.id == current.id => {
                        debug!(deployment_id = %latest.id, status = %latest.status, "deployment in progress");
                        current = latest;
                    }
                    _ => {
                        warn!(
                            deployment_id = %current.id,
                            "deployment was superseded before reaching a terminal state"
                        );
                        return Ok(current);
                    }
                },
            }
        }
    }
}
