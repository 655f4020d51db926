//! InMemoryScheduler - テスト・デモ用のスケジューラシミュレーション
//!
//! # 学習ポイント
//! - tokio::sync::Mutex による状態の排他制御
//! - 非同期に進む状態（evaluation / deployment / 停止）を
//!   「問い合わせ回数」で決定的に進める
//!
//! # 振る舞い
//! - version は identity ごとに 1 から始まり、登録のたびに 1 増える
//! - purge は履歴ごと削除（以後 job_info は NotFound）
//! - purge なしの deregister は stop=true、`stop_polls` 回目の job_info で dead
//! - soft / hard ポリシー、到達不能モード、namespace 単位の登録失敗を再現できる
//! - 呼び出し回数を `calls()` で検証できる

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::domain::{
    Deployment, DeploymentId, DeploymentStatus, EvalId, EvalStatus, Evaluation, JobIdentity,
    JobStatus, JobSubmission, PolicyLevel, RemoteJob, SchedulerError,
};
use crate::ports::{RegisterRequest, RegisterResponse, SchedulerClient};

/// How the simulated asynchronous state progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimBehavior {
    /// `evaluation` calls until the evaluation settles.
    pub eval_polls: u32,
    pub eval_outcome: EvalStatus,

    /// `latest_deployment` calls until the deployment settles.
    pub deployment_polls: u32,
    pub deployment_outcome: DeploymentStatus,

    /// `job_info` calls after a deregister until the job reports dead.
    /// `0` means dead immediately.
    pub stop_polls: u32,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            eval_polls: 1,
            eval_outcome: EvalStatus::Complete,
            deployment_polls: 2,
            deployment_outcome: DeploymentStatus::Successful,
            stop_polls: 1,
        }
    }
}

/// A submission policy evaluated on every registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPolicy {
    pub name: String,
    pub level: PolicyLevel,
    /// Only jobs with this id are checked; `None` checks every job.
    pub job_id: Option<String>,
}

impl SimPolicy {
    pub fn soft_mandatory(name: impl Into<String>) -> Self {
        Self::new(name, PolicyLevel::SoftMandatory)
    }

    pub fn hard_mandatory(name: impl Into<String>) -> Self {
        Self::new(name, PolicyLevel::HardMandatory)
    }

    pub fn advisory(name: impl Into<String>) -> Self {
        Self::new(name, PolicyLevel::Advisory)
    }

    pub fn for_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    fn new(name: impl Into<String>, level: PolicyLevel) -> Self {
        Self {
            name: name.into(),
            level,
            job_id: None,
        }
    }

    fn applies_to(&self, job_id: &str) -> bool {
        self.job_id.as_deref().is_none_or(|id| id == job_id)
    }

    fn message(&self) -> String {
        format!("policy {:?} failed ({})", self.name, self.level)
    }
}

/// Calls received per scheduler operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub register: u32,
    pub info: u32,
    pub deregister: u32,
    pub deployment: u32,
    pub submission: u32,
    pub evaluation: u32,
}

#[derive(Debug)]
struct SimJob {
    remote: RemoteJob,
    submissions: BTreeMap<u64, JobSubmission>,
    deployment: Option<SimDeployment>,
    /// `job_info` calls left before a stopping job reports dead.
    stopping: Option<u32>,
}

#[derive(Debug)]
struct SimDeployment {
    deployment: Deployment,
    polls_left: u32,
    outcome: DeploymentStatus,
}

#[derive(Debug)]
struct SimEval {
    evaluation: Evaluation,
    polls_left: u32,
    outcome: EvalStatus,
}

#[derive(Debug, Default)]
struct SimState {
    behavior: SimBehavior,
    jobs: HashMap<JobIdentity, SimJob>,
    evaluations: HashMap<EvalId, SimEval>,
    policies: Vec<SimPolicy>,
    unreachable: bool,
    failing_namespaces: HashSet<String>,
    modify_index: u64,
    calls: CallCounts,
    registrations: Vec<RegisterRequest>,
}

impl SimState {
    fn reachable(&self) -> Result<(), SchedulerError> {
        if self.unreachable {
            return Err(SchedulerError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn next_index(&mut self) -> u64 {
        self.modify_index += 1;
        self.modify_index
    }

    fn new_evaluation(&mut self) -> EvalId {
        let id = EvalId::generate();
        self.evaluations.insert(
            id.clone(),
            SimEval {
                evaluation: Evaluation {
                    id: id.clone(),
                    status: EvalStatus::Pending,
                    status_description: None,
                },
                polls_left: self.behavior.eval_polls,
                outcome: self.behavior.eval_outcome,
            },
        );
        id
    }
}

#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    state: Mutex<SimState>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(mut self, behavior: SimBehavior) -> Self {
        self.state.get_mut().behavior = behavior;
        self
    }

    pub fn with_policy(mut self, policy: SimPolicy) -> Self {
        self.state.get_mut().policies.push(policy);
        self
    }

    async fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().await
    }

    pub async fn set_behavior(&self, behavior: SimBehavior) {
        self.lock().await.behavior = behavior;
    }

    pub async fn add_policy(&self, policy: SimPolicy) {
        self.lock().await.policies.push(policy);
    }

    pub async fn clear_policies(&self) {
        self.lock().await.policies.clear();
    }

    pub async fn set_unreachable(&self, unreachable: bool) {
        self.lock().await.unreachable = unreachable;
    }

    /// Registrations in `namespace` fail (e.g. the namespace does not exist).
    pub async fn fail_registrations_in(&self, namespace: impl Into<String>) {
        self.lock().await.failing_namespaces.insert(namespace.into());
    }

    pub async fn allow_registrations_in(&self, namespace: &str) {
        self.lock().await.failing_namespaces.remove(namespace);
    }

    pub async fn calls(&self) -> CallCounts {
        self.lock().await.calls
    }

    pub async fn registrations(&self) -> Vec<RegisterRequest> {
        self.lock().await.registrations.clone()
    }

    /// Current job snapshot, without counting as a `job_info` call.
    pub async fn job(&self, identity: &JobIdentity) -> Option<RemoteJob> {
        self.lock().await.jobs.get(identity).map(|job| job.remote.clone())
    }

    pub async fn submission(&self, identity: &JobIdentity, version: u64) -> Option<JobSubmission> {
        self.lock()
            .await
            .jobs
            .get(identity)
            .and_then(|job| job.submissions.get(&version).cloned())
    }

    pub async fn job_ids(&self, namespace: &str) -> Vec<String> {
        let state = self.lock().await;
        let mut ids: Vec<String> = state
            .jobs
            .keys()
            .filter(|identity| identity.namespace == namespace)
            .map(|identity| identity.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Someone ran `job stop` outside the reconciler.
    pub async fn stop_externally(&self, identity: &JobIdentity) {
        let mut state = self.lock().await;
        let index = state.next_index();
        if let Some(job) = state.jobs.get_mut(identity) {
            job.remote.stop = true;
            job.remote.status = JobStatus::Dead;
            job.remote.modify_index = index;
            job.stopping = None;
            cancel_running(job);
        }
    }

    /// Someone ran `job stop -purge` outside the reconciler.
    pub async fn purge_externally(&self, identity: &JobIdentity) {
        self.lock().await.jobs.remove(identity);
    }
}

fn cancel_running(job: &mut SimJob) {
    if let Some(sim) = job.deployment.as_mut()
        && !sim.deployment.status.is_terminal()
    {
        sim.deployment.status = DeploymentStatus::Cancelled;
        sim.deployment.status_description = Some("Cancelled because job is stopped".to_string());
    }
}

#[async_trait]
impl SchedulerClient for InMemoryScheduler {
    async fn register_job(&self, request: RegisterRequest) -> Result<RegisterResponse, SchedulerError> {
        let mut state = self.lock().await;
        state.calls.register += 1;
        state.reachable()?;
        state.registrations.push(request.clone());

        if state.failing_namespaces.contains(&request.namespace) {
            return Err(SchedulerError::Rejected(format!(
                "namespace {:?} does not exist",
                request.namespace
            )));
        }

        let mut warnings = Vec::new();
        for policy in state.policies.iter().filter(|p| p.applies_to(&request.job.id)) {
            match policy.level {
                PolicyLevel::HardMandatory => {
                    return Err(SchedulerError::PolicyViolation {
                        level: policy.level,
                        message: policy.message(),
                    });
                }
                PolicyLevel::SoftMandatory if !request.policy_override => {
                    return Err(SchedulerError::PolicyViolation {
                        level: policy.level,
                        message: policy.message(),
                    });
                }
                PolicyLevel::SoftMandatory | PolicyLevel::Advisory => warnings.push(policy.message()),
            }
        }

        let identity = request.identity();
        let index = state.next_index();
        let job = &request.job;
        let version = state
            .jobs
            .get(&identity)
            .map_or(1, |existing| existing.remote.version + 1);

        let eval_id = job.creates_evaluation().then(|| state.new_evaluation());
        let behavior = state.behavior;

        let entry = state.jobs.entry(identity.clone()).or_insert_with(|| SimJob {
            remote: RemoteJob {
                identity: identity.clone(),
                name: job.name.clone(),
                job_type: job.job_type,
                status: JobStatus::Pending,
                stop: false,
                version,
                modify_index: index,
                parameterized: job.parameterized,
                multiregion: job.multiregion,
            },
            submissions: BTreeMap::new(),
            deployment: None,
            stopping: None,
        });

        // A new version supersedes whatever rollout was in flight.
        if let Some(previous) = entry.deployment.as_mut()
            && !previous.deployment.status.is_terminal()
        {
            previous.deployment.status = DeploymentStatus::Cancelled;
            previous.deployment.status_description =
                Some("Cancelled due to newer version of job".to_string());
        }

        entry.remote = RemoteJob {
            identity: identity.clone(),
            name: job.name.clone(),
            job_type: job.job_type,
            status: JobStatus::Running,
            stop: false,
            version,
            modify_index: index,
            parameterized: job.parameterized,
            multiregion: job.multiregion,
        };
        entry.stopping = None;
        entry.submissions.insert(
            version,
            JobSubmission {
                version,
                source: request.source.clone(),
                format: request.format,
                variables: request.variables.clone(),
            },
        );
        if job.produces_deployments() {
            entry.deployment = Some(SimDeployment {
                deployment: Deployment {
                    id: DeploymentId::generate(),
                    job_version: version,
                    status: DeploymentStatus::Running,
                    status_description: None,
                },
                polls_left: behavior.deployment_polls,
                outcome: behavior.deployment_outcome,
            });
        }

        Ok(RegisterResponse {
            eval_id,
            version,
            modify_index: index,
            warnings,
        })
    }

    async fn job_info(&self, identity: &JobIdentity) -> Result<RemoteJob, SchedulerError> {
        let mut state = self.lock().await;
        state.calls.info += 1;
        state.reachable()?;

        let job = state.jobs.get_mut(identity).ok_or(SchedulerError::NotFound)?;
        if let Some(left) = job.stopping {
            if left <= 1 {
                job.remote.status = JobStatus::Dead;
                job.stopping = None;
            } else {
                job.stopping = Some(left - 1);
            }
        }
        Ok(job.remote.clone())
    }

    async fn deregister_job(
        &self,
        identity: &JobIdentity,
        purge: bool,
    ) -> Result<Option<EvalId>, SchedulerError> {
        let mut state = self.lock().await;
        state.calls.deregister += 1;
        state.reachable()?;

        if !state.jobs.contains_key(identity) {
            return Err(SchedulerError::NotFound);
        }
        let eval_id = state.new_evaluation();
        if purge {
            state.jobs.remove(identity);
            return Ok(Some(eval_id));
        }

        let index = state.next_index();
        let stop_polls = state.behavior.stop_polls;
        if let Some(job) = state.jobs.get_mut(identity) {
            job.remote.stop = true;
            job.remote.modify_index = index;
            cancel_running(job);
            if job.remote.status != JobStatus::Dead {
                if stop_polls == 0 {
                    job.remote.status = JobStatus::Dead;
                } else {
                    job.stopping = Some(stop_polls);
                }
            }
        }
        Ok(Some(eval_id))
    }

    async fn latest_deployment(
        &self,
        identity: &JobIdentity,
    ) -> Result<Option<Deployment>, SchedulerError> {
        let mut state = self.lock().await;
        state.calls.deployment += 1;
        state.reachable()?;

        let job = state.jobs.get_mut(identity).ok_or(SchedulerError::NotFound)?;
        let Some(sim) = job.deployment.as_mut() else {
            return Ok(None);
        };
        if !sim.deployment.status.is_terminal() {
            sim.polls_left = sim.polls_left.saturating_sub(1);
            if sim.polls_left == 0 {
                sim.deployment.status = sim.outcome;
            }
        }
        Ok(Some(sim.deployment.clone()))
    }

    async fn job_submission(
        &self,
        identity: &JobIdentity,
        version: u64,
    ) -> Result<JobSubmission, SchedulerError> {
        let mut state = self.lock().await;
        state.calls.submission += 1;
        state.reachable()?;

        state
            .jobs
            .get(identity)
            .and_then(|job| job.submissions.get(&version))
            .cloned()
            .ok_or(SchedulerError::NotFound)
    }

    async fn evaluation(&self, eval_id: &EvalId, _namespace: &str) -> Result<Evaluation, SchedulerError> {
        let mut state = self.lock().await;
        state.calls.evaluation += 1;
        state.reachable()?;

        let sim = state
            .evaluations
            .get_mut(eval_id)
            .ok_or(SchedulerError::NotFound)?;
        if sim.evaluation.status == EvalStatus::Pending {
            sim.polls_left = sim.polls_left.saturating_sub(1);
            if sim.polls_left == 0 {
                sim.evaluation.status = sim.outcome;
            }
        }
        Ok(sim.evaluation.clone())
    }
}
