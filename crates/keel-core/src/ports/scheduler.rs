//! SchedulerClient port - リモートスケジューラ API の抽象化
//!
//! reconciler が使う呼び出しはこの 6 つ（+ evaluation 参照）だけです。
//! - register / info / deregister / latest deployment / submission
//!
//! # 実装
//! - `impls::http_scheduler::HttpSchedulerClient`（本番用、HTTP API）
//! - `impls::inmem_scheduler::InMemoryScheduler`（テスト・デモ用）

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{
    Deployment, EvalId, Evaluation, JobIdentity, JobSubmission, JobspecFormat, ParsedJob,
    RemoteJob, SchedulerError,
};

/// Registration request.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    /// Namespace the job is registered in. Overrides whatever the jobspec says.
    pub namespace: String,
    pub job: ParsedJob,

    /// Source text stored with the version, for later drift comparison.
    pub source: String,
    pub format: JobspecFormat,
    pub variables: BTreeMap<String, String>,

    pub policy_override: bool,
}

impl RegisterRequest {
    pub fn identity(&self) -> JobIdentity {
        JobIdentity::new(self.job.id.clone(), self.namespace.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResponse {
    /// `None` for jobs the scheduler does not evaluate (parameterized, periodic).
    pub eval_id: Option<EvalId>,
    pub version: u64,
    pub modify_index: u64,

    /// Non-fatal warnings returned with a successful registration.
    pub warnings: Vec<String>,
}

/// SchedulerClient はリモートスケジューラへのインターフェース
///
/// # エラー契約
/// - 存在しない job / deployment / submission は `SchedulerError::NotFound`
/// - ポリシー違反は `SchedulerError::PolicyViolation`（メッセージは加工しない）
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    async fn register_job(&self, request: RegisterRequest) -> Result<RegisterResponse, SchedulerError>;

    async fn job_info(&self, identity: &JobIdentity) -> Result<RemoteJob, SchedulerError>;

    /// Stop (and optionally purge) a job. Returns the evaluation, if any.
    async fn deregister_job(
        &self,
        identity: &JobIdentity,
        purge: bool,
    ) -> Result<Option<EvalId>, SchedulerError>;

    /// Most recent deployment of the job, `None` when it never had one.
    async fn latest_deployment(
        &self,
        identity: &JobIdentity,
    ) -> Result<Option<Deployment>, SchedulerError>;

    async fn job_submission(
        &self,
        identity: &JobIdentity,
        version: u64,
    ) -> Result<JobSubmission, SchedulerError>;

    async fn evaluation(&self, eval_id: &EvalId, namespace: &str) -> Result<Evaluation, SchedulerError>;
}
