//! HttpSchedulerClient - スケジューラ HTTP API（`/v1/...`）の SchedulerClient 実装
//!
//! # エラー分類
//! - 404 → `SchedulerError::NotFound`
//! - 本文に enforcement level（`soft-mandatory` など）を含む拒否 → `PolicyViolation`
//! - 接続失敗・タイムアウト・502/503/504 → `Unavailable`（再試行可能）
//! - それ以外の非 2xx → `Rejected`（本文をそのまま返す）
//!
//! structured-text の jobspec は登録前に `/v1/jobs/parse` で JSON に変換します。

use std::collections::BTreeMap;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::app::config::SchedulerConnection;
use crate::domain::{
    Deployment, DeploymentId, DeploymentStatus, EvalId, EvalStatus, Evaluation, JobIdentity,
    JobStatus, JobSubmission, JobType, JobspecFormat, PolicyLevel, RemoteJob, SchedulerError,
};
use crate::ports::{RegisterRequest, RegisterResponse, SchedulerClient};

const TOKEN_HEADER: &str = "X-Nomad-Token";

/// Escapes everything except RFC 3986 unreserved characters, so a job id is
/// always exactly one path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub struct HttpSchedulerClient {
    client: Client,
    base_url: String,
    region: Option<String>,
    secret_id: Option<String>,
}

impl HttpSchedulerClient {
    pub fn new(connection: &SchedulerConnection) -> Result<Self, SchedulerError> {
        let client = Client::builder()
            .timeout(connection.request_timeout())
            .build()
            .map_err(|err| SchedulerError::Unavailable(err.to_string()))?;

        Ok(Self {
            client,
            base_url: connection.address.trim_end_matches('/').to_string(),
            region: connection.region.clone(),
            secret_id: connection.secret_id.clone(),
        })
    }

    fn request(&self, method: Method, path: &str, namespace: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .request(method, &url)
            .query(&[("namespace", namespace)]);
        if let Some(region) = &self.region {
            builder = builder.query(&[("region", region)]);
        }
        if let Some(token) = &self.secret_id {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, SchedulerError> {
        let response = builder.send().await.map_err(transport_error)?;
        handle_response(response).await
    }

    /// Canonical JSON job for a registration.
    async fn job_payload(&self, request: &RegisterRequest) -> Result<Value, SchedulerError> {
        let mut job = match (&request.job.payload, request.format) {
            (Some(payload), _) => payload.clone(),
            (None, JobspecFormat::Json) => {
                return Err(SchedulerError::Rejected(
                    "JSON jobspec without a job payload".to_string(),
                ));
            }
            (None, JobspecFormat::StructuredText) => {
                let body = ParseJobRequest {
                    job_hcl: &request.source,
                    variables: variable_lines(&request.variables),
                    canonicalize: true,
                };
                let builder = self
                    .request(Method::POST, "/v1/jobs/parse", &request.namespace)
                    .json(&body);
                self.send(builder).await?
            }
        };

        // The resource's namespace always wins over the jobspec's.
        if let Value::Object(fields) = &mut job {
            fields.insert("Namespace".to_string(), Value::String(request.namespace.clone()));
        }
        Ok(job)
    }
}

#[async_trait]
impl SchedulerClient for HttpSchedulerClient {
    #[instrument(skip_all, fields(job = %request.job.id, namespace = %request.namespace))]
    async fn register_job(&self, request: RegisterRequest) -> Result<RegisterResponse, SchedulerError> {
        let job = self.job_payload(&request).await?;
        let body = RegisterJobRequest {
            job,
            policy_override: request.policy_override,
            submission: WireSubmission {
                source: request.source.clone(),
                format: request.format.as_str().to_string(),
                variable_flags: request.variables.clone(),
                version: None,
            },
        };
        let builder = self
            .request(Method::POST, "/v1/jobs", &request.namespace)
            .json(&body);
        let response: WireRegisterResponse = self.send(builder).await?;
        debug!(eval_id = %response.eval_id, "job registered");

        // The register response does not carry the version; read it back.
        let remote = self.job_info(&request.identity()).await?;
        Ok(RegisterResponse {
            eval_id: non_empty(response.eval_id).map(EvalId::new),
            version: remote.version,
            modify_index: response.job_modify_index,
            warnings: split_warnings(&response.warnings),
        })
    }

    async fn job_info(&self, identity: &JobIdentity) -> Result<RemoteJob, SchedulerError> {
        let builder = self.request(Method::GET, &job_path(identity, ""), &identity.namespace);
        let job: WireJob = self.send(builder).await?;
        job.into_remote(identity)
    }

    async fn deregister_job(
        &self,
        identity: &JobIdentity,
        purge: bool,
    ) -> Result<Option<EvalId>, SchedulerError> {
        let builder = self
            .request(Method::DELETE, &job_path(identity, ""), &identity.namespace)
            .query(&[("purge", purge)]);
        let response: WireEvalResponse = self.send(builder).await?;
        Ok(non_empty(response.eval_id).map(EvalId::new))
    }

    async fn latest_deployment(
        &self,
        identity: &JobIdentity,
    ) -> Result<Option<Deployment>, SchedulerError> {
        let builder = self.request(
            Method::GET,
            &job_path(identity, "/deployment"),
            &identity.namespace,
        );
        let deployment: Option<WireDeployment> = self.send(builder).await?;
        deployment.map(WireDeployment::into_domain).transpose()
    }

    async fn job_submission(
        &self,
        identity: &JobIdentity,
        version: u64,
    ) -> Result<JobSubmission, SchedulerError> {
        let builder = self
            .request(
                Method::GET,
                &job_path(identity, "/submission"),
                &identity.namespace,
            )
            .query(&[("version", version)]);
        let submission: WireSubmission = self.send(builder).await?;
        let format = match submission.format.as_str() {
            "json" => JobspecFormat::Json,
            _ => JobspecFormat::StructuredText,
        };
        Ok(JobSubmission {
            version: submission.version.unwrap_or(version),
            source: submission.source,
            format,
            variables: submission.variable_flags,
        })
    }

    async fn evaluation(&self, eval_id: &EvalId, namespace: &str) -> Result<Evaluation, SchedulerError> {
        let path = format!("/v1/evaluation/{}", eval_id.as_str());
        let builder = self.request(Method::GET, &path, namespace);
        let eval: WireEvaluation = self.send(builder).await?;
        Ok(Evaluation {
            id: EvalId::new(eval.id),
            status: parse_eval_status(&eval.status)?,
            status_description: non_empty(eval.status_description),
        })
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, SchedulerError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|err| SchedulerError::Decode(err.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify(status, body))
}

fn transport_error(err: reqwest::Error) -> SchedulerError {
    if err.is_decode() {
        SchedulerError::Decode(err.to_string())
    } else {
        SchedulerError::Unavailable(err.to_string())
    }
}

/// Map a non-2xx response to a `SchedulerError`.
fn classify(status: StatusCode, body: String) -> SchedulerError {
    if status == StatusCode::NOT_FOUND {
        return SchedulerError::NotFound;
    }
    if let Some(level) = policy_level(&body) {
        return SchedulerError::PolicyViolation {
            level,
            message: body.trim().to_string(),
        };
    }
    match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            SchedulerError::Unavailable(format!("{status}: {}", body.trim()))
        }
        _ => SchedulerError::Rejected(format!("{status}: {}", body.trim())),
    }
}

/// Most severe enforcement level mentioned in a rejection body.
fn policy_level(body: &str) -> Option<PolicyLevel> {
    let lower = body.to_ascii_lowercase();
    if lower.contains("hard-mandatory") || lower.contains("hard mandatory") {
        Some(PolicyLevel::HardMandatory)
    } else if lower.contains("soft-mandatory") || lower.contains("soft mandatory") {
        Some(PolicyLevel::SoftMandatory)
    } else {
        None
    }
}

fn job_path(identity: &JobIdentity, suffix: &str) -> String {
    let id = utf8_percent_encode(&identity.id, PATH_SEGMENT);
    format!("/v1/job/{id}{suffix}")
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn split_warnings(warnings: &str) -> Vec<String> {
    let trimmed = warnings.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

fn variable_lines(variables: &BTreeMap<String, String>) -> String {
    variables
        .iter()
        .map(|(name, value)| format!("{name}={value}\n"))
        .collect()
}

fn parse_eval_status(value: &str) -> Result<EvalStatus, SchedulerError> {
    match value {
        "pending" => Ok(EvalStatus::Pending),
        "complete" => Ok(EvalStatus::Complete),
        "blocked" => Ok(EvalStatus::Blocked),
        "failed" => Ok(EvalStatus::Failed),
        "canceled" | "cancelled" => Ok(EvalStatus::Canceled),
        other => Err(SchedulerError::Decode(format!("unknown evaluation status {other:?}"))),
    }
}

fn parse_deployment_status(value: &str) -> Result<DeploymentStatus, SchedulerError> {
    match value {
        "running" | "pending" | "initializing" | "blocked" | "unblocking" => {
            Ok(DeploymentStatus::Running)
        }
        "successful" => Ok(DeploymentStatus::Successful),
        "failed" => Ok(DeploymentStatus::Failed),
        "cancelled" => Ok(DeploymentStatus::Cancelled),
        "paused" => Ok(DeploymentStatus::Paused),
        other => Err(SchedulerError::Decode(format!("unknown deployment status {other:?}"))),
    }
}

// ========================================
// Wire types (PascalCase JSON)
// ========================================

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ParseJobRequest<'a> {
    #[serde(rename = "JobHCL")]
    job_hcl: &'a str,
    variables: String,
    canonicalize: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RegisterJobRequest {
    job: Value,
    policy_override: bool,
    submission: WireSubmission,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireSubmission {
    source: String,
    format: String,
    #[serde(default)]
    variable_flags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireRegisterResponse {
    #[serde(rename = "EvalID", default)]
    eval_id: String,
    #[serde(default)]
    job_modify_index: u64,
    #[serde(default)]
    warnings: String,
}

#[derive(Deserialize)]
struct WireEvalResponse {
    #[serde(rename = "EvalID", default)]
    eval_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireJob {
    #[serde(default)]
    name: String,
    #[serde(rename = "Type", default)]
    job_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    stop: bool,
    #[serde(default)]
    version: u64,
    #[serde(default)]
    job_modify_index: u64,
    #[serde(default)]
    parameterized_job: Option<Value>,
    #[serde(default)]
    multiregion: Option<Value>,
}

impl WireJob {
    fn into_remote(self, identity: &JobIdentity) -> Result<RemoteJob, SchedulerError> {
        let job_type = JobType::parse(&self.job_type)
            .ok_or_else(|| SchedulerError::Decode(format!("unknown job type {:?}", self.job_type)))?;
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| SchedulerError::Decode(format!("unknown job status {:?}", self.status)))?;
        Ok(RemoteJob {
            identity: identity.clone(),
            name: self.name,
            job_type,
            status,
            stop: self.stop,
            version: self.version,
            modify_index: self.job_modify_index,
            parameterized: self.parameterized_job.is_some_and(|v| !v.is_null()),
            multiregion: self.multiregion.is_some_and(|v| !v.is_null()),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireDeployment {
    #[serde(rename = "ID")]
    id: String,
    job_version: u64,
    status: String,
    #[serde(default)]
    status_description: String,
}

impl WireDeployment {
    fn into_domain(self) -> Result<Deployment, SchedulerError> {
        Ok(Deployment {
            id: DeploymentId::new(self.id),
            job_version: self.job_version,
            status: parse_deployment_status(&self.status)?,
            status_description: non_empty(self.status_description),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireEvaluation {
    #[serde(rename = "ID")]
    id: String,
    status: String,
    #[serde(default)]
    status_description: String,
}
