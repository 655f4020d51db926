//! Errors - エラー型と分類
//!
//! - `SchedulerError`: リモート API（port）から返るエラー
//! - `ReconcileError`: reconciler の操作が返すエラー（運用分類つき）

use std::fmt;

use thiserror::Error;

use super::deployment::{Deployment, EvalStatus};
use super::ids::{EvalId, JobIdentity};

/// Enforcement level of a submission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyLevel {
    Advisory,
    /// May be overridden by resubmitting with an explicit override flag.
    SoftMandatory,
    HardMandatory,
}

impl fmt::Display for PolicyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PolicyLevel::Advisory => "advisory",
            PolicyLevel::SoftMandatory => "soft-mandatory",
            PolicyLevel::HardMandatory => "hard-mandatory",
        })
    }
}

/// Errors surfaced by a `SchedulerClient`.
///
/// Not-found is its own variant so callers never have to sniff a transport
/// error string for "404".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("not found")]
    NotFound,

    #[error("{message}")]
    PolicyViolation { level: PolicyLevel, message: String },

    #[error("{0}")]
    Rejected(String),

    #[error("scheduler unavailable: {0}")]
    Unavailable(String),

    #[error("failed to decode scheduler response: {0}")]
    Decode(String),
}

impl SchedulerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::NotFound)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, SchedulerError::Unavailable(_))
    }
}

/// Errors surfaced while normalizing a jobspec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("{line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("not a job: {0}")]
    NotAJob(String),

    #[error("filesystem function disabled: {0}")]
    FilesystemDisabled(String),

    #[error("variable {0:?} is not set and has no default")]
    UnsetVariable(String),

    /// Rejected by a remote normalizer (the scheduler's parse endpoint).
    #[error("{0}")]
    Remote(String),
}

impl ParseError {
    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }
}

impl From<ParseError> for ReconcileError {
    fn from(err: ParseError) -> Self {
        ReconcileError::InvalidJobspec(err.to_string())
    }
}

/// Errors surfaced by reconciler operations.
///
/// # 分類
/// - local validation: `InvalidJobspec`, `IdentityMismatch`（リトライ無意味）
/// - policy rejection: `Policy`（override 有効時のみ 1 回だけ再送）
/// - not-found: `Scheduler(SchedulerError::NotFound)`（teardown 中は成功扱い、
///   read / plan では戻り値で表す: `ReadOutcome::Gone`, `PlanAction::Create`）
/// - timeout: `Timeout`（まだ収束中。失敗確定とは区別する）
/// - partial migration: `PartialMigration`（旧 identity はもう存在しない）
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("error parsing jobspec: {0}")]
    InvalidJobspec(String),

    #[error("jobspec declares job {declared:?} but the reconciled identity is {identity}")]
    IdentityMismatch {
        declared: String,
        identity: JobIdentity,
    },

    /// Remote policy rejection, message passed through verbatim.
    #[error("{0}")]
    Policy(String),

    #[error("timed out waiting for {operation} after {attempts} attempts")]
    Timeout { operation: String, attempts: u32 },

    #[error("job {0} has not been stopped")]
    JobNotStopped(JobIdentity),

    #[error("deployment {} for job version {} finished as {}", deployment.id, deployment.job_version, deployment.status)]
    DeploymentFailed { deployment: Deployment },

    #[error("evaluation {eval_id} ended as {status:?}: {description}")]
    EvaluationFailed {
        eval_id: EvalId,
        status: EvalStatus,
        description: String,
    },

    #[error("job was removed from {from} but could not be created in {to}: {source}")]
    PartialMigration {
        from: JobIdentity,
        to: JobIdentity,
        #[source]
        source: Box<ReconcileError>,
    },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ReconcileError {
    pub fn timeout(operation: impl Into<String>, attempts: u32) -> Self {
        ReconcileError::Timeout {
            operation: operation.into(),
            attempts,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::Scheduler(err) if err.is_not_found())
    }

    /// Bounded polling ran out: the remote side may still converge.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReconcileError::Timeout { .. })
    }

    /// Local errors never succeed on retry.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ReconcileError::InvalidJobspec(_) | ReconcileError::IdentityMismatch { .. }
        )
    }

    /// Worth retrying the same operation later without changing inputs.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Timeout { .. } | ReconcileError::PartialMigration { .. } => true,
            ReconcileError::Scheduler(err) => err.is_unavailable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_jobspec_message_is_stable() {
        let err = ReconcileError::InvalidJobspec("expected value at line 1".to_string());
        assert!(err.to_string().starts_with("error parsing jobspec"));
        assert!(err.is_local());
    }

    #[test]
    fn policy_message_is_verbatim() {
        let message = "policy \"deny-all\" failed (soft-mandatory)";
        let err = ReconcileError::Policy(message.to_string());
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn not_found_is_detected_through_scheduler_errors() {
        assert!(ReconcileError::from(SchedulerError::NotFound).is_not_found());
        assert!(!ReconcileError::timeout("deployment", 3).is_not_found());
        assert!(!ReconcileError::JobNotStopped(JobIdentity::in_default_namespace("x")).is_not_found());
    }

    #[test]
    fn partial_migration_keeps_its_cause() {
        let err = ReconcileError::PartialMigration {
            from: JobIdentity::new("foo", "a"),
            to: JobIdentity::new("foo", "b"),
            source: Box::new(ReconcileError::Scheduler(SchedulerError::Rejected(
                "namespace \"b\" not found".to_string(),
            ))),
        };
        let message = err.to_string();
        assert!(message.contains("foo@a"));
        assert!(message.contains("foo@b"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_retryable());
    }
}
