//! Deployments and evaluations: the two asynchronous records the scheduler
//! creates after a registration.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{DeploymentId, EvalId};

/// Deployment state (closed set).
///
/// - `Successful` is the only terminal success.
/// - `Failed` / `Cancelled` are terminal failures.
/// - `Running` / `Paused` keep a blocking wait polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Running,
    Successful,
    Failed,
    Cancelled,
    Paused,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Successful | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }

    pub fn is_success(self) -> bool {
        self == DeploymentStatus::Successful
    }

    pub fn is_failure(self) -> bool {
        matches!(self, DeploymentStatus::Failed | DeploymentStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Running => "running",
            DeploymentStatus::Successful => "successful",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
            DeploymentStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduler-tracked rollout of one job version. Immutable once terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub job_version: u64,
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
}

/// Evaluation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Pending,
    Complete,
    /// Processed, but some allocations could not be placed yet.
    Blocked,
    Failed,
    Canceled,
}

impl EvalStatus {
    /// The scheduler has processed the registration (not merely accepted it).
    pub fn is_evaluated(self) -> bool {
        matches!(self, EvalStatus::Complete | EvalStatus::Blocked)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, EvalStatus::Failed | EvalStatus::Canceled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvalId,
    pub status: EvalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
}
