//! Reconciliation state: the durable record the caller persists between
//! operations on one managed job.
//!
//! Design: same rule as the task record of a queue.
//! - The caller owns and persists it; the reconciler never caches it.
//! - State transitions go through methods, not direct field writes.
//! - Only the lifecycle managers mutate it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::deployment::{Deployment, DeploymentStatus};
use super::ids::{DeploymentId, JobIdentity};
use super::job::{JobStatus, RemoteJob, RemoteJobVersion};
use super::spec::{JobType, JobspecFormat, ParsedJob};

/// Teardown and rerun flags configured on the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    pub deregister_on_destroy: bool,
    pub purge_on_destroy: bool,
    pub policy_override: bool,
    pub rerun_if_dead: bool,
    pub detach: bool,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            deregister_on_destroy: true,
            purge_on_destroy: false,
            policy_override: false,
            rerun_if_dead: false,
            detach: true,
        }
    }
}

impl ResourcePolicy {
    pub fn teardown(&self) -> TeardownPolicy {
        TeardownPolicy {
            deregister: self.deregister_on_destroy,
            purge: self.purge_on_destroy,
        }
    }
}

/// How a job is removed.
///
/// `deregister = false` leaves the job running remotely; it only drops out of
/// the caller's tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownPolicy {
    pub deregister: bool,
    pub purge: bool,
}

impl TeardownPolicy {
    pub fn deregister() -> Self {
        Self {
            deregister: true,
            purge: false,
        }
    }

    pub fn purge() -> Self {
        Self {
            deregister: true,
            purge: true,
        }
    }

    pub fn keep_running() -> Self {
        Self {
            deregister: false,
            purge: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationState {
    pub identity: JobIdentity,

    /// Last version this reconciler submitted or observed.
    /// `None` while a submission to `identity` is still owed (fresh record or
    /// a migration whose create half failed).
    pub version: Option<u64>,

    pub name: String,
    pub job_type: JobType,
    pub modify_index: u64,
    pub status: Option<JobStatus>,

    /// Placement as declared by the last applied jobspec.
    #[serde(default)]
    pub datacenters: Vec<String>,
    #[serde(default)]
    pub task_groups: Vec<String>,

    pub deployment_id: Option<DeploymentId>,
    pub deployment_status: Option<DeploymentStatus>,

    /// Last applied jobspec, kept for plan-time comparison.
    pub source: String,
    pub format: JobspecFormat,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    pub policy: ResourcePolicy,
}

impl ReconciliationState {
    pub fn new(identity: JobIdentity, policy: ResourcePolicy) -> Self {
        Self {
            identity,
            version: None,
            name: String::new(),
            job_type: JobType::default(),
            modify_index: 0,
            status: None,
            datacenters: Vec::new(),
            task_groups: Vec::new(),
            deployment_id: None,
            deployment_status: None,
            source: String::new(),
            format: JobspecFormat::default(),
            variables: BTreeMap::new(),
            policy,
        }
    }

    /// A submission is owed to `identity` before the record is in sync.
    pub fn is_pending_submission(&self) -> bool {
        self.version.is_none()
    }

    /// Move the last-known version forward. Never decreases it.
    pub fn advance_version(&mut self, version: u64) {
        self.version = Some(self.version.map_or(version, |current| current.max(version)));
    }

    /// Record a successful submission.
    pub fn record_submission(
        &mut self,
        submitted: &RemoteJobVersion,
        job: &ParsedJob,
        format: JobspecFormat,
        modify_index: u64,
    ) {
        self.advance_version(submitted.version);
        self.name = job.name.clone();
        self.job_type = job.job_type;
        self.datacenters = job.datacenters.clone();
        self.task_groups = job.task_groups.clone();
        self.modify_index = self.modify_index.max(modify_index);
        self.source = submitted.submitted_source.clone();
        self.format = format;
        self.variables = submitted.submitted_variables.clone();
        // A new version starts a new rollout; whatever we knew is stale.
        self.clear_deployment();
    }

    /// Refresh the computed fields from a `JobInfo` snapshot.
    pub fn record_remote(&mut self, remote: &RemoteJob) {
        self.advance_version(remote.version);
        self.name = remote.name.clone();
        self.job_type = remote.job_type;
        self.modify_index = self.modify_index.max(remote.modify_index);
        self.status = Some(remote.status);
    }

    pub fn record_deployment(&mut self, deployment: Option<&Deployment>) {
        match deployment {
            Some(deployment) => {
                self.deployment_id = Some(deployment.id.clone());
                self.deployment_status = Some(deployment.status);
            }
            None => self.clear_deployment(),
        }
    }

    pub fn clear_deployment(&mut self) {
        self.deployment_id = None;
        self.deployment_status = None;
    }

    /// Point the record at a new identity whose job does not exist yet.
    pub fn retarget(&mut self, identity: JobIdentity) {
        self.identity = identity;
        self.version = None;
        self.modify_index = 0;
        self.status = None;
        self.clear_deployment();
    }

    pub fn teardown_policy(&self) -> TeardownPolicy {
        self.policy.teardown()
    }
}
