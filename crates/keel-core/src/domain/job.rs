//! Remote job views: what the scheduler reports back about a job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::JobIdentity;
use super::spec::{JobType, JobspecFormat};

/// Scheduler-reported job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Registered, allocations not placed yet.
    Pending,

    /// At least one allocation is running (or the parent of a template job).
    Running,

    /// No allocations running, none will be placed.
    Dead,
}

impl JobStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "dead" => Some(JobStatus::Dead),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Dead => "dead",
        }
    }
}

/// Snapshot of a job as the scheduler reports it (`JobInfo`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteJob {
    pub identity: JobIdentity,
    pub name: String,
    pub job_type: JobType,
    pub status: JobStatus,

    /// Set when the job was deregistered without purge.
    pub stop: bool,

    pub version: u64,
    pub modify_index: u64,

    #[serde(default)]
    pub parameterized: bool,
    #[serde(default)]
    pub multiregion: bool,
}

impl RemoteJob {
    /// Dead *because somebody stopped it*, as opposed to a batch job that ran
    /// to completion.
    pub fn is_stopped(&self) -> bool {
        self.status == JobStatus::Dead && self.stop
    }
}

/// One successful submission on one identity.
///
/// Versions are strictly increasing per identity and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJobVersion {
    pub identity: JobIdentity,
    pub version: u64,
    pub submitted_source: String,
    #[serde(default)]
    pub submitted_variables: BTreeMap<String, String>,
}

/// Source recorded by the scheduler for one job version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub version: u64,
    pub source: String,
    pub format: JobspecFormat,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: JobStatus, stop: bool) -> RemoteJob {
        RemoteJob {
            identity: JobIdentity::in_default_namespace("foo"),
            name: "foo".to_string(),
            job_type: JobType::Service,
            status,
            stop,
            version: 1,
            modify_index: 10,
            parameterized: false,
            multiregion: false,
        }
    }

    #[test]
    fn stopped_requires_dead_and_stop_flag() {
        assert!(remote(JobStatus::Dead, true).is_stopped());
        assert!(!remote(JobStatus::Dead, false).is_stopped());
        assert!(!remote(JobStatus::Running, true).is_stopped());
    }

    #[test]
    fn status_names_roundtrip() {
        for status in [JobStatus::Pending, JobStatus::Running, JobStatus::Dead] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("complete"), None);
    }
}
