//! Input specs: the jobspec as the caller hands it over, and the header the
//! reconciler extracts from it before talking to the scheduler.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Submission format of a jobspec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JobspecFormat {
    /// HCL2 structured text.
    #[default]
    #[serde(rename = "hcl2")]
    StructuredText,

    /// JSON, either bare or wrapped in a `{"Job": ...}` envelope.
    #[serde(rename = "json")]
    Json,
}

impl JobspecFormat {
    /// Format tag recorded with the submission on the scheduler.
    pub fn as_str(self) -> &'static str {
        match self {
            JobspecFormat::StructuredText => "hcl2",
            JobspecFormat::Json => "json",
        }
    }
}

impl fmt::Display for JobspecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A jobspec as declared by the caller. Read-only to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpecification {
    pub source: String,
    pub format: JobspecFormat,

    /// Variable overrides (structured-text only).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,

    /// Whether filesystem functions (`file(...)` etc.) may be evaluated.
    #[serde(default)]
    pub allow_fs: bool,
}

impl JobSpecification {
    pub fn hcl(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            format: JobspecFormat::StructuredText,
            variables: BTreeMap::new(),
            allow_fs: false,
        }
    }

    pub fn json(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            format: JobspecFormat::Json,
            variables: BTreeMap::new(),
            allow_fs: false,
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_allow_fs(mut self, allow_fs: bool) -> Self {
        self.allow_fs = allow_fs;
        self
    }
}

/// Scheduler job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    #[default]
    Service,
    Batch,
    System,
    Sysbatch,
}

impl JobType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "service" => Some(JobType::Service),
            "batch" => Some(JobType::Batch),
            "system" => Some(JobType::System),
            "sysbatch" => Some(JobType::Sysbatch),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Service => "service",
            JobType::Batch => "batch",
            JobType::System => "system",
            JobType::Sysbatch => "sysbatch",
        }
    }
}

/// What the reconciler needs to know about a jobspec after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedJob {
    pub id: String,
    pub name: String,

    /// Namespace named inside the jobspec, if any.
    pub namespace: Option<String>,

    pub job_type: JobType,

    /// Parameterized (template) job: only the parent is registered.
    pub parameterized: bool,
    pub periodic: bool,
    pub multiregion: bool,

    /// False when every group disables rolling updates (`max_parallel = 0`).
    pub deployments_enabled: bool,

    #[serde(default)]
    pub datacenters: Vec<String>,
    #[serde(default)]
    pub task_groups: Vec<String>,

    /// Canonical JSON job, when the normalizer produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ParsedJob {
    /// Minimal service job header; mostly useful in tests.
    pub fn service(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            namespace: None,
            job_type: JobType::Service,
            parameterized: false,
            periodic: false,
            multiregion: false,
            deployments_enabled: true,
            datacenters: Vec::new(),
            task_groups: Vec::new(),
            payload: None,
        }
    }

    /// Registration of this job creates an evaluation worth waiting on.
    /// Parameterized and periodic parents are never evaluated directly.
    pub fn creates_evaluation(&self) -> bool {
        !self.parameterized && !self.periodic
    }

    /// The scheduler will track a rollout (deployment) for this job.
    pub fn produces_deployments(&self) -> bool {
        self.job_type == JobType::Service
            && self.creates_evaluation()
            && self.deployments_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn format_serializes_as_submission_tag() {
        assert_eq!(
            serde_json::to_string(&JobspecFormat::StructuredText).unwrap(),
            "\"hcl2\""
        );
        assert_eq!(serde_json::to_string(&JobspecFormat::Json).unwrap(), "\"json\"");
    }

    #[test]
    fn specification_builders_accumulate() {
        let spec = JobSpecification::hcl("job \"foo\" {}")
            .with_variable("dc", "dc1")
            .with_allow_fs(true);

        assert_eq!(spec.format, JobspecFormat::StructuredText);
        assert_eq!(spec.variables.get("dc").map(String::as_str), Some("dc1"));
        assert!(spec.allow_fs);
    }

    #[rstest]
    #[case::service(JobType::Service, false, false, true, true)]
    #[case::service_without_update(JobType::Service, false, false, false, false)]
    #[case::batch(JobType::Batch, false, false, true, false)]
    #[case::system(JobType::System, false, false, true, false)]
    #[case::parameterized(JobType::Service, true, false, true, false)]
    #[case::periodic(JobType::Service, false, true, true, false)]
    fn deployment_expectation(
        #[case] job_type: JobType,
        #[case] parameterized: bool,
        #[case] periodic: bool,
        #[case] deployments_enabled: bool,
        #[case] expected: bool,
    ) {
        let job = ParsedJob {
            job_type,
            parameterized,
            periodic,
            deployments_enabled,
            ..ParsedJob::service("foo")
        };
        assert_eq!(job.produces_deployments(), expected);
    }

    #[test]
    fn job_type_parses_known_names_only() {
        assert_eq!(JobType::parse("sysbatch"), Some(JobType::Sysbatch));
        assert_eq!(JobType::parse("cron"), None);
    }
}
