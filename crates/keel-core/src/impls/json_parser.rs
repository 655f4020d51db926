//! JsonJobspecParser - JSON jobspec（`{"Job": {...}}` envelope または bare job）

use serde_json::{Map, Value};

use crate::domain::{JobSpecification, JobType, ParseError, ParsedJob};
use crate::ports::JobspecParser;

/// Parses the scheduler's JSON job format (PascalCase keys).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonJobspecParser;

impl JsonJobspecParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, source: &str) -> Result<ParsedJob, ParseError> {
        let root: Value =
            serde_json::from_str(source).map_err(|err| ParseError::Json(err.to_string()))?;
        let Value::Object(root) = root else {
            return Err(ParseError::NotAJob("top-level value is not an object".to_string()));
        };

        let job = match root.get("Job") {
            Some(Value::Object(job)) => job,
            Some(_) => return Err(ParseError::NotAJob("\"Job\" is not an object".to_string())),
            None => &root,
        };
        header(job)
    }
}

impl JobspecParser for JsonJobspecParser {
    fn parse(&self, spec: &JobSpecification) -> Result<ParsedJob, ParseError> {
        self.parse_str(&spec.source)
    }
}

fn header(job: &Map<String, Value>) -> Result<ParsedJob, ParseError> {
    let id = non_empty_str(job, "ID");
    let name = non_empty_str(job, "Name");
    let (id, name) = match (id, name) {
        (Some(id), Some(name)) => (id, name),
        (Some(id), None) => (id, id),
        (None, Some(name)) => (name, name),
        (None, None) => {
            return Err(ParseError::NotAJob("missing \"ID\" and \"Name\"".to_string()));
        }
    };

    let job_type = match non_empty_str(job, "Type") {
        Some(value) => JobType::parse(value)
            .ok_or_else(|| ParseError::NotAJob(format!("invalid job type {value:?}")))?,
        None => JobType::default(),
    };

    let job_update = max_parallel(job.get("Update"));
    let groups = job
        .get("TaskGroups")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let task_groups = groups
        .iter()
        .filter_map(|group| non_empty_str(group.as_object()?, "Name").map(str::to_string))
        .collect();
    let deployments_enabled = if groups.is_empty() {
        job_update.unwrap_or(1) > 0
    } else {
        groups.iter().any(|group| {
            let own = max_parallel(group.get("Update"));
            own.or(job_update).unwrap_or(1) > 0
        })
    };

    let periodic = match job.get("Periodic") {
        Some(Value::Object(periodic)) => periodic
            .get("Enabled")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        _ => false,
    };

    Ok(ParsedJob {
        id: id.to_string(),
        name: name.to_string(),
        namespace: non_empty_str(job, "Namespace").map(str::to_string),
        job_type,
        parameterized: is_present(job.get("ParameterizedJobConfig")),
        periodic,
        multiregion: is_present(job.get("Multiregion")),
        deployments_enabled,
        datacenters: job
            .get("Datacenters")
            .and_then(Value::as_array)
            .map(|dcs| dcs.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        task_groups,
        payload: Some(Value::Object(job.clone())),
    })
}

fn non_empty_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).filter(|value| !value.is_empty())
}

fn is_present(value: Option<&Value>) -> bool {
    matches!(value, Some(value) if !value.is_null())
}

fn max_parallel(update: Option<&Value>) -> Option<u64> {
    update?.get("MaxParallel")?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn envelope_and_bare_job_parse_the_same() {
        let parser = JsonJobspecParser::new();
        let wrapped = parser
            .parse_str(r#"{"Job": {"ID": "foo", "Name": "foo", "Type": "batch"}}"#)
            .unwrap();
        let bare = parser
            .parse_str(r#"{"ID": "foo", "Name": "foo", "Type": "batch"}"#)
            .unwrap();

        assert_eq!(wrapped.id, "foo");
        assert_eq!(wrapped.job_type, JobType::Batch);
        assert_eq!(wrapped.id, bare.id);
        assert_eq!(wrapped.job_type, bare.job_type);
    }

    #[rstest]
    #[case::invalid_json("{", "invalid JSON")]
    #[case::not_a_job(r#"{"not": "job"}"#, "not a job")]
    #[case::array("[1, 2]", "not a job")]
    #[case::bad_envelope(r#"{"Job": "foo"}"#, "not a job")]
    #[case::bad_type(r#"{"ID": "foo", "Type": "cron"}"#, "invalid job type")]
    fn rejected_documents(#[case] source: &str, #[case] message: &str) {
        let err = JsonJobspecParser::new().parse_str(source).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[test]
    fn header_fields_are_extracted() {
        let job = JsonJobspecParser::new()
            .parse_str(
                r#"{
                    "ID": "api",
                    "Namespace": "team",
                    "Datacenters": ["dc1", "dc2"],
                    "ParameterizedJobConfig": {"Payload": "optional"},
                    "TaskGroups": [{"Name": "web"}, {"Name": "worker"}]
                }"#,
            )
            .unwrap();

        assert_eq!(job.name, "api");
        assert_eq!(job.namespace.as_deref(), Some("team"));
        assert_eq!(job.datacenters, vec!["dc1", "dc2"]);
        assert_eq!(job.task_groups, vec!["web", "worker"]);
        assert!(job.parameterized);
        assert!(!job.creates_evaluation());
        assert!(job.payload.is_some());
    }

    #[rstest]
    #[case::defaults(r#"{"ID": "a", "TaskGroups": [{"Name": "g"}]}"#, true)]
    #[case::job_level_off(r#"{"ID": "a", "Update": {"MaxParallel": 0}, "TaskGroups": [{"Name": "g"}]}"#, false)]
    #[case::group_overrides(r#"{"ID": "a", "Update": {"MaxParallel": 0}, "TaskGroups": [{"Name": "g", "Update": {"MaxParallel": 2}}]}"#, true)]
    #[case::all_groups_off(r#"{"ID": "a", "TaskGroups": [{"Name": "g", "Update": {"MaxParallel": 0}}]}"#, false)]
    fn rolling_updates(#[case] source: &str, #[case] enabled: bool) {
        let job = JsonJobspecParser::new().parse_str(source).unwrap();
        assert_eq!(job.deployments_enabled, enabled);
    }

    #[test]
    fn disabled_periodic_block_is_not_periodic() {
        let job = JsonJobspecParser::new()
            .parse_str(r#"{"ID": "a", "Type": "batch", "Periodic": {"Enabled": false}}"#)
            .unwrap();
        assert!(!job.periodic);
    }
}
