//! Configuration - reconciler の設定値
//!
//! # 方針
//! - すべて明示的な struct として各 manager に渡す（グローバル状態なし）
//! - JSON から読み込み、欠けているフィールドはデフォルト値
//! - 接続情報（`SchedulerConnection`）は read-only、起動時に一度だけ注入

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{JobSpecification, ResourcePolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Bounded polling: fixed attempt count, fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl PollPolicy {
    pub const fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub evaluation: PollPolicy,
    pub deployment_discovery: PollPolicy,
    pub deployment: PollPolicy,
    pub teardown: PollPolicy,

    /// Outer deadline for one create / update / delete, shared by every
    /// phase it runs.
    pub timeout_ms: Option<u64>,

    pub scheduler: SchedulerConnection,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            evaluation: PollPolicy::new(60, 1_000),
            deployment_discovery: PollPolicy::new(10, 1_000),
            deployment: PollPolicy::new(300, 2_000),
            teardown: PollPolicy::new(5, 1_000),
            timeout_ms: None,
            scheduler: SchedulerConnection::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ReconcilerConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// `NOMAD_ADDR` / `NOMAD_REGION` / `NOMAD_TOKEN` を上書きに使う
    pub fn with_env_overrides(mut self) -> Self {
        self.scheduler = self.scheduler.with_overrides(|key| std::env::var(key).ok());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, policy) in [
            ("evaluation", self.evaluation),
            ("deployment_discovery", self.deployment_discovery),
            ("deployment", self.deployment),
            ("teardown", self.teardown),
        ] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.max_attempts must be at least 1"
                )));
            }
        }
        if self.scheduler.address.trim().is_empty() {
            return Err(ConfigError::Invalid("scheduler.address is empty".to_string()));
        }
        Ok(())
    }
}

/// Connection to the scheduler HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConnection {
    pub address: String,
    pub region: Option<String>,
    pub secret_id: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for SchedulerConnection {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:4646".to_string(),
            region: None,
            secret_id: None,
            request_timeout_ms: 30_000,
        }
    }
}

impl SchedulerConnection {
    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(address) = lookup("NOMAD_ADDR").filter(|v| !v.is_empty()) {
            self.address = address;
        }
        if let Some(region) = lookup("NOMAD_REGION").filter(|v| !v.is_empty()) {
            self.region = Some(region);
        }
        if let Some(token) = lookup("NOMAD_TOKEN").filter(|v| !v.is_empty()) {
            self.secret_id = Some(token);
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Structured-text options of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hcl2Options {
    pub allow_fs: bool,
    pub vars: BTreeMap<String, String>,
}

/// Per-resource options, as declared by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub jobspec: String,

    /// Jobspec is JSON rather than structured text.
    pub json: bool,
    pub hcl2: Hcl2Options,

    /// Overrides the namespace declared in the jobspec.
    pub namespace: Option<String>,

    pub detach: bool,
    pub deregister_on_destroy: bool,
    pub purge_on_destroy: bool,
    pub policy_override: bool,
    pub rerun_if_dead: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        let policy = ResourcePolicy::default();
        Self {
            jobspec: String::new(),
            json: false,
            hcl2: Hcl2Options::default(),
            namespace: None,
            detach: policy.detach,
            deregister_on_destroy: policy.deregister_on_destroy,
            purge_on_destroy: policy.purge_on_destroy,
            policy_override: policy.policy_override,
            rerun_if_dead: policy.rerun_if_dead,
        }
    }
}

impl ResourceConfig {
    pub fn hcl(jobspec: impl Into<String>) -> Self {
        Self {
            jobspec: jobspec.into(),
            ..Self::default()
        }
    }

    pub fn json(jobspec: impl Into<String>) -> Self {
        Self {
            jobspec: jobspec.into(),
            json: true,
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn specification(&self) -> JobSpecification {
        if self.json {
            JobSpecification::json(self.jobspec.clone())
        } else {
            let mut spec = JobSpecification::hcl(self.jobspec.clone())
                .with_allow_fs(self.hcl2.allow_fs);
            spec.variables = self.hcl2.vars.clone();
            spec
        }
    }

    pub fn policy(&self) -> ResourcePolicy {
        ResourcePolicy {
            deregister_on_destroy: self.deregister_on_destroy,
            purge_on_destroy: self.purge_on_destroy,
            policy_override: self.policy_override,
            rerun_if_dead: self.rerun_if_dead,
            detach: self.detach,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobspecFormat;

    #[test]
    fn empty_json_yields_defaults() {
        let config = ReconcilerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ReconcilerConfig::default());
        assert_eq!(config.deployment.interval(), Duration::from_secs(2));
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = ReconcilerConfig::from_json_str(
            r#"{"teardown": {"max_attempts": 2, "interval_ms": 10}, "timeout_ms": 5000}"#,
        )
        .unwrap();
        assert_eq!(config.teardown, PollPolicy::new(2, 10));
        assert_eq!(config.evaluation, PollPolicy::new(60, 1_000));
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = ReconcilerConfig::from_json_str(
            r#"{"deployment": {"max_attempts": 0, "interval_ms": 10}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("deployment.max_attempts")));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            ReconcilerConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_replace_connection_fields() {
        let connection = SchedulerConnection::default().with_overrides(|key| match key {
            "NOMAD_ADDR" => Some("https://nomad.internal:4646".to_string()),
            "NOMAD_TOKEN" => Some("s3cr3t".to_string()),
            "NOMAD_REGION" => Some(String::new()),
            _ => None,
        });
        assert_eq!(connection.address, "https://nomad.internal:4646");
        assert_eq!(connection.secret_id.as_deref(), Some("s3cr3t"));
        assert_eq!(connection.region, None);
    }

    #[test]
    fn resource_defaults_match_policy_defaults() {
        let resource: ResourceConfig = serde_json::from_str(r#"{"jobspec": "job \"x\" {}"}"#).unwrap();
        assert_eq!(resource.policy(), ResourcePolicy::default());
        assert!(resource.detach);
        assert!(resource.deregister_on_destroy);
    }

    #[test]
    fn resource_specification_carries_hcl2_options() {
        let resource: ResourceConfig = serde_json::from_str(
            r#"{"jobspec": "job \"x\" {}", "hcl2": {"allow_fs": true, "vars": {"dc": "dc1"}}}"#,
        )
        .unwrap();
        let spec = resource.specification();
        assert_eq!(spec.format, JobspecFormat::StructuredText);
        assert!(spec.allow_fs);
        assert_eq!(spec.variables.get("dc").map(String::as_str), Some("dc1"));

        let json = ResourceConfig::json("{}").specification();
        assert_eq!(json.format, JobspecFormat::Json);
        assert!(json.variables.is_empty());
    }
}
