//! Domain identifiers.
//!
//! # Phantom type パターン
//! スケジューラが払い出す ID（evaluation, deployment）はどれも文字列ですが、
//! `Id<T>` のマーカー型でコンパイル時に区別します。
//! `EvalId` を `DeploymentId` の代わりに渡すことはできません。
//!
//! `JobIdentity` だけは別扱いです。job id と namespace の組がスケジューラ上の
//! 一意キーであり、namespace が変われば別の identity になります。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Namespace used when neither the resource nor the jobspec names one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// ログやエラーメッセージで使う種別名（例: "evaluation"）
    fn kind() -> &'static str;
}

/// Scheduler-issued identifier, typed by what it identifies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// Fresh, sortable id. Used by the in-memory scheduler.
    pub fn generate() -> Self {
        Self::new(Ulid::new().to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> &'static str {
        T::kind()
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Evaluation {}

impl IdMarker for Evaluation {
    fn kind() -> &'static str {
        "evaluation"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Deployment {}

impl IdMarker for Deployment {
    fn kind() -> &'static str {
        "deployment"
    }
}

/// Identifier of a scheduler evaluation (created by register/deregister).
pub type EvalId = Id<Evaluation>;

/// Identifier of a deployment (one rollout of one job version).
pub type DeploymentId = Id<Deployment>;

/// `(job id, namespace)`: the key of a job on the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobIdentity {
    pub id: String,
    pub namespace: String,
}

impl JobIdentity {
    pub fn new(id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
        }
    }

    /// Identity in the `default` namespace.
    pub fn in_default_namespace(id: impl Into<String>) -> Self {
        Self::new(id, DEFAULT_NAMESPACE)
    }

    /// Same job id, different namespace.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self::new(self.id.clone(), namespace)
    }
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let eval = EvalId::new("8f0c");
        let deployment = DeploymentId::new("8f0c");

        assert_eq!(eval.as_str(), deployment.as_str());
        assert_eq!(eval.kind(), "evaluation");
        assert_eq!(deployment.kind(), "deployment");
        // let _: EvalId = deployment; // <- does not compile
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = DeploymentId::generate();
        let b = DeploymentId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = EvalId::new("abc-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-123\"");

        let back: EvalId = serde_json::from_str("\"abc-123\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn namespace_change_yields_new_identity() {
        let a = JobIdentity::in_default_namespace("foo");
        let b = a.with_namespace("prod");

        assert_ne!(a, b);
        assert_eq!(a.id, b.id);
        assert_eq!(b.to_string(), "foo@prod");
    }
}
