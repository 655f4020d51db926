//! Drift decision model: what a reconciliation pass should do about the
//! remote state it observed.
//!
//! This module defines the decision types and the `DriftDecider` trait that
//! maps an observation to a decision.

use serde::{Deserialize, Serialize};

use super::job::RemoteJob;

/// Outcome of comparing the observed job against the desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftDecision {
    /// Nothing to correct.
    None,

    /// Scheduler has no such job: recreate from scratch.
    Absent,

    /// Stopped by someone else and `rerun_if_dead` is off.
    /// Reported as "nothing to correct"; the run is considered complete.
    ExternallyStopped,

    /// Stopped by someone else and `rerun_if_dead` is on: resubmit.
    RerunRequired,
}

impl DriftDecision {
    /// The next apply must submit the jobspec again.
    pub fn requires_submission(self) -> bool {
        matches!(self, DriftDecision::Absent | DriftDecision::RerunRequired)
    }
}

/// Out-of-band change to what the scheduler runs. Reported, never
/// auto-corrected by a drift check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDrift {
    /// Version the reconciler last knew about (if any).
    pub expected_version: Option<u64>,
    pub remote_version: u64,
    pub source_differs: bool,
    pub variables_differ: bool,
}

impl SourceDrift {
    pub fn is_drifted(&self) -> bool {
        self.source_differs
            || self.variables_differ
            || self
                .expected_version
                .is_some_and(|expected| expected != self.remote_version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub decision: DriftDecision,

    /// The job as observed; `None` when the scheduler reported not-found.
    pub remote: Option<RemoteJob>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_drift: Option<SourceDrift>,
}

impl DriftReport {
    pub fn absent() -> Self {
        Self {
            decision: DriftDecision::Absent,
            remote: None,
            source_drift: None,
        }
    }
}

/// Maps an observed job to a drift decision.
///
/// Deciders are pure functions: no remote calls, no state mutation.
pub trait DriftDecider: Send + Sync {
    fn decide(&self, remote: Option<&RemoteJob>) -> DriftDecision;
}

/// Decision table driven by the `rerun_if_dead` flag.
///
/// | observed                  | rerun_if_dead=false | rerun_if_dead=true |
/// |---------------------------|---------------------|--------------------|
/// | not found                 | Absent              | Absent             |
/// | dead, stopped externally  | ExternallyStopped   | RerunRequired      |
/// | anything else             | None                | None               |
#[derive(Debug, Clone, Copy)]
pub struct DefaultDriftDecider {
    rerun_if_dead: bool,
}

impl DefaultDriftDecider {
    pub fn new(rerun_if_dead: bool) -> Self {
        Self { rerun_if_dead }
    }
}

impl DriftDecider for DefaultDriftDecider {
    fn decide(&self, remote: Option<&RemoteJob>) -> DriftDecision {
        match remote {
            None => DriftDecision::Absent,
            Some(job) if job.is_stopped() => {
                if self.rerun_if_dead {
                    DriftDecision::RerunRequired
                } else {
                    DriftDecision::ExternallyStopped
                }
            }
            Some(_) => DriftDecision::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::JobIdentity;
    use crate::domain::job::JobStatus;
    use crate::domain::spec::JobType;
    use rstest::rstest;

    fn remote(status: JobStatus, stop: bool) -> RemoteJob {
        RemoteJob {
            identity: JobIdentity::in_default_namespace("foo"),
            name: "foo".to_string(),
            job_type: JobType::Service,
            status,
            stop,
            version: 1,
            modify_index: 1,
            parameterized: false,
            multiregion: false,
        }
    }

    #[rstest]
    #[case::stopped_no_rerun(Some((JobStatus::Dead, true)), false, DriftDecision::ExternallyStopped)]
    #[case::stopped_rerun(Some((JobStatus::Dead, true)), true, DriftDecision::RerunRequired)]
    #[case::running(Some((JobStatus::Running, false)), true, DriftDecision::None)]
    #[case::pending(Some((JobStatus::Pending, false)), false, DriftDecision::None)]
    #[case::completed_batch(Some((JobStatus::Dead, false)), true, DriftDecision::None)]
    #[case::absent(None, false, DriftDecision::Absent)]
    #[case::absent_rerun(None, true, DriftDecision::Absent)]
    fn drift_decision_table(
        #[case] observed: Option<(JobStatus, bool)>,
        #[case] rerun_if_dead: bool,
        #[case] expected: DriftDecision,
    ) {
        let job = observed.map(|(status, stop)| remote(status, stop));
        let decider = DefaultDriftDecider::new(rerun_if_dead);
        assert_eq!(decider.decide(job.as_ref()), expected);
    }

    #[test]
    fn version_mismatch_alone_is_drift() {
        let drift = SourceDrift {
            expected_version: Some(2),
            remote_version: 3,
            source_differs: false,
            variables_differ: false,
        };
        assert!(drift.is_drifted());

        let in_sync = SourceDrift {
            expected_version: Some(3),
            ..drift
        };
        assert!(!in_sync.is_drifted());
    }
}
