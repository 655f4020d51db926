//! App - job lifecycle reconciler
//!
//! ```text
//! Submission ─▶ Deployment (create/update)
//!                    │
//!                    ▼
//!                  Drift (read) ─▶ Teardown (delete)
//!
//! Migration = Teardown(old) + Submission(new)  (identity change)
//! ```
//!
//! 各 manager は `Context`（port + 設定）だけに依存し、
//! `JobResource` がそれらを managed-resource のライフサイクルにまとめます。

pub mod builder;
pub mod config;
pub mod context;
pub mod deployment;
pub mod drift;
pub mod migration;
pub mod poll;
pub mod resource;
pub mod submission;
pub mod teardown;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{BuildError, Reconciler, ReconcilerBuilder};
pub use config::{ConfigError, Hcl2Options, PollPolicy, ReconcilerConfig, ResourceConfig, SchedulerConnection};
pub use context::Context;
pub use deployment::{DeploymentMonitor, ObserveMode};
pub use drift::DriftDetector;
pub use migration::MigrationHandler;
pub use poll::{Deadline, Poller, Tick};
pub use resource::{ApplyFailure, JobResource, Plan, PlanAction, ReadOutcome, UpdateReason};
pub use submission::{Submission, SubmissionManager, SubmitOptions};
pub use teardown::{TeardownManager, TeardownOutcome};
