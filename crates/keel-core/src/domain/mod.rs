//! Domain model (identities, specs, remote views, state, decisions, errors).

pub mod decision;
pub mod deployment;
pub mod errors;
pub mod ids;
pub mod job;
pub mod spec;
pub mod state;

pub use decision::{DefaultDriftDecider, DriftDecider, DriftDecision, DriftReport, SourceDrift};
pub use deployment::{Deployment, DeploymentStatus, EvalStatus, Evaluation};
pub use errors::{ParseError, PolicyLevel, ReconcileError, SchedulerError};
pub use ids::{DEFAULT_NAMESPACE, DeploymentId, EvalId, JobIdentity};
pub use job::{JobStatus, JobSubmission, RemoteJob, RemoteJobVersion};
pub use spec::{JobSpecification, JobType, JobspecFormat, ParsedJob};
pub use state::{ReconciliationState, ResourcePolicy, TeardownPolicy};
