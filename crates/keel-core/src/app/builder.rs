//! ReconcilerBuilder - reconciler の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - scheduler が未設定なら build() が失敗する
//! - 設定値（poll policy など）は build() 時に検証する
//! - parser / clock / config は省略時にデフォルト実装を使う

use std::sync::Arc;

use super::config::{ConfigError, ReconcilerConfig};
use super::context::Context;
use super::deployment::DeploymentMonitor;
use super::drift::DriftDetector;
use super::migration::MigrationHandler;
use super::resource::JobResource;
use super::submission::SubmissionManager;
use super::teardown::TeardownManager;
use crate::impls::parser::DefaultJobspecParser;
use crate::ports::{Clock, JobspecParser, SchedulerClient, SystemClock};

/// ReconcilerBuilder は reconciler を構築
///
/// # 使用例
/// ```ignore
/// let reconciler = ReconcilerBuilder::new()
///     .scheduler(Arc::new(InMemoryScheduler::new()))
///     .clock(Arc::new(SimulatedClock::default()))
///     .build()?;
/// let state = reconciler.resource().create(&config).await?;
/// ```
pub struct ReconcilerBuilder {
    scheduler: Option<Arc<dyn SchedulerClient>>,
    parser: Option<Arc<dyn JobspecParser>>,
    clock: Option<Arc<dyn Clock>>,
    config: ReconcilerConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no scheduler client configured")]
    MissingScheduler,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self {
            scheduler: None,
            parser: None,
            clock: None,
            config: ReconcilerConfig::default(),
        }
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn SchedulerClient>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn JobspecParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Reconciler, BuildError> {
        let scheduler = self.scheduler.ok_or(BuildError::MissingScheduler)?;
        self.config.validate()?;

        let ctx = Context {
            scheduler,
            parser: self
                .parser
                .unwrap_or_else(|| Arc::new(DefaultJobspecParser::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: Arc::new(self.config),
        };
        Ok(Reconciler::new(ctx))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconciler は各 manager を保持する
pub struct Reconciler {
    ctx: Context,
    submission: SubmissionManager,
    deployments: DeploymentMonitor,
    drift: DriftDetector,
    teardown: TeardownManager,
}

impl Reconciler {
    fn new(ctx: Context) -> Self {
        Self {
            submission: SubmissionManager::new(ctx.clone()),
            deployments: DeploymentMonitor::new(ctx.clone()),
            drift: DriftDetector::new(ctx.clone()),
            teardown: TeardownManager::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn submission(&self) -> &SubmissionManager {
        &self.submission
    }

    pub fn deployments(&self) -> &DeploymentMonitor {
        &self.deployments
    }

    pub fn drift(&self) -> &DriftDetector {
        &self.drift
    }

    pub fn teardown(&self) -> &TeardownManager {
        &self.teardown
    }

    pub fn migration(&self) -> MigrationHandler<'_> {
        MigrationHandler::new(&self.submission, &self.teardown)
    }

    pub fn resource(&self) -> JobResource<'_> {
        JobResource::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::PollPolicy;
    use crate::impls::inmem_scheduler::InMemoryScheduler;

    #[test]
    fn build_requires_a_scheduler() {
        let result = ReconcilerBuilder::new().build();
        assert!(matches!(result, Err(BuildError::MissingScheduler)));
    }

    #[test]
    fn build_rejects_invalid_poll_policy() {
        let config = ReconcilerConfig {
            teardown: PollPolicy::new(0, 1_000),
            ..ReconcilerConfig::default()
        };
        let result = ReconcilerBuilder::new()
            .scheduler(Arc::new(InMemoryScheduler::new()))
            .config(config)
            .build();
        assert!(matches!(result, Err(BuildError::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn build_with_defaults() {
        let reconciler = ReconcilerBuilder::new()
            .scheduler(Arc::new(InMemoryScheduler::new()))
            .build()
            .unwrap();
        assert_eq!(reconciler.context().config.teardown, PollPolicy::new(5, 1_000));
    }
}
