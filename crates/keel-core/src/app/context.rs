//! Context - 各 manager が共有する依存（port）と設定
//!
//! プロセス全体のグローバル状態は持ちません。
//! `Context` は clone して各 manager のコンストラクタに渡します。

use std::future::Future;
use std::sync::Arc;

use super::config::{PollPolicy, ReconcilerConfig};
use super::poll::{Deadline, Poller};
use crate::domain::ReconcileError;
use crate::ports::{Clock, JobspecParser, SchedulerClient};

#[derive(Clone)]
pub struct Context {
    pub scheduler: Arc<dyn SchedulerClient>,
    pub parser: Arc<dyn JobspecParser>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ReconcilerConfig>,
}

impl Context {
    /// Deadline for an operation starting now. Taken once per public
    /// operation and handed to every phase it runs.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.clock.as_ref(), self.config.timeout())
    }

    pub fn poller(
        &self,
        policy: PollPolicy,
        deadline: Deadline,
        operation: &'static str,
    ) -> Poller<'_> {
        Poller::new(self.clock.as_ref(), policy, deadline, operation)
    }

    /// A single scheduler call outside any polling loop.
    pub async fn call<F: Future>(
        &self,
        deadline: Deadline,
        operation: &'static str,
        call: F,
    ) -> Result<F::Output, ReconcileError> {
        deadline.bound(self.clock.as_ref(), operation, 1, call).await
    }
}
