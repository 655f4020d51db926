//! Clock port - 時刻と待機の抽象化
//!
//! ポーリングは必ずこの trait 経由で待機します。
//! テストでは `SimulatedClock` を使い、壁時計を一切待ちません。

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Clock は現在時刻と sleep を提供
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// SystemClock（本番用）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// SimulatedClock（テスト用）
///
/// `sleep` は即座に返り、仮想時刻だけを進めます。
/// 待機の履歴は `sleeps()` で検証できます。
#[derive(Debug)]
pub struct SimulatedClock {
    inner: Mutex<SimulatedInner>,
}

#[derive(Debug)]
struct SimulatedInner {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl SimulatedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(SimulatedInner {
                now: start,
                sleeps: Vec::new(),
            }),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut inner = self.lock();
        inner.now = shift(inner.now, duration);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.lock().sleeps.iter().sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedInner> {
        // poison は無視（テスト用の時計なので状態は常に有効）
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        let mut inner = self.lock();
        inner.now = shift(inner.now, duration);
        inner.sleeps.push(duration);
    }
}

fn shift(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_sleep_advances_virtual_time_only() {
        let clock = SimulatedClock::default();
        let start = clock.now();

        clock.sleep(Duration::from_secs(30)).await;
        clock.sleep(Duration::from_millis(500)).await;

        assert_eq!(clock.now() - start, chrono::Duration::milliseconds(30_500));
        assert_eq!(clock.sleeps().len(), 2);
        assert_eq!(clock.total_slept(), Duration::from_millis(30_500));
    }

    #[test]
    fn advance_moves_now_without_recording_a_sleep() {
        let clock = SimulatedClock::default();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(5));
        assert!(clock.sleeps().is_empty());
    }
}
