//! Poller - bounded polling をステートマシンとして表現
//!
//! ```text
//! Ready ──tick──▶ Attempt(1) ──tick(sleep)──▶ Attempt(2) ... ──▶ Exhausted(n)
//!   │
//!   └── deadline 超過 ──▶ Err(Timeout)
//! ```
//!
//! 呼び出し側は `tick()` の結果を見てリモート呼び出しを 1 回行い、
//! 終端条件を自分で判定します。待機は必ず `Clock` 経由です。
//!
//! `Deadline` は公開操作（create / update / delete）ごとに 1 回だけ決め、
//! すべてのフェーズで共有します。実行中のリモート呼び出しも残り時間で打ち切ります。

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::config::PollPolicy;
use crate::domain::ReconcileError;
use crate::ports::Clock;

/// Instant by which a whole public operation must finish, across every
/// phase it runs. `Deadline::default()` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<DateTime<Utc>>);

impl Deadline {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(Some(instant))
    }

    /// `timeout` from the clock's current time; `None` means unbounded.
    pub fn after(clock: &dyn Clock, timeout: Option<Duration>) -> Self {
        let instant = timeout
            .and_then(|timeout| chrono::Duration::from_std(timeout).ok())
            .and_then(|timeout| clock.now().checked_add_signed(timeout));
        Self(instant)
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Time left, zero once passed. `None` when unbounded.
    pub fn remaining(&self, clock: &dyn Clock) -> Option<Duration> {
        let instant = self.0?;
        Some((instant - clock.now()).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        self.0.is_some_and(|instant| clock.now() >= instant)
    }

    /// Run one remote call, abandoning it when the remaining time runs out.
    ///
    /// The outer `Result` is the deadline; the inner one is the call's own.
    pub async fn bound<F: Future>(
        &self,
        clock: &dyn Clock,
        operation: &'static str,
        attempts: u32,
        call: F,
    ) -> Result<F::Output, ReconcileError> {
        let Some(remaining) = self.remaining(clock) else {
            return Ok(call.await);
        };
        if remaining.is_zero() {
            return Err(ReconcileError::timeout(operation, attempts));
        }
        tokio::time::timeout(remaining, call)
            .await
            .map_err(|_| ReconcileError::timeout(operation, attempts))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Make attempt number `n` (1-based) now.
    Attempt(u32),
    /// `max_attempts` used up; `n` attempts were made.
    Exhausted(u32),
}

pub struct Poller<'a> {
    clock: &'a dyn Clock,
    policy: PollPolicy,
    deadline: Deadline,
    operation: &'static str,
    attempts: u32,
    sleep_first: bool,
}

impl<'a> Poller<'a> {
    pub fn new(
        clock: &'a dyn Clock,
        policy: PollPolicy,
        deadline: Deadline,
        operation: &'static str,
    ) -> Self {
        Self {
            clock,
            policy,
            deadline,
            operation,
            attempts: 0,
            sleep_first: false,
        }
    }

    /// Wait one interval before the first attempt as well. Used when the
    /// caller has just observed the remote side through another poller.
    pub fn delayed(mut self) -> Self {
        self.sleep_first = true;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub async fn tick(&mut self) -> Result<Tick, ReconcileError> {
        if self.attempts >= self.policy.max_attempts {
            return Ok(Tick::Exhausted(self.attempts));
        }
        if self.attempts > 0 || self.sleep_first {
            self.clock.sleep(self.policy.interval()).await;
        }
        if self.deadline.is_expired(self.clock) {
            return Err(ReconcileError::timeout(self.operation, self.attempts));
        }
        self.attempts += 1;
        Ok(Tick::Attempt(self.attempts))
    }

    /// The remote call for the current attempt, bounded by the deadline.
    pub async fn call<F: Future>(&self, call: F) -> Result<F::Output, ReconcileError> {
        self.deadline
            .bound(self.clock, self.operation, self.attempts, call)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SimulatedClock;

    #[tokio::test]
    async fn exhausts_after_max_attempts_sleeping_between_them() {
        let clock = SimulatedClock::default();
        let mut poller = Poller::new(&clock, PollPolicy::new(3, 100), Deadline::default(), "test");

        assert_eq!(poller.tick().await.unwrap(), Tick::Attempt(1));
        assert_eq!(poller.tick().await.unwrap(), Tick::Attempt(2));
        assert_eq!(poller.tick().await.unwrap(), Tick::Attempt(3));
        assert_eq!(poller.tick().await.unwrap(), Tick::Exhausted(3));

        // no sleep before the first attempt, none after exhaustion
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100); 2]);
    }

    #[tokio::test]
    async fn delayed_poller_sleeps_before_first_attempt() {
        let clock = SimulatedClock::default();
        let mut poller = Poller::new(&clock, PollPolicy::new(1, 250), Deadline::default(), "test").delayed();

        assert_eq!(poller.tick().await.unwrap(), Tick::Attempt(1));
        assert_eq!(clock.total_slept(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn deadline_expiry_is_a_timeout_error() {
        let clock = SimulatedClock::default();
        let deadline = Deadline::after(&clock, Some(Duration::from_millis(150)));
        let mut poller = Poller::new(&clock, PollPolicy::new(10, 100), deadline, "deployment");

        assert_eq!(poller.tick().await.unwrap(), Tick::Attempt(1));
        assert_eq!(poller.tick().await.unwrap(), Tick::Attempt(2));
        let err = poller.tick().await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "timed out waiting for deployment after 2 attempts"
        );
    }

    #[tokio::test]
    async fn one_deadline_is_shared_by_consecutive_pollers() {
        let clock = SimulatedClock::default();
        let deadline = Deadline::after(&clock, Some(Duration::from_millis(250)));

        let mut first = Poller::new(&clock, PollPolicy::new(2, 100), deadline, "evaluation");
        while let Tick::Attempt(_) = first.tick().await.unwrap() {}
        assert_eq!(deadline.remaining(&clock), Some(Duration::from_millis(150)));

        // the second phase only gets what the first one left over
        let mut second = Poller::new(&clock, PollPolicy::new(5, 100), deadline, "deployment")
            .delayed();
        assert_eq!(second.tick().await.unwrap(), Tick::Attempt(1));
        let err = second.tick().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(clock.total_slept(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn expired_deadline_skips_the_remote_call() {
        let clock = SimulatedClock::default();
        let deadline = Deadline::at(clock.now());
        let mut called = false;

        let err = deadline
            .bound(&clock, "registration", 1, async { called = true })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(!called);
    }

    #[tokio::test]
    async fn hanging_call_is_cut_at_the_remaining_time() {
        let clock = SimulatedClock::default();
        let deadline = Deadline::after(&clock, Some(Duration::from_millis(20)));

        let err = deadline
            .bound(&clock, "registration", 1, std::future::pending::<()>())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "timed out waiting for registration after 1 attempts"
        );
    }

    #[tokio::test]
    async fn unbounded_deadline_never_expires() {
        let clock = SimulatedClock::default();
        let deadline = Deadline::default();

        clock.sleep(Duration::from_secs(3600)).await;

        assert!(!deadline.is_expired(&clock));
        assert_eq!(deadline.remaining(&clock), None);
        assert_eq!(deadline.bound(&clock, "x", 0, async { 7 }).await.unwrap(), 7);
    }
}
