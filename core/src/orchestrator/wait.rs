//! Bounded waiting for a usable session
//!
//! One [`WaitBudget`] is created per `session()` call and shared by every
//! stage of that call, so awaiting tasks and polling never add up to more
//! than the configured timeout.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};

/// Deadline for one `session()` call
#[derive(Debug, Clone, Copy)]
pub struct WaitBudget {
    total: Duration,
    deadline: Instant,
}

impl WaitBudget {
    pub fn start(total: Duration) -> Self {
        Self {
            total,
            deadline: Instant::now() + total,
        }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_exhausted(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Run `future` until the deadline; `None` on timeout
    pub async fn run<F: Future>(&self, future: F) -> Option<F::Output> {
        timeout_at(self.deadline, future).await.ok()
    }

    /// Call `check` every `interval` until it yields a value or the budget runs out.
    /// `check` runs at least once, even when the budget is already spent.
    pub async fn poll<T, F>(&self, interval: Duration, mut check: F) -> Option<T>
    where
        F: FnMut() -> Option<T>,
    {
        loop {
            if let Some(value) = check() {
                return Some(value);
            }
            let remaining = self.remaining();
            if remaining.is_zero() {
                return None;
            }
            sleep(interval.min(remaining)).await;
        }
    }
}
