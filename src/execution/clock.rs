//! Injected time source
//!
//! The pod wait and artifact polling depend on wall-clock time; tests
//! substitute an accelerated implementation instead of mutating any
//! process-wide state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Time source used by the pod executor
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock time
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
