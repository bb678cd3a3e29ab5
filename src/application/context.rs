//! Per-request deadline and correlation id.
//!
//! Every external call made on behalf of a request goes through
//! [`RequestContext::run`], so the whole operation shares one deadline.
//! Cancelling a request is dropping its future; work already committed stays
//! committed and nothing further is attempted.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, timeout_at};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Error)]
#[error("deadline exceeded during `{op}`")]
pub struct DeadlineExceeded {
    pub op: &'static str,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// A context without a deadline.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            deadline: Some(deadline),
        }
    }

    /// Same request, fresh deadline. For follow-up work that must still run
    /// once the primary mutation has committed.
    pub fn follow_up(&self, timeout: Duration) -> Self {
        Self {
            request_id: self.request_id,
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Drives `fut` to completion unless the deadline passes first.
    pub async fn run<F, T>(&self, op: &'static str, fut: F) -> Result<T, DeadlineExceeded>
    where
        F: Future<Output = T>,
    {
        match self.deadline {
            Some(deadline) => timeout_at(deadline, fut)
                .await
                .map_err(|_| DeadlineExceeded { op }),
            None => Ok(fut.await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn run_fails_once_deadline_passes() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run("slow", tokio::time::sleep(Duration::from_secs(5)))
            .await
            .expect_err("deadline should fire");
        assert_eq!(err.op, "slow");
        assert!(ctx.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_outlives_an_expired_request() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ctx.is_expired());

        let follow_up = ctx.follow_up(Duration::from_secs(1));
        assert_eq!(follow_up.request_id(), ctx.request_id());
        assert!(!follow_up.is_expired());
        follow_up
            .run("cleanup", tokio::time::sleep(Duration::from_millis(10)))
            .await
            .expect("fresh deadline");
    }

    #[tokio::test]
    async fn run_without_deadline_completes() {
        let ctx = RequestContext::new();
        let value = ctx.run("fast", async { 7 }).await.expect("no deadline");
        assert_eq!(value, 7);
        assert!(!ctx.is_expired());
    }
}
