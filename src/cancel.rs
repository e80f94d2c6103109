//! Cancellation and deadlines shared by the content server and the render host.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of cancellable sleeps.
const POLL_SLICE: Duration = Duration::from_millis(25);

/// A cloneable cancellation flag.
///
/// Every clone observes the same flag, so the pipeline can hand one clone to
/// the server thread and keep another for its own waits.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// A child token that is cancelled when either itself or `self` is.
    pub fn child(&self) -> LinkedToken {
        LinkedToken { parent: self.clone(), own: CancelToken::new() }
    }
}

/// Token linked to a parent; used to stop one request-scoped resource
/// without cancelling the whole request.
#[derive(Debug, Clone)]
pub struct LinkedToken {
    parent: CancelToken,
    own: CancelToken,
}

impl LinkedToken {
    pub fn cancel(&self) {
        self.own.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.own.is_cancelled() || self.parent.is_cancelled()
    }
}

/// A point in time after which a wait must give up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget_ms: u64,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self { at: Instant::now() + budget, budget_ms: budget.as_millis() as u64 }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The earlier of `self` and a fresh deadline `budget` from now.
    pub fn min_with(&self, budget: Duration) -> Deadline {
        let other = Deadline::after(budget);
        if other.at < self.at { other } else { *self }
    }

    pub fn budget_ms(&self) -> u64 {
        self.budget_ms
    }

    /// Fails with `Cancelled` or `Timeout` when the wait must stop.
    pub fn check(&self, cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.expired() {
            return Err(Error::Timeout(self.budget_ms));
        }
        Ok(())
    }
}

/// Sleep for `duration`, waking early with an error on cancellation or when
/// the deadline passes first.
pub fn sleep_cancellable(duration: Duration, deadline: &Deadline, cancel: &CancelToken) -> Result<()> {
    let until = Instant::now() + duration;
    loop {
        deadline.check(cancel)?;
        let now = Instant::now();
        if now >= until {
            return Ok(());
        }
        let slice = (until - now).min(POLL_SLICE).min(deadline.remaining());
        std::thread::sleep(slice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn linked_token_follows_parent_but_not_the_reverse() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn sleep_stops_at_deadline() {
        let deadline = Deadline::after(Duration::from_millis(30));
        let started = Instant::now();
        let res = sleep_cancellable(Duration::from_secs(5), &deadline, &CancelToken::new());
        assert!(matches!(res, Err(Error::Timeout(30))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_observes_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let deadline = Deadline::after(Duration::from_secs(5));
        let res = sleep_cancellable(Duration::from_secs(5), &deadline, &cancel);
        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[test]
    fn short_sleep_completes() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert!(sleep_cancellable(Duration::from_millis(10), &deadline, &CancelToken::new()).is_ok());
    }
}
