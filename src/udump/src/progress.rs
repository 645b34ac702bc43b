//! Progress observation and cooperative cancellation
//!
//! A generation run is one long-lived background unit of work; the
//! initiating side observes it only through this structure. All fields are
//! atomics so a reader thread can poll while the run writes. Cancellation
//! is cooperative: the run polls the flag at outer-loop iteration
//! boundaries and unwinds, leaving fully registered entities valid and
//! discarding in-progress ones.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use thiserror::Error;

/// The run observed the cancellation flag and unwound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("generation cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Succeeded,
            3 => Self::Failed,
            _ => Self::NotStarted,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Succeeded => 2,
            Self::Failed => 3,
        }
    }
}

/// Shared progress state for one generation run
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicU64,
    total: AtomicU64,
    status: AtomicU8,
    cancel: AtomicBool,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the run as started with an initial total
    pub fn begin(&self, total: u64) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.status
            .store(RunStatus::Running.as_u8(), Ordering::Release);
    }

    /// Revise the total; the run does this once when it moves from the
    /// object-count phase to the package-count phase
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn advance(&self, n: u64) {
        self.completed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> RunStatus {
        RunStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn finish(&self, status: RunStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Poll point for outer loops
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let p = Progress::new();
        assert_eq!(p.status(), RunStatus::NotStarted);

        p.begin(10);
        assert_eq!(p.status(), RunStatus::Running);
        assert_eq!(p.total(), 10);

        p.advance(3);
        p.advance(2);
        assert_eq!(p.completed(), 5);

        p.set_total(20);
        assert_eq!(p.total(), 20);

        p.finish(RunStatus::Succeeded);
        assert_eq!(p.status(), RunStatus::Succeeded);
    }

    #[test]
    fn test_cancellation_poll() {
        let p = Progress::new();
        assert!(p.check_cancelled().is_ok());
        p.cancel();
        assert_eq!(p.check_cancelled(), Err(Cancelled));
    }
}
