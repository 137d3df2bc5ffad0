//! Commit scheduling as plain state.
//!
//! [`CommitScheduler`] decides *when* a commit should happen. It never
//! touches the network or a clock of its own: callers feed it the current
//! [`Instant`] on every mutation, timer tick and commit outcome. That keeps
//! debounce, fast path and backoff testable with paused time.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::PersistenceConfig;

/// Timing knobs for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    /// Quiet period after the last mutation before committing.
    pub debounce: Duration,
    /// Delay for the first commit of an aggregate that has never been stored.
    pub fast_path: Duration,
    /// Consecutive failures that open the backoff window.
    pub failure_threshold: u32,
    pub backoff: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self::from(&PersistenceConfig::default())
    }
}

impl From<&PersistenceConfig> for CommitPolicy {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            fast_path: Duration::from_millis(config.fast_path_ms),
            failure_threshold: config.failure_threshold.max(1),
            backoff: Duration::from_secs(config.backoff_secs),
        }
    }
}

/// What to do when the armed timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Commit the aggregate as it is now. Carries the revision being covered.
    Commit { revision: u64 },
    /// Backoff is active; the timer is dropped without a network call.
    Suppressed { until: Instant },
    /// Nothing due (deadline moved, or nothing changed since the last commit).
    Idle,
}

#[derive(Debug, Clone)]
pub struct CommitScheduler {
    policy: CommitPolicy,
    deadline: Option<Instant>,
    fast_path_armed: bool,
    /// Bumped on every mutation.
    revision: u64,
    /// Highest revision known to be stored remotely.
    committed_revision: u64,
    consecutive_failures: u32,
    backoff_until: Option<Instant>,
}

impl CommitScheduler {
    pub fn new(policy: CommitPolicy) -> Self {
        Self {
            policy,
            deadline: None,
            fast_path_armed: false,
            revision: 0,
            committed_revision: 0,
            consecutive_failures: 0,
            backoff_until: None,
        }
    }

    pub fn policy(&self) -> &CommitPolicy {
        &self.policy
    }

    /// Forget everything: pending timer, failure count, backoff.
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }

    /// Record a mutation. `has_pointer` is whether the aggregate has ever
    /// been committed; if not, the fast path applies.
    pub fn on_mutation(&mut self, now: Instant, has_pointer: bool) {
        self.revision += 1;

        if !has_pointer {
            // An armed fast-path timer is not pushed back by later mutations.
            if !(self.fast_path_armed && self.deadline.is_some()) {
                self.deadline = Some(now + self.policy.fast_path);
                self.fast_path_armed = true;
            }
            return;
        }

        self.fast_path_armed = false;
        self.deadline = Some(now + self.policy.debounce);
    }

    /// Called when the worker wakes at or after [`Self::deadline`].
    pub fn on_timer(&mut self, now: Instant) -> TimerOutcome {
        match self.deadline {
            Some(at) if at <= now => {}
            _ => return TimerOutcome::Idle,
        }
        self.deadline = None;
        self.fast_path_armed = false;

        if let Some(until) = self.backoff_until.filter(|until| *until > now) {
            return TimerOutcome::Suppressed { until };
        }
        if !self.has_pending_changes() {
            return TimerOutcome::Idle;
        }
        TimerOutcome::Commit {
            revision: self.revision,
        }
    }

    /// A commit covering `revision` succeeded.
    pub fn record_success(&mut self, revision: u64) {
        self.consecutive_failures = 0;
        self.backoff_until = None;
        self.committed_revision = self.committed_revision.max(revision);
    }

    /// A commit failed. Returns `true` when this failure opened (or
    /// re-opened) the backoff window.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.policy.failure_threshold {
            self.backoff_until = Some(now + self.policy.backoff);
            return true;
        }
        false
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn has_pending_changes(&self) -> bool {
        self.revision > self.committed_revision
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn backoff_active(&self, now: Instant) -> bool {
        self.backoff_until.is_some_and(|until| until > now)
    }

    pub fn backoff_until(&self) -> Option<Instant> {
        self.backoff_until
    }
}
