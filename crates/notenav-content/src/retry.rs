//! Per-path retry bookkeeping with exponential backoff.
//!
//! The scheduler only tracks state; the processor owns the single timer
//! armed at [`RetryScheduler::next_deadline`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use notenav_core::defaults;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Failures tolerated before a path is dropped.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(defaults::RETRY_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// `min(initial * 2^(attempts - 1), max)`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let delay = self.initial_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}

/// What happened to a path after a failure was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The path will be re-queued after `delay`.
    Scheduled { attempts: u32, delay: Duration },
    /// Too many failures; the entry was removed.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone)]
struct RetryEntry {
    attempts: u32,
    /// `None` once the entry fired and the file went back to the queue.
    next_retry_at: Option<Instant>,
}

/// Failure counts and re-queue times keyed by path.
#[derive(Debug, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    entries: HashMap<String, RetryEntry>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record a failed attempt for `path`.
    pub fn register_failure(&mut self, path: &str, now: Instant) -> RetryDecision {
        let attempts = self.entries.get(path).map(|e| e.attempts).unwrap_or(0) + 1;

        if attempts > self.policy.max_attempts {
            self.entries.remove(path);
            return RetryDecision::Exhausted { attempts };
        }

        let delay = self.policy.delay_for(attempts);
        self.entries.insert(
            path.to_string(),
            RetryEntry {
                attempts,
                next_retry_at: Some(now + delay),
            },
        );
        RetryDecision::Scheduled { attempts, delay }
    }

    /// Forget `path`. Returns whether an entry existed.
    pub fn clear(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Failures recorded for `path`.
    pub fn attempts(&self, path: &str) -> Option<u32> {
        self.entries.get(path).map(|e| e.attempts)
    }

    /// When `path` is next due, if it is waiting.
    pub fn next_retry_at(&self, path: &str) -> Option<Instant> {
        self.entries.get(path).and_then(|e| e.next_retry_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest pending retry time across all entries.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().filter_map(|e| e.next_retry_at).min()
    }

    /// Collect due paths and mark them unscheduled until their next failure.
    pub fn take_due(&mut self, now: Instant) -> Vec<String> {
        let mut due: Vec<String> = self
            .entries
            .iter_mut()
            .filter(|(_, e)| e.next_retry_at.is_some_and(|at| at <= now))
            .map(|(path, e)| {
                e.next_retry_at = None;
                path.clone()
            })
            .collect();
        due.sort();
        due
    }
}
