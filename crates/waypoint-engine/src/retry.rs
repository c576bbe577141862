//! Retry and catch policy.
//!
//! Retry rules are consulted in declaration order and the first rule whose
//! matchers cover a failure owns it. Each rule keeps its own attempt counter
//! for the lifetime of one step. A rule with `max_attempts = n` allows `n`
//! invocations in total; the wait before invocation `k` (k >= 2) is
//! `initial_delay * multiplier^(k-2)`, capped by `max_delay` when set.

use std::time::Duration;

use crate::error::{ErrorCategory, Failure};
use crate::path::Path;

/// Catch-all category accepted only by catch rules.
pub const MATCH_ALL: &str = "all";

/// A category matcher in a retry or catch rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorMatcher {
    All,
    Category(ErrorCategory),
}

impl ErrorMatcher {
    pub fn parse(name: &str) -> Self {
        if name == MATCH_ALL {
            Self::All
        } else {
            Self::Category(ErrorCategory::from(name))
        }
    }

    pub fn matches(&self, category: &ErrorCategory) -> bool {
        match self {
            Self::All => true,
            Self::Category(expected) => expected == category,
        }
    }
}

fn any_matches(matchers: &[ErrorMatcher], category: &ErrorCategory) -> bool {
    matchers.iter().any(|m| m.matches(category))
}

/// A validated retry rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryRule {
    pub errors: Vec<ErrorCategory>,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    pub max_delay: Option<Duration>,
}

impl RetryRule {
    pub fn matches(&self, category: &ErrorCategory) -> bool {
        self.errors.contains(category)
    }

    /// Wait before the given 1-based invocation attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// The full schedule of waits, one per allowed attempt.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).map(|a| self.delay_before(a)).collect()
    }
}

/// A validated catch rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchRule {
    pub errors: Vec<ErrorMatcher>,
    /// Never the root; catches preserve the document.
    pub result_path: Path,
    pub next: String,
}

impl CatchRule {
    pub fn matches(&self, category: &ErrorCategory) -> bool {
        any_matches(&self.errors, category)
    }
}

/// First catch rule covering `failure`, in declaration order.
pub fn find_catch<'a>(rules: &'a [CatchRule], failure: &Failure) -> Option<&'a CatchRule> {
    rules.iter().find(|rule| rule.matches(&failure.category))
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then invoke again as attempt `attempt`.
    Retry { attempt: u32, delay: Duration },
    /// No rule matched, or the owning rule ran out of attempts.
    GiveUp,
}

/// Per-step attempt bookkeeping, one counter per retry rule.
#[derive(Debug)]
pub struct RetryTracker<'a> {
    rules: &'a [RetryRule],
    counters: Vec<u32>,
    attempts: u32,
    total_backoff: Duration,
}

impl<'a> RetryTracker<'a> {
    pub fn new(rules: &'a [RetryRule]) -> Self {
        Self {
            rules,
            counters: vec![0; rules.len()],
            attempts: 1,
            total_backoff: Duration::ZERO,
        }
    }

    /// Invocations made so far, including the current one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn total_backoff(&self) -> Duration {
        self.total_backoff
    }

    /// Record a failure of the current attempt and decide whether to retry.
    pub fn on_failure(&mut self, failure: &Failure) -> RetryDecision {
        let Some(index) = self
            .rules
            .iter()
            .position(|rule| rule.matches(&failure.category))
        else {
            return RetryDecision::GiveUp;
        };
        let rule = &self.rules[index];

        // Counter of invocations this rule has seen fail, the first included.
        self.counters[index] += 1;
        let rule_attempt = self.counters[index] + 1;
        if rule_attempt > rule.max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = rule.delay_before(rule_attempt);
        self.attempts += 1;
        self.total_backoff += delay;
        RetryDecision::Retry {
            attempt: self.attempts,
            delay,
        }
    }
}
