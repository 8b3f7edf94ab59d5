// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Exponential backoff with jitter.
//!
//! One pure delay function shared by readiness probing and tool-execution
//! retries; the two call sites parameterize it differently (the probe uses
//! a small base/max so several attempts fit inside its timeout window).

use std::time::Duration;

use rand::Rng;

/// Compute the delay before retry attempt `attempt` (1-based).
///
/// `delay = min(base * 2^(attempt-1) + random(0, base * 2^(attempt-1) * jitter), max)`
///
/// Monotonically non-decreasing in expectation as `attempt` grows, and
/// never exceeds `max`.
pub fn delay(attempt: u32, base: Duration, max: Duration, jitter_fraction: f64) -> Duration {
    let attempt = attempt.max(1);
    let exponent = (attempt - 1).min(31);
    let scaled = base
        .as_millis()
        .saturating_mul(1u128 << exponent)
        .min(u64::MAX as u128) as u64;

    let jitter_fraction = jitter_fraction.clamp(0.0, 1.0);
    let jitter_ceiling = (scaled as f64 * jitter_fraction) as u64;
    let jitter = if jitter_ceiling == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ceiling)
    };

    Duration::from_millis(scaled.saturating_add(jitter)).min(max)
}

/// Ephemeral per-call retry state. Never persisted; dropped when the call
/// resolves or exhausts its attempts.
#[derive(Debug)]
pub struct RetryContext {
    attempt: u32,
    base: Duration,
    max: Duration,
    jitter_fraction: f64,
}

impl RetryContext {
    /// Create a fresh context with no attempts recorded.
    pub fn new(base: Duration, max: Duration, jitter_fraction: f64) -> Self {
        Self {
            attempt: 0,
            base,
            max,
            jitter_fraction,
        }
    }

    /// Number of attempts recorded so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record one failed attempt and return the delay to wait before the
    /// next one.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        delay(self.attempt, self.base, self.max, self.jitter_fraction)
    }
}
