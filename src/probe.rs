// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Post-handshake readiness probing.
//!
//! A freshly handshaked server is not always able to answer catalog
//! queries immediately. Each probe attempt issues two independent calls
//! concurrently (list-tools and fetch-capabilities) and accepts the server
//! once **either** settles successfully; some servers omit one of the two
//! responses without being broken.
//!
//! The probe never raises. Exhausting attempts degrades to optimistic
//! continuation: the caller proceeds anyway with a warning, because some
//! servers become usable slightly after their first advertised readiness
//! signal.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backoff::RetryContext;
use crate::config::Settings;
use crate::rpc::RpcClient;

/// Base delay between probe attempts. Kept small so several attempts fit
/// inside the overall timeout window.
const PROBE_BASE_DELAY: Duration = Duration::from_millis(200);

/// Ceiling for the inter-attempt delay.
const PROBE_MAX_DELAY: Duration = Duration::from_secs(2);

/// Hard (non-startup-noise) failures tolerated before giving up early.
const MAX_HARD_FAILURES: u32 = 3;

/// Readiness probe configuration.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    timeout: Duration,
    max_attempts: u32,
    jitter_fraction: f64,
}

impl ReadinessProbe {
    /// Build a probe from the runtime settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.readiness_timeout,
            max_attempts: settings.readiness_attempts.max(1),
            jitter_fraction: settings.jitter_fraction,
        }
    }

    /// Probe until the server answers, attempts run out, or the overall
    /// timeout elapses. Returns whether the server proved ready.
    ///
    /// Each attempt is capped at the remaining budget, so a hung call
    /// cannot carry the probe past its overall timeout.
    pub async fn await_ready(&self, client: &dyn RpcClient, name: &str) -> bool {
        let deadline = Instant::now() + self.timeout;
        let mut retry = RetryContext::new(PROBE_BASE_DELAY, PROBE_MAX_DELAY, self.jitter_fraction);
        let mut hard_failures = 0u32;

        for attempt in 1..=self.max_attempts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let attempt_result = tokio::time::timeout(remaining, async {
                tokio::join!(client.list_tools(), client.capabilities())
            })
            .await;
            let Ok((tools, capabilities)) = attempt_result else {
                debug!(server = name, attempt, "readiness budget exhausted mid-attempt");
                break;
            };

            match (&tools, &capabilities) {
                (Ok(_), _) | (_, Ok(_)) => {
                    debug!(server = name, attempt, "server ready");
                    return true;
                }
                (Err(tools_err), Err(caps_err)) => {
                    let noise =
                        tools_err.is_startup_noise() && caps_err.is_startup_noise();
                    if noise {
                        debug!(server = name, attempt, error = %tools_err, "start-up noise");
                    } else {
                        hard_failures += 1;
                        debug!(
                            server = name,
                            attempt,
                            hard_failures,
                            error = %tools_err,
                            "readiness attempt failed"
                        );
                        if hard_failures >= MAX_HARD_FAILURES {
                            break;
                        }
                    }
                }
            }

            if attempt == self.max_attempts {
                break;
            }
            let pause = retry.next_delay();
            if Instant::now() + pause >= deadline {
                break;
            }
            tokio::time::sleep(pause).await;
        }

        warn!(
            server = name,
            "readiness not confirmed, proceeding optimistically"
        );
        false
    }
}
