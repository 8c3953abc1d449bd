//! Quota governor for the Gmail API
//!
//! Gmail charges "quota units" per call against a per-user budget of 15,000
//! units per minute:
//! - `messages.list`: 5 units
//! - `messages.get`: 5 units
//!
//! The governor keeps a conservative local approximation of that budget: a
//! counter of units consumed since the current window started. When a charge
//! would push the counter over the configured ceiling before the window has
//! elapsed, the caller sleeps until the window would expire (plus a safety
//! margin) and a fresh window begins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::QuotaConfig;
use crate::error::{ExportError, Result};

/// Gmail API quota costs for the calls this tool makes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCost {
    /// messages.list page
    List,
    /// messages.get with format=metadata
    Get,
}

/// Observer invoked when the governor is about to sleep
pub type WaitCallback = Arc<dyn Fn(Duration) + Send + Sync>;

/// Fixed-window quota governor
///
/// Cloning shares the underlying budget, so the search walker and the fetch
/// loop of one run draw from the same counter. Separate runs must build
/// separate governors.
#[derive(Clone)]
pub struct QuotaGovernor {
    inner: Arc<Mutex<GovernorState>>,
    on_wait: Option<WaitCallback>,
}

#[derive(Debug)]
struct GovernorState {
    /// Units charged since `window_start`
    consumed: u32,
    window_start: Instant,
    ceiling: u32,
    window: Duration,
    safety_margin: Duration,
    list_cost: u32,
    get_cost: u32,
    total_consumed: u64,
    total_calls: u64,
    waits: u64,
    total_waited: Duration,
}

impl GovernorState {
    fn reset(&mut self, now: Instant) {
        self.consumed = 0;
        self.window_start = now;
    }

    fn units(&self, cost: QuotaCost) -> u32 {
        match cost {
            QuotaCost::List => self.list_cost,
            QuotaCost::Get => self.get_cost,
        }
    }
}

impl std::fmt::Debug for QuotaGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaGovernor")
            .field("has_wait_observer", &self.on_wait.is_some())
            .finish_non_exhaustive()
    }
}

impl QuotaGovernor {
    /// Create a governor from quota configuration
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GovernorState {
                consumed: 0,
                window_start: Instant::now(),
                ceiling: config.ceiling_units,
                window: Duration::from_secs(config.window_secs),
                safety_margin: Duration::from_millis(config.safety_margin_ms),
                list_cost: config.list_cost,
                get_cost: config.get_cost,
                total_consumed: 0,
                total_calls: 0,
                waits: 0,
                total_waited: Duration::ZERO,
            })),
            on_wait: None,
        }
    }

    /// Register an observer called with the wait duration before each sleep
    pub fn with_wait_observer(mut self, on_wait: WaitCallback) -> Self {
        self.on_wait = Some(on_wait);
        self
    }

    /// Charge quota for one remote call, sleeping first if the window is spent
    ///
    /// Returns the time spent waiting (zero when the charge fit).
    pub async fn charge(&self, cost: QuotaCost) -> Duration {
        let mut waited = Duration::ZERO;

        loop {
            let wait_time = {
                let mut state = self.inner.lock().await;
                let units = state.units(cost);
                let now = Instant::now();
                let elapsed = now.duration_since(state.window_start);

                trace!(
                    "Quota state: {}/{} units used, {:.1}s into window, requesting {}",
                    state.consumed,
                    state.ceiling,
                    elapsed.as_secs_f64(),
                    units
                );

                // An empty window admits any call, even one costing more than the ceiling
                let over_ceiling =
                    state.consumed > 0 && state.consumed.saturating_add(units) > state.ceiling;

                if over_ceiling && elapsed < state.window {
                    let wait = state.window - elapsed + state.safety_margin;
                    state.waits += 1;
                    state.total_waited += wait;
                    Some(wait)
                } else {
                    if over_ceiling {
                        debug!("Quota window elapsed, resetting without waiting");
                        state.reset(now);
                    }
                    state.consumed += units;
                    state.total_consumed += units as u64;
                    state.total_calls += 1;
                    debug!("Charged {} quota units, {} used in window", units, state.consumed);
                    None
                }
            };

            match wait_time {
                None => return waited,
                Some(wait) => {
                    debug!(
                        "Quota ceiling reached, waiting {:.1}s for the window to expire",
                        wait.as_secs_f64()
                    );
                    if let Some(on_wait) = &self.on_wait {
                        on_wait(wait);
                    }
                    tokio::time::sleep(wait).await;
                    waited += wait;
                }
            }
        }
    }

    /// Back off after the service itself reported quota exhaustion
    ///
    /// Waits for the longer of the rest of the current window and the server's
    /// retry hint, plus the safety margin, then starts a new window.
    pub async fn back_off(&self, retry_after: Duration) -> Duration {
        let wait = {
            let mut state = self.inner.lock().await;
            let elapsed = Instant::now().duration_since(state.window_start);
            let remaining = state.window.saturating_sub(elapsed);
            let wait = remaining.max(retry_after) + state.safety_margin;
            state.waits += 1;
            state.total_waited += wait;
            wait
        };

        warn!(
            "Gmail reported quota exhaustion, backing off {:.1}s",
            wait.as_secs_f64()
        );
        if let Some(on_wait) = &self.on_wait {
            on_wait(wait);
        }
        tokio::time::sleep(wait).await;

        let mut state = self.inner.lock().await;
        state.reset(Instant::now());
        wait
    }

    /// Charge, run `operation`, and retry it once if the service rejects it for quota
    ///
    /// A second quota rejection is returned to the caller as-is.
    pub async fn call_with_quota_retry<T, F, Fut>(
        &self,
        cost: QuotaCost,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.charge(cost).await;
        match operation().await {
            Err(ExportError::QuotaExceeded { retry_after }) => {
                self.back_off(Duration::from_secs(retry_after)).await;
                self.charge(cost).await;
                operation().await
            }
            other => other,
        }
    }

    /// Units charged in the current window
    pub async fn consumed(&self) -> u32 {
        self.inner.lock().await.consumed
    }

    /// Get statistics about quota usage
    pub async fn stats(&self) -> QuotaStats {
        let state = self.inner.lock().await;
        QuotaStats {
            consumed_in_window: state.consumed,
            ceiling: state.ceiling,
            total_consumed: state.total_consumed,
            total_calls: state.total_calls,
            waits: state.waits,
            total_waited: state.total_waited,
        }
    }
}

impl Default for QuotaGovernor {
    fn default() -> Self {
        Self::new(&QuotaConfig::default())
    }
}

/// Statistics about quota usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaStats {
    /// Units charged in the current window
    pub consumed_in_window: u32,
    /// Configured ceiling per window
    pub ceiling: u32,
    /// Total units charged since creation
    pub total_consumed: u64,
    /// Total calls charged
    pub total_calls: u64,
    /// Number of times the governor slept
    pub waits: u64,
    /// Total time spent sleeping
    pub total_waited: Duration,
}
