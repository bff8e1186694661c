//! Background task that keeps a pool at or above its floor.
//!
//! Every cycle compares the pool's connection count with `min_size`. When it has
//! fallen below, the monitor refreshes the pool back up to `max_size`. A refill
//! that comes up short usually means the database is unreachable, so the delay
//! before the next attempt grows by a fixed step, up to a ceiling, and snaps back
//! to the base interval as soon as a refill succeeds.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorOptions;
use crate::connection::ConnectionFactory;

use super::shared::Shared;

/// Additive retry delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    step: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(opts: &MonitorOptions) -> Self {
        let base = opts.base_interval();
        Self {
            base,
            max: opts.max_interval().max(base),
            step: opts.backoff_step(),
            current: base,
        }
    }

    pub(crate) fn base(&self) -> Duration {
        self.base
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Duration {
        self.current
    }

    /// Delay to sleep after a failed refill; the next failure waits one step longer.
    pub(crate) fn on_failure(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current + self.step).min(self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// At or above the floor; nothing to do.
    Healthy,
    /// Was below the floor and is now full.
    Refilled,
    /// Refill came up short.
    Short { available: usize },
}

impl CycleOutcome {
    fn next_delay(self, backoff: &mut Backoff) -> Duration {
        match self {
            Self::Healthy => backoff.base(),
            Self::Refilled => {
                backoff.reset();
                backoff.base()
            }
            Self::Short { .. } => backoff.on_failure(),
        }
    }
}

pub(crate) async fn check_once<F: ConnectionFactory>(shared: Arc<Shared<F>>) -> CycleOutcome {
    let options = &shared.options;
    let available = shared.lock_state().available();
    if !options.is_pooled() || available >= options.min_size {
        return CycleOutcome::Healthy;
    }

    tracing::debug!(pool = %options.name, available, min_size = options.min_size, "below floor, refreshing");
    if let Err(err) = shared.refresh(false).await {
        tracing::debug!(pool = %options.name, error = %err, "monitor refresh failed");
    }

    let available = shared.lock_state().available();
    if available == options.max_size {
        CycleOutcome::Refilled
    } else {
        CycleOutcome::Short { available }
    }
}

pub(crate) async fn run<F: ConnectionFactory>(pool: Weak<Shared<F>>, shutdown: CancellationToken) {
    let Some((name, monitor)) = pool
        .upgrade()
        .map(|shared| (shared.options.name.clone(), shared.options.monitor))
    else {
        return;
    };
    let mut backoff = Backoff::new(&monitor);
    let mut last_report = Instant::now();

    tracing::debug!(pool = %name, interval = ?backoff.base(), "monitor started");
    loop {
        let Some(shared) = pool.upgrade() else {
            break;
        };

        // Run the cycle as its own task so a panic in a factory cannot take the monitor down.
        let mut cycle = tokio::spawn(check_once(shared));
        let delay = tokio::select! {
            () = shutdown.cancelled() => {
                cycle.abort();
                break;
            }
            joined = &mut cycle => match joined {
                Ok(outcome) => {
                    let delay = outcome.next_delay(&mut backoff);
                    if let CycleOutcome::Short { available } = outcome {
                        tracing::warn!(pool = %name, available, retry_in = ?delay, "pool still below target after refill");
                    }
                    delay
                }
                Err(err) => {
                    tracing::error!(pool = %name, error = %err, "monitor cycle failed");
                    backoff.on_failure()
                }
            },
        };

        if last_report.elapsed() >= monitor.status_interval() {
            if let Some(shared) = pool.upgrade() {
                tracing::info!(pool = %name, status = %shared.status().to_json(), "pool status");
            }
            last_report = Instant::now();
        }

        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!(pool = %name, "monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(base: u64, max: u64, step: u64) -> MonitorOptions {
        MonitorOptions {
            base_interval_ms: base,
            max_interval_ms: max,
            backoff_step_ms: step,
            ..MonitorOptions::default()
        }
    }

    #[test]
    fn failures_grow_additively_up_to_max() {
        let mut backoff = Backoff::new(&opts(100, 350, 100));
        let delays: Vec<u128> = (0..6).map(|_| backoff.on_failure().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 300, 350, 350, 350]);
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn one_success_resets_to_base() {
        let mut backoff = Backoff::new(&opts(50, 500, 75));
        for _ in 0..4 {
            backoff.on_failure();
        }
        assert!(backoff.current() > backoff.base());

        let delay = CycleOutcome::Refilled.next_delay(&mut backoff);
        assert_eq!(delay, Duration::from_millis(50));
        assert_eq!(backoff.current(), backoff.base());
    }

    #[test]
    fn healthy_cycles_poll_at_base_without_resetting() {
        let mut backoff = Backoff::new(&opts(10, 100, 10));
        backoff.on_failure();
        backoff.on_failure();
        assert_eq!(CycleOutcome::Healthy.next_delay(&mut backoff), Duration::from_millis(10));
        assert_eq!(backoff.current(), Duration::from_millis(30));
    }

    #[test]
    fn zero_step_keeps_interval_flat() {
        let mut backoff = Backoff::new(&opts(40, 400, 0));
        assert_eq!(backoff.on_failure(), Duration::from_millis(40));
        assert_eq!(backoff.on_failure(), Duration::from_millis(40));
    }
}
