//! Mark-and-evict liveness sweeper.
//!
//! Every interval, each registered connection whose liveness flag is still
//! clear is terminated and removed; every other connection has its flag
//! cleared, so it must `ping` again before the next sweep. A ping that
//! races a sweep may or may not count for that sweep, but always counts
//! for the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::ConnectionRegistry;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections terminated in this sweep.
    pub evicted: usize,
    /// Connections that had proven liveness and were kept.
    pub retained: usize,
}

/// Periodic task evicting connections that stopped pinging.
#[derive(Debug, Clone)]
pub struct LivenessSweeper {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl LivenessSweeper {
    /// Creates a sweeper over `registry` running every `interval`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Runs one sweep over every registered connection.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for handle in self.registry.snapshot().await {
            if handle.take_alive() {
                report.retained = report.retained.saturating_add(1);
                continue;
            }
            handle.terminate();
            self.registry.remove(handle.id()).await;
            report.evicted = report.evicted.saturating_add(1);
            tracing::info!(
                connection_id = %handle.id(),
                opened_at = %handle.opened_at(),
                "terminating connection that missed heartbeat"
            );
        }
        report
    }

    /// Sweeps forever. The first sweep happens one full interval after start.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = self.sweep().await;
            if report.evicted > 0 {
                tracing::info!(
                    evicted = report.evicted,
                    retained = report.retained,
                    "liveness sweep"
                );
            } else {
                tracing::debug!(retained = report.retained, "liveness sweep");
            }
        }
    }

    /// Spawns [`Self::run`] on the current runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tracing::info!(interval_secs = self.interval.as_secs(), "starting liveness sweeper");
        tokio::spawn(self.run())
    }
}
