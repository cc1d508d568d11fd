//! Background reclamation of expired usage records.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::limiter::Limiter;
use crate::error::{RatekeeperError, Result};

/// Default period between sweeps.
pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Periodically sweeps expired records out of a [`Limiter`].
///
/// Sweeping only bounds memory; admission decisions are correct without it.
pub struct Reclaimer;

impl Reclaimer {
    /// Start a sweep task on the current tokio runtime.
    ///
    /// The first sweep runs one `interval` after the call. A zero interval is
    /// rejected.
    pub fn spawn(limiter: Arc<Limiter>, interval: Duration) -> Result<ReclaimerHandle> {
        if interval.is_zero() {
            return Err(RatekeeperError::Config(
                "reclaim interval must be greater than zero".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_secs = interval.as_secs(), "Reclaimer started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.reclaim(Utc::now());
                        if removed > 0 {
                            info!(removed, remaining = limiter.len(), "Reclaimed expired rate limit records");
                        } else {
                            debug!(tracked = limiter.len(), "Reclaim sweep found nothing to remove");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            info!("Reclaimer stopped");
        });

        Ok(ReclaimerHandle {
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle owning a running sweep task.
///
/// Dropping the handle without calling [`stop`](Self::stop) also ends the
/// task, at its next scheduling point.
pub struct ReclaimerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReclaimerHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            error!(error = %e, "Reclaimer task failed");
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::Policy;
    use chrono::TimeDelta;

    fn expired_limiter(keys: usize) -> Arc<Limiter> {
        let limiter = Arc::new(Limiter::new());
        let policy = Policy::new(Duration::from_secs(1), 5).unwrap();
        let long_ago = Utc::now() - TimeDelta::hours(1);
        for i in 0..keys {
            limiter
                .check_at(&format!("stale-{}", i), &policy, long_ago)
                .unwrap();
        }
        limiter
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_after_interval() {
        let limiter = expired_limiter(3);
        let handle = Reclaimer::spawn(Arc::clone(&limiter), DEFAULT_RECLAIM_INTERVAL).unwrap();

        // Nothing happens before the first period elapses
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(limiter.len(), 3);

        tokio::time::sleep(DEFAULT_RECLAIM_INTERVAL).await;
        assert!(limiter.is_empty());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_active_records() {
        let limiter = expired_limiter(2);
        let active = Policy::new(Duration::from_secs(24 * 3600), 5).unwrap();
        limiter.check("active", &active).unwrap();

        let handle = Reclaimer::spawn(Arc::clone(&limiter), Duration::from_secs(10)).unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(limiter.len(), 1);
        assert!(limiter.record("active").is_some());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let limiter = expired_limiter(1);
        let result = Reclaimer::spawn(Arc::clone(&limiter), Duration::ZERO);

        assert!(matches!(result, Err(RatekeeperError::Config(_))));
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_task() {
        let limiter = expired_limiter(1);
        let handle = Reclaimer::spawn(Arc::clone(&limiter), Duration::from_secs(10)).unwrap();
        assert!(!handle.is_finished());

        handle.stop().await;

        // No sweep runs once stopped
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(limiter.len(), 1);
    }
}
