//! Background sweep loop — the only actor that drives unattended,
//! time-based transitions.
//!
//! One tick per interval: query due drafts and due campaigns, drive each
//! through the same service methods the admin API uses. Per-entity
//! failures are logged and skipped (the row stays eligible for the next
//! tick); a failed eligibility query aborts the whole tick and the loop
//! simply tries again next interval. The sweeper never takes the process
//! down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lexfront_core::error::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::Lifecycle;

/// What one sweep tick accomplished.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub published: u32,
    pub sent: u32,
    pub failed: u32,
}

impl SweepStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The sweep loop, owned and injected rather than process-global, so tests
/// can drive ticks deterministically and deployments decide how many
/// instances run.
pub struct Sweeper {
    service: Arc<Lifecycle>,
    interval: Duration,
    in_flight: Arc<AtomicBool>,
}

/// Handle to a running sweep loop. Dropping it without `stop()` leaves the
/// task running until the runtime shuts down.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop to exit and wait for the in-progress tick, if any,
    /// to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
        tracing::info!("⏹ Sweeper stopped");
    }
}

impl Sweeper {
    pub fn new(service: Arc<Lifecycle>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run one sweep tick at `now`. Public so tests and admin tooling can
    /// trigger a deterministic sweep without a running loop.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<SweepStats> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("⏳ Sweep tick skipped — previous tick still running");
            return Ok(SweepStats::default());
        }
        let result = self.tick_inner(now).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn tick_inner(&self, now: DateTime<Utc>) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        // A store failure here aborts the tick; eligible rows are simply
        // retried next interval.
        let due_posts = self.service.db().due_posts(now)?;
        for post in due_posts {
            match self.service.publish_post_now(&post.id).await {
                Ok(p) => {
                    stats.published += 1;
                    tracing::info!("🔔 Sweep published '{}' ({})", p.title, p.id);
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!("⚠️ Sweep could not publish {}: {e}", post.id);
                }
            }
        }

        let due_campaigns = self.service.db().due_campaigns(now)?;
        for campaign in due_campaigns {
            match self.service.send_campaign_now(&campaign.id).await {
                Ok(c) => {
                    stats.sent += 1;
                    tracing::info!("🔔 Sweep sent '{}' ({})", c.subject, c.id);
                }
                Err(e) => {
                    // Also hit when a concurrent admin send won the claim —
                    // that campaign is someone else's to finish.
                    stats.failed += 1;
                    tracing::warn!("⚠️ Sweep could not send {}: {e}", campaign.id);
                }
            }
        }

        Ok(stats)
    }

    /// Spawn the recurring loop as a background tokio task.
    pub fn start(self) -> SweeperHandle {
        let (shutdown, mut rx) = watch::channel(false);
        tracing::info!(
            "⏰ Sweeper started (tick every {}s)",
            self.interval.as_secs()
        );

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick fires immediately; skip it so a
            // restart doesn't double up with the previous deployment.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.tick(Utc::now()).await {
                            Ok(stats) if !stats.is_empty() => {
                                tracing::info!(
                                    "📣 Sweep tick: {} published, {} sent, {} failed",
                                    stats.published, stats.sent, stats.failed
                                );
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!("❌ Sweep tick aborted: {e}");
                            }
                        }
                    }
                    changed = rx.changed() => {
                        // Err means the handle was dropped; treat as shutdown.
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle { shutdown, task }
    }
}
