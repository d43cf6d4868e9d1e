//! Background completion sweeper.
//!
//! Periodically finds users who completed every onboarding step and sends
//! them the congratulation sequence, once. The congratulated flag is only
//! written after all three messages went out, so a user whose delivery
//! failed is picked up again on the next cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::channels::OutboundChannel;
use crate::dialogue::composer;
use crate::dispatcher::Dispatcher;
use crate::profile::UserProfile;
use crate::store::ProfileStore;

/// Gaps between congratulation messages and between users.
#[derive(Debug, Clone, Copy)]
pub struct SweepPacing {
    pub after_first: Duration,
    pub after_second: Duration,
    pub between_users: Duration,
}

impl Default for SweepPacing {
    fn default() -> Self {
        Self {
            after_first: Duration::from_secs(3),
            after_second: Duration::from_secs(2),
            between_users: Duration::from_secs(2),
        }
    }
}

impl SweepPacing {
    pub fn none() -> Self {
        Self {
            after_first: Duration::ZERO,
            after_second: Duration::ZERO,
            between_users: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed { notified: usize, failed: usize },
    /// Another cycle was still running.
    Skipped,
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CompletionSweeper {
    store: Arc<dyn ProfileStore>,
    dispatcher: Arc<Dispatcher>,
    channel: Arc<dyn OutboundChannel>,
    pacing: SweepPacing,
    running: AtomicBool,
}

impl CompletionSweeper {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        dispatcher: Arc<Dispatcher>,
        channel: Arc<dyn OutboundChannel>,
        pacing: SweepPacing,
    ) -> Self {
        Self {
            store,
            dispatcher,
            channel,
            pacing,
            running: AtomicBool::new(false),
        }
    }

    /// One pass over all users awaiting congratulation.
    pub async fn run_cycle(&self) -> SweepOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already running, skipping");
            return SweepOutcome::Skipped;
        }
        let _guard = RunGuard(&self.running);

        let users: Vec<UserProfile> = match self.store.list_awaiting_congratulation().await {
            Ok(users) => users
                .into_iter()
                .filter(UserProfile::awaiting_congratulation)
                .collect(),
            Err(e) => {
                error!(error = %e, "Failed to list users awaiting congratulation");
                return SweepOutcome::Completed {
                    notified: 0,
                    failed: 0,
                };
            }
        };
        if users.is_empty() {
            debug!("No newly completed users");
            return SweepOutcome::Completed {
                notified: 0,
                failed: 0,
            };
        }

        info!(count = users.len(), "Congratulating newly completed users");
        let (mut notified, mut failed) = (0, 0);
        for (i, user) in users.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing.between_users).await;
            }
            match self.congratulate(user).await {
                Ok(true) => {
                    notified += 1;
                    info!(handle = %user.handle, "Congratulation sequence sent");
                }
                Ok(false) => debug!(handle = %user.handle, "Already congratulated"),
                Err(e) => {
                    failed += 1;
                    warn!(handle = %user.handle, error = %e, "Congratulation failed; will retry");
                }
            }
        }
        SweepOutcome::Completed { notified, failed }
    }

    async fn congratulate(&self, profile: &UserProfile) -> crate::error::Result<bool> {
        let [first, second, third] = composer::congratulation_sequence(profile);
        let handle = profile.handle.as_str();

        self.channel.send(handle, &first).await?;
        tokio::time::sleep(self.pacing.after_first).await;
        self.channel.send(handle, &second).await?;
        tokio::time::sleep(self.pacing.after_second).await;
        self.channel.send(handle, &third).await?;

        Ok(self.dispatcher.mark_congratulated(handle).await?)
    }

    /// Run a cycle every `interval` after `initial_delay`. Each tick runs as
    /// its own task; dropping the handle also stops the ticker.
    pub fn spawn(self: Arc<Self>, interval: Duration, initial_delay: Duration) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(initial_delay) => {}
                _ = stop_rx.changed() => return,
            }
            info!(interval_secs = interval.as_secs_f64(), "Completion sweeper started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweeper = Arc::clone(&self);
                        tokio::spawn(async move {
                            sweeper.run_cycle().await;
                        });
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            info!("Completion sweeper stopped");
        });

        SweeperHandle {
            stop: stop_tx,
            task,
        }
    }
}

pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop ticking and wait for the ticker to exit. A cycle already in
    /// flight finishes on its own.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sweeper task ended abnormally");
        }
    }
}
