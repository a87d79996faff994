//! Periodic tunnel refresh, independent of request traffic.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::broadcast,
    task::{JoinHandle, JoinSet},
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::{resolver::Resolver, target::TargetStore};

/// Re-resolves the tunnel every `interval` and updates the store when the
/// address changed.
pub struct RefreshScheduler {
    resolver: Arc<Resolver>,
    store: Arc<TargetStore>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(resolver: Arc<Resolver>, store: Arc<TargetStore>, interval: Duration) -> Self {
        Self {
            resolver,
            store,
            interval,
        }
    }

    /// Spawns the background task. The first tick fires one interval from now.
    pub fn start(self) -> SchedulerHandle {
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle {
            shutdown: tx,
            task: Some(task),
        }
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval = ?self.interval, "Tunnel refresh scheduler starting");

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Ticks run as separate tasks so a hung fetch cannot hold back the next one.
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while ticks.try_join_next().is_some() {}
                    ticks.spawn(refresh(
                        Arc::clone(&self.resolver),
                        Arc::clone(&self.store),
                        self.interval,
                    ));
                }
                _ = shutdown.recv() => {
                    info!("Tunnel refresh scheduler stopping");
                    break;
                }
            }
        }
        ticks.shutdown().await;
    }
}

/// One scheduled refresh, bounded by `budget`. Returns `true` when the stored
/// target changed.
pub async fn refresh(resolver: Arc<Resolver>, store: Arc<TargetStore>, budget: Duration) -> bool {
    match time::timeout(budget, resolver.resolve()).await {
        Ok(Ok(target)) => {
            let shown = target.to_string();
            let changed = store.compare_and_swap_if_different(target);
            if changed {
                info!(tunnel = %shown, "Tunnel url updated");
            } else {
                debug!(tunnel = %shown, "Tunnel url unchanged");
            }
            changed
        }
        Ok(Err(e)) => {
            error!(error = %e, "Error during periodic tunnel url refresh");
            false
        }
        Err(_) => {
            error!(budget = ?budget, "Periodic tunnel url refresh timed out");
            false
        }
    }
}

/// Keeps the scheduler alive. Dropping it stops the scheduler as well.
pub struct SchedulerHandle {
    shutdown: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signals the scheduler and waits for it to exit, aborting in-flight ticks.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Tunnel refresh scheduler ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}
