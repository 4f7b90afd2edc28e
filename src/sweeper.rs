//! Periodic background sweeps with a cooperative shutdown hook.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Something that can drop its stale entries.
pub trait Sweep: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Remove stale entries, returning how many were dropped.
    fn sweep(&self) -> usize;
}

/// Handle to a running sweep loop.
pub struct Sweeper {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Run `target.sweep()` every `period`, starting one period from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: Sweep>(target: Arc<S>, period: Duration) -> Self {
        let name = target.name();
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let removed = target.sweep();
                        debug!(sweeper = name, removed, "Sweep finished");
                    }
                }
            }
        });

        info!(sweeper = name, period_ms = period.as_millis() as u64, "Sweeper started");
        Self {
            name,
            shutdown,
            task,
        }
    }

    /// Stop the loop after any in-flight sweep completes.
    pub async fn shutdown(self) {
        // A send error only means the loop is already gone.
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(sweeper = self.name, error = %err, "Sweeper task failed");
        }
        info!(sweeper = self.name, "Sweeper stopped");
    }
}
