//! Background maintenance: periodic expired-entry sweep and periodic metrics summary.
//! Each loop holds the store lock only for a single sweep.

use crate::cache::CacheStore;
use crate::telemetry::MetricsRecorder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Running daemon. Dropping the handle also stops both loops, at their next wakeup.
#[derive(Debug)]
pub struct DaemonHandle {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl DaemonHandle {
    /// Signals both loops and waits for them to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                log::warn!("cache daemon task ended abnormally: {e}");
            }
        }
        log::info!("cache daemon stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

pub(crate) fn spawn(
    store: Arc<CacheStore>,
    metrics: Arc<MetricsRecorder>,
    sweep_every: Duration,
    summary_every: Duration,
) -> DaemonHandle {
    let (stop, rx) = watch::channel(false);
    let sweep = run_every(sweep_every, rx.clone(), move || {
        let removed = store.sweep_expired(Instant::now());
        if removed > 0 {
            log::debug!("cache sweep removed {removed} entries; {} remain", store.len());
        }
    });
    let summary = run_every(summary_every, rx, move || {
        metrics.emit_summary();
    });
    log::info!("cache daemon started: sweep every {sweep_every:?}, summary every {summary_every:?}");
    DaemonHandle { stop, tasks: vec![sweep, summary] }
}

fn run_every(period: Duration, mut stop: watch::Receiver<bool>, mut tick: impl FnMut() + Send + 'static) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => tick(),
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
