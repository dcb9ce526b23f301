// src/refresh.rs
//! Periodic transfer accounting over the server registry.
//!
//! Each pass scans the registry under its read lock, turns the cumulative
//! counters into per-hour deltas and hands the batch to a [`TransferSink`]
//! once the lock is released. Baselines live in the recorder; published
//! `Server` values are never written to.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::model::ServerRegistry;
use crate::store::{TransferRecord, TransferSink};

const HOUR_SECS: u64 = 3600;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Baseline {
    inbound: u64,
    outbound: u64,
}

/// Counter delta, treating a drop below the baseline as a counter reset.
fn delta(current: u64, baseline: u64) -> u64 {
    if current >= baseline {
        current - baseline
    } else {
        current
    }
}

/// Turns cumulative server counters into per-pass usage records.
#[derive(Default)]
pub struct TransferRecorder {
    baselines: DashMap<u64, Baseline>,
}

impl TransferRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one accounting pass stamped with `now` (unix seconds). Returns how
    /// many records were written. Baselines only advance once the sink has
    /// accepted the batch, so a failed write is retried on the next pass.
    pub fn record(&self, servers: &ServerRegistry, sink: &dyn TransferSink, now: u64) -> Result<usize> {
        let created_at = now - now % HOUR_SECS;
        let mut batch = Vec::new();
        let mut pending = Vec::new();
        let mut live = HashSet::new();

        servers.range(|id, server| {
            live.insert(id);
            let current = Baseline {
                inbound: server.state.net_in_transfer,
                outbound: server.state.net_out_transfer,
            };
            // First sighting only establishes the baseline.
            let Some(prev) = self.baselines.get(&id).map(|b| *b) else {
                pending.push((id, current));
                return ControlFlow::Continue(());
            };
            let inbound = delta(current.inbound, prev.inbound);
            let outbound = delta(current.outbound, prev.outbound);
            if inbound == 0 && outbound == 0 {
                // A counter that reset to zero still needs its baseline moved.
                if current.inbound < prev.inbound || current.outbound < prev.outbound {
                    pending.push((id, current));
                }
                return ControlFlow::Continue(());
            }
            pending.push((id, current));
            batch.push(TransferRecord { server_id: id, inbound, outbound, created_at });
            ControlFlow::Continue(())
        });

        self.baselines.retain(|id, _| live.contains(id));

        if !batch.is_empty() {
            sink.record_transfers(&batch)?;
            info!(rows = batch.len(), "saved transfer usage");
        }
        for (id, baseline) in pending {
            self.baselines.insert(id, baseline);
        }
        Ok(batch.len())
    }

    /// Number of servers with an established baseline.
    pub fn tracked(&self) -> usize {
        self.baselines.len()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Handle to a running refresher task.
pub struct RefresherHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    /// Stop the loop and wait for it, including the final pass when
    /// `record_on_shutdown` is set.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("refresher task failed: {e}");
        }
    }
}

/// Interval the refresher ticks on. A zero interval falls back to the
/// default rather than stalling the task.
fn refresh_period(config: &Config) -> Duration {
    if config.refresh_interval_secs == 0 {
        let fallback = Config::default().refresh_interval();
        warn!(?fallback, "refresh interval is zero, using default");
        return fallback;
    }
    config.refresh_interval()
}

/// Spawn the periodic recorder on the current tokio runtime. The first tick
/// fires immediately and establishes baselines.
pub fn spawn_refresher(
    servers: Arc<ServerRegistry>,
    sink: Arc<dyn TransferSink>,
    config: &Config,
) -> RefresherHandle {
    let (shutdown, mut stop) = oneshot::channel();
    let period = refresh_period(config);
    let record_on_shutdown = config.record_on_shutdown;
    let recorder = Arc::new(TransferRecorder::new());

    let task = tokio::spawn(async move {
        info!(?period, "transfer refresher started");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    run_pass(&recorder, &servers, &sink).await;
                }
                _ = &mut stop => {
                    if record_on_shutdown {
                        run_pass(&recorder, &servers, &sink).await;
                    }
                    break;
                }
            }
        }
        info!("transfer refresher stopped");
    });

    RefresherHandle { shutdown, task }
}

async fn run_pass(
    recorder: &Arc<TransferRecorder>,
    servers: &Arc<ServerRegistry>,
    sink: &Arc<dyn TransferSink>,
) {
    let (recorder, servers, sink) = (recorder.clone(), servers.clone(), sink.clone());
    let outcome = tokio::task::spawn_blocking(move || {
        recorder.record(&servers, sink.as_ref(), unix_now())
    })
    .await;
    match outcome {
        Ok(Ok(rows)) => debug!(rows, "transfer pass finished"),
        Ok(Err(e)) => error!("transfer pass failed: {e}"),
        Err(e) => error!("transfer pass panicked: {e}"),
    }
}
