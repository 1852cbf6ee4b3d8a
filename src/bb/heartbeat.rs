//! Background heartbeat ticker, grounded in `tasks.py`'s `start_heartbeat` /
//! `_hb_loop`: write the first beat immediately so the master can see the
//! task even if it dies within one interval, then keep refreshing on a
//! timer until stopped.

use super::{BulletinBoard, WorkerKind};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// Task-scoped cancellable background activity. Must be started after the
/// worker's task-id is known and stopped (via `stop`) before the caller
/// deletes the corresponding pending-assignment record, so a reaper never
/// observes a pending record without a heartbeat (spec.md §5).
pub struct HeartbeatGuard {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl HeartbeatGuard {
    /// Write the initial heartbeat and spawn the refresh ticker.
    pub async fn start(
        bb: BulletinBoard,
        kind: WorkerKind,
        worker_id: String,
        interval: Duration,
    ) -> crate::common::error::Result<Self> {
        bb.heartbeat(kind, &worker_id).await?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip the duplicate beat
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = bb.heartbeat(kind, &worker_id).await {
                            warn!("heartbeat refresh failed for {}: {}", worker_id, e);
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle,
        })
    }

    /// Signal the ticker to stop and wait for it to exit. Safe to call at
    /// most once; a second call is a no-op.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}
