//! Per-user background scheduling loops.
//!
//! One loop per user: sync pass, reminder pass, then a cancellable sleep
//! until the next reminder instant (capped at the poll ceiling, floored at
//! one second). [`WorkerRegistry`] keys the loops by user id; `start` is
//! idempotent and `stop` cancels cooperatively and waits for the loop to
//! wind down. Cancellation never interrupts a pass mid-flight.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use calsync_core::config::{POLL_CEILING_SECONDS, POLL_FLOOR_SECONDS};

use crate::reminders::ReminderEngine;
use crate::sync::SyncEngine;

/// How long the loop sleeps given the time until the next reminder.
pub fn sleep_duration(next_reminder: Option<chrono::Duration>) -> std::time::Duration {
    let ceiling = POLL_CEILING_SECONDS as i64;
    let seconds = match next_reminder {
        Some(delta) => delta.num_seconds().min(ceiling),
        None => ceiling,
    };
    std::time::Duration::from_secs(seconds.max(POLL_FLOOR_SECONDS as i64) as u64)
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct WorkerRegistry {
    sync: Arc<SyncEngine>,
    reminders: Arc<ReminderEngine>,
    workers: Mutex<HashMap<String, Worker>>,
}

impl WorkerRegistry {
    pub fn new(sync: Arc<SyncEngine>, reminders: Arc<ReminderEngine>) -> Self {
        WorkerRegistry {
            sync,
            reminders,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Start the loop for a user. A second start while the loop is alive
    /// is a no-op.
    pub async fn start(&self, user_id: &str) {
        let mut workers = self.workers.lock().await;
        if let Some(worker) = workers.get(user_id) {
            if !worker.handle.is_finished() {
                tracing::debug!(user = %user_id, "scheduling loop already running");
                return;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.sync.clone(),
            self.reminders.clone(),
            user_id.to_string(),
            cancel.clone(),
        ));
        workers.insert(user_id.to_string(), Worker { cancel, handle });
        tracing::info!(user = %user_id, "started scheduling loop");
    }

    /// Cancel a user's loop and wait for it to finish.
    pub async fn stop(&self, user_id: &str) {
        let worker = self.workers.lock().await.remove(user_id);
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                tracing::warn!(user = %user_id, error = %e, "scheduling loop panicked");
            }
            tracing::info!(user = %user_id, "stopped scheduling loop");
        }
    }

    pub async fn stop_all(&self) {
        let user_ids: Vec<String> = self.workers.lock().await.keys().cloned().collect();
        for user_id in user_ids {
            self.stop(&user_id).await;
        }
    }

    pub async fn is_running(&self, user_id: &str) -> bool {
        self.workers
            .lock()
            .await
            .get(user_id)
            .is_some_and(|worker| !worker.handle.is_finished())
    }
}

async fn run_loop(
    sync: Arc<SyncEngine>,
    reminders: Arc<ReminderEngine>,
    user_id: String,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = sync.sync_all_accounts(&user_id, &cancel).await {
            tracing::warn!(user = %user_id, error = %e, "sync pass failed");
        }

        if cancel.is_cancelled() {
            break;
        }
        let next_reminder = match reminders.run_pass(&user_id, Utc::now(), &cancel).await {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "reminder pass failed");
                None
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(sleep_duration(next_reminder)) => {}
        }
    }
    tracing::debug!(user = %user_id, "scheduling loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn sleep_is_capped_at_the_poll_ceiling() {
        assert_eq!(
            sleep_duration(None),
            std::time::Duration::from_secs(POLL_CEILING_SECONDS)
        );
        assert_eq!(
            sleep_duration(Some(Duration::hours(2))),
            std::time::Duration::from_secs(POLL_CEILING_SECONDS)
        );
    }

    #[test]
    fn sleep_tracks_the_next_reminder() {
        assert_eq!(
            sleep_duration(Some(Duration::seconds(90))),
            std::time::Duration::from_secs(90)
        );
    }

    #[test]
    fn sleep_is_floored_at_one_second() {
        assert_eq!(
            sleep_duration(Some(Duration::seconds(0))),
            std::time::Duration::from_secs(POLL_FLOOR_SECONDS)
        );
        assert_eq!(
            sleep_duration(Some(Duration::seconds(-30))),
            std::time::Duration::from_secs(POLL_FLOOR_SECONDS)
        );
    }
}
