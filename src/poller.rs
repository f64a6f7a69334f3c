//! Background Etsy poller.
//!
//! Waits `poll_minutes` (re-read from the settings table every cycle), runs a
//! sync, and repeats. [`PollerHandle::reschedule`] restarts the wait so a new
//! interval takes effect immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::invoicing::InvoiceService;

/// Handle to the running poller.
#[derive(Clone)]
pub struct PollerHandle {
    notify: Arc<Notify>,
    cancel: CancellationToken,
    runs: Arc<AtomicU64>,
}

impl PollerHandle {
    /// A handle not attached to any task (tests, one-shot commands).
    pub fn detached() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Restart the current wait with the interval now stored in settings.
    pub fn reschedule(&self) {
        self.notify.notify_one();
    }

    /// Stop the poller after the current cycle.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Scheduled syncs started so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

/// Spawn the poller task.
pub fn spawn_poller(
    service: Arc<InvoiceService>,
    cancel: CancellationToken,
) -> (PollerHandle, JoinHandle<()>) {
    let handle = PollerHandle {
        notify: Arc::new(Notify::new()),
        cancel,
        runs: Arc::new(AtomicU64::new(0)),
    };
    let task = tokio::spawn(run_poller(service, handle.clone()));
    (handle, task)
}

fn poll_interval(service: &InvoiceService) -> Duration {
    let minutes = match service.settings() {
        Ok(settings) => settings.poll_minutes,
        Err(e) => {
            tracing::warn!("Failed to read poll interval, using default: {e}");
            service.defaults().poll_minutes.max(1)
        }
    };
    Duration::from_secs(minutes * 60)
}

async fn run_poller(service: Arc<InvoiceService>, handle: PollerHandle) {
    tracing::info!("Etsy poller started");

    loop {
        let interval = poll_interval(&service);
        tracing::debug!(minutes = interval.as_secs() / 60, "Waiting for next poll");

        tokio::select! {
            _ = handle.cancel.cancelled() => break,
            _ = handle.notify.notified() => {
                tracing::info!("Poll interval rescheduled");
                continue;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let run = handle.runs.fetch_add(1, Ordering::Relaxed) + 1;
        match service.sync_orders().await {
            Ok(report) => tracing::info!(run, "{report}"),
            Err(e) => tracing::error!(run, "Scheduled sync failed: {e}"),
        }
    }

    tracing::info!("Etsy poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use earsiv_db::pool::{get_conn, init_memory_pool};
    use earsiv_db::queries::settings::set_setting;

    #[tokio::test]
    async fn stops_on_cancel() {
        let pool = init_memory_pool().unwrap();
        let service = Arc::new(InvoiceService::new(pool, &Config::default()));
        let (handle, task) = spawn_poller(service, CancellationToken::new());

        handle.reschedule();
        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("poller did not stop")
            .unwrap();
        assert!(handle.is_stopped());
    }

    // Without Etsy credentials a sync fails before any network call.
    #[tokio::test(start_paused = true)]
    async fn reschedule_applies_new_interval() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        set_setting(&conn, "poll_minutes", "30").unwrap();
        drop(conn);

        let service = Arc::new(InvoiceService::new(pool.clone(), &Config::default()));
        let (handle, task) = spawn_poller(service, CancellationToken::new());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let conn = get_conn(&pool).unwrap();
        set_setting(&conn, "poll_minutes", "1").unwrap();
        drop(conn);
        handle.reschedule();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(handle.runs(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.runs(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.runs(), 2);

        handle.stop();
        task.await.unwrap();
    }

    #[test]
    fn interval_follows_settings() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        set_setting(&conn, "poll_minutes", "7").unwrap();
        drop(conn);

        let service = InvoiceService::new(pool, &Config::default());
        assert_eq!(poll_interval(&service), Duration::from_secs(420));
    }
}
