use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tzproxy_core::ports::{MetricsBuffer, MetricsStore};
use tzproxy_telemetry::MetricsCollector;

/// Signals the background flusher to stop after its current sleep, used for
/// graceful shutdown's final drain.
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn wait_or_shutdown(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.notify.notified() => {}
        }
    }
}

/// Size-triggered and time-triggered drain of the metrics buffer into the
/// durable store.
///
/// Drain algorithm: snapshot `buffer.get_all()`, call `store.save_many`, and
/// on success clear only the records observed in the snapshot. On failure,
/// log and leave the buffer untouched for the next attempt. `drain_lock`
/// ensures a size-triggered drain racing a time-triggered one never issues
/// two overlapping `save_many` calls against the same snapshot.
pub struct MetricsFlusher {
    buffer: Arc<dyn MetricsBuffer>,
    store: Arc<dyn MetricsStore>,
    metrics: Arc<MetricsCollector>,
    drain_lock: Mutex<()>,
}

impl MetricsFlusher {
    pub fn new(buffer: Arc<dyn MetricsBuffer>, store: Arc<dyn MetricsStore>, metrics: Arc<MetricsCollector>) -> Self {
        Self { buffer, store, metrics, drain_lock: Mutex::new(()) }
    }

    /// Run one drain attempt. Returns the number of records handed to the
    /// store on success.
    pub async fn drain_once(&self) -> usize {
        let _guard = self.drain_lock.lock().await;

        let records = self.buffer.get_all().await;
        if records.is_empty() {
            return 0;
        }

        match self.store.save_many(&records).await {
            Ok(()) => {
                self.buffer.clear(records.len()).await;
                tracing::debug!(count = records.len(), "metrics drained");
                self.metrics.record_flush(true, records.len());
                records.len()
            }
            Err(e) => {
                tracing::error!(error = %e, count = records.len(), "metrics persist failed, buffer retained");
                self.metrics.record_flush(false, 0);
                0
            }
        }
    }

    /// Called after every `add` by the coordinator: if the buffer has
    /// crossed `threshold`, issue a drain. The reference implementation
    /// spawns the drain onto its own task so the request path is never
    /// blocked on a store round-trip, while still attempting the drain
    /// at-least-once for this crossing.
    pub fn maybe_drain_on_threshold(self: &Arc<Self>, threshold: usize) {
        let flusher = Arc::clone(self);
        tokio::spawn(async move {
            if flusher.buffer.len().await >= threshold {
                flusher.drain_once().await;
            }
        });
    }

    /// Runs the time-triggered drain loop until `shutdown` is triggered, then
    /// performs one final drain before returning.
    pub async fn run_time_triggered(self: Arc<Self>, interval: Duration, shutdown: ShutdownHandle) {
        while !shutdown.is_triggered() {
            shutdown.wait_or_shutdown(interval).await;
            if shutdown.is_triggered() {
                break;
            }
            self.drain_once().await;
        }
        tracing::info!("flusher shutting down, issuing final drain");
        self.drain_once().await;
    }
}
