use async_trait::async_trait;
use tokio::sync::Mutex;
use tzproxy_core::model::MetricRecord;
use tzproxy_core::ports::MetricsBuffer;

/// An in-memory, size-aware accumulator of per-request metric records.
///
/// The buffer is unbounded by the spec; `overflow_cap` is this adapter's own
/// backpressure policy (see DESIGN.md) guarding against unbounded growth
/// under a sustained durable-store outage — once the buffer exceeds the cap,
/// the oldest records are dropped and a counter/warning records the loss.
pub struct InMemoryMetricsBuffer {
    records: Mutex<Vec<MetricRecord>>,
    overflow_cap: usize,
}

impl InMemoryMetricsBuffer {
    pub fn new(overflow_cap: usize) -> Self {
        Self { records: Mutex::new(Vec::new()), overflow_cap }
    }
}

#[async_trait]
impl MetricsBuffer for InMemoryMetricsBuffer {
    async fn add(&self, record: MetricRecord) {
        let mut guard = self.records.lock().await;
        guard.push(record);
        if guard.len() > self.overflow_cap {
            let overflow = guard.len() - self.overflow_cap;
            tracing::warn!(
                dropped = overflow,
                cap = self.overflow_cap,
                "metrics buffer exceeded backpressure cap, dropping oldest records"
            );
            guard.drain(0..overflow);
        }
    }

    async fn get_all(&self) -> Vec<MetricRecord> {
        self.records.lock().await.clone()
    }

    async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Remove exactly the first `count` records — the ones a prior
    /// `get_all` observed. Records appended after that snapshot are left
    /// untouched, bounding the metric-loss-on-race window to records that
    /// were never snapshotted in the first place (see tzproxy-gateway's
    /// flusher for why no two drains can race each other here).
    async fn clear(&self, count: usize) {
        let mut guard = self.records.lock().await;
        let count = count.min(guard.len());
        guard.drain(0..count);
    }
}
