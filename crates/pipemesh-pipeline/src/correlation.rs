//! Gateway-side table of requests awaiting their terminal envelope.
//!
//! Every entry is resolved at most once. Delivery, deadline eviction,
//! caller drop and the periodic sweep all go through [`DashMap::remove`],
//! so exactly one of them claims a given entry; the losers see `None`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};

type Outcome = PipelineResult<Value>;

struct PendingRequest {
    tx: oneshot::Sender<Outcome>,
    deadline: Instant,
}

/// Concurrent requestId → pending caller map.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    pending: Arc<DashMap<String, PendingRequest>>,
}

/// Caller side of one pending request.
///
/// Dropping it releases the table entry if nothing has claimed it yet.
pub struct PendingHandle {
    request_id: String,
    rx: oneshot::Receiver<Outcome>,
    table: CorrelationTable,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Must happen before the envelope is sent.
    pub fn register(&self, request_id: &str, deadline: Instant) -> PendingHandle {
        let (tx, rx) = oneshot::channel();
        self.pending
            .insert(request_id.to_string(), PendingRequest { tx, deadline });
        PendingHandle {
            request_id: request_id.to_string(),
            rx,
            table: self.clone(),
        }
    }

    /// Resolve the entry for `request_id`. Returns false when there is no
    /// such entry (late, duplicate or unknown delivery).
    pub fn resolve(&self, request_id: &str, outcome: Outcome) -> bool {
        match self.pending.remove(request_id) {
            Some((_, pending)) => {
                // The caller may have gone away in the meantime.
                let _ = pending.tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Claim an entry without resolving it.
    fn claim(&self, request_id: &str) -> bool {
        self.pending.remove(request_id).is_some()
    }

    /// Evict every entry whose deadline is at or before `now`.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.pending.len();
        // Dropping the sender wakes the caller with a closed channel.
        self.pending.retain(|_, p| p.deadline > now);
        before.saturating_sub(self.pending.len())
    }

    /// Sweep on every tick until `shutdown` flips.
    pub async fn run_sweeper(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep(Instant::now());
                    if evicted > 0 {
                        warn!(evicted, "evicted expired pending requests");
                    }
                }
                _ = shutdown.changed() => {
                    info!("correlation sweeper shutting down");
                    break;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }
}

impl PendingHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wait for the outcome, at most `timeout`.
    pub async fn wait(self, timeout: Duration) -> Outcome {
        self.wait_until(Instant::now() + timeout, timeout).await
    }

    /// Wait for the outcome until `deadline`; `timeout` is what a
    /// [`PipelineError::Timeout`] reports.
    ///
    /// If the deadline fires but a delivery already claimed the entry,
    /// the delivered outcome wins.
    pub async fn wait_until(mut self, deadline: Instant, timeout: Duration) -> Outcome {
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped: the sweeper evicted us.
            Ok(Err(_)) => Err(PipelineError::Timeout(timeout)),
            Err(_) => {
                if self.table.claim(&self.request_id) {
                    debug!(request_id = %self.request_id, "pending request timed out");
                    Err(PipelineError::Timeout(timeout))
                } else {
                    (&mut self.rx)
                        .await
                        .unwrap_or(Err(PipelineError::Timeout(timeout)))
                }
            }
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        self.table.claim(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolve_delivers_once() {
        let table = CorrelationTable::new();
        let handle = table.register("r1", Instant::now() + Duration::from_secs(5));

        assert!(table.resolve("r1", Ok(json!(7))));
        assert!(!table.resolve("r1", Ok(json!(8))));
        assert_eq!(handle.wait(Duration::from_secs(1)).await.unwrap(), json!(7));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn unknown_request_is_not_resolved() {
        let table = CorrelationTable::new();
        assert!(!table.resolve("ghost", Ok(json!(null))));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_evicts_and_late_delivery_is_discarded() {
        let table = CorrelationTable::new();
        let handle = table.register("r1", Instant::now() + Duration::from_secs(1));

        let err = handle.wait(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
        assert!(!table.contains("r1"));
        assert!(!table.resolve("r1", Ok(json!("late"))));
    }

    #[tokio::test]
    async fn dropping_handle_releases_entry() {
        let table = CorrelationTable::new();
        let handle = table.register("r1", Instant::now() + Duration::from_secs(5));
        assert_eq!(table.len(), 1);
        drop(handle);
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_expired() {
        let table = CorrelationTable::new();
        let now = Instant::now();
        let _old = table.register("old", now + Duration::from_millis(10));
        let _fresh = table.register("fresh", now + Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(table.sweep(Instant::now()), 1);
        assert!(table.contains("fresh"));
        assert!(!table.contains("old"));
    }

    #[tokio::test]
    async fn swept_caller_sees_timeout() {
        let table = CorrelationTable::new();
        let handle = table.register("r1", Instant::now());
        table.sweep(Instant::now() + Duration::from_millis(1));
        let err = handle.wait(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }
}
