//! Batching claim state store
//!
//! Requests are queued to a single flush task that owns the baseline. The
//! task takes the first waiting request, keeps collecting until the batch is
//! full or the linger window closes, applies every transform in arrival order
//! and commits the result with one conditional write. All requests of a batch
//! share its outcome: committed together, or refreshed-and-retry together. A
//! request whose transform panics fails alone and is left out of the write.

use super::{apply_transform, commit, ClaimStateStore, PoolStateTransform, StoreContext, StoreStats, StoreStatsSnapshot};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use selection_config::StoreSettings;
use selection_types::{PoolKey, PoolState, StoredPoolState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

struct PendingRequest {
    transform: PoolStateTransform,
    reply: oneshot::Sender<Result<bool, StoreError>>,
}

pub struct PerformanceClaimStateStore {
    pool_key: PoolKey,
    sender: mpsc::UnboundedSender<PendingRequest>,
    /// Baseline as of the last flush; written only by the flush task
    published: Arc<RwLock<StoredPoolState>>,
    stats: Arc<StoreStats>,
    flush_task: JoinHandle<()>,
}

impl PerformanceClaimStateStore {
    /// Spawn the flush task; must be called within a tokio runtime
    pub fn new(baseline: StoredPoolState, context: StoreContext, settings: &StoreSettings) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let published = Arc::new(RwLock::new(baseline.clone()));
        let stats = Arc::new(StoreStats::default());

        let flush_loop = FlushLoop {
            baseline,
            receiver,
            context,
            published: published.clone(),
            stats: stats.clone(),
            linger: settings.batch_linger(),
            max_batch_size: settings.max_batch_size.max(1),
        };

        Self {
            pool_key: flush_loop.baseline.pool_key.clone(),
            sender,
            published,
            stats,
            flush_task: tokio::spawn(flush_loop.run()),
        }
    }

    fn closed(&self) -> StoreError {
        StoreError::Closed {
            key: self.pool_key.state_key(),
        }
    }
}

impl Drop for PerformanceClaimStateStore {
    fn drop(&mut self) {
        self.flush_task.abort();
    }
}

#[async_trait]
impl ClaimStateStore for PerformanceClaimStateStore {
    fn pool_key(&self) -> &PoolKey {
        &self.pool_key
    }

    async fn enqueue_request(&self, transform: PoolStateTransform) -> Result<bool, StoreError> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(PendingRequest { transform, reply })
            .map_err(|_| self.closed())?;
        outcome.await.map_err(|_| self.closed())?
    }

    async fn snapshot(&self) -> StoredPoolState {
        self.published.read().clone()
    }

    fn stats(&self) -> StoreStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Single writer of a batching store's baseline
struct FlushLoop {
    baseline: StoredPoolState,
    receiver: mpsc::UnboundedReceiver<PendingRequest>,
    context: StoreContext,
    published: Arc<RwLock<StoredPoolState>>,
    stats: Arc<StoreStats>,
    linger: Duration,
    max_batch_size: usize,
}

impl FlushLoop {
    async fn run(mut self) {
        while let Some(first) = self.receiver.recv().await {
            let batch = self.collect_batch(first).await;
            self.flush(batch).await;
        }
        debug!("Flush loop for pool {} stopped", self.baseline.pool_key);
    }

    async fn collect_batch(&mut self, first: PendingRequest) -> Vec<PendingRequest> {
        let mut batch = vec![first];
        let deadline = Instant::now() + self.linger;

        while batch.len() < self.max_batch_size {
            match self.receiver.try_recv() {
                Ok(request) => {
                    batch.push(request);
                    continue;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if self.linger.is_zero() {
                break;
            }
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Ok(Some(request)) => batch.push(request),
                Ok(None) | Err(_) => break,
            }
        }
        batch
    }

    async fn flush(&mut self, batch: Vec<PendingRequest>) {
        let size = batch.len();
        self.stats.record_requests(size as u64);

        let mut next: Option<PoolState> = None;
        let mut replies = Vec::with_capacity(size);
        for request in batch {
            let current = next.as_ref().unwrap_or(&self.baseline.state);
            match apply_transform(&self.baseline.pool_key, request.transform, current) {
                Ok(produced) => {
                    next = Some(produced);
                    replies.push(request.reply);
                }
                Err(e) => {
                    let _ = request.reply.send(Err(e));
                }
            }
        }

        let Some(next) = next else {
            return;
        };

        let outcome = commit(&self.context, &mut self.baseline, next, &self.stats).await;
        *self.published.write() = self.baseline.clone();

        debug!(
            "Flushed batch of {} for pool {}: {:?}",
            size, self.baseline.pool_key, outcome
        );
        for reply in replies {
            // Requester may have gone away
            let _ = reply.send(outcome.clone());
        }
    }
}
