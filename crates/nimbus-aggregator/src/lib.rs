//! Per-user debounced aggregation of rapid message fragments.
//!
//! Users often send one thought across several quick messages. The
//! aggregator buffers fragments per user and only hands the joined batch
//! downstream after a quiet period with no new input. Each new fragment
//! cancels and reschedules the pending flush (sliding window), so a steady
//! stream of fragments defers the flush indefinitely; that is the intended
//! contract, not a defect. Pending batches are lost on process shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// Callback invoked with `(user_id, joined_text)` when a batch flushes.
pub type FlushHandler = Arc<dyn Fn(String, String) -> BoxFuture<'static, ()> + Send + Sync>;

struct PendingBatch {
    fragments: Vec<String>,
    on_flush: FlushHandler,
    timer: JoinHandle<()>,
    // Monotonic per-add stamp. A timer may only flush the batch whose
    // generation it was spawned for; abort alone cannot stop a timer that
    // has already woken, so a stale timer must see the mismatch and yield.
    generation: u64,
}

/// Coalesces rapid per-user fragments into one batch per quiet period.
#[derive(Clone)]
pub struct DebounceAggregator {
    delay: Duration,
    batches: Arc<Mutex<HashMap<String, PendingBatch>>>,
    next_generation: Arc<AtomicU64>,
}

impl DebounceAggregator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            batches: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Appends `fragment` to `user_id`'s pending batch and restarts that
    /// user's flush timer. The handler supplied with the newest fragment
    /// wins. When the timer fires, fragments are joined by newline in
    /// arrival order, the batch is cleared, and the handler runs.
    pub fn add(&self, user_id: &str, fragment: impl Into<String>, on_flush: FlushHandler) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut batches = self.lock_batches();
        let fragments = match batches.remove(user_id) {
            Some(existing) => {
                existing.timer.abort();
                let mut fragments = existing.fragments;
                fragments.push(fragment.into());
                fragments
            }
            None => vec![fragment.into()],
        };
        debug!(user_id, pending = fragments.len(), "fragment buffered");

        let timer = self.spawn_flush_timer(user_id.to_string(), generation);
        batches.insert(
            user_id.to_string(),
            PendingBatch {
                fragments,
                on_flush,
                timer,
                generation,
            },
        );
    }

    /// Fragments currently buffered for `user_id`, oldest first.
    pub fn pending_fragments(&self, user_id: &str) -> Vec<String> {
        self.lock_batches()
            .get(user_id)
            .map(|batch| batch.fragments.clone())
            .unwrap_or_default()
    }

    fn spawn_flush_timer(&self, user_id: String, generation: u64) -> JoinHandle<()> {
        let delay = self.delay;
        let batches = Arc::clone(&self.batches);
        tokio::spawn(async move {
            sleep(delay).await;
            let flushed = {
                let mut batches = batches.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                // A newer `add` may have rescheduled after this timer woke
                // but before it took the lock; that batch belongs to the
                // newer timer, so leave it in place.
                match batches.get(&user_id) {
                    Some(batch) if batch.generation == generation => batches.remove(&user_id),
                    _ => None,
                }
            };
            let Some(batch) = flushed else {
                return;
            };
            let joined = batch.fragments.join("\n");
            debug!(user_id = user_id.as_str(), "flushing batch");
            (batch.on_flush)(user_id, joined).await;
        })
    }

    fn lock_batches(&self) -> MutexGuard<'_, HashMap<String, PendingBatch>> {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
