//! C7: the key-update queue. Producers are [`crate::directory::Directory`]'s upload
//! methods, which append a [`PendingKeyUpdate`] row per change; the consumer is the
//! periodic worker here, which drains the queue into [`crate::gossamer::Gossamer`] on a
//! fixed interval (spec §4.6). Grounded in the teacher's own `tokio::spawn` background
//! task pattern in `main.rs` (the Signal-distribution polling loop) generalized from a
//! fire-and-forget loop into one with an explicit failure posture: a signing failure
//! must never drop updates, only delay them.

use crate::error::Result;
use crate::gossamer::Gossamer;
use crate::model::TransparencyEpoch;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Drains every unprocessed [`PendingKeyUpdate`] and cuts at most one epoch from them.
/// Exposed standalone (not just as part of `run_forever`) so callers — tests, or an
/// operator-triggered "cut now" admin action — can force an epoch without waiting for
/// the interval to elapse.
pub async fn drain_once(store: &crate::persistence::SqliteStore, gossamer: &Gossamer) -> Result<Option<TransparencyEpoch>> {
    let pending = store.fetch_unprocessed_pending_updates().await?;
    if pending.is_empty() {
        return Ok(None);
    }
    let count = pending.len();
    match gossamer.cut_epoch(pending).await {
        Ok(epoch) => Ok(epoch),
        Err(err) => {
            // spec §4.6: a signing failure commits nothing and leaves every update in
            // this batch `processed = 0`, so the next interval retries the same batch.
            error!(%err, batch_size = count, "epoch cut failed; updates remain pending for retry");
            Err(err)
        }
    }
}

/// Caps the extra delay a run of consecutive failures can add on top of the normal
/// tick interval, so a long outage doesn't push retries out to the point where pending
/// updates feel abandoned.
const MAX_BACKOFF_MULTIPLIER: u32 = 8;

/// Runs `drain_once` every `interval` until the process exits. Never exits on its own —
/// a single failed cut is logged and retried rather than killing the worker, since
/// stopping the worker entirely would silently stop signing new epochs (spec §4.6:
/// "the worker degrades epoch latency under backpressure, it does not drop updates").
/// Consecutive failures back off exponentially (interval doubling, capped at
/// `MAX_BACKOFF_MULTIPLIER`x) so a storage outage doesn't turn into a retry storm; a
/// single success resets the multiplier.
pub async fn run_forever(store: Arc<crate::persistence::SqliteStore>, gossamer: Arc<Gossamer>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let mut consecutive_failures: u32 = 0;
    loop {
        ticker.tick().await;
        if consecutive_failures > 0 {
            let multiplier = 1u32 << consecutive_failures.min(MAX_BACKOFF_MULTIPLIER.ilog2());
            tokio::time::sleep(interval * multiplier).await;
        }
        match drain_once(&store, &gossamer).await {
            Ok(Some(epoch)) => {
                consecutive_failures = 0;
                info!(epoch = epoch.epoch_number, tree_size = epoch.tree_size, "transparency epoch committed");
            }
            Ok(None) => consecutive_failures = 0,
            Err(err) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                warn!(%err, consecutive_failures, "epoch worker tick failed, backing off");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SigningAlgorithm;
    use crate::model::{KeyUpdateType, UserId};
    use crate::persistence::SqliteStore;

    async fn harness() -> (Arc<SqliteStore>, Gossamer) {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let gossamer = Gossamer::generate(store.clone(), SigningAlgorithm::Ed25519).await.unwrap();
        (store, gossamer)
    }

    #[tokio::test]
    async fn draining_an_empty_queue_cuts_no_epoch() {
        let (store, gossamer) = harness().await;
        assert!(drain_once(&store, &gossamer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn draining_cuts_exactly_one_epoch_for_the_whole_pending_batch() {
        let (store, gossamer) = harness().await;
        let fp = protocol::pqc::fingerprint::fingerprint(b"identity");
        for _ in 0..5 {
            store
                .append_pending_key_update(UserId::new_v4(), KeyUpdateType::Added, fp, None, 1)
                .await
                .unwrap();
        }
        let epoch = drain_once(&store, &gossamer).await.unwrap().unwrap();
        assert_eq!(epoch.tree_size, 5);

        let remaining = store.fetch_unprocessed_pending_updates().await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn a_second_drain_with_nothing_new_is_a_no_op() {
        let (store, gossamer) = harness().await;
        store
            .append_pending_key_update(UserId::new_v4(), KeyUpdateType::Added, [1u8; 32], None, 1)
            .await
            .unwrap();
        drain_once(&store, &gossamer).await.unwrap().unwrap();
        assert!(drain_once(&store, &gossamer).await.unwrap().is_none());
    }
}
