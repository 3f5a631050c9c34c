//! C4's server-side half: the pieces that don't require holding a private key.
//! `seal`/`open`/`delivery_token` live in [`protocol::sealed`]; this module is the
//! storage-backed service around them — recording envelopes, tracking invalid-attempt
//! rate limiting, and group-fanout sealed content key bookkeeping (spec §4.4).

use crate::error::{DirectoryError, Result};
use crate::model::*;
use crate::persistence::SqliteStore;
use protocol::sealed::{hash_token, timestamp_bucket};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

pub struct SealedSenderService {
    store: Arc<SqliteStore>,
    max_invalid_per_hour: u64,
}

impl SealedSenderService {
    pub fn new(store: Arc<SqliteStore>, max_invalid_per_hour: u32) -> Self {
        Self { store, max_invalid_per_hour: max_invalid_per_hour as u64 }
    }

    /// `PostSealedEnvelope(recipient, envelope, delivery_token)` (spec §6). Stores the
    /// envelope verbatim, hashes the token, checks the invalid-attempt rate limit, and
    /// records this attempt (with `valid = None`, pending out-of-band confirmation).
    pub async fn post_sealed_envelope(
        &self,
        recipient: UserId,
        kem_ciphertext: Vec<u8>,
        nonce: [u8; 12],
        encrypted_content: Vec<u8>,
        delivery_token: [u8; 32],
    ) -> Result<()> {
        if !self.check_rate_limit(recipient).await? {
            return Err(DirectoryError::RateLimited);
        }

        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
        self.store
            .store_sealed_envelope(StoredSealedEnvelope {
                recipient_id: recipient,
                kem_ciphertext,
                nonce,
                encrypted_content,
                timestamp_bucket: timestamp_bucket(now_ms),
            })
            .await?;

        let token_hash = hash_token(&delivery_token);
        self.store
            .record_delivery_attempt(DeliveryAttempt { recipient_id: recipient, token_hash, valid: None })
            .await?;
        Ok(())
    }

    /// Records an out-of-band validity report from the recipient for a previously
    /// delivered token (spec §6: "valid is set asynchronously").
    pub async fn record_attempt(&self, recipient: UserId, token_hash: [u8; 32], valid: Option<bool>) -> Result<()> {
        self.store.record_delivery_attempt(DeliveryAttempt { recipient_id: recipient, token_hash, valid }).await
    }

    /// `check_rate_limit(recipient, max_invalid_per_hour = 10)` (spec §4.4). A
    /// `valid = None` (pending) row never counts as invalid.
    pub async fn check_rate_limit(&self, recipient: UserId) -> Result<bool> {
        let invalid = self.store.count_invalid_attempts_last_hour(recipient).await?;
        Ok(invalid < self.max_invalid_per_hour)
    }

    /// Group fanout (spec §4.4, optional): store the per-recipient KEM-sealed content
    /// key under a shared `message_id` without ever linking it to a sender.
    pub async fn store_group_content_key(&self, message_id: String, recipient: UserId, sealed_content_key: Vec<u8>) -> Result<()> {
        self.store.store_sealed_message_key(message_id, recipient, sealed_content_key).await
    }

    pub async fn get_group_content_key(&self, message_id: String, recipient: UserId) -> Result<Option<Vec<u8>>> {
        self.store.get_sealed_message_key(message_id, recipient).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn service() -> SealedSenderService {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        SealedSenderService::new(store, 10)
    }

    #[tokio::test]
    async fn envelope_post_never_records_a_sender_column() {
        let svc = service().await;
        let recipient = Uuid::new_v4();
        svc.post_sealed_envelope(recipient, vec![0u8; 1568], [1u8; 12], vec![1, 2, 3], [7u8; 32])
            .await
            .unwrap();
        // There is no field to assert against: StoredSealedEnvelope has no sender_id,
        // which is the structural guarantee spec §8 ("no column reveals sender_id").
    }

    #[tokio::test]
    async fn rate_limit_denies_at_the_eleventh_invalid_attempt_within_the_hour() {
        let svc = service().await;
        let recipient = Uuid::new_v4();
        for _ in 0..10 {
            svc.record_attempt(recipient, [0u8; 32], Some(false)).await.unwrap();
        }
        assert!(!svc.check_rate_limit(recipient).await.unwrap());
    }

    #[tokio::test]
    async fn pending_attempts_never_count_toward_the_limit() {
        let svc = service().await;
        let recipient = Uuid::new_v4();
        for _ in 0..50 {
            svc.record_attempt(recipient, [0u8; 32], None).await.unwrap();
        }
        assert!(svc.check_rate_limit(recipient).await.unwrap());
    }
}
