//! C2: key directory store logic. Validates sizes via [`protocol::pqc::dispatch`],
//! computes fingerprints, and drives [`crate::persistence::SqliteStore`] plus the C7
//! pending-update queue. This module has no notion of rate limiting or transparency
//! tree internals — those are [`crate::ratelimit`] and [`crate::gossamer`].

use crate::error::{DirectoryError, Result};
use crate::model::*;
use crate::persistence::SqliteStore;
use protocol::pqc::dispatch::{IdentityKeyMaterial, PreKeyMaterial, SignatureMaterial};
use protocol::pqc::fingerprint::fingerprint;
use protocol::pqc::mlkem;
use protocol::rand::generate_random;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Directory {
    store: Arc<SqliteStore>,
    signed_prekey_ttl: Duration,
    one_time_prekey_ttl: Duration,
    sealed_sender_key_ttl: Duration,
}

impl Directory {
    pub fn new(store: Arc<SqliteStore>, signed_prekey_ttl: Duration, one_time_prekey_ttl: Duration, sealed_sender_key_ttl: Duration) -> Self {
        Self { store, signed_prekey_ttl, one_time_prekey_ttl, sealed_sender_key_ttl }
    }

    /// `UploadIdentityKey` / `store_identity_key` (spec §4.2, §6).
    pub async fn store_identity_key(&self, user: UserId, public_key: Vec<u8>) -> Result<IdentityKey> {
        // Validates |pk| ∈ {65, 1952} by dispatching on size; the returned material is
        // discarded, only used to reject out-of-range lengths before we touch storage.
        let _ = IdentityKeyMaterial::decode(&public_key)?;
        let fp = fingerprint(&public_key);
        let key = self.store.store_identity_key(user, public_key, fp).await?;

        let update_type = if key.version == 1 { KeyUpdateType::Added } else { KeyUpdateType::Updated };
        self.store
            .append_pending_key_update(user, update_type, key.fingerprint, None, key.version)
            .await?;
        info!(%user, version = key.version, "identity key stored");
        Ok(key)
    }

    /// `UploadSignedPreKey` (spec §4.2 store_signed_prekey, §6). The signature is an
    /// opaque identity-to-prekey trust binding the server never verifies (spec §1
    /// Non-goals, §3 `SignedPreKey`: "The server validates length only") — it is
    /// stored verbatim once its size is plausible for one of the two algorithms.
    pub async fn store_signed_prekey(
        &self,
        user: UserId,
        key_id: i64,
        pq_public_key: Vec<u8>,
        ec_public_key: Option<Vec<u8>>,
        signature: Vec<u8>,
    ) -> Result<SignedPreKey> {
        if pq_public_key.len() != mlkem::PUBLIC_KEY_LEN {
            return Err(DirectoryError::Pqc(protocol::PqcError::InvalidKeySize {
                expected: &[mlkem::PUBLIC_KEY_LEN],
                got: pq_public_key.len(),
            }));
        }
        if let Some(ec) = &ec_public_key {
            let _ = PreKeyMaterial::decode(ec)?;
        }
        let _ = SignatureMaterial::decode(&signature)?;

        let hybrid_version: u8 = if ec_public_key.is_some() { 2 } else { 1 };
        let mut fp_input = Vec::new();
        if let Some(ec) = &ec_public_key {
            fp_input.extend_from_slice(ec);
        }
        fp_input.extend_from_slice(&pq_public_key);
        let fp = fingerprint(&fp_input);

        let spk = self
            .store
            .store_signed_prekey(
                user,
                key_id,
                pq_public_key,
                ec_public_key,
                signature,
                fp,
                hybrid_version,
                self.signed_prekey_ttl.as_secs() as i64,
            )
            .await?;

        if let Some(identity) = self.store.get_identity_key(user).await? {
            self.store
                .append_pending_key_update(user, KeyUpdateType::Updated, identity.fingerprint, Some(spk.fingerprint), identity.version)
                .await?;
        }
        info!(%user, key_id, hybrid_version, "signed prekey stored");
        Ok(spk)
    }

    /// `UploadOneTimePreKeys` (spec §4.2 store_one_time_prekeys, §6). Validates every
    /// entry before writing any — an invalid entry aborts the whole batch.
    pub async fn store_one_time_prekeys(&self, user: UserId, entries: Vec<(i64, Vec<u8>, Option<Vec<u8>>)>) -> Result<usize> {
        let mut validated = Vec::with_capacity(entries.len());
        for (key_id, pq, ec) in entries {
            if pq.len() != mlkem::PUBLIC_KEY_LEN {
                return Err(DirectoryError::Pqc(protocol::PqcError::InvalidKeySize {
                    expected: &[mlkem::PUBLIC_KEY_LEN],
                    got: pq.len(),
                }));
            }
            if let Some(ref ec) = ec {
                let _ = PreKeyMaterial::decode(ec)?;
            }
            let hybrid_version: u8 = if ec.is_some() { 2 } else { 1 };
            validated.push((key_id, pq, ec, hybrid_version));
        }
        let count = validated.len();
        let inserted = self
            .store
            .store_one_time_prekeys(user, validated, self.one_time_prekey_ttl.as_secs() as i64)
            .await?;
        info!(%user, requested = count, inserted, "one-time prekeys stored");
        Ok(inserted)
    }

    /// `UploadSealedSenderKey` (spec §6).
    pub async fn store_sealed_sender_key(&self, user: UserId, public_key: Vec<u8>) -> Result<SealedSenderKey> {
        if public_key.len() != mlkem::PUBLIC_KEY_LEN {
            return Err(DirectoryError::Pqc(protocol::PqcError::InvalidKeySize {
                expected: &[mlkem::PUBLIC_KEY_LEN],
                got: public_key.len(),
            }));
        }
        let fp = fingerprint(&public_key);
        let key = self
            .store
            .store_sealed_sender_key(user, public_key, fp, self.sealed_sender_key_ttl.as_secs() as i64)
            .await?;
        info!(%user, version = key.version, "sealed-sender key stored");
        Ok(key)
    }

    pub async fn get_identity_key(&self, user: UserId) -> Result<Option<IdentityKey>> {
        self.store.get_identity_key(user).await
    }

    pub async fn get_signed_prekey(&self, user: UserId) -> Result<Option<SignedPreKey>> {
        self.store.get_signed_prekey(user).await
    }

    pub async fn get_sealed_sender_key(&self, user: UserId) -> Result<Option<SealedSenderKey>> {
        self.store.get_sealed_sender_key(user).await
    }

    /// `HasKeys`.
    pub async fn has_keys(&self, user: UserId) -> Result<bool> {
        Ok(self.get_identity_key(user).await?.is_some() && self.get_signed_prekey(user).await?.is_some())
    }

    /// `HasHybridKeys`.
    pub async fn has_hybrid_keys(&self, user: UserId) -> Result<bool> {
        Ok(matches!(self.get_signed_prekey(user).await?, Some(spk) if spk.hybrid_version == 2))
    }

    /// `HasSealedSenderKey`.
    pub async fn has_sealed_sender_key(&self, user: UserId) -> Result<bool> {
        Ok(self.get_sealed_sender_key(user).await?.is_some())
    }

    /// `GetAvailableOTKCount`.
    pub async fn available_otk_count(&self, user: UserId) -> Result<u64> {
        self.store.count_available_one_time_prekeys(user).await
    }

    /// `RotateIdentityKey`. `reason` is accepted for the rotation log's context but the
    /// store itself treats every upload as a rotation when a prior active key exists.
    pub async fn rotate_identity_key(&self, user: UserId, new_pk: Vec<u8>, reason: &str) -> Result<IdentityKey> {
        info!(%user, reason, "rotating identity key");
        self.store_identity_key(user, new_pk).await
    }

    /// `RotateSealedSenderKey`.
    pub async fn rotate_sealed_sender_key(&self, user: UserId, new_pk: Vec<u8>, reason: &str) -> Result<SealedSenderKey> {
        info!(%user, reason, "rotating sealed-sender key");
        self.store_sealed_sender_key(user, new_pk).await
    }

    /// `GetRotationHistory` — supplemented operation (SPEC_FULL §SUPPLEMENTED FEATURES).
    pub async fn rotation_history(&self, user: UserId) -> Result<Vec<RotationLogEntry>> {
        self.store.get_rotation_history(user).await
    }

    /// Fresh 32 random bytes, handed to storage's `get_or_create_delivery_verifier` so
    /// the INSERT-if-absent decision stays in one transaction.
    pub fn fresh_delivery_verifier() -> [u8; 32] {
        let bytes = generate_random(32);
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        out
    }

    pub(crate) fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testkit::TestIdentity;

    async fn directory() -> Directory {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        Directory::new(store, Duration::from_secs(7 * 86400), Duration::from_secs(30 * 86400), Duration::from_secs(30 * 86400))
    }

    #[tokio::test]
    async fn uploading_a_64_byte_identity_key_is_rejected() {
        let dir = directory().await;
        let user = UserId::new_v4();
        let err = dir.store_identity_key(user, vec![0u8; 64]).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Pqc(protocol::PqcError::InvalidKeySize { .. })));
    }

    #[tokio::test]
    async fn rotation_preserves_single_active_identity_key() {
        let dir = directory().await;
        let identity = TestIdentity::generate();
        let user = UserId::new_v4();
        let first = dir.store_identity_key(user, identity.public_key.clone()).await.unwrap();
        assert_eq!(first.version, 1);

        let identity2 = TestIdentity::generate();
        let second = dir.rotate_identity_key(user, identity2.public_key.clone(), "user requested").await.unwrap();
        assert_eq!(second.version, 2);

        let active = dir.get_identity_key(user).await.unwrap().unwrap();
        assert_eq!(active.version, 2);
        assert_eq!(active.fingerprint, second.fingerprint);

        let history = dir.rotation_history(user).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn a_signature_made_with_the_wrong_identity_key_is_stored_as_an_opaque_blob() {
        // The server never verifies the identity->prekey binding (spec §1 Non-goals,
        // §3 SignedPreKey): a well-formed signature is accepted on size alone, even
        // when it was produced by an unrelated identity key.
        let dir = directory().await;
        let other_identity = TestIdentity::generate();
        let user = UserId::new_v4();

        let pq = mlkem::generate_kem_keypair();
        let sig = protocol::bundle::sign_prekey(&other_identity.secret_key, None, &pq.public_key).unwrap();
        let spk = dir.store_signed_prekey(user, 1, pq.public_key, None, sig).await.unwrap();
        assert_eq!(spk.key_id, 1);
    }

    #[tokio::test]
    async fn wrong_length_pq_public_key_is_invalid_key_size() {
        let dir = directory().await;
        let user = UserId::new_v4();
        let err = dir.store_signed_prekey(user, 1, vec![0u8; 100], None, vec![0u8; 3293]).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Pqc(protocol::PqcError::InvalidKeySize { .. })));
    }

    #[tokio::test]
    async fn a_50_byte_signature_is_invalid_signature_size() {
        let dir = directory().await;
        let user = UserId::new_v4();
        let pq = mlkem::generate_kem_keypair();
        let err = dir.store_signed_prekey(user, 1, pq.public_key, None, vec![0u8; 50]).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Pqc(protocol::PqcError::InvalidSignatureSize { .. })));
    }
}
