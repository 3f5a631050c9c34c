//! C3: prekey dispenser. `get_prekey_bundle` is the hot path spec §4.3 describes;
//! everything here reads through [`crate::directory::Directory`] and
//! [`crate::persistence::SqliteStore`], and never touches a connection directly.

use crate::directory::Directory;
use crate::error::{DirectoryError, Result};
use crate::model::*;
use tracing::warn;

pub struct Dispenser {
    otk_low_threshold: u64,
}

impl Dispenser {
    pub fn new(otk_low_threshold: u32) -> Self {
        Self { otk_low_threshold: otk_low_threshold as u64 }
    }

    /// `GetPreKeyBundle(target, requester)` (spec §4.3). Never fails because the OTK
    /// pool is empty — that degrades to `one_time_prekey: None`, per spec §8's boundary
    /// behavior ("Claiming when OTK pool is empty -> bundle with one_time_prekey = None,
    /// not an error").
    pub async fn get_prekey_bundle(&self, directory: &Directory, target: UserId, requester: UserId) -> Result<PreKeyBundle> {
        let identity_key = directory
            .get_identity_key(target)
            .await?
            .ok_or(DirectoryError::NoIdentityKey { user: target.to_string() })?;

        let signed_prekey = directory
            .get_signed_prekey(target)
            .await?
            .ok_or(DirectoryError::NoSignedPreKey { user: target.to_string() })?;

        let one_time_prekey = directory.store().claim_one_time_prekey(target, requester).await?;

        if one_time_prekey.is_some() {
            let remaining = directory.available_otk_count(target).await?;
            if remaining < self.otk_low_threshold {
                warn!(%target, remaining, "OTK pool low"); // SPEC_FULL §SUPPLEMENTED FEATURES
            }
        }

        let bundle_version = if signed_prekey.hybrid_version == 2 { 2 } else { 1 };
        directory.store().set_cached_bundle_version(target, bundle_version).await?;

        Ok(PreKeyBundle { user_id: target, identity_key, signed_prekey, one_time_prekey, bundle_version })
    }

    /// `GetPreKeyBundleWithSealed` (spec §6). Materializes the delivery verifier on
    /// first request, per spec §4.3 step 5.
    pub async fn get_prekey_bundle_with_sealed(&self, directory: &Directory, target: UserId, requester: UserId) -> Result<SealedSenderBundle> {
        let bundle = self.get_prekey_bundle(directory, target, requester).await?;
        let sealed_sender_key = directory
            .get_sealed_sender_key(target)
            .await?
            .ok_or(DirectoryError::NoIdentityKey { user: target.to_string() })?;
        let fresh = Directory::fresh_delivery_verifier();
        let delivery_verifier = directory.store().get_or_create_delivery_verifier(target, fresh).await?;
        Ok(SealedSenderBundle { bundle, sealed_sender_key, delivery_verifier })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteStore;
    use std::sync::Arc;
    use std::time::Duration;
    use testkit::TestUser;

    async fn setup() -> (Directory, Dispenser) {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        (
            Directory::new(store, Duration::from_secs(7 * 86400), Duration::from_secs(30 * 86400), Duration::from_secs(30 * 86400)),
            Dispenser::new(25),
        )
    }

    async fn register(directory: &Directory, user: &TestUser, user_id: UserId) {
        directory.store_identity_key(user_id, user.identity.public_key.clone()).await.unwrap();
        directory
            .store_signed_prekey(
                user_id,
                1,
                user.signed_prekey.pq_public_key.clone(),
                Some(user.signed_prekey.ec_public_key.clone()),
                user.signed_prekey.signature.clone(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_identity_key_fails_with_no_identity_key() {
        let (directory, dispenser) = setup().await;
        let err = dispenser
            .get_prekey_bundle(&directory, UserId::new_v4(), UserId::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NoIdentityKey { .. }));
    }

    #[tokio::test]
    async fn bundle_without_otk_is_not_an_error() {
        let (directory, dispenser) = setup().await;
        let user = TestUser::generate(0).unwrap();
        let user_id = UserId::new_v4();
        register(&directory, &user, user_id).await;

        let bundle = dispenser.get_prekey_bundle(&directory, user_id, UserId::new_v4()).await.unwrap();
        assert!(bundle.one_time_prekey.is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_receive_distinct_otks_oldest_first() {
        let (directory, dispenser) = setup().await;
        let user = TestUser::generate(2).unwrap();
        let user_id = UserId::new_v4();
        register(&directory, &user, user_id).await;

        let bundle = user.registration_bundle();
        let entries: Vec<(i64, Vec<u8>, Option<Vec<u8>>)> = bundle
            .one_time_prekeys
            .iter()
            .enumerate()
            .map(|(i, otk)| (i as i64 + 1, otk.pq_public_key.clone(), None))
            .collect();
        directory.store_one_time_prekeys(user_id, entries).await.unwrap();

        let r1 = UserId::new_v4();
        let r2 = UserId::new_v4();
        let first = dispenser.get_prekey_bundle(&directory, user_id, r1).await.unwrap();
        let second = dispenser.get_prekey_bundle(&directory, user_id, r2).await.unwrap();

        let first_id = first.one_time_prekey.unwrap().key_id;
        let second_id = second.one_time_prekey.unwrap().key_id;
        assert_ne!(first_id, second_id);
    }
}
