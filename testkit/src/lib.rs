//! Test fixtures for the key directory and sealed-sender service, mirroring the
//! teacher's `client::MemoryClient`/`X3DHClient` pattern (spec §3-4) generalized from
//! classical X3DH to hybrid PQXDH. This crate is a dev-dependency only: nothing in
//! `server`'s non-test code links against it, matching the teacher's own client/server
//! separation where `MemoryClient` never appears outside test and CLI call sites.
//!
//! Every key pair minted here is synthetic and exists only so `server` and `protocol`
//! tests can exercise the directory without standing up a real client.

use anyhow::{Context, Result};
use protocol::bundle::sign_prekey;
use protocol::pqc::{mldsa, mlkem, x25519};
use std::collections::HashMap;

/// A synthetic identity: an ML-DSA-65 keypair playing the role of a registered user's
/// long-term identity key.
pub struct TestIdentity {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

impl TestIdentity {
    pub fn generate() -> Self {
        let kp = mldsa::generate_sig_keypair();
        Self { public_key: kp.public_key, secret_key: kp.secret_key }
    }
}

/// A freshly minted hybrid (X25519 + ML-KEM-1024) signed prekey, signed by a
/// [`TestIdentity`], with both secret halves retained for tests that need to open
/// envelopes or re-derive shared secrets.
pub struct TestSignedPreKey {
    pub ec_public_key: Vec<u8>,
    pub ec_secret_key: Vec<u8>,
    pub pq_public_key: Vec<u8>,
    pub pq_secret_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl TestSignedPreKey {
    /// Mint a hybrid signed prekey under `identity`.
    pub fn generate(identity: &TestIdentity) -> Result<Self> {
        let ec = x25519::x25519_generate();
        let pq = mlkem::generate_kem_keypair();
        let signature = sign_prekey(&identity.secret_key, Some(&ec.public_key), &pq.public_key)
            .context("signing synthetic signed prekey")?;
        Ok(Self {
            ec_public_key: ec.public_key,
            ec_secret_key: ec.secret_key,
            pq_public_key: pq.public_key,
            pq_secret_key: pq.secret_key,
            signature,
        })
    }

    /// Mint a legacy (PQ-only, no EC component) signed prekey, for exercising the
    /// `hybrid_version = 1` path.
    pub fn generate_legacy(identity: &TestIdentity) -> Result<Self> {
        let pq = mlkem::generate_kem_keypair();
        let signature =
            sign_prekey(&identity.secret_key, None, &pq.public_key).context("signing legacy prekey")?;
        Ok(Self {
            ec_public_key: Vec::new(),
            ec_secret_key: Vec::new(),
            pq_public_key: pq.public_key,
            pq_secret_key: pq.secret_key,
            signature,
        })
    }
}

/// A batch of one-time prekeys, each independently signed, the way `add_one_time_keys`
/// produces a batch in the teacher's `X3DHClient`.
pub struct TestOneTimePreKeyBatch {
    pub keys: Vec<TestSignedPreKey>,
}

impl TestOneTimePreKeyBatch {
    pub fn generate(identity: &TestIdentity, count: usize) -> Result<Self> {
        let keys = (0..count)
            .map(|_| TestSignedPreKey::generate(identity))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }
}

/// A sealed-sender key pair: an ML-KEM-1024 keypair used only for envelope sealing, kept
/// distinct from signed/one-time prekeys per spec §3's `SealedSenderKey`.
pub struct TestSealedSenderKey {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

impl TestSealedSenderKey {
    pub fn generate() -> Self {
        let kp = mlkem::generate_kem_keypair();
        Self { public_key: kp.public_key, secret_key: kp.secret_key }
    }
}

/// A complete synthetic user: identity, one signed prekey, a pool of one-time prekeys,
/// and a sealed-sender key, generalizing the teacher's `MemoryClient` from classical
/// X3DH to hybrid PQXDH plus sealed sender.
pub struct TestUser {
    pub identity: TestIdentity,
    pub signed_prekey: TestSignedPreKey,
    pub sealed_sender_key: TestSealedSenderKey,
    one_time_prekeys: HashMap<Vec<u8>, TestSignedPreKey>,
}

impl TestUser {
    pub fn generate(one_time_key_count: usize) -> Result<Self> {
        let identity = TestIdentity::generate();
        let signed_prekey = TestSignedPreKey::generate(&identity)?;
        let sealed_sender_key = TestSealedSenderKey::generate();
        let mut one_time_prekeys = HashMap::new();
        for otk in TestOneTimePreKeyBatch::generate(&identity, one_time_key_count)?.keys {
            one_time_prekeys.insert(otk.pq_public_key.clone(), otk);
        }
        Ok(Self { identity, signed_prekey, sealed_sender_key, one_time_prekeys })
    }

    /// The public upload a client would register with the directory: identity key,
    /// signed prekey (public half + signature), and public halves of every one-time key.
    pub fn registration_bundle(&self) -> RegistrationBundle {
        RegistrationBundle {
            identity_public_key: self.identity.public_key.clone(),
            signed_prekey_ec_public: self.signed_prekey.ec_public_key.clone(),
            signed_prekey_pq_public: self.signed_prekey.pq_public_key.clone(),
            signed_prekey_signature: self.signed_prekey.signature.clone(),
            sealed_sender_public_key: self.sealed_sender_key.public_key.clone(),
            one_time_prekeys: self
                .one_time_prekeys
                .values()
                .map(|otk| OneTimePreKeyUpload {
                    pq_public_key: otk.pq_public_key.clone(),
                    signature: otk.signature.clone(),
                })
                .collect(),
        }
    }

    /// Mirrors `X3DHClient::fetch_wipe_one_time_secret_key`: consume (and remove) the
    /// secret half of a claimed one-time prekey so a test can complete a PQXDH agreement
    /// on the recipient side.
    pub fn fetch_wipe_one_time_secret_key(&mut self, pq_public_key: &[u8]) -> Result<TestSignedPreKey> {
        self.one_time_prekeys
            .remove(pq_public_key)
            .context("test fixture has no such one-time prekey")
    }

    pub fn remaining_one_time_keys(&self) -> usize {
        self.one_time_prekeys.len()
    }
}

/// What a client sends the directory at registration time (spec §3).
pub struct RegistrationBundle {
    pub identity_public_key: Vec<u8>,
    pub signed_prekey_ec_public: Vec<u8>,
    pub signed_prekey_pq_public: Vec<u8>,
    pub signed_prekey_signature: Vec<u8>,
    pub sealed_sender_public_key: Vec<u8>,
    pub one_time_prekeys: Vec<OneTimePreKeyUpload>,
}

pub struct OneTimePreKeyUpload {
    pub pq_public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_registration_bundle_round_trips_through_bundle_verification() {
        let user = TestUser::generate(5).unwrap();
        let bundle = user.registration_bundle();
        assert_eq!(bundle.one_time_prekeys.len(), 5);
        assert!(protocol::bundle::verify_prekey_binding(
            &bundle.identity_public_key,
            Some(&bundle.signed_prekey_ec_public),
            &bundle.signed_prekey_pq_public,
            &bundle.signed_prekey_signature,
        )
        .unwrap());
    }

    #[test]
    fn claiming_one_time_key_removes_it_from_the_pool() {
        let mut user = TestUser::generate(2).unwrap();
        let bundle = user.registration_bundle();
        let first = &bundle.one_time_prekeys[0];
        assert_eq!(user.remaining_one_time_keys(), 2);
        user.fetch_wipe_one_time_secret_key(&first.pq_public_key).unwrap();
        assert_eq!(user.remaining_one_time_keys(), 1);
        assert!(user.fetch_wipe_one_time_secret_key(&first.pq_public_key).is_err());
    }

    #[test]
    fn legacy_prekey_has_no_ec_component() {
        let identity = TestIdentity::generate();
        let legacy = TestSignedPreKey::generate_legacy(&identity).unwrap();
        assert!(legacy.ec_public_key.is_empty());
        assert!(protocol::bundle::verify_prekey_binding(
            &identity.public_key,
            None,
            &legacy.pq_public_key,
            &legacy.signature,
        )
        .unwrap());
    }
}
