//! The data model from spec §3, as owned Rust types. These are what [`crate::persistence`]
//! reads and writes and what [`crate::directory`]/[`crate::dispenser`]/[`crate::gossamer`]
//! operate on; nothing below this module touches SQL directly.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Active,
    Rotated,
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreKeyStatus {
    Available,
    Used,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey {
    pub user_id: UserId,
    pub public_key: Vec<u8>,
    pub fingerprint: [u8; 32],
    pub version: i64,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedPreKeyStatus {
    Active,
    Rotated,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPreKey {
    pub user_id: UserId,
    pub key_id: i64,
    pub pq_public_key: Vec<u8>,
    pub ec_public_key: Option<Vec<u8>>,
    pub signature: Vec<u8>,
    pub fingerprint: [u8; 32],
    pub hybrid_version: u8,
    pub status: SignedPreKeyStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimePreKey {
    pub user_id: UserId,
    pub key_id: i64,
    pub pq_public_key: Vec<u8>,
    pub ec_public_key: Option<Vec<u8>>,
    pub hybrid_version: u8,
    pub status: PreKeyStatus,
    pub used_by: Option<UserId>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSenderKey {
    pub user_id: UserId,
    pub public_key: Vec<u8>,
    pub fingerprint: [u8; 32],
    pub version: i64,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKeyBundle {
    pub user_id: UserId,
    pub identity_key: IdentityKey,
    pub signed_prekey: SignedPreKey,
    pub one_time_prekey: Option<OneTimePreKey>,
    pub bundle_version: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSenderBundle {
    pub bundle: PreKeyBundle,
    pub sealed_sender_key: SealedSenderKey,
    pub delivery_verifier: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSealedEnvelope {
    pub recipient_id: UserId,
    pub kem_ciphertext: Vec<u8>,
    pub nonce: [u8; 12],
    pub encrypted_content: Vec<u8>,
    pub timestamp_bucket: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub recipient_id: UserId,
    pub token_hash: [u8; 32],
    pub valid: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransparencyEpoch {
    pub epoch_number: u64,
    pub root_hash: [u8; 32],
    pub tree_size: u64,
    pub signature: Vec<u8>,
    pub signing_key_fingerprint: [u8; 32],
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdateType {
    Added,
    Updated,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDirectoryEntry {
    pub user_id: UserId,
    pub user_id_hash: [u8; 32],
    pub identity_fp: [u8; 32],
    pub signed_prekey_fp: Option<[u8; 32]>,
    pub version: i64,
    pub leaf_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingKeyUpdate {
    pub id: i64,
    pub user_id: UserId,
    pub update_type: KeyUpdateType,
    pub identity_fp: [u8; 32],
    pub signed_prekey_fp: Option<[u8; 32]>,
    pub version: i64,
    pub processed: bool,
    pub processed_epoch: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub epoch: u64,
    pub change_type: KeyUpdateType,
    pub user_id_commitment: [u8; 32],
    pub old_leaf_hash: Option<[u8; 32]>,
    pub new_leaf_hash: Option<[u8; 32]>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProofStep {
    pub sibling: [u8; 32],
    pub sibling_on_right: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub leaf_hash: [u8; 32],
    pub path: Vec<InclusionProofStep>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransparencySigningKey {
    pub fingerprint: [u8; 32],
    pub public_key: Vec<u8>,
    pub algorithm: crate::config::SigningAlgorithm,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub status: KeyStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationLogEntry {
    pub user_id: UserId,
    pub key_kind: String,
    pub old_fingerprint: Option<[u8; 32]>,
    pub new_fingerprint: [u8; 32],
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTransparencyCheckpoint {
    pub user_id: UserId,
    pub device_id: String,
    pub epoch_number: u64,
    pub root_hash: [u8; 32],
}
