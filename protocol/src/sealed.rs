//! C4 crypto core: sealed-sender envelope construction/opening, delivery-token hashing,
//! and timestamp bucketing (spec §4.4). `seal`/`open` are primarily client
//! responsibilities; they live here because the server embeds them for its own test
//! suite and for the group-fanout case where the server assembles a shared encrypted
//! envelope. The server itself never calls [`open`] on a real envelope — see spec §4.4.

use crate::error::Result;
use crate::pqc::aead::{self, AES_GCM_NONCE_LEN, KEY_LEN};
use crate::pqc::mlkem;
use crate::rand::fill_random;
use sha2::{Digest, Sha256};

/// The crypto payload of a sealed envelope. Storage-layer concerns (`recipient_id`,
/// `timestamp_bucket`) live on `server::model::SealedEnvelope`, which wraps this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub kem_ciphertext: Vec<u8>,
    pub nonce: [u8; AES_GCM_NONCE_LEN],
    pub encrypted_content: Vec<u8>,
}

const ENVELOPE_KEY_INFO: &[u8] = b"sealed-sender-v1";
const DELIVERY_TOKEN_INFO: &[u8] = b"sealed-sender-token-v1";

/// Spec §9's Open Question: the reference implementation this is modeled on stands in
/// HKDF with plain `SHA-256(ss || info)`. We keep that exact construction for wire
/// compatibility with clients that already implement it this way, rather than silently
/// switching to real HKDF-SHA-256 and breaking interop.
fn derive_envelope_key(shared_secret: &[u8; mlkem::SHARED_SECRET_LEN]) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(ENVELOPE_KEY_INFO);
    let digest = hasher.finalize();
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest);
    key
}

/// `seal(inner_envelope, recipient_sealed_pk)`: KEM-encapsulate against the recipient's
/// sealed-sender key, derive an envelope key, and AES-256-GCM-seal the inner plaintext.
pub fn seal(inner_envelope: &[u8], recipient_sealed_pk: &[u8]) -> Result<SealedEnvelope> {
    let (kem_ciphertext, shared_secret) = mlkem::kem_encapsulate(recipient_sealed_pk)?;
    let envelope_key = derive_envelope_key(&shared_secret);
    let nonce: [u8; AES_GCM_NONCE_LEN] = fill_random();
    let encrypted_content = aead::aes_gcm_seal(&envelope_key, &nonce, &[], inner_envelope);
    Ok(SealedEnvelope { kem_ciphertext, nonce, encrypted_content })
}

/// The inverse of [`seal`]. Defined for completeness and testing (spec §4.4); the
/// server never invokes this on a real envelope, since doing so would require holding
/// the recipient's sealed-sender secret key, which it never does.
pub fn open(envelope: &SealedEnvelope, recipient_sk: &[u8]) -> Result<Vec<u8>> {
    let shared_secret = mlkem::kem_decapsulate(recipient_sk, &envelope.kem_ciphertext)?;
    let envelope_key = derive_envelope_key(&shared_secret);
    aead::aes_gcm_open(&envelope_key, &envelope.nonce, &[], &envelope.encrypted_content)
}

/// `delivery_token(shared_secret, delivery_verifier)`. Spec §9's Open Question notes the
/// reference uses unkeyed SHA-256 concatenation rather than HMAC-SHA-256; we keep that
/// construction here for the same wire-compatibility reason as [`derive_envelope_key`],
/// and note in `DESIGN.md` that an HMAC-SHA-256 variant would be the stronger choice if
/// wire compatibility were not a constraint. The server can never compute this itself —
/// it never has `shared_secret` — this function exists for clients and for tests.
pub fn delivery_token(shared_secret: &[u8], delivery_verifier: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(delivery_verifier);
    hasher.update(DELIVERY_TOKEN_INFO);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// `hash_token(token) = SHA-256(token)` — the only form of the token the server stores.
pub fn hash_token(token: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// `timestamp_bucket(unix_ms) = floor(unix_ms / 900000) * 900000` — 15-minute bucketing
/// (spec §4.4, §6 `timestamp.bucket_ms`).
pub const TIMESTAMP_BUCKET_MS: u64 = 900_000;

pub fn timestamp_bucket(unix_ms: u64) -> u64 {
    (unix_ms / TIMESTAMP_BUCKET_MS) * TIMESTAMP_BUCKET_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let recipient = mlkem::generate_kem_keypair();
        let inner = b"hello, this is alice, but you can't tell from the wire";
        let envelope = seal(inner, &recipient.public_key).unwrap();
        let opened = open(&envelope, &recipient.secret_key).unwrap();
        assert_eq!(opened, inner);
    }

    #[test]
    fn envelope_never_carries_sender_identity_field() {
        let recipient = mlkem::generate_kem_keypair();
        let envelope = seal(b"payload", &recipient.public_key).unwrap();
        // The type itself has no sender_id field to serialize; this is a structural
        // guarantee, asserted here by construction rather than by searching bytes.
        let SealedEnvelope { kem_ciphertext, nonce, encrypted_content } = envelope;
        assert_eq!(kem_ciphertext.len(), mlkem::CIPHERTEXT_LEN);
        assert_eq!(nonce.len(), AES_GCM_NONCE_LEN);
        assert!(!encrypted_content.is_empty());
    }

    #[test]
    fn timestamp_bucket_is_multiple_of_900000() {
        assert_eq!(timestamp_bucket(0), 0);
        assert_eq!(timestamp_bucket(899_999), 0);
        assert_eq!(timestamp_bucket(900_000), 900_000);
        assert_eq!(timestamp_bucket(1_000_000), 900_000);
        assert_eq!(timestamp_bucket(1_800_001) % TIMESTAMP_BUCKET_MS, 0);
    }

    #[test]
    fn hash_token_is_deterministic() {
        let token = [7u8; 32];
        assert_eq!(hash_token(&token), hash_token(&token));
    }

    #[test]
    fn delivery_token_depends_on_all_inputs() {
        let verifier = [1u8; 32];
        let a = delivery_token(b"secret-a", &verifier);
        let b = delivery_token(b"secret-b", &verifier);
        assert_ne!(a, b);

        let other_verifier = [2u8; 32];
        let c = delivery_token(b"secret-a", &other_verifier);
        assert_ne!(a, c);
    }
}
