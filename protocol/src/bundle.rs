//! PQXDH prekey bundle assembly and signature binding (spec §3 `SignedPreKey`, §4.1
//! "Size-based dispatch", §4.3 C3). This module owns exactly the crypto-shaped part of
//! bundle construction — the message bytes a signed prekey's signature is computed
//! over, and verifying that binding. Storage/rotation/claiming lives in the `server`
//! crate's `directory`/`dispenser` modules; this module has no notion of a database row.

use crate::error::Result;
use crate::pqc::dispatch::{verify_signature, SignatureMaterial};
use crate::pqc::mldsa;

/// The exact byte sequence a signed (or one-time) prekey's signature is computed over.
///
/// Per spec §3: `ec_public_key || pq_public_key` when the prekey is hybrid (PQXDH,
/// `hybrid_version = 2`), or `pq_public_key` alone for the legacy (`hybrid_version = 1`)
/// path.
pub fn prekey_signing_message(ec_public_key: Option<&[u8]>, pq_public_key: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(ec_public_key.map_or(0, <[u8]>::len) + pq_public_key.len());
    if let Some(ec) = ec_public_key {
        msg.extend_from_slice(ec);
    }
    msg.extend_from_slice(pq_public_key);
    msg
}

/// Sign a (signed or one-time) prekey with an ML-DSA-65 identity secret key. Used by
/// clients (and by `testkit` to synthesize fixtures); the server never calls this since
/// it never holds an identity secret key.
pub fn sign_prekey(identity_secret_key: &[u8], ec_public_key: Option<&[u8]>, pq_public_key: &[u8]) -> Result<Vec<u8>> {
    let msg = prekey_signing_message(ec_public_key, pq_public_key);
    mldsa::sign(identity_secret_key, &msg)
}

/// Verify the binding between an identity key and a (signed or one-time) prekey,
/// dispatching on the signature's size the way spec §4.1 requires. Returns `Ok(true)`
/// unconditionally for a length-plausible P-256 signature (the documented zero-trust
/// policy — see [`crate::pqc::dispatch::verify_signature`]).
pub fn verify_prekey_binding(
    identity_public_key: &[u8],
    ec_public_key: Option<&[u8]>,
    pq_public_key: &[u8],
    signature: &[u8],
) -> Result<bool> {
    let sig = SignatureMaterial::decode(signature)?;
    let msg = prekey_signing_message(ec_public_key, pq_public_key);
    verify_signature(&sig, identity_public_key, &msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pqc::{mldsa, mlkem, x25519};

    #[test]
    fn hybrid_signature_binds_ec_and_pq() {
        let identity = mldsa::generate_sig_keypair();
        let ec = x25519::x25519_generate();
        let pq = mlkem::generate_kem_keypair();

        let sig = sign_prekey(&identity.secret_key, Some(&ec.public_key), &pq.public_key).unwrap();
        assert!(verify_prekey_binding(&identity.public_key, Some(&ec.public_key), &pq.public_key, &sig).unwrap());
    }

    #[test]
    fn legacy_signature_omits_ec_component() {
        let identity = mldsa::generate_sig_keypair();
        let pq = mlkem::generate_kem_keypair();

        let sig = sign_prekey(&identity.secret_key, None, &pq.public_key).unwrap();
        assert!(verify_prekey_binding(&identity.public_key, None, &pq.public_key, &sig).unwrap());
        // Claiming it was hybrid when it wasn't signed that way must not verify.
        let ec = x25519::x25519_generate();
        assert!(!verify_prekey_binding(&identity.public_key, Some(&ec.public_key), &pq.public_key, &sig).unwrap());
    }

    #[test]
    fn tampered_pq_component_fails_verification() {
        let identity = mldsa::generate_sig_keypair();
        let pq = mlkem::generate_kem_keypair();
        let other_pq = mlkem::generate_kem_keypair();

        let sig = sign_prekey(&identity.secret_key, None, &pq.public_key).unwrap();
        assert!(!verify_prekey_binding(&identity.public_key, None, &other_pq.public_key, &sig).unwrap());
    }

    #[test]
    fn p256_path_verifies_on_length_alone() {
        let pq = mlkem::generate_kem_keypair();
        let bogus_signature = vec![0x11u8; 70];
        assert!(verify_prekey_binding(&[9, 9, 9], None, &pq.public_key, &bogus_signature).unwrap());
    }
}
