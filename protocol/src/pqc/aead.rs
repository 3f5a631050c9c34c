//! AEAD sealing, covering both ciphers spec §4.1 names: AES-256-GCM (12-byte nonce) for
//! the sealed-sender envelope path and XChaCha20-Poly1305 (24-byte nonce) for any
//! longer-lived ciphertext that benefits from XChaCha's wider nonce space. The teacher
//! already depends on `chacha20poly1305`; `aes-gcm` is added alongside it since the
//! wire format spec freezes both nonce sizes as contractual.

use crate::error::{PqcError, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce as Aes256GcmNonce};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

pub const AES_GCM_NONCE_LEN: usize = 12;
pub const XCHACHA20_NONCE_LEN: usize = 24;
pub const KEY_LEN: usize = 32;

pub fn aes_gcm_seal(key: &[u8; KEY_LEN], nonce: &[u8; AES_GCM_NONCE_LEN], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new_from_slice(key).expect("key length is fixed at compile time");
    cipher
        .encrypt(Aes256GcmNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .expect("AES-256-GCM encryption does not fail for well-formed inputs")
}

pub fn aes_gcm_open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; AES_GCM_NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).expect("key length is fixed at compile time");
    cipher
        .decrypt(Aes256GcmNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| PqcError::AuthFailure)
}

pub fn xchacha20poly1305_seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; XCHACHA20_NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).expect("key length is fixed at compile time");
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .expect("XChaCha20-Poly1305 encryption does not fail for well-formed inputs")
}

pub fn xchacha20poly1305_open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; XCHACHA20_NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).expect("key length is fixed at compile time");
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| PqcError::AuthFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_gcm_round_trip() {
        let key = [7u8; KEY_LEN];
        let nonce = [1u8; AES_GCM_NONCE_LEN];
        let ct = aes_gcm_seal(&key, &nonce, b"aad", b"hello");
        assert_eq!(aes_gcm_open(&key, &nonce, b"aad", &ct).unwrap(), b"hello");
    }

    #[test]
    fn aes_gcm_tamper_detected() {
        let key = [7u8; KEY_LEN];
        let nonce = [1u8; AES_GCM_NONCE_LEN];
        let mut ct = aes_gcm_seal(&key, &nonce, b"aad", b"hello");
        ct[0] ^= 1;
        assert_eq!(aes_gcm_open(&key, &nonce, b"aad", &ct).unwrap_err(), PqcError::AuthFailure);
    }

    #[test]
    fn aes_gcm_wrong_aad_detected() {
        let key = [7u8; KEY_LEN];
        let nonce = [1u8; AES_GCM_NONCE_LEN];
        let ct = aes_gcm_seal(&key, &nonce, b"aad-a", b"hello");
        assert_eq!(aes_gcm_open(&key, &nonce, b"aad-b", &ct).unwrap_err(), PqcError::AuthFailure);
    }

    #[test]
    fn xchacha20poly1305_round_trip() {
        let key = [9u8; KEY_LEN];
        let nonce = [2u8; XCHACHA20_NONCE_LEN];
        let ct = xchacha20poly1305_seal(&key, &nonce, b"", b"world");
        assert_eq!(xchacha20poly1305_open(&key, &nonce, b"", &ct).unwrap(), b"world");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn aes_gcm_open_inverts_seal_for_any_plaintext_and_aad(
            key in prop::array::uniform32(any::<u8>()),
            nonce in prop::array::uniform12(any::<u8>()),
            aad in prop::collection::vec(any::<u8>(), 0..64),
            plaintext in prop::collection::vec(any::<u8>(), 0..4096),
        ) {
            let ct = aes_gcm_seal(&key, &nonce, &aad, &plaintext);
            prop_assert_eq!(aes_gcm_open(&key, &nonce, &aad, &ct).unwrap(), plaintext);
        }
    }
}
