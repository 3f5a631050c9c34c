//! ML-KEM-1024 (Kyber-1024) encapsulation, wrapping `pqcrypto-mlkem` the way the
//! Quantum-Shield `qsfs-core::pq` module wraps it for its own FIPS 203 path.
//!
//! Sizes are frozen by spec §6: public key 1568 B, secret key 3168 B, ciphertext
//! 1568 B, shared secret 32 B.

use crate::error::{PqcError, Result};
use pqcrypto_mlkem::mlkem1024;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};

pub const PUBLIC_KEY_LEN: usize = 1568;
pub const SECRET_KEY_LEN: usize = 3168;
pub const CIPHERTEXT_LEN: usize = 1568;
pub const SHARED_SECRET_LEN: usize = 32;

/// An ML-KEM-1024 keypair, as raw bytes so it can be stored/transmitted without
/// leaking the `pqcrypto` wrapper types past this module.
pub struct KemKeypair {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

pub fn generate_kem_keypair() -> KemKeypair {
    let (pk, sk) = mlkem1024::keypair();
    KemKeypair {
        public_key: pk.as_bytes().to_vec(),
        secret_key: sk.as_bytes().to_vec(),
    }
}

/// Encapsulate against a public key, returning `(ciphertext, shared_secret)`.
pub fn kem_encapsulate(public_key: &[u8]) -> Result<(Vec<u8>, [u8; SHARED_SECRET_LEN])> {
    let pk = mlkem1024::PublicKey::from_bytes(public_key).map_err(|_| PqcError::InvalidKeySize {
        expected: &[PUBLIC_KEY_LEN],
        got: public_key.len(),
    })?;
    let (ss, ct) = mlkem1024::encapsulate(&pk);
    let mut secret = [0u8; SHARED_SECRET_LEN];
    secret.copy_from_slice(ss.as_bytes());
    Ok((ct.as_bytes().to_vec(), secret))
}

/// Decapsulate a ciphertext with a secret key.
///
/// Per spec §4.1, ML-KEM's implicit-rejection property means a malformed-but-correctly
/// -sized ciphertext never produces an error distinguishable from success: it yields a
/// deterministic pseudo-random secret derived from `sk`, which is exactly what
/// `pqcrypto`'s FO-transform decapsulation already does internally. The only error this
/// function can return is a length mismatch on the key/ciphertext inputs themselves,
/// which is a distinct failure (`InvalidKeySize`) from the cryptographic one spec §4.1
/// deliberately declines to distinguish.
pub fn kem_decapsulate(secret_key: &[u8], ciphertext: &[u8]) -> Result<[u8; SHARED_SECRET_LEN]> {
    let sk = mlkem1024::SecretKey::from_bytes(secret_key).map_err(|_| PqcError::InvalidKeySize {
        expected: &[SECRET_KEY_LEN],
        got: secret_key.len(),
    })?;
    let ct =
        mlkem1024::Ciphertext::from_bytes(ciphertext).map_err(|_| PqcError::InvalidKeySize {
            expected: &[CIPHERTEXT_LEN],
            got: ciphertext.len(),
        })?;
    let ss = mlkem1024::decapsulate(&ct, &sk);
    let mut secret = [0u8; SHARED_SECRET_LEN];
    secret.copy_from_slice(ss.as_bytes());
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_has_frozen_sizes() {
        let kp = generate_kem_keypair();
        assert_eq!(kp.public_key.len(), PUBLIC_KEY_LEN);
        assert_eq!(kp.secret_key.len(), SECRET_KEY_LEN);
    }

    #[test]
    fn encapsulate_decapsulate_agree() {
        let kp = generate_kem_keypair();
        let (ct, ss_a) = kem_encapsulate(&kp.public_key).unwrap();
        assert_eq!(ct.len(), CIPHERTEXT_LEN);
        let ss_b = kem_decapsulate(&kp.secret_key, &ct).unwrap();
        assert_eq!(ss_a, ss_b);
    }

    #[test]
    fn rejects_wrong_size_public_key() {
        let err = kem_encapsulate(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            PqcError::InvalidKeySize { expected: &[PUBLIC_KEY_LEN], got: 10 }
        );
    }

    #[test]
    fn decapsulate_never_errors_on_garbage_ciphertext_of_correct_length() {
        let kp = generate_kem_keypair();
        let garbage = vec![0xAAu8; CIPHERTEXT_LEN];
        let secret = kem_decapsulate(&kp.secret_key, &garbage).unwrap();
        assert_eq!(secret.len(), SHARED_SECRET_LEN);
        // Different garbage must not collide with a real encapsulation's secret.
        let (_, real_secret) = kem_encapsulate(&kp.public_key).unwrap();
        assert_ne!(secret, real_secret);
    }
}
