//! ML-DSA-65 (Dilithium3) signatures, wrapping `pqcrypto-mldsa`. Sizes are frozen by
//! spec §6: public key 1952 B, secret key 4016 B, signature 3293 B.

use crate::error::{PqcError, Result};
use pqcrypto_mldsa::mldsa65;
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _, SecretKey as _, VerificationError,
};

pub const PUBLIC_KEY_LEN: usize = 1952;
pub const SECRET_KEY_LEN: usize = 4016;
pub const SIGNATURE_LEN: usize = 3293;

pub struct SigKeypair {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

pub fn generate_sig_keypair() -> SigKeypair {
    let (pk, sk) = mldsa65::keypair();
    SigKeypair {
        public_key: pk.as_bytes().to_vec(),
        secret_key: sk.as_bytes().to_vec(),
    }
}

pub fn sign(secret_key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    let sk = mldsa65::SecretKey::from_bytes(secret_key).map_err(|_| PqcError::InvalidKeySize {
        expected: &[SECRET_KEY_LEN],
        got: secret_key.len(),
    })?;
    let sig = mldsa65::detached_sign(msg, &sk);
    Ok(sig.as_bytes().to_vec())
}

pub fn verify(public_key: &[u8], msg: &[u8], signature: &[u8]) -> Result<bool> {
    let pk = mldsa65::PublicKey::from_bytes(public_key).map_err(|_| PqcError::InvalidKeySize {
        expected: &[PUBLIC_KEY_LEN],
        got: public_key.len(),
    })?;
    let sig = mldsa65::DetachedSignature::from_bytes(signature).map_err(|_| {
        PqcError::InvalidSignatureSize { expected: &[SIGNATURE_LEN], got: signature.len() }
    })?;
    match mldsa65::verify_detached_signature(&sig, msg, &pk) {
        Ok(()) => Ok(true),
        Err(VerificationError::InvalidSignature) => Ok(false),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_has_frozen_sizes() {
        let kp = generate_sig_keypair();
        assert_eq!(kp.public_key.len(), PUBLIC_KEY_LEN);
        assert_eq!(kp.secret_key.len(), SECRET_KEY_LEN);
    }

    #[test]
    fn sign_verify_round_trip() {
        let kp = generate_sig_keypair();
        let msg = b"pre-key bundle binding";
        let sig = sign(&kp.secret_key, msg).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(verify(&kp.public_key, msg, &sig).unwrap());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = generate_sig_keypair();
        let sig = sign(&kp.secret_key, b"original").unwrap();
        assert!(!verify(&kp.public_key, b"tampered", &sig).unwrap());
    }

    #[test]
    fn wrong_size_signature_is_rejected() {
        let kp = generate_sig_keypair();
        let err = verify(&kp.public_key, b"msg", &[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            PqcError::InvalidSignatureSize { expected: &[SIGNATURE_LEN], got: 10 }
        );
    }
}
