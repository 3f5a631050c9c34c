//! Size-sniffed ingress, turned into tagged sum types (spec §9: "Dynamic typing at
//! ingress → tagged variants"). Callers decode raw bytes into one of these once, at the
//! boundary, and every downstream match is exhaustive instead of re-checking lengths.

use crate::error::{PqcError, Result};
use crate::pqc::{mldsa, mlkem, x25519};

/// An identity public key: either legacy P-256 (validated by length only, never used
/// cryptographically server-side) or ML-DSA-65.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKeyMaterial {
    P256(Vec<u8>),
    MlDsa(Vec<u8>),
}

pub const P256_PUBLIC_KEY_LEN: usize = 65;

impl IdentityKeyMaterial {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            P256_PUBLIC_KEY_LEN => Ok(Self::P256(bytes.to_vec())),
            mldsa::PUBLIC_KEY_LEN => Ok(Self::MlDsa(bytes.to_vec())),
            got => Err(PqcError::InvalidKeySize {
                expected: &[P256_PUBLIC_KEY_LEN, mldsa::PUBLIC_KEY_LEN],
                got,
            }),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::P256(b) | Self::MlDsa(b) => b,
        }
    }
}

/// A prekey public key: legacy P-256, X25519 (classical component of a hybrid bundle),
/// or ML-KEM-1024 (post-quantum component).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreKeyMaterial {
    P256(Vec<u8>),
    X25519(Vec<u8>),
    MlKem(Vec<u8>),
}

impl PreKeyMaterial {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            P256_PUBLIC_KEY_LEN => Ok(Self::P256(bytes.to_vec())),
            x25519::PUBLIC_KEY_LEN => Ok(Self::X25519(bytes.to_vec())),
            mlkem::PUBLIC_KEY_LEN => Ok(Self::MlKem(bytes.to_vec())),
            got => Err(PqcError::InvalidKeySize {
                expected: &[P256_PUBLIC_KEY_LEN, x25519::PUBLIC_KEY_LEN, mlkem::PUBLIC_KEY_LEN],
                got,
            }),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::P256(b) | Self::X25519(b) | Self::MlKem(b) => b,
        }
    }
}

/// A signature: legacy P-256 ECDSA (64-72 bytes, validated by length only — see spec
/// §4.1's zero-trust note) or ML-DSA-65 (cryptographically verified).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureMaterial {
    EcdsaP256(Vec<u8>),
    MlDsa(Vec<u8>),
}

pub const P256_ECDSA_SIG_MIN: usize = 64;
pub const P256_ECDSA_SIG_MAX: usize = 72;

impl SignatureMaterial {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let len = bytes.len();
        if (P256_ECDSA_SIG_MIN..=P256_ECDSA_SIG_MAX).contains(&len) {
            return Ok(Self::EcdsaP256(bytes.to_vec()));
        }
        if len == mldsa::SIGNATURE_LEN {
            return Ok(Self::MlDsa(bytes.to_vec()));
        }
        Err(PqcError::InvalidSignatureSize {
            expected: &[P256_ECDSA_SIG_MIN, P256_ECDSA_SIG_MAX, mldsa::SIGNATURE_LEN],
            got: len,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::EcdsaP256(b) | Self::MlDsa(b) => b,
        }
    }
}

/// Verify a signature against a message, per spec §4.1's documented zero-trust policy:
/// a P-256 signature is accepted purely on having a plausible length (the server never
/// needs semantic assurance, since it only ever handles ciphertext), while an ML-DSA-65
/// signature is verified for real. This function is the single place that policy is
/// encoded, so it can be audited and the startup log line (spec §9) pointed at it.
pub fn verify_signature(sig: &SignatureMaterial, public_key: &[u8], msg: &[u8]) -> Result<bool> {
    match sig {
        SignatureMaterial::EcdsaP256(_) => Ok(true),
        SignatureMaterial::MlDsa(bytes) => mldsa::verify(public_key, msg, bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_dispatches_by_size() {
        assert!(matches!(
            IdentityKeyMaterial::decode(&vec![0u8; 65]).unwrap(),
            IdentityKeyMaterial::P256(_)
        ));
        assert!(matches!(
            IdentityKeyMaterial::decode(&vec![0u8; 1952]).unwrap(),
            IdentityKeyMaterial::MlDsa(_)
        ));
        assert!(IdentityKeyMaterial::decode(&vec![0u8; 64]).is_err());
    }

    #[test]
    fn prekey_dispatches_by_size() {
        assert!(matches!(PreKeyMaterial::decode(&vec![0u8; 32]).unwrap(), PreKeyMaterial::X25519(_)));
        assert!(matches!(PreKeyMaterial::decode(&vec![0u8; 1568]).unwrap(), PreKeyMaterial::MlKem(_)));
        assert!(matches!(PreKeyMaterial::decode(&vec![0u8; 65]).unwrap(), PreKeyMaterial::P256(_)));
    }

    #[test]
    fn signature_dispatch_boundary_behavior() {
        assert!(matches!(SignatureMaterial::decode(&vec![0u8; 64]).unwrap(), SignatureMaterial::EcdsaP256(_)));
        assert!(matches!(SignatureMaterial::decode(&vec![0u8; 72]).unwrap(), SignatureMaterial::EcdsaP256(_)));
        assert!(matches!(SignatureMaterial::decode(&vec![0u8; 3293]).unwrap(), SignatureMaterial::MlDsa(_)));
        assert!(SignatureMaterial::decode(&vec![0u8; 63]).is_err());
        assert!(SignatureMaterial::decode(&vec![0u8; 73]).is_err());
    }

    #[test]
    fn p256_signature_verifies_on_length_alone() {
        let sig = SignatureMaterial::EcdsaP256(vec![0xFF; 70]);
        // Garbage key, garbage message: the zero-trust policy still returns `true`.
        assert!(verify_signature(&sig, &[1, 2, 3], b"anything").unwrap());
    }
}
