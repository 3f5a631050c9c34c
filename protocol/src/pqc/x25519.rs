//! X25519 Diffie-Hellman, reusing the teacher's own `x25519-dalek` dependency and
//! calling convention (`native/client/src/lib.rs` builds `X25519StaticSecret` the same
//! way). `x25519-dalek::StaticSecret::from` already performs the RFC 7748 clamping
//! spec §4.1 calls out (`sk[0] &= 248; sk[31] = (sk[31] & 127) | 64`); we don't re-clamp,
//! we just document that the invariant is upheld by the dependency. Entropy is drawn
//! through `protocol::rand`, the single entry point spec §4.1 mandates, rather than an
//! `OsRng` reached directly.

use crate::error::{PqcError, Result};
use crate::rand::fill_random;
use x25519_dalek::{PublicKey, StaticSecret};

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SECRET_KEY_LEN: usize = 32;

pub struct X25519Keypair {
    pub public_key: [u8; PUBLIC_KEY_LEN],
    pub secret_key: [u8; SECRET_KEY_LEN],
}

pub fn x25519_generate() -> X25519Keypair {
    let sk = StaticSecret::from(fill_random::<32>());
    let pk = PublicKey::from(&sk);
    X25519Keypair { public_key: pk.to_bytes(), secret_key: sk.to_bytes() }
}

/// Diffie-Hellman. Fails with [`PqcError::InvalidPoint`] if the result is the all-zero
/// output that signals `peer_pk` was a low-order point (spec §4.1).
pub fn x25519_dh(secret_key: &[u8; SECRET_KEY_LEN], peer_public_key: &[u8]) -> Result<[u8; 32]> {
    let peer_bytes: [u8; 32] = peer_public_key.try_into().map_err(|_| PqcError::InvalidKeySize {
        expected: &[PUBLIC_KEY_LEN],
        got: peer_public_key.len(),
    })?;
    let sk = StaticSecret::from(*secret_key);
    let peer = PublicKey::from(peer_bytes);
    let shared = sk.diffie_hellman(&peer);
    let bytes = shared.to_bytes();
    if bytes == [0u8; 32] {
        return Err(PqcError::InvalidPoint);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_agrees_both_directions() {
        let alice = x25519_generate();
        let bob = x25519_generate();
        let a = x25519_dh(&alice.secret_key, &bob.public_key).unwrap();
        let b = x25519_dh(&bob.secret_key, &alice.public_key).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn low_order_point_is_rejected() {
        let alice = x25519_generate();
        // The all-zero point is a well-known low-order point on Curve25519.
        let zero_point = [0u8; 32];
        let err = x25519_dh(&alice.secret_key, &zero_point).unwrap_err();
        assert_eq!(err, PqcError::InvalidPoint);
    }

    #[test]
    fn wrong_size_peer_key_is_invalid_key_size() {
        let alice = x25519_generate();
        let err = x25519_dh(&alice.secret_key, &[0u8; 10]).unwrap_err();
        assert_eq!(err, PqcError::InvalidKeySize { expected: &[PUBLIC_KEY_LEN], got: 10 });
    }
}
