//! Public-key fingerprints: SHA-256 of the encoded key, lowercase hex (spec §4.1, §3).

use sha2::{Digest, Sha256};

pub const FINGERPRINT_LEN: usize = 32;

/// `fingerprint(pk) = SHA-256(pk)`, as raw bytes.
pub fn fingerprint(public_key: &[u8]) -> [u8; FINGERPRINT_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(public_key);
    let digest = hasher.finalize();
    let mut out = [0u8; FINGERPRINT_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Lowercase hex encoding, for out-of-band display/verification.
pub fn fingerprint_hex(public_key: &[u8]) -> String {
    hex::encode(fingerprint(public_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_pure() {
        let a = fingerprint(b"some public key bytes");
        let b = fingerprint(b"some public key bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn matches_known_sha256() {
        // SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        assert_eq!(
            fingerprint_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hex_is_lowercase() {
        let hex = fingerprint_hex(b"key material");
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(hex.len(), FINGERPRINT_LEN * 2);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use sha2::{Digest, Sha256};

    proptest! {
        #[test]
        fn fingerprint_is_sha256_for_any_key(pk in prop::collection::vec(any::<u8>(), 0..4096)) {
            prop_assert_eq!(fingerprint(&pk).to_vec(), Sha256::digest(&pk).to_vec());
        }

        #[test]
        fn fingerprint_is_deterministic(pk in prop::collection::vec(any::<u8>(), 0..4096)) {
            prop_assert_eq!(fingerprint(&pk), fingerprint(&pk));
        }
    }
}
