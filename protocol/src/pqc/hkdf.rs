//! HKDF-SHA-256, the teacher's own choice (`native/client/src/main.rs`'s `kdf` function
//! builds on `hkdf::Hkdf<Sha256>` directly). This is the one KDF entry point allowed by
//! spec §4.1; every other component derives keys through it rather than reaching for
//! raw SHA-256 concatenation, except where spec §9's Open Questions explicitly call out
//! a documented SHA-256-as-HKDF-stand-in for wire compatibility (see
//! [`crate::sealed::derive_envelope_key`]).

use crate::error::{PqcError, Result};
use hkdf::Hkdf;
use sha2::Sha256;

const MAX_OUTPUT_LEN: usize = 255 * 32;

pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
    if len > MAX_OUTPUT_LEN {
        return Err(PqcError::HkdfLengthTooLarge { requested: len, max: MAX_OUTPUT_LEN });
    }
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    // Hkdf::expand only fails when `len` exceeds the RFC 5869 bound we already checked.
    hk.expand(info, &mut okm).expect("length bound checked above");
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let a = hkdf_sha256(b"ikm", b"salt", b"info", 32).unwrap();
        let b = hkdf_sha256(b"ikm", b"salt", b"info", 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn differs_by_info() {
        let a = hkdf_sha256(b"ikm", b"salt", b"info-a", 32).unwrap();
        let b = hkdf_sha256(b"ikm", b"salt", b"info-b", 32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_too_long_output() {
        let err = hkdf_sha256(b"ikm", b"salt", b"info", MAX_OUTPUT_LEN + 1).unwrap_err();
        assert_eq!(err, PqcError::HkdfLengthTooLarge { requested: MAX_OUTPUT_LEN + 1, max: MAX_OUTPUT_LEN });
    }
}
