//! C1: PQC Primitives. A thin, side-channel-conscious wrapper around vetted
//! implementations (spec §4.1). Nothing above this module touches a cryptographic
//! library directly.

pub mod aead;
pub mod dispatch;
pub mod fingerprint;
pub mod hkdf;
pub mod mldsa;
pub mod mlkem;
pub mod x25519;
