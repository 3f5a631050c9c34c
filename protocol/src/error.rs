use thiserror::Error;

/// The primitive-level error taxonomy from spec §7. Every fallible operation in
/// [`crate::pqc`], [`crate::bundle`] and [`crate::sealed`] returns one of these; callers
/// up in `server` map them onto the wider [`server::error::DirectoryError`] taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PqcError {
    #[error("invalid key size: expected one of {expected:?}, got {got}")]
    InvalidKeySize { expected: &'static [usize], got: usize },

    #[error("invalid signature size: expected one of {expected:?}, got {got}")]
    InvalidSignatureSize { expected: &'static [usize], got: usize },

    #[error("invalid point: X25519 Diffie-Hellman output was the all-zero low-order point")]
    InvalidPoint,

    #[error("AEAD authentication failed")]
    AuthFailure,

    #[error("padded buffer too small or length field exceeds payload")]
    InvalidPadding,

    #[error("HKDF output length {requested} exceeds the maximum of {max} bytes")]
    HkdfLengthTooLarge { requested: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, PqcError>;
