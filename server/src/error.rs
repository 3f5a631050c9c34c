//! The error taxonomy from spec §7. Every public operation on [`crate::service::Directory`]
//! returns a `Result<_, DirectoryError>`; nothing upstream of the persistence layer sees a
//! raw `rusqlite`/`tokio_rusqlite` error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Pqc(#[from] protocol::PqcError),

    #[error("user {user} has no identity key on file")]
    NoIdentityKey { user: String },

    #[error("user {user} has no active signed prekey on file")]
    NoSignedPreKey { user: String },

    #[error("request rate limited")]
    RateLimited,

    #[error("targeted attack detected against user {target}: {distinct_requesters} distinct requesters within the window")]
    TargetedAttack { target: String, distinct_requesters: u64 },

    #[error("AEAD authentication failed while opening envelope")]
    AuthFailure,

    #[error("storage temporarily unavailable: {0}")]
    StorageUnavailable(String),

    #[error("transparency signing failed; epoch not committed: {0}")]
    SigningFailure(String),

    #[error("unique constraint conflict on ({user}, {key_id})")]
    Conflict { user: String, key_id: i64 },

    #[error("no such epoch: {0}")]
    NoSuchEpoch(u64),

    #[error("inclusion/consistency proofs against epoch 0 are undefined (sentinel genesis)")]
    GenesisProofRequested,
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

impl From<rusqlite::Error> for DirectoryError {
    fn from(err: rusqlite::Error) -> Self {
        DirectoryError::StorageUnavailable(err.to_string())
    }
}

impl From<tokio_rusqlite::Error> for DirectoryError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        DirectoryError::StorageUnavailable(err.to_string())
    }
}
