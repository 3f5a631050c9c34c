//! Pure cryptographic core for the key directory and sealed-sender service (spec §1-4).
//!
//! This crate has no notion of storage, rate limiting, or the network; it is the part
//! of the system a client and the server both link against, and the only part either
//! side trusts for correctness of cryptographic operations. Everything in [`server`]
//! calls through here rather than touching a cryptographic library directly.

pub mod bundle;
pub mod error;
pub mod padding;
pub mod pqc;
pub mod rand;
pub mod sealed;

pub use error::{PqcError, Result};
