//! The server-side key directory and sealed-sender envelope service: a zero-trust
//! component that holds no private key material, never sees plaintext, and never
//! learns sealed-sender identity. See `DESIGN.md` for how each module grounds in the
//! teacher repo, and `SPEC_FULL.md` for the behavior this crate implements.

pub mod config;
pub mod directory;
pub mod dispenser;
pub mod error;
pub mod gossamer;
pub mod model;
pub mod persistence;
pub mod queue;
pub mod ratelimit;
pub mod sealed_sender;
pub mod service;

pub use config::DirectoryConfig;
pub use error::{DirectoryError, Result};
pub use service::DirectoryService;
