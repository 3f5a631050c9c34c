//! C2's durable storage. `sqlite` is the only backend, the way the teacher carries
//! exactly one (`SqliteStorage` in `sqlite_brongnal.rs`); the module is still split out
//! so a future backend could sit beside it without touching `directory`/`dispenser`.

pub mod sqlite;

pub use sqlite::SqliteStore;
