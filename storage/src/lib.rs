//! SQLite-backed implementation of [`runtime::storage::Storage`] (§6).
//!
//! One [`SqliteStorage`] owns one on-disk database file for one process's set of
//! worlds -- the same "one connection, `block_in_place` per call" shape the
//! teacher's workspace store uses, rather than a `spawn_blocking`-per-call pool,
//! because a World's lifetime already matches a single open connection far more
//! directly than pooled blocking handoffs would.

mod store;

pub use store::SqliteStorage;
