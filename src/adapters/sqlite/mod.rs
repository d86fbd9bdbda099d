//! SQLite-backed transfer store

pub mod store;

pub use store::SqliteTransferStore;
