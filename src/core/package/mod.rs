//! Packaging: blobs for the destination and the new-storage file
//!
//! - [`blob`] - per-record SQLite blob uploaded as a file resource
//! - [`checksum`] - SHA-256 of packaged files
//! - [`storage`] - new-storage CSV and the outcome commit

pub mod blob;
pub mod checksum;
pub mod storage;

pub use blob::{BlobPackage, BlobPackager};
pub use storage::{commit_storage_file, CommitReport, StorageEntry, StorageFile, StorageStatus};
