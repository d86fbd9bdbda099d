//! External system integrations for vatransfer.
//!
//! - [`dhis`] - DHIS2 Web API client behind the [`dhis::DestinationServer`] trait
//! - [`database`] - Transfer store abstraction ([`database::TransferStore`])
//! - [`sqlite`] - SQLite (optionally SQLCipher) transfer store
//!
//! Both seams are traits so the pipeline can be exercised against in-memory
//! implementations.

pub mod database;
pub mod dhis;
pub mod sqlite;
