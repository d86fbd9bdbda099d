//! Transfer store abstraction
//!
//! The pipeline talks to the store only through [`TransferStore`]; the SQLite
//! implementation lives in [`crate::adapters::sqlite`].

pub mod factory;
pub mod traits;

pub use factory::create_transfer_store;
pub use traits::TransferStore;
