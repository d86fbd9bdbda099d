//! Transfer store factory

use crate::adapters::database::traits::TransferStore;
use crate::adapters::sqlite::SqliteTransferStore;
use crate::config::StoreConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Create the transfer store described by the configuration
///
/// The schema is created on first use, so this also validates that the store
/// file can be opened (and decrypted, when a key is configured).
///
/// # Errors
///
/// Returns a store error if the file cannot be opened or initialised.
pub async fn create_transfer_store(config: &StoreConfig) -> Result<Arc<dyn TransferStore>> {
    tracing::info!(path = %config.path, encrypted = config.key.is_some(), "Opening transfer store");
    let store = SqliteTransferStore::open(&config.path, config.key.clone()).await?;
    Ok(Arc::new(store))
}
