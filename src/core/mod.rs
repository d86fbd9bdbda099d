//! Core business logic for vatransfer.
//!
//! This module contains the transfer pipeline and its orchestration.
//!
//! # Modules
//!
//! - [`ingest`] - Export merging, duplicate filtering and the cause-of-death join
//! - [`reconcile`] - Organisation unit resolution and tracked entity matching
//! - [`package`] - Blob packaging and the new-storage file
//! - [`transfer`] - Posting and run coordination
//! - [`verification`] - Re-reading accepted records from the destination
//! - [`state`] - Outcome, quarantine and event bookkeeping
//!
//! # Transfer Workflow
//!
//! 1. **Merge**: Fold the new export into the carry-over file
//! 2. **Filter**: Drop records that already have an outcome or are quarantined
//! 3. **Join**: Attach cause-of-death results
//! 4. **Resolve**: Find each record's organisation unit, quarantining the rest
//! 5. **Reconcile**: Match records to existing tracked entities
//! 6. **Post**: Upload blobs and submit the batch
//! 7. **Verify**: Confirm accepted records are searchable
//! 8. **Commit**: Record terminal outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use vatransfer::config::load_config;
//! use vatransfer::core::transfer::TransferCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("vatransfer.toml")?;
//! let coordinator = TransferCoordinator::from_config(config).await?;
//!
//! let summary = coordinator.run().await?;
//! println!("Pushed: {}", summary.pushed());
//! println!("Quarantined: {}", summary.quarantined);
//! # Ok(())
//! # }
//! ```

pub mod ingest;
pub mod package;
pub mod reconcile;
pub mod state;
pub mod transfer;
pub mod verification;
