// vatransfer - Verbal autopsy to DHIS2 transfer
// Copyright (c) 2025 vatransfer Contributors
// Licensed under the MIT License

//! # vatransfer - Verbal autopsy to DHIS2 transfer
//!
//! vatransfer moves verbal autopsy (VA) records, together with their
//! cause-of-death results, from field exports into a DHIS2 tracker program.
//! Every record is delivered exactly once, even across repeated and
//! partially failing runs.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Merging** successive exports into a duplicate-free working set
//! - **Resolving** each record's organisation unit and matching it to an
//!   existing or new tracked entity
//! - **Posting** each record with an SQLite blob of its attributes
//! - **Recording** outcomes durably, and quarantining records whose
//!   destination cannot be resolved until they are repaired
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Pipeline stages and run coordination
//! - [`adapters`] - DHIS2 Web API client and the SQLite transfer store
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vatransfer::config::load_config;
//! use vatransfer::core::transfer::TransferCoordinator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("vatransfer.toml")?;
//!     let coordinator = TransferCoordinator::from_config(config).await?;
//!
//!     let summary = coordinator.run().await?;
//!     println!("{}", summary.describe());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All library errors are [`domain::TransferError`]. Each maps to an
//! [`domain::ErrorCategory`], which the binary turns into its exit code:
//!
//! ```rust
//! use vatransfer::domain::{DhisError, ErrorCategory, TransferError};
//!
//! let err: TransferError = DhisError::ProgramNotFound("Verbal Autopsy".to_string()).into();
//! assert_eq!(err.category(), ErrorCategory::Configuration);
//! assert_eq!(err.category().exit_code(), 2);
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;

#[doc(hidden)]
pub mod test_support;
