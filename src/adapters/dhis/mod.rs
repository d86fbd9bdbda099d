//! DHIS2 destination adapter
//!
//! [`DestinationServer`] is the seam the pipeline depends on; [`Dhis2Client`]
//! implements it over the DHIS2 Web API.

pub mod client;
pub mod models;
pub mod traits;

pub use client::Dhis2Client;
pub use traits::DestinationServer;
