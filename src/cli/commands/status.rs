//! Status command implementation
//!
//! This module implements the `status` command: outcome counts, quarantined
//! records, the last run and recent events from the transfer store.

use crate::adapters::database::{create_transfer_store, TransferStore};
use crate::config::load_config;
use crate::domain::Result;
use clap::Args;
use std::sync::Arc;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Number of recent events to show
    #[arg(long, default_value_t = 20)]
    pub events: usize,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking transfer status");

        println!("📊 Transfer Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(e.category().exit_code());
            }
        };

        let store = match create_transfer_store(&config.store).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to open transfer store");
                println!("   Error: {e}");
                return Ok(e.category().exit_code());
            }
        };

        match self.print_status(store).await {
            Ok(()) => Ok(0),
            Err(e) => {
                println!("❌ Failed to read transfer store");
                println!("   Error: {e}");
                Ok(e.category().exit_code())
            }
        }
    }

    async fn print_status(&self, store: Arc<dyn TransferStore>) -> Result<()> {
        let counts = store.outcome_counts().await?;
        println!("Outcomes:");
        if counts.is_empty() {
            println!("  (none recorded)");
        }
        for (label, count) in &counts {
            println!("  {:<20} {:>8}", label.as_str(), count);
        }
        println!();

        let quarantined = store.list_unresolved().await?;
        println!("Quarantined records: {}", quarantined.len());
        if !quarantined.is_empty() {
            println!("{:<40} {:<20} {:<20}", "Instance ID", "Raw Org Unit", "Since");
            println!("{}", "-".repeat(80));
            for q in &quarantined {
                println!(
                    "{:<40} {:<20} {:<20}",
                    q.id,
                    if q.raw_org_unit.is_empty() {
                        "(empty)"
                    } else {
                        q.raw_org_unit.as_str()
                    },
                    q.inserted_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!("Use 'vatransfer repair <instance-id> [--org-unit UID]' to release a record.");
        }
        println!();

        match store.load_last_run().await? {
            Some(run) => {
                let status = match run.status.as_str() {
                    "completed" => "✅ Completed",
                    "in_progress" => "🔄 In Progress",
                    "failed" => "❌ Failed",
                    _ => "⏸️  Not Started",
                };
                println!("Last run: {}", run.run_id);
                println!("  Status: {status}");
                println!("  Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
                if let Some(completed_at) = run.completed_at {
                    println!("  Finished: {}", completed_at.format("%Y-%m-%d %H:%M:%S"));
                }
                println!("  Records pushed: {}", run.records_pushed);
                if let Some(error) = &run.last_error {
                    println!("  Error: {error}");
                }
            }
            None => {
                println!("No run history found.");
                println!("Run 'vatransfer run' to start transferring records.");
            }
        }
        println!();

        let events = store.recent_events(self.events).await?;
        if !events.is_empty() {
            println!("Recent events:");
            for event in &events {
                println!(
                    "  {} [{:<7}] {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.category.as_str(),
                    event.description
                );
            }
            println!();
        }
        Ok(())
    }
}
