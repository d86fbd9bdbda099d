//! Run command implementation
//!
//! This module implements the `run` command, one pass of the transfer
//! pipeline.

use crate::config::load_config;
use crate::core::transfer::{RunOutcome, RunSummary, TransferCoordinator};
use clap::Args;
use std::io::{self, Write};

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Stop after reconciliation and print the planned creates and updates
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting run command");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(e.category().exit_code());
            }
        };
        let dry_run = self.dry_run || config.application.dry_run;

        if dry_run {
            tracing::info!("Dry run mode enabled - nothing will be posted or recorded");
            println!("🔍 DRY RUN MODE - Nothing will be posted to DHIS2 or recorded");
            println!();
        }

        if !self.yes && !dry_run {
            println!("Transfer Configuration:");
            println!("  DHIS2 Server: {}", config.dhis.base_url);
            println!("  Program: {}", config.dhis.program_name);
            println!("  Working directory: {}", config.transfer.working_dir);
            println!("  Transfer store: {}", config.store.path);
            println!();
            print!("Proceed with transfer? [y/N]: ");
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Transfer cancelled.");
                return Ok(0);
            }
        }

        let coordinator = match TransferCoordinator::from_config(config).await {
            Ok(c) => c.with_dry_run(dry_run),
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize transfer");
                eprintln!("Failed to initialize transfer: {e}");
                return Ok(e.category().exit_code());
            }
        };

        println!("🚀 Starting transfer...");
        println!();

        let summary = match coordinator.run().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, category = ?e.category(), "Transfer failed");
                eprintln!("Transfer failed: {e}");
                return Ok(e.category().exit_code());
            }
        };

        print_summary(&summary);

        let exit_code = match summary.outcome {
            RunOutcome::NoNewRecords => {
                println!("✅ No new records to transfer.");
                0
            }
            RunOutcome::NothingToForward => {
                println!("✅ All records were already handled.");
                0
            }
            RunOutcome::DryRun => {
                println!("✅ Dry run completed. Nothing was posted.");
                0
            }
            RunOutcome::Completed if summary.is_successful() => {
                println!("✅ Transfer completed successfully!");
                0
            }
            RunOutcome::Completed => {
                println!("⚠️  Transfer completed with rejected or uncommitted records");
                0
            }
        };

        Ok(exit_code)
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Transfer Summary:");
    println!("  Run: {}", summary.run_id);
    println!("  Merged: {}", summary.merge.merged);
    println!(
        "  Forwarded: {} ({} already handled)",
        summary.dedup.forwarded, summary.dedup.duplicates_removed
    );

    if summary.outcome == RunOutcome::DryRun {
        let (creates, updates) = summary.planned_counts();
        println!("  Planned creates: {creates}");
        println!("  Planned updates: {updates}");
        println!("  Unresolved: {}", summary.resolution.unresolved);
        println!("  Without cause: {}", summary.no_cause);
        println!();
        for plan in &summary.planned {
            println!(
                "    {} {} (serial {}) -> {}{}",
                plan.action,
                plan.instance_id,
                plan.serial_no,
                plan.org_unit,
                plan.tracked_entity_id
                    .as_deref()
                    .map(|id| format!(" [{id}]"))
                    .unwrap_or_default()
            );
        }
    } else if summary.outcome == RunOutcome::Completed {
        println!("  Pushed: {}", summary.pushed());
        println!("  Pending verification: {}", summary.pending());
        println!("  Rejected: {}", summary.post.rejected);
        println!("  Quarantined: {}", summary.quarantined);
        println!("  Without cause: {}", summary.no_cause);
        println!("  Outcomes committed: {}", summary.commit.committed);
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    if let Some(report) = &summary.verification {
        if !report.failures.is_empty() {
            println!("⚠️  Not yet visible on DHIS2 (retried next run):");
            for (i, failure) in report.failures.iter().enumerate() {
                if i < 10 {
                    println!("    - {}: {}", failure.instance_id, failure.reason);
                }
            }
            if report.failures.len() > 10 {
                println!("    ... and {} more", report.failures.len() - 10);
            }
            println!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_defaults() {
        let args = RunArgs {
            yes: false,
            dry_run: false,
        };

        assert!(!args.yes);
        assert!(!args.dry_run);
    }

    #[tokio::test]
    async fn test_missing_config_exits_with_configuration_code() {
        let args = RunArgs {
            yes: true,
            dry_run: false,
        };
        let code = args
            .execute("/nonexistent/vatransfer.toml")
            .await
            .unwrap();
        assert_eq!(code, 2);
    }
}
