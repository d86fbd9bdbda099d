//! Repair command implementation
//!
//! Releases one quarantined record so the next run picks it up again.

use crate::adapters::database::create_transfer_store;
use crate::config::load_config;
use crate::core::state::{repair_quarantined, RepairTarget, StateManager};
use crate::domain::{InstanceId, OrgUnitId};
use clap::Args;

/// Arguments for the repair command
#[derive(Args, Debug)]
pub struct RepairArgs {
    /// Instance id of the quarantined record
    pub instance_id: String,

    /// Organisation unit to write into the record's org unit field
    #[arg(long, value_name = "UID")]
    pub org_unit: Option<String>,
}

impl RepairArgs {
    /// Execute the repair command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(instance_id = %self.instance_id, "Repairing quarantined record");

        let id = InstanceId::new(self.instance_id.as_str()).map_err(anyhow::Error::msg)?;
        let org_unit = self
            .org_unit
            .as_deref()
            .map(OrgUnitId::new)
            .transpose()
            .map_err(anyhow::Error::msg)?;

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(e.category().exit_code());
            }
        };

        let state = match create_transfer_store(&config.store).await {
            Ok(store) => StateManager::new(store),
            Err(e) => {
                println!("❌ Failed to open transfer store");
                println!("   Error: {e}");
                return Ok(e.category().exit_code());
            }
        };

        let carry_over = config.transfer.carry_over_path();
        let schema = config.transfer.column_schema();
        let target = RepairTarget {
            carry_over: &carry_over,
            schema: &schema,
            org_unit_field: &config.org_unit.field_name,
        };

        match repair_quarantined(&state, target, &id, org_unit.as_ref()).await {
            Ok(record) => {
                println!("✅ Record {} released from quarantine", record.instance_id);
                if let Some(org_unit) = &org_unit {
                    println!("   {} = {}", config.org_unit.field_name, org_unit);
                }
                println!("   It will be retried on the next 'vatransfer run'.");
                Ok(0)
            }
            Err(e) => {
                println!("❌ Repair failed");
                println!("   Error: {e}");
                Ok(e.category().exit_code())
            }
        }
    }
}
