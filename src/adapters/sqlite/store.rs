//! SQLite implementation of the transfer store
//!
//! A connection is opened for every operation and closed when it returns.
//! Blocking SQLite work runs on Tokio's blocking pool.

use crate::adapters::database::traits::TransferStore;
use crate::config::SecretString;
use crate::core::state::watermark::{RunStatus, RunWatermark};
use crate::domain::{
    DestinationIds, EventCategory, EventLogEntry, InstanceId, OrgUnitId, OutcomeLabel,
    QuarantineRecord, Result, TransferError, VaRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS va_outcome (
      id TEXT PRIMARY KEY,
      outcome TEXT NOT NULL,
      payload TEXT NOT NULL,
      recorded_at TEXT NOT NULL,
      org_unit TEXT NOT NULL,
      event_id TEXT,
      tracked_entity_id TEXT
    );
    CREATE TABLE IF NOT EXISTS va_quarantine (
      id TEXT PRIMARY KEY,
      record TEXT NOT NULL,
      attributes TEXT NOT NULL,
      raw_org_unit TEXT NOT NULL,
      inserted_at TEXT NOT NULL,
      resolved INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS event_log (
      seq INTEGER PRIMARY KEY AUTOINCREMENT,
      description TEXT NOT NULL,
      category TEXT NOT NULL,
      timestamp TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS run_watermark (
      run_id TEXT PRIMARY KEY,
      started_at TEXT NOT NULL,
      completed_at TEXT,
      status TEXT NOT NULL,
      records_pushed INTEGER NOT NULL DEFAULT 0,
      last_error TEXT
    );
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Transfer store backed by one SQLite file
///
/// With the `sqlcipher` feature the file is encrypted using `store.key`.
#[derive(Clone)]
pub struct SqliteTransferStore {
    path: PathBuf,
    key: Option<SecretString>,
}

impl SqliteTransferStore {
    /// Open the store, creating the parent directory and the schema
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created and a store
    /// error if the file cannot be opened, decrypted or initialised.
    pub async fn open(path: impl AsRef<Path>, key: Option<SecretString>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TransferError::Io(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let store = Self { path, key };
        store
            .with_connection(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;

        tracing::debug!(path = %store.path.display(), "Transfer store schema ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(path: &Path, key: Option<&SecretString>) -> Result<Connection> {
        let conn = Connection::open(path)?;
        if let Some(key) = key {
            conn.pragma_update(None, "key", key.expose_secret().as_str())?;
        }
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    async fn with_connection<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let key = self.key.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Self::connect(&path, key.as_ref())?;
            operation(&mut conn)
        })
        .await
        .map_err(|e| TransferError::Store(format!("Store task failed: {e}")))?
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TransferError::Store(format!("Invalid timestamp '{raw}' in store: {e}")))
}

fn parse_instance_id(raw: String) -> Result<InstanceId> {
    InstanceId::new(raw).map_err(TransferError::Store)
}

/// JSON object of attribute name to value
fn outcome_payload(record: &VaRecord) -> Result<String> {
    let map: serde_json::Map<String, serde_json::Value> = record
        .attribute_pairs()
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    Ok(serde_json::to_string(&map)?)
}

/// JSON array of `[entity, attribute, value]` triples
fn eav_triples(record: &VaRecord) -> Result<String> {
    let entity = record.instance_id.to_string();
    let triples: Vec<[String; 3]> = record
        .attribute_pairs()
        .into_iter()
        .map(|(attribute, value)| [entity.clone(), attribute, value])
        .collect();
    Ok(serde_json::to_string(&triples)?)
}

type QuarantineRow = (String, String, String, String, String, i64);

fn quarantine_from_row(row: QuarantineRow) -> Result<QuarantineRecord> {
    let (id, record, attributes, raw_org_unit, inserted_at, resolved) = row;
    Ok(QuarantineRecord {
        id: parse_instance_id(id)?,
        record,
        attributes,
        raw_org_unit,
        inserted_at: parse_timestamp(&inserted_at)?,
        resolved: resolved != 0,
    })
}

#[async_trait]
impl TransferStore for SqliteTransferStore {
    async fn record_outcome(
        &self,
        record: &VaRecord,
        outcome: OutcomeLabel,
        org_unit: &OrgUnitId,
        destination_ids: &DestinationIds,
    ) -> Result<bool> {
        let id = record.instance_id.to_string();
        let payload = outcome_payload(record)?;
        let org_unit = org_unit.to_string();
        let ids = destination_ids.clone();

        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO va_outcome
                   (id, outcome, payload, recorded_at, org_unit, event_id, tracked_entity_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    outcome.as_str(),
                    payload,
                    now_timestamp(),
                    org_unit,
                    ids.event_id,
                    ids.tracked_entity_id
                ],
            )?;
            tx.commit()?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn record_unresolved_org_unit(
        &self,
        record: &VaRecord,
        raw_value: &str,
    ) -> Result<bool> {
        let id = record.instance_id.to_string();
        let record_json = serde_json::to_string(record)?;
        let attributes = eav_triples(record)?;
        let raw_value = raw_value.to_string();

        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO va_quarantine
                   (id, record, attributes, raw_org_unit, inserted_at, resolved)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![id, record_json, attributes, raw_value, now_timestamp()],
            )?;
            tx.commit()?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn list_outcome_identifiers(&self) -> Result<HashSet<InstanceId>> {
        let ids: Vec<String> = self
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT id FROM va_outcome")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        ids.into_iter().map(parse_instance_id).collect()
    }

    async fn list_unresolved_identifiers(&self) -> Result<HashSet<InstanceId>> {
        let ids: Vec<String> = self
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT id FROM va_quarantine")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        ids.into_iter().map(parse_instance_id).collect()
    }

    async fn remove_unresolved(&self, id: &InstanceId) -> Result<bool> {
        let id = id.to_string();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM va_quarantine WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn append_event(&self, description: &str, category: EventCategory) -> Result<()> {
        let description = description.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO event_log (description, category, timestamp) VALUES (?1, ?2, ?3)",
                params![description, category.as_str(), now_timestamp()],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_unresolved(&self, id: &InstanceId) -> Result<Option<QuarantineRecord>> {
        let id = id.to_string();
        let row: Option<QuarantineRow> = self
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, record, attributes, raw_org_unit, inserted_at, resolved
                         FROM va_quarantine WHERE id = ?1",
                        params![id],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                            ))
                        },
                    )
                    .optional()?)
            })
            .await?;
        row.map(quarantine_from_row).transpose()
    }

    async fn list_unresolved(&self) -> Result<Vec<QuarantineRecord>> {
        let rows: Vec<QuarantineRow> = self
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, record, attributes, raw_org_unit, inserted_at, resolved
                     FROM va_quarantine ORDER BY inserted_at, id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        rows.into_iter().map(quarantine_from_row).collect()
    }

    async fn outcome_counts(&self) -> Result<Vec<(OutcomeLabel, u64)>> {
        let rows: Vec<(String, i64)> = self
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT outcome, COUNT(*) FROM va_outcome GROUP BY outcome ORDER BY outcome",
                )?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for (label, count) in rows {
            match label.parse::<OutcomeLabel>() {
                Ok(label) => counts.push((label, count.max(0) as u64)),
                Err(e) => tracing::warn!(error = %e, "Skipping unknown outcome label in store"),
            }
        }
        Ok(counts)
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<EventLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String, String, String)> = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT description, category, timestamp FROM event_log
                     ORDER BY seq DESC LIMIT ?1",
                )?;
                let rows =
                    stmt.query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;

        rows.into_iter()
            .map(|(description, category, timestamp)| {
                Ok(EventLogEntry {
                    description,
                    category: category.parse().map_err(TransferError::Store)?,
                    timestamp: parse_timestamp(&timestamp)?,
                })
            })
            .collect()
    }

    async fn save_run_watermark(&self, watermark: &RunWatermark) -> Result<()> {
        let run_id = watermark.run_id.to_string();
        let started_at = format_timestamp(&watermark.started_at);
        let completed_at = watermark.completed_at.as_ref().map(format_timestamp);
        let status = watermark.status.as_str();
        let records_pushed = i64::try_from(watermark.records_pushed).unwrap_or(i64::MAX);
        let last_error = watermark.last_error.clone();

        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO run_watermark
                   (run_id, started_at, completed_at, status, records_pushed, last_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(run_id) DO UPDATE SET
                   completed_at = excluded.completed_at,
                   status = excluded.status,
                   records_pushed = excluded.records_pushed,
                   last_error = excluded.last_error",
                params![run_id, started_at, completed_at, status, records_pushed, last_error],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_last_run(&self) -> Result<Option<RunWatermark>> {
        type RunRow = (String, String, Option<String>, String, i64, Option<String>);
        let row: Option<RunRow> = self
            .with_connection(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT run_id, started_at, completed_at, status, records_pushed, last_error
                         FROM run_watermark ORDER BY started_at DESC LIMIT 1",
                        [],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                            ))
                        },
                    )
                    .optional()?)
            })
            .await?;

        let Some((run_id, started_at, completed_at, status, records_pushed, last_error)) = row
        else {
            return Ok(None);
        };

        Ok(Some(RunWatermark {
            run_id: uuid::Uuid::parse_str(&run_id)
                .map_err(|e| TransferError::Store(format!("Invalid run id '{run_id}': {e}")))?,
            started_at: parse_timestamp(&started_at)?,
            completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
            status: status
                .parse::<RunStatus>()
                .map_err(TransferError::Store)?,
            records_pushed: records_pushed.max(0) as u64,
            last_error,
        }))
    }
}
