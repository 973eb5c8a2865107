//! DuckDB-backed sample store.
//!
//! One embedded database file holds the raw sample log plus the
//! supporting tables: known entities, per-entity metadata selection,
//! the metadata change log, and period statistics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use crate::entities::{EntityRecord, EntityUpdate, MetadataChange};
use crate::error::{Error, Result};
use crate::registry::{EntityMetadata, EntityRegistry, MetadataField, MetadataSelector};
use crate::samples::Sample;
use crate::stats::PeriodStats;
use crate::storage::SampleStore;

/// Embedded DuckDB store behind a single async lock.
///
/// The lock serializes every read and write; waiting for it is bounded
/// by the operation timeout so no caller blocks indefinitely on a
/// wedged connection.
pub struct DuckDbBackend {
    conn: Arc<Mutex<Connection>>,
    op_timeout: Duration,
}

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::Storage(format!("timestamp out of range: {}", micros)))
}

impl DuckDbBackend {
    /// Opens (or creates) the database at `path`. `":memory:"` opens a
    /// transient in-memory database.
    pub fn new(path: &str, op_timeout: Duration) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            op_timeout,
        })
    }

    async fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        tokio::time::timeout(self.op_timeout, self.conn.lock())
            .await
            .map_err(|_| Error::Storage("timed out waiting for store lock".to_string()))
    }

    /// Creates all tables and indexes if they do not exist.
    pub async fn init(&self) -> Result<()> {
        let conn = self.lock().await?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS samples (
                entity_id TEXT NOT NULL,
                ts BIGINT NOT NULL,
                value DOUBLE NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_samples_entity_ts ON samples(entity_id, ts);
            CREATE TABLE IF NOT EXISTS entities (
                entity_id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                area TEXT,
                device TEXT,
                friendly_name TEXT,
                auto_added BOOLEAN NOT NULL DEFAULT false,
                last_metadata_update BIGINT
            );
            CREATE TABLE IF NOT EXISTS metadata_changes (
                entity_id TEXT NOT NULL,
                ts BIGINT NOT NULL,
                old_area TEXT,
                new_area TEXT,
                old_device TEXT,
                new_device TEXT,
                old_name TEXT,
                new_name TEXT
            );
            CREATE TABLE IF NOT EXISTS entity_metadata_selection (
                entity_id TEXT NOT NULL,
                field_name TEXT NOT NULL,
                selected BOOLEAN NOT NULL,
                PRIMARY KEY (entity_id, field_name)
            );
            CREATE TABLE IF NOT EXISTS stats (
                entity_id TEXT NOT NULL,
                period_start BIGINT NOT NULL,
                period_end BIGINT NOT NULL,
                first_value DOUBLE,
                last_value DOUBLE,
                mean_value DOUBLE,
                mode_value DOUBLE,
                min_value DOUBLE,
                max_value DOUBLE,
                PRIMARY KEY (entity_id, period_start, period_end)
            );",
        )?;
        Ok(())
    }

    /// Registers an entity; an already-known key is left untouched.
    pub async fn add_entity(&self, record: &EntityRecord) -> Result<()> {
        let conn = self.lock().await?;
        conn.execute(
            "INSERT OR IGNORE INTO entities (
                entity_id, domain, area, device, friendly_name,
                auto_added, last_metadata_update
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.entity_key,
                record.domain,
                record.area,
                record.device,
                record.friendly_name,
                record.auto_added,
                record.last_metadata_update.map(to_micros),
            ],
        )?;
        Ok(())
    }

    pub async fn get_entity(&self, entity_key: &str) -> Result<Option<EntityRecord>> {
        let conn = self.lock().await?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, domain, area, device, friendly_name,
                    auto_added, last_metadata_update
             FROM entities WHERE entity_id = ?",
        )?;
        let mut rows = stmt.query_map(params![entity_key], row_to_entity)?;
        match rows.next() {
            Some(row) => Ok(Some(row??)),
            None => Ok(None),
        }
    }

    pub async fn list_entities(&self) -> Result<Vec<EntityRecord>> {
        let conn = self.lock().await?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, domain, area, device, friendly_name,
                    auto_added, last_metadata_update
             FROM entities ORDER BY entity_id",
        )?;
        let rows = stmt.query_map([], row_to_entity)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row??);
        }
        Ok(entities)
    }

    /// Applies a partial metadata update.
    ///
    /// Unset fields keep their stored value. A detected change is
    /// appended to the metadata change log before the record is
    /// rewritten; an update that changes nothing is a no-op.
    pub async fn update_entity(&self, entity_key: &str, update: &EntityUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let Some(current) = self.get_entity(entity_key).await? else {
            return Ok(());
        };

        let new_area = update.area.clone().or(current.area.clone());
        let new_device = update.device.clone().or(current.device.clone());
        let new_name = update.friendly_name.clone().or(current.friendly_name.clone());

        if new_area == current.area && new_device == current.device && new_name == current.friendly_name {
            return Ok(());
        }

        let now = to_micros(Utc::now());
        let conn = self.lock().await?;
        conn.execute(
            "INSERT INTO metadata_changes (
                entity_id, ts, old_area, new_area,
                old_device, new_device, old_name, new_name
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entity_key,
                now,
                current.area,
                new_area,
                current.device,
                new_device,
                current.friendly_name,
                new_name,
            ],
        )?;
        conn.execute(
            "UPDATE entities
             SET area = ?, device = ?, friendly_name = ?, last_metadata_update = ?
             WHERE entity_id = ?",
            params![new_area, new_device, new_name, now, entity_key],
        )?;
        Ok(())
    }

    pub async fn list_metadata_changes(&self, entity_key: &str) -> Result<Vec<MetadataChange>> {
        let conn = self.lock().await?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, ts, old_area, new_area, old_device, new_device, old_name, new_name
             FROM metadata_changes WHERE entity_id = ? ORDER BY ts",
        )?;
        let rows = stmt.query_map(params![entity_key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;
        let mut changes = Vec::new();
        for row in rows {
            let (entity_key, ts, old_area, new_area, old_device, new_device, old_name, new_name) =
                row?;
            changes.push(MetadataChange {
                entity_key,
                timestamp: from_micros(ts)?,
                old_area,
                new_area,
                old_device,
                new_device,
                old_name,
                new_name,
            });
        }
        Ok(changes)
    }

    /// Marks one metadata field as selected or deselected for exports.
    pub async fn set_field_selected(
        &self,
        entity_key: &str,
        field: MetadataField,
        selected: bool,
    ) -> Result<()> {
        let conn = self.lock().await?;
        conn.execute(
            "INSERT INTO entity_metadata_selection (entity_id, field_name, selected)
             VALUES (?, ?, ?)
             ON CONFLICT (entity_id, field_name) DO UPDATE SET selected = excluded.selected",
            params![entity_key, field.as_str(), selected],
        )?;
        Ok(())
    }

    /// Stores period statistics, replacing an earlier run of the same
    /// period.
    pub async fn record_period_stats(
        &self,
        entity_key: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        stats: &PeriodStats,
    ) -> Result<()> {
        let conn = self.lock().await?;
        conn.execute(
            "INSERT INTO stats (
                entity_id, period_start, period_end,
                first_value, last_value, mean_value, mode_value, min_value, max_value
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (entity_id, period_start, period_end) DO UPDATE SET
                first_value = excluded.first_value,
                last_value = excluded.last_value,
                mean_value = excluded.mean_value,
                mode_value = excluded.mode_value,
                min_value = excluded.min_value,
                max_value = excluded.max_value",
            params![
                entity_key,
                to_micros(period_start),
                to_micros(period_end),
                stats.first,
                stats.last,
                stats.mean,
                stats.mode,
                stats.min,
                stats.max,
            ],
        )?;
        Ok(())
    }

    pub async fn get_period_stats(
        &self,
        entity_key: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<PeriodStats>> {
        let conn = self.lock().await?;
        let mut stmt = conn.prepare(
            "SELECT first_value, last_value, mean_value, mode_value, min_value, max_value
             FROM stats
             WHERE entity_id = ? AND period_start = ? AND period_end = ?",
        )?;
        let mut rows = stmt.query_map(
            params![entity_key, to_micros(period_start), to_micros(period_end)],
            |row| {
                Ok(PeriodStats {
                    first: row.get(0)?,
                    last: row.get(1)?,
                    mean: row.get(2)?,
                    mode: row.get(3)?,
                    min: row.get(4)?,
                    max: row.get(5)?,
                })
            },
        )?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

fn row_to_entity(row: &duckdb::Row<'_>) -> duckdb::Result<Result<EntityRecord>> {
    let entity_key: String = row.get(0)?;
    let domain: String = row.get(1)?;
    let area: Option<String> = row.get(2)?;
    let device: Option<String> = row.get(3)?;
    let friendly_name: Option<String> = row.get(4)?;
    let auto_added: bool = row.get(5)?;
    let last_update: Option<i64> = row.get(6)?;

    Ok(last_update
        .map(from_micros)
        .transpose()
        .map(|last_metadata_update| EntityRecord {
            entity_key,
            domain,
            area,
            device,
            friendly_name,
            auto_added,
            last_metadata_update,
        }))
}

#[async_trait]
impl SampleStore for DuckDbBackend {
    async fn append(&self, entity_key: &str, timestamp: DateTime<Utc>, value: f64) -> Result<()> {
        let conn = self.lock().await?;
        conn.execute(
            "INSERT INTO samples (entity_id, ts, value) VALUES (?, ?, ?)",
            params![entity_key, to_micros(timestamp), value],
        )?;
        Ok(())
    }

    async fn range_query(
        &self,
        entity_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>> {
        let conn = self.lock().await?;
        let mut stmt = conn.prepare(
            "SELECT ts, value FROM samples
             WHERE entity_id = ? AND ts >= ? AND ts <= ?
             ORDER BY ts",
        )?;
        let rows = stmt.query_map(
            params![entity_key, to_micros(start), to_micros(end)],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;

        let mut samples = Vec::new();
        for row in rows {
            let (ts, value) = row?;
            samples.push(Sample {
                entity_key: entity_key.to_string(),
                timestamp: from_micros(ts)?,
                value,
            });
        }
        Ok(samples)
    }
}

#[async_trait]
impl MetadataSelector for DuckDbBackend {
    async fn selected_fields(&self, entity_key: &str) -> Result<BTreeSet<MetadataField>> {
        let conn = self.lock().await?;
        let mut stmt = conn.prepare(
            "SELECT field_name FROM entity_metadata_selection
             WHERE entity_id = ? AND selected",
        )?;
        let rows = stmt.query_map(params![entity_key], |row| row.get::<_, String>(0))?;

        let mut fields = BTreeSet::new();
        for row in rows {
            if let Some(field) = MetadataField::parse(&row?) {
                fields.insert(field);
            }
        }
        Ok(fields)
    }
}

#[async_trait]
impl EntityRegistry for DuckDbBackend {
    async fn lookup(&self, entity_key: &str) -> Result<Option<EntityMetadata>> {
        let entity = self.get_entity(entity_key).await?;
        Ok(entity.map(|record| EntityMetadata {
            integration_domain: Some(record.domain),
            area_name: record.area,
            device_name: record.device,
            entity_name: record.friendly_name,
            ..Default::default()
        }))
    }
}
