//! Export orchestration: window resolution, per-entity resampling, and
//! multi-format serialization.
//!
//! One export call resolves a time window, generates the target grid
//! once, then fans out per entity. Entities are independent; a store
//! failure or write failure on one never aborts the others, and the
//! report keeps per-entity and per-format detail so "no data" and
//! "failed" stay distinguishable.

pub mod formats;
pub mod writer;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::registry::{metadata_block, EntityRegistry, MetadataSelector};
use crate::resample::{downsample, target_grid};
use crate::storage::SampleStore;

pub use formats::FormatKind;

/// A validated export request over an inclusive time window.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub entity_keys: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: Duration,
    pub formats: Vec<FormatKind>,
    pub label: String,
}

impl ExportRequest {
    fn validate(&self) -> Result<()> {
        if self.formats.is_empty() {
            return Err(Error::InvalidRequest(
                "no valid export formats selected".to_string(),
            ));
        }
        if self.resolution <= Duration::zero() {
            return Err(Error::InvalidRequest(format!(
                "resolution must be positive, got {}s",
                self.resolution.num_seconds()
            )));
        }
        if self.end < self.start {
            return Err(Error::InvalidRequest(format!(
                "end {} precedes start {}",
                self.end, self.start
            )));
        }
        Ok(())
    }
}

/// Outcome of one export call.
///
/// `completed` maps each exported entity to its per-format output
/// paths. Entities with zero samples in range land in `no_data` and
/// nowhere else; store and write failures are recorded separately.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub completed: BTreeMap<String, BTreeMap<FormatKind, PathBuf>>,
    pub no_data: Vec<String>,
    pub store_failures: BTreeMap<String, String>,
    pub write_failures: BTreeMap<String, BTreeMap<FormatKind, String>>,
}

impl ExportReport {
    pub fn has_failures(&self) -> bool {
        !self.store_failures.is_empty() || !self.write_failures.is_empty()
    }

    /// Operator-facing summary distinguishing "nothing to export" from
    /// "export broke".
    pub fn summary(&self) -> String {
        if self.completed.is_empty() && !self.has_failures() {
            return if self.no_data.is_empty() {
                "no entities requested".to_string()
            } else {
                format!("no data to export ({} entities empty in range)", self.no_data.len())
            };
        }

        let files: usize = self.completed.values().map(|formats| formats.len()).sum();
        let mut parts = vec![format!(
            "{} entities exported ({} files)",
            self.completed.len(),
            files
        )];
        if !self.no_data.is_empty() {
            parts.push(format!("{} entities had no data", self.no_data.len()));
        }
        if !self.store_failures.is_empty() {
            parts.push(format!("{} entities failed to read", self.store_failures.len()));
        }
        if !self.write_failures.is_empty() {
            let writes: usize = self.write_failures.values().map(|formats| formats.len()).sum();
            parts.push(format!("{} format writes failed", writes));
        }
        parts.join(", ")
    }
}

enum EntityOutcome {
    NoData,
    StoreFailed(String),
    Written {
        files: BTreeMap<FormatKind, PathBuf>,
        errors: BTreeMap<FormatKind, String>,
    },
}

/// Replaces path-hostile characters so an entity key is safe inside a
/// file name.
fn sanitize_entity_key(entity_key: &str) -> String {
    entity_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn base_name(label: &str, entity_key: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}_{}",
        label,
        sanitize_entity_key(entity_key),
        start.date_naive(),
        end.date_naive()
    )
}

/// `[00:00:00, 24:00:00)` of the given date, minus one second.
pub fn day_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1) - Duration::seconds(1))
}

/// ISO week containing the given date: Monday 00:00:00 through the
/// following Monday minus one second.
pub fn week_window(any_day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let monday = any_day - Duration::days(any_day.weekday().num_days_from_monday() as i64);
    let start = monday.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(7) - Duration::seconds(1))
}

/// First of the month through first of the next month minus one second.
pub fn month_window(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::InvalidRequest(format!("invalid month: {}-{}", year, month)))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| Error::InvalidRequest(format!("invalid month: {}-{}", year, month)))?;

    let start = first.and_time(NaiveTime::MIN).and_utc();
    let end = next.and_time(NaiveTime::MIN).and_utc() - Duration::seconds(1);
    Ok((start, end))
}

/// Jan 1 through the following Jan 1 minus one second.
pub fn year_window(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| Error::InvalidRequest(format!("invalid year: {}", year)))?;
    let next = NaiveDate::from_ymd_opt(year + 1, 1, 1)
        .ok_or_else(|| Error::InvalidRequest(format!("invalid year: {}", year)))?;

    let start = first.and_time(NaiveTime::MIN).and_utc();
    let end = next.and_time(NaiveTime::MIN).and_utc() - Duration::seconds(1);
    Ok((start, end))
}

/// Drives resampling and format writing for a set of entities.
pub struct Exporter {
    store: Arc<dyn SampleStore>,
    registry: Arc<dyn EntityRegistry>,
    selector: Arc<dyn MetadataSelector>,
    export_dir: PathBuf,
}

impl Exporter {
    pub fn new(
        store: Arc<dyn SampleStore>,
        registry: Arc<dyn EntityRegistry>,
        selector: Arc<dyn MetadataSelector>,
        export_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let export_dir = export_dir.into();
        std::fs::create_dir_all(&export_dir)?;
        Ok(Self {
            store,
            registry,
            selector,
            export_dir,
        })
    }

    /// Runs one export request.
    ///
    /// Entities run concurrently; the report is keyed by entity so the
    /// result contract is independent of completion order. The call
    /// fails outright only on invalid input, or when every attempted
    /// entity/format pair failed.
    pub async fn export(&self, request: ExportRequest) -> Result<ExportReport> {
        request.validate()?;

        let grid = Arc::new(target_grid(request.start, request.end, request.resolution));
        let formats = Arc::new(request.formats.clone());
        tracing::info!(
            label = %request.label,
            entities = request.entity_keys.len(),
            targets = grid.len(),
            "starting export"
        );

        let mut handles: Vec<(String, JoinHandle<EntityOutcome>)> = Vec::new();
        for entity_key in &request.entity_keys {
            let store = Arc::clone(&self.store);
            let registry = Arc::clone(&self.registry);
            let selector = Arc::clone(&self.selector);
            let grid = Arc::clone(&grid);
            let formats = Arc::clone(&formats);
            let export_dir = self.export_dir.clone();
            let entity = entity_key.clone();
            let label = request.label.clone();
            let (start, end) = (request.start, request.end);

            handles.push((
                entity_key.clone(),
                tokio::spawn(async move {
                    export_entity(
                        store, registry, selector, export_dir, grid, formats, entity, start,
                        end, label,
                    )
                    .await
                }),
            ));
        }

        let mut report = ExportReport::default();
        for (entity, handle) in handles {
            match handle.await {
                Ok(EntityOutcome::NoData) => report.no_data.push(entity),
                Ok(EntityOutcome::StoreFailed(reason)) => {
                    tracing::warn!(entity = %entity, reason = %reason, "entity export failed");
                    report.store_failures.insert(entity, reason);
                }
                Ok(EntityOutcome::Written { files, errors }) => {
                    if !errors.is_empty() {
                        report.write_failures.insert(entity.clone(), errors);
                    }
                    if !files.is_empty() {
                        report.completed.insert(entity, files);
                    }
                }
                Err(join_err) => {
                    report
                        .store_failures
                        .insert(entity, format!("export task failed: {}", join_err));
                }
            }
        }

        let attempted_writes = !report.completed.is_empty() || !report.write_failures.is_empty();
        if attempted_writes && report.completed.is_empty() {
            return Err(Error::Write(format!(
                "every export attempt failed: {}",
                report.summary()
            )));
        }

        tracing::info!(summary = %report.summary(), "export finished");
        Ok(report)
    }

    /// Ad-hoc range export, labeled `manual`.
    pub async fn export_range(
        &self,
        entity_keys: Vec<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Duration,
        formats: Vec<FormatKind>,
    ) -> Result<ExportReport> {
        self.export(ExportRequest {
            entity_keys,
            start,
            end,
            resolution,
            formats,
            label: "manual".to_string(),
        })
        .await
    }

    pub async fn export_day(
        &self,
        entity_keys: Vec<String>,
        day: NaiveDate,
        resolution: Duration,
        formats: Vec<FormatKind>,
    ) -> Result<ExportReport> {
        let (start, end) = day_window(day);
        self.export(ExportRequest {
            entity_keys,
            start,
            end,
            resolution,
            formats,
            label: "day".to_string(),
        })
        .await
    }

    pub async fn export_week(
        &self,
        entity_keys: Vec<String>,
        any_day: NaiveDate,
        resolution: Duration,
        formats: Vec<FormatKind>,
    ) -> Result<ExportReport> {
        let (start, end) = week_window(any_day);
        self.export(ExportRequest {
            entity_keys,
            start,
            end,
            resolution,
            formats,
            label: "week".to_string(),
        })
        .await
    }

    pub async fn export_month(
        &self,
        entity_keys: Vec<String>,
        year: i32,
        month: u32,
        resolution: Duration,
        formats: Vec<FormatKind>,
    ) -> Result<ExportReport> {
        let (start, end) = month_window(year, month)?;
        self.export(ExportRequest {
            entity_keys,
            start,
            end,
            resolution,
            formats,
            label: "month".to_string(),
        })
        .await
    }

    pub async fn export_year(
        &self,
        entity_keys: Vec<String>,
        year: i32,
        resolution: Duration,
        formats: Vec<FormatKind>,
    ) -> Result<ExportReport> {
        let (start, end) = year_window(year)?;
        self.export(ExportRequest {
            entity_keys,
            start,
            end,
            resolution,
            formats,
            label: "year".to_string(),
        })
        .await
    }
}

#[allow(clippy::too_many_arguments)]
async fn export_entity(
    store: Arc<dyn SampleStore>,
    registry: Arc<dyn EntityRegistry>,
    selector: Arc<dyn MetadataSelector>,
    export_dir: PathBuf,
    grid: Arc<Vec<DateTime<Utc>>>,
    formats: Arc<Vec<FormatKind>>,
    entity_key: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    label: String,
) -> EntityOutcome {
    let samples = match store.range_query(&entity_key, start, end).await {
        Ok(samples) => samples,
        Err(err) => return EntityOutcome::StoreFailed(err.to_string()),
    };
    if samples.is_empty() {
        return EntityOutcome::NoData;
    }

    let selected = match selector.selected_fields(&entity_key).await {
        Ok(selected) => selected,
        Err(err) => return EntityOutcome::StoreFailed(err.to_string()),
    };
    let metadata = match registry.lookup(&entity_key).await {
        Ok(metadata) => metadata,
        Err(err) => return EntityOutcome::StoreFailed(err.to_string()),
    };
    let block = metadata_block(&entity_key, metadata.as_ref(), &selected);

    let pairs: Vec<_> = samples
        .iter()
        .map(|sample| (sample.timestamp, sample.value))
        .collect();
    let points = downsample(&pairs, &grid);

    let base = base_name(&label, &entity_key, start, end);
    let mut files = BTreeMap::new();
    let mut errors = BTreeMap::new();
    for &kind in formats.iter() {
        match writer::write_format(&export_dir, &base, kind, &points, &block) {
            Ok(path) => {
                files.insert(kind, path);
            }
            Err(err) => {
                tracing::warn!(entity = %entity_key, format = %kind, error = %err, "format write failed");
                errors.insert(kind, err.to_string());
            }
        }
    }

    EntityOutcome::Written { files, errors }
}
