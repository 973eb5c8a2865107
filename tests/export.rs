use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

use histore_core::error::{Error, Result};
use histore_core::export::{
    day_window, month_window, week_window, year_window, ExportRequest, Exporter, FormatKind,
};
use histore_core::registry::{
    EntityMetadata, EntityRegistry, MetadataField, MetadataSelector,
};
use histore_core::samples::Sample;
use histore_core::storage::{DuckDbBackend, SampleStore};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn create_test_store() -> Arc<DuckDbBackend> {
    let backend = DuckDbBackend::new(":memory:", std::time::Duration::from_secs(5)).unwrap();
    backend.init().await.unwrap();
    Arc::new(backend)
}

fn create_exporter(store: &Arc<DuckDbBackend>, dir: &std::path::Path) -> Exporter {
    Exporter::new(store.clone(), store.clone(), store.clone(), dir).unwrap()
}

fn request(entities: Vec<&str>, formats: Vec<FormatKind>) -> ExportRequest {
    ExportRequest {
        entity_keys: entities.into_iter().map(String::from).collect(),
        start: at(0),
        end: at(10),
        resolution: Duration::seconds(5),
        formats,
        label: "manual".to_string(),
    }
}

// --- calendar windows ---

#[test]
fn day_window_spans_one_day_minus_a_second() {
    let (start, end) = day_window(date(2024, 3, 13));
    assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 13, 0, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 13, 23, 59, 59).unwrap());
}

#[test]
fn week_window_anchors_wednesday_to_monday() {
    // 2024-03-13 is a Wednesday.
    let (start, end) = week_window(date(2024, 3, 13));
    assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 17, 23, 59, 59).unwrap());
}

#[test]
fn week_window_on_monday_is_identity() {
    let (start, _) = week_window(date(2024, 3, 11));
    assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
}

#[test]
fn month_window_handles_leap_february() {
    let (start, end) = month_window(2024, 2).unwrap();
    assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());
}

#[test]
fn month_window_rolls_december_into_january() {
    let (start, end) = month_window(2024, 12).unwrap();
    assert_eq!(start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap());
}

#[test]
fn month_window_rejects_invalid_month() {
    assert!(matches!(month_window(2024, 13), Err(Error::InvalidRequest(_))));
}

#[test]
fn year_window_spans_the_year() {
    let (start, end) = year_window(2024).unwrap();
    assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap());
}

// --- request validation ---

#[tokio::test]
async fn empty_format_set_is_rejected_before_io() {
    let store = create_test_store().await;
    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());

    let result = exporter.export(request(vec!["sensor.a"], vec![])).await;
    assert!(matches!(result, Err(Error::InvalidRequest(_))));
}

#[tokio::test]
async fn non_positive_resolution_is_rejected() {
    let store = create_test_store().await;
    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());

    let mut req = request(vec!["sensor.a"], vec![FormatKind::Csv]);
    req.resolution = Duration::zero();
    assert!(matches!(exporter.export(req).await, Err(Error::InvalidRequest(_))));
}

#[tokio::test]
async fn end_before_start_is_rejected() {
    let store = create_test_store().await;
    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());

    let mut req = request(vec!["sensor.a"], vec![FormatKind::Csv]);
    req.start = at(100);
    req.end = at(0);
    assert!(matches!(exporter.export(req).await, Err(Error::InvalidRequest(_))));
}

// --- orchestration ---

#[tokio::test]
async fn entity_without_samples_is_silently_omitted() {
    let store = create_test_store().await;
    store.append("sensor.a", at(0), 10.0).await.unwrap();
    store.append("sensor.a", at(10), 20.0).await.unwrap();

    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());
    let report = exporter
        .export(request(vec!["sensor.a", "sensor.empty"], vec![FormatKind::Csv]))
        .await
        .unwrap();

    assert!(report.completed.contains_key("sensor.a"));
    assert!(!report.completed.contains_key("sensor.empty"));
    assert_eq!(report.no_data, vec!["sensor.empty".to_string()]);
    assert!(!report.has_failures());

    let stray: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().contains("sensor_empty"))
        .collect();
    assert!(stray.is_empty());
}

#[tokio::test]
async fn csv_export_contains_resampled_rows() {
    let store = create_test_store().await;
    store.append("sensor.a", at(0), 10.0).await.unwrap();
    store.append("sensor.a", at(10), 20.0).await.unwrap();

    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());
    let report = exporter
        .export(request(vec!["sensor.a"], vec![FormatKind::Csv]))
        .await
        .unwrap();

    let path = &report.completed["sensor.a"][&FormatKind::Csv];
    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        "manual_sensor_a_1970-01-01_1970-01-01.csv"
    );

    let content = fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "timestamp,value,data_accuracy");
    assert_eq!(lines[1], "1970-01-01T00:00:00Z,10,raw");
    assert_eq!(lines[2], "1970-01-01T00:00:05Z,15,mean");
    assert_eq!(lines[3], "1970-01-01T00:00:10Z,20,raw");
}

#[tokio::test]
async fn metadata_block_leads_text_exports() {
    let store = create_test_store().await;
    store.append("sensor.a", at(0), 10.0).await.unwrap();
    store
        .add_entity(&histore_core::entities::EntityRecord {
            entity_key: "sensor.a".to_string(),
            domain: "sensor".to_string(),
            area: Some("Kitchen".to_string()),
            device: None,
            friendly_name: None,
            auto_added: false,
            last_metadata_update: None,
        })
        .await
        .unwrap();
    store
        .set_field_selected("sensor.a", MetadataField::AreaName, true)
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());
    let report = exporter
        .export(request(vec!["sensor.a"], vec![FormatKind::Csv, FormatKind::Json, FormatKind::Html]))
        .await
        .unwrap();

    let files = &report.completed["sensor.a"];

    let csv = fs::read_to_string(&files[&FormatKind::Csv]).unwrap();
    assert!(csv.starts_with("# Entity: sensor.a\n# area_name: Kitchen\n"));

    let json = fs::read_to_string(&files[&FormatKind::Json]).unwrap();
    assert!(json.starts_with("// # Entity: sensor.a\n// # area_name: Kitchen\n"));

    let html = fs::read_to_string(&files[&FormatKind::Html]).unwrap();
    assert!(html.starts_with("<!--\n# Entity: sensor.a\n# area_name: Kitchen\n-->\n"));
}

#[tokio::test]
async fn rerunning_an_export_is_byte_identical() {
    let store = create_test_store().await;
    store.append("sensor.a", at(0), 10.0).await.unwrap();
    store.append("sensor.a", at(7), 17.5).await.unwrap();

    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());

    let first = exporter
        .export(request(vec!["sensor.a"], vec![FormatKind::Csv, FormatKind::Json]))
        .await
        .unwrap();
    let csv_first = fs::read(&first.completed["sensor.a"][&FormatKind::Csv]).unwrap();
    let json_first = fs::read(&first.completed["sensor.a"][&FormatKind::Json]).unwrap();

    let second = exporter
        .export(request(vec!["sensor.a"], vec![FormatKind::Csv, FormatKind::Json]))
        .await
        .unwrap();
    let csv_second = fs::read(&second.completed["sensor.a"][&FormatKind::Csv]).unwrap();
    let json_second = fs::read(&second.completed["sensor.a"][&FormatKind::Json]).unwrap();

    assert_eq!(
        first.completed["sensor.a"][&FormatKind::Csv],
        second.completed["sensor.a"][&FormatKind::Csv]
    );
    assert_eq!(csv_first, csv_second);
    assert_eq!(json_first, json_second);
}

#[tokio::test]
async fn every_format_produces_a_file() {
    let store = create_test_store().await;
    store.append("sensor.a", at(0), 10.0).await.unwrap();
    store.append("sensor.a", at(10), 20.0).await.unwrap();

    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());
    let report = exporter
        .export(request(vec!["sensor.a"], FormatKind::ALL.to_vec()))
        .await
        .unwrap();

    let files = &report.completed["sensor.a"];
    assert_eq!(files.len(), FormatKind::ALL.len());
    for kind in FormatKind::ALL {
        let path = &files[&kind];
        assert_eq!(path.extension().unwrap().to_string_lossy(), kind.extension());
        assert!(fs::metadata(path).unwrap().len() > 0);
    }
}

#[tokio::test]
async fn sqlite_export_round_trips_rows() {
    let store = create_test_store().await;
    store.append("sensor.a", at(0), 10.0).await.unwrap();
    store.append("sensor.a", at(10), 20.0).await.unwrap();
    store
        .add_entity(&histore_core::entities::EntityRecord {
            entity_key: "sensor.a".to_string(),
            domain: "sensor".to_string(),
            area: Some("Kitchen".to_string()),
            device: None,
            friendly_name: None,
            auto_added: false,
            last_metadata_update: None,
        })
        .await
        .unwrap();
    store
        .set_field_selected("sensor.a", MetadataField::AreaName, true)
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());
    let report = exporter
        .export(request(vec!["sensor.a"], vec![FormatKind::Sqlite]))
        .await
        .unwrap();

    let path = &report.completed["sensor.a"][&FormatKind::Sqlite];
    let conn = rusqlite::Connection::open(path).unwrap();
    let rows: i64 = conn
        .query_row("SELECT count(*) FROM export", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 3);

    let accuracy: String = conn
        .query_row(
            "SELECT data_accuracy FROM export WHERE timestamp = '1970-01-01T00:00:05Z'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(accuracy, "mean");

    let meta_rows: i64 = conn
        .query_row("SELECT count(*) FROM export_metadata", [], |row| row.get(0))
        .unwrap();
    assert_eq!(meta_rows, 2);
}

#[tokio::test]
async fn ipc_exports_read_back_with_comments() {
    let store = create_test_store().await;
    store.append("sensor.a", at(0), 10.0).await.unwrap();
    store.append("sensor.a", at(10), 20.0).await.unwrap();
    store
        .add_entity(&histore_core::entities::EntityRecord {
            entity_key: "sensor.a".to_string(),
            domain: "sensor".to_string(),
            area: Some("Kitchen".to_string()),
            device: None,
            friendly_name: None,
            auto_added: false,
            last_metadata_update: None,
        })
        .await
        .unwrap();
    store
        .set_field_selected("sensor.a", MetadataField::AreaName, true)
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());
    let report = exporter
        .export(request(vec!["sensor.a"], vec![FormatKind::Feather, FormatKind::Arrow]))
        .await
        .unwrap();

    for kind in [FormatKind::Feather, FormatKind::Arrow] {
        let path = &report.completed["sensor.a"][&kind];
        let file = fs::File::open(path).unwrap();
        let mut reader = arrow::ipc::reader::FileReader::try_new(file, None).unwrap();
        let comments = reader.schema().metadata().get("comments").cloned();
        assert_eq!(
            comments.as_deref(),
            Some("# Entity: sensor.a\n# area_name: Kitchen")
        );
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 3);
    }
}

// --- failure handling ---

struct FailingStore;

#[async_trait]
impl SampleStore for FailingStore {
    async fn append(&self, _entity_key: &str, _ts: DateTime<Utc>, _value: f64) -> Result<()> {
        Err(Error::Storage("store offline".to_string()))
    }

    async fn range_query(
        &self,
        _entity_key: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Sample>> {
        Err(Error::Storage("store offline".to_string()))
    }
}

#[async_trait]
impl EntityRegistry for FailingStore {
    async fn lookup(&self, _entity_key: &str) -> Result<Option<EntityMetadata>> {
        Ok(None)
    }
}

#[async_trait]
impl MetadataSelector for FailingStore {
    async fn selected_fields(&self, _entity_key: &str) -> Result<BTreeSet<MetadataField>> {
        Ok(BTreeSet::new())
    }
}

#[tokio::test]
async fn store_failure_is_recorded_per_entity() {
    let failing = Arc::new(FailingStore);
    let dir = tempdir().unwrap();
    let exporter = Exporter::new(
        failing.clone(),
        failing.clone(),
        failing.clone(),
        dir.path(),
    )
    .unwrap();

    let report = exporter
        .export(request(vec!["sensor.a", "sensor.b"], vec![FormatKind::Csv]))
        .await
        .unwrap();

    assert!(report.completed.is_empty());
    assert_eq!(report.store_failures.len(), 2);
    assert!(report.store_failures["sensor.a"].contains("store offline"));
    assert!(report.summary().contains("failed to read"));
}

#[tokio::test]
async fn all_write_failures_surface_as_aggregate_error() {
    let store = create_test_store().await;
    store.append("sensor.a", at(0), 10.0).await.unwrap();

    let base = tempdir().unwrap();
    let export_dir = base.path().join("out");
    let exporter = create_exporter(&store, &export_dir);

    // Replace the export directory with a plain file so every write
    // fails.
    fs::remove_dir_all(&export_dir).unwrap();
    fs::write(&export_dir, b"blocker").unwrap();

    let result = exporter
        .export(request(vec!["sensor.a"], vec![FormatKind::Csv, FormatKind::Json]))
        .await;
    assert!(matches!(result, Err(Error::Write(_))));
}

#[tokio::test]
async fn entities_export_independently() {
    let store = create_test_store().await;
    store.append("sensor.a", at(0), 10.0).await.unwrap();
    store.append("sensor.b", at(0), 11.0).await.unwrap();

    let dir = tempdir().unwrap();
    let exporter = create_exporter(&store, dir.path());
    let report = exporter
        .export(request(vec!["sensor.a", "sensor.b"], vec![FormatKind::Csv]))
        .await
        .unwrap();

    assert_eq!(report.completed.len(), 2);
    assert!(report.summary().contains("2 entities exported"));
}
