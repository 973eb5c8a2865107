//! Serializes a resampled table plus metadata header into one of the
//! supported output formats.
//!
//! Text formats (CSV/JSON/HTML) lead with the metadata lines in the
//! format's native comment syntax. Columnar and database formats carry
//! the same three columns and attach the metadata lines where the
//! container allows: a `metadata` side sheet (XLSX), an
//! `export_metadata` side table (SQLite), or `comments` key-value /
//! schema metadata (Parquet, Feather, Arrow).

use arrow::ipc::writer::FileWriter;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::export::formats::FormatKind;
use crate::samples::{export_record_batch, format_timestamp, ResampledPoint};

#[derive(Serialize)]
struct ExportRow {
    timestamp: String,
    value: f64,
    data_accuracy: &'static str,
}

fn rows(points: &[ResampledPoint]) -> Vec<ExportRow> {
    points
        .iter()
        .map(|point| ExportRow {
            timestamp: format_timestamp(point.timestamp),
            value: point.value,
            data_accuracy: point.accuracy.as_str(),
        })
        .collect()
}

/// Writes one file for the given format and returns its path.
/// Re-running with identical input overwrites the previous file.
pub fn write_format(
    dir: &Path,
    base_name: &str,
    kind: FormatKind,
    points: &[ResampledPoint],
    metadata: &[String],
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", base_name, kind.extension()));
    match kind {
        FormatKind::Csv => write_csv(&path, points, metadata)?,
        FormatKind::Json => write_json(&path, points, metadata)?,
        FormatKind::Html => write_html(&path, points, metadata)?,
        FormatKind::Xlsx => write_xlsx(&path, points, metadata)?,
        FormatKind::Sqlite => write_sqlite(&path, points, metadata)?,
        FormatKind::Parquet => write_parquet(&path, points, metadata)?,
        FormatKind::Feather | FormatKind::Arrow => write_ipc(&path, points, metadata)?,
    }
    Ok(path)
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_csv(path: &Path, points: &[ResampledPoint], metadata: &[String]) -> Result<()> {
    let mut file = File::create(path)?;
    for line in metadata {
        writeln!(file, "{}", csv_field(line))?;
    }
    writeln!(file, "timestamp,value,data_accuracy")?;
    for row in rows(points) {
        writeln!(
            file,
            "{},{},{}",
            csv_field(&row.timestamp),
            row.value,
            row.data_accuracy
        )?;
    }
    Ok(())
}

fn write_json(path: &Path, points: &[ResampledPoint], metadata: &[String]) -> Result<()> {
    let mut file = File::create(path)?;
    if !metadata.is_empty() {
        writeln!(file, "// {}", metadata.join("\n// "))?;
    }
    let body = serde_json::to_string_pretty(&rows(points))?;
    file.write_all(body.as_bytes())?;
    Ok(())
}

fn write_html(path: &Path, points: &[ResampledPoint], metadata: &[String]) -> Result<()> {
    let mut file = File::create(path)?;
    if !metadata.is_empty() {
        writeln!(file, "<!--\n{}\n-->", metadata.join("\n"))?;
    }
    writeln!(file, "<table border=\"1\">")?;
    writeln!(
        file,
        "  <thead>\n    <tr><th>timestamp</th><th>value</th><th>data_accuracy</th></tr>\n  </thead>"
    )?;
    writeln!(file, "  <tbody>")?;
    for row in rows(points) {
        writeln!(
            file,
            "    <tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            row.timestamp, row.value, row.data_accuracy
        )?;
    }
    writeln!(file, "  </tbody>")?;
    writeln!(file, "</table>")?;
    Ok(())
}

fn write_xlsx(path: &Path, points: &[ResampledPoint], metadata: &[String]) -> Result<()> {
    let mut workbook = rust_xlsxwriter::Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name("data")?;
    sheet.write_string(0, 0, "timestamp")?;
    sheet.write_string(0, 1, "value")?;
    sheet.write_string(0, 2, "data_accuracy")?;
    for (i, row) in rows(points).into_iter().enumerate() {
        let row_idx = (i + 1) as u32;
        sheet.write_string(row_idx, 0, row.timestamp)?;
        sheet.write_number(row_idx, 1, row.value)?;
        sheet.write_string(row_idx, 2, row.data_accuracy)?;
    }

    if !metadata.is_empty() {
        let meta_sheet = workbook.add_worksheet();
        meta_sheet.set_name("metadata")?;
        for (i, line) in metadata.iter().enumerate() {
            meta_sheet.write_string(i as u32, 0, line.as_str())?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn write_sqlite(path: &Path, points: &[ResampledPoint], metadata: &[String]) -> Result<()> {
    // Regeneration replaces the whole file, never appends to a stale one.
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let mut conn = rusqlite::Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE export (
            timestamp TEXT NOT NULL,
            value REAL NOT NULL,
            data_accuracy TEXT NOT NULL
        );
        CREATE TABLE export_metadata (line TEXT NOT NULL);",
    )?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO export (timestamp, value, data_accuracy) VALUES (?1, ?2, ?3)",
        )?;
        for row in rows(points) {
            stmt.execute(rusqlite::params![row.timestamp, row.value, row.data_accuracy])?;
        }
        let mut meta_stmt = tx.prepare("INSERT INTO export_metadata (line) VALUES (?1)")?;
        for line in metadata {
            meta_stmt.execute(rusqlite::params![line])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn write_parquet(path: &Path, points: &[ResampledPoint], metadata: &[String]) -> Result<()> {
    let batch = export_record_batch(points, &[])?;
    let mut builder = WriterProperties::builder();
    if !metadata.is_empty() {
        builder = builder.set_key_value_metadata(Some(vec![KeyValue::new(
            "comments".to_string(),
            metadata.join("\n"),
        )]));
    }
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(builder.build()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn write_ipc(path: &Path, points: &[ResampledPoint], metadata: &[String]) -> Result<()> {
    let batch = export_record_batch(points, metadata)?;
    let file = File::create(path)?;
    let mut writer = FileWriter::try_new(file, batch.schema().as_ref())?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(())
}
