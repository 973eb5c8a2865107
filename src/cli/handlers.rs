//! Command handlers for the histore binary.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;

use crate::config::Settings;
use crate::entities::EntityRecord;
use crate::export::{ExportReport, Exporter, FormatKind};
use crate::registry::MetadataField;
use crate::storage::DuckDbBackend;

use super::Command;

pub async fn run(command: Command, settings: Settings) -> Result<()> {
    let store = Arc::new(
        DuckDbBackend::new(
            &settings.storage.path,
            std::time::Duration::from_secs(settings.storage.op_timeout_secs),
        )
        .context("Failed to open sample store")?,
    );
    store.init().await.context("Failed to initialize schema")?;

    match command {
        Command::Init => {
            println!("initialized {}", settings.storage.path);
        }
        Command::Entities => {
            for entity in store.list_entities().await? {
                let name = entity.friendly_name.as_deref().unwrap_or("-");
                println!("{}\t{}\t{}", entity.entity_key, entity.domain, name);
            }
        }
        Command::AddEntity {
            entity,
            domain,
            area,
            device,
            name,
        } => {
            store
                .add_entity(&EntityRecord {
                    entity_key: entity.clone(),
                    domain,
                    area,
                    device,
                    friendly_name: name,
                    auto_added: false,
                    last_metadata_update: None,
                })
                .await?;
            println!("added {}", entity);
        }
        Command::SelectField {
            entity,
            field,
            deselect,
        } => {
            let Some(field) = MetadataField::parse(&field) else {
                bail!("unknown metadata field: {}", field);
            };
            store.set_field_selected(&entity, field, !deselect).await?;
        }
        Command::Export {
            entities,
            start,
            end,
            resolution,
            formats,
        } => {
            let exporter = exporter(&store, &settings)?;
            let start = parse_instant(&start)?;
            let end = parse_instant(&end)?;
            let report = exporter
                .export_range(
                    entities,
                    start,
                    end,
                    pick_resolution(resolution, &settings),
                    pick_formats(&formats, &settings)?,
                )
                .await?;
            print_report(&report);
        }
        Command::ExportDay {
            entities,
            date,
            resolution,
            formats,
        } => {
            let exporter = exporter(&store, &settings)?;
            let report = exporter
                .export_day(
                    entities,
                    parse_date(&date)?,
                    pick_resolution(resolution, &settings),
                    pick_formats(&formats, &settings)?,
                )
                .await?;
            print_report(&report);
        }
        Command::ExportWeek {
            entities,
            date,
            resolution,
            formats,
        } => {
            let exporter = exporter(&store, &settings)?;
            let report = exporter
                .export_week(
                    entities,
                    parse_date(&date)?,
                    pick_resolution(resolution, &settings),
                    pick_formats(&formats, &settings)?,
                )
                .await?;
            print_report(&report);
        }
        Command::ExportMonth {
            entities,
            year,
            month,
            resolution,
            formats,
        } => {
            let exporter = exporter(&store, &settings)?;
            let report = exporter
                .export_month(
                    entities,
                    year,
                    month,
                    pick_resolution(resolution, &settings),
                    pick_formats(&formats, &settings)?,
                )
                .await?;
            print_report(&report);
        }
        Command::ExportYear {
            entities,
            year,
            resolution,
            formats,
        } => {
            let exporter = exporter(&store, &settings)?;
            let report = exporter
                .export_year(
                    entities,
                    year,
                    pick_resolution(resolution, &settings),
                    pick_formats(&formats, &settings)?,
                )
                .await?;
            print_report(&report);
        }
    }

    Ok(())
}

fn exporter(store: &Arc<DuckDbBackend>, settings: &Settings) -> Result<Exporter> {
    Exporter::new(
        store.clone(),
        store.clone(),
        store.clone(),
        &settings.export.directory,
    )
    .context("Failed to create exporter")
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp: {}", value))?;
    Ok(parsed.with_timezone(&Utc))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("invalid date: {}", value))
}

fn pick_resolution(override_secs: Option<u64>, settings: &Settings) -> Duration {
    Duration::seconds(override_secs.unwrap_or(settings.export.resolution_secs) as i64)
}

fn pick_formats(names: &[String], settings: &Settings) -> Result<Vec<FormatKind>> {
    let names: &[String] = if names.is_empty() {
        &settings.export.formats
    } else {
        names
    };
    let kinds = FormatKind::filter_supported(names);
    if kinds.is_empty() {
        bail!("no valid export formats in {:?}", names);
    }
    Ok(kinds)
}

fn print_report(report: &ExportReport) {
    println!("{}", report.summary());
    for (entity, files) in &report.completed {
        for (kind, path) in files {
            println!("{}\t{}\t{}", entity, kind, path.display());
        }
    }
    for (entity, reason) in &report.store_failures {
        eprintln!("FAILED {}: {}", entity, reason);
    }
    for (entity, failures) in &report.write_failures {
        for (kind, reason) in failures {
            eprintln!("FAILED {} ({}): {}", entity, kind, reason);
        }
    }
}
