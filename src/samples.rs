//! Core sample and resampled-point types with Arrow interop.
//!
//! This module provides:
//! - The raw `Sample` record as persisted by the sample store
//! - The derived `ResampledPoint` with its provenance tag
//! - Arrow-compatible schema and batch construction for the columnar
//!   export formats

use arrow::array::{Float64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// A single raw observation for one entity.
///
/// Samples are immutable once written; ordering key is
/// `(entity_key, timestamp)`. Duplicate or out-of-order timestamps are
/// possible and tolerated downstream by the resampling engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Key of the monitored entity
    pub entity_key: String,
    /// Observation instant
    pub timestamp: DateTime<Utc>,
    /// Observed value
    pub value: f64,
}

/// Provenance tag distinguishing measured from synthesized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    /// An actual observation, or the last known one (held)
    Raw,
    /// Arithmetic mean of the two bracketing observations
    Mean,
    /// Linear interpolation between the two bracketing observations
    WeightedMean,
}

impl Accuracy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Accuracy::Raw => "raw",
            Accuracy::Mean => "mean",
            Accuracy::WeightedMean => "weighted_mean",
        }
    }
}

/// One point on the reconstructed regular grid.
///
/// Produced per export, never persisted as a primary record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub accuracy: Accuracy,
}

lazy_static! {
    /// Arrow schema for the exported table.
    ///
    /// Columns: timestamp (ISO-8601 string), value, data_accuracy.
    pub static ref EXPORT_SCHEMA: Schema = Schema::new(vec![
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("value", DataType::Float64, false),
        Field::new("data_accuracy", DataType::Utf8, false),
    ]);
}

/// Renders a timestamp the way every export format carries it.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Creates an Arrow RecordBatch from a resampled series.
///
/// Metadata comment lines, when present, are attached to the schema
/// metadata under the `comments` key so the IPC-based formats carry
/// them losslessly.
pub fn export_record_batch(points: &[ResampledPoint], comments: &[String]) -> Result<RecordBatch> {
    let mut timestamps = Vec::with_capacity(points.len());
    let mut values = Vec::with_capacity(points.len());
    let mut accuracies = Vec::with_capacity(points.len());

    for point in points {
        timestamps.push(format_timestamp(point.timestamp));
        values.push(point.value);
        accuracies.push(point.accuracy.as_str());
    }

    let schema = if comments.is_empty() {
        EXPORT_SCHEMA.clone()
    } else {
        let mut metadata = HashMap::new();
        metadata.insert("comments".to_string(), comments.join("\n"));
        Schema::new_with_metadata(EXPORT_SCHEMA.fields().clone(), metadata)
    };

    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(StringArray::from(timestamps)),
            Arc::new(Float64Array::from(values)),
            Arc::new(StringArray::from(accuracies)),
        ],
    )?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accuracy_strings_match_wire_values() {
        assert_eq!(Accuracy::Raw.as_str(), "raw");
        assert_eq!(Accuracy::Mean.as_str(), "mean");
        assert_eq!(Accuracy::WeightedMean.as_str(), "weighted_mean");
    }

    #[test]
    fn batch_carries_comments_in_schema_metadata() {
        let points = vec![ResampledPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            value: 1.5,
            accuracy: Accuracy::Raw,
        }];
        let comments = vec!["# Entity: sensor.temp".to_string()];
        let batch = export_record_batch(&points, &comments).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(
            batch.schema().metadata().get("comments").map(String::as_str),
            Some("# Entity: sensor.temp")
        );
    }
}
