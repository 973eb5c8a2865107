//! Storage backends for the append-only sample log.
//!
//! The store serializes all reads and writes behind a single lock so a
//! concurrently running sampler and exporter never observe interleaved
//! partial writes. Range reads are best-effort snapshots.

pub mod duckdb;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::samples::Sample;

pub use self::duckdb::DuckDbBackend;

/// Append/range-query contract for the sample store.
///
/// `range_query` bounds are inclusive and results come back ascending
/// by timestamp; an empty range is an empty vector, not an error.
#[async_trait]
pub trait SampleStore: Send + Sync + 'static {
    /// Append one raw sample. Idempotency is not guaranteed; duplicate
    /// appends are tolerated downstream.
    async fn append(&self, entity_key: &str, timestamp: DateTime<Utc>, value: f64) -> Result<()>;

    /// Fetch all samples for one entity within `[start, end]`.
    async fn range_query(
        &self,
        entity_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>>;
}
