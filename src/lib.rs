//! Core library for entity history sampling and downsampled export.
//!
//! This crate provides the core functionality for:
//! - Append-only sample storage with range queries
//! - Deterministic temporal downsampling with provenance tags
//! - Multi-format export (CSV/JSON/HTML/XLSX/SQLite/Parquet/Feather/Arrow)
//! - Periodic sampling of live entity values

pub mod cli;
pub mod config;
pub mod context;
pub mod entities;
pub mod error;
pub mod export;
pub mod registry;
pub mod resample;
pub mod samples;
pub mod scheduler;
pub mod stats;
pub mod storage;

pub use config::Settings;
pub use context::ArchiverContext;
pub use error::{Error, Result};
pub use export::{ExportReport, ExportRequest, Exporter, FormatKind};
pub use registry::{EntityMetadata, EntityRegistry, MetadataField, MetadataSelector};
pub use resample::{downsample, target_grid};
pub use samples::{Accuracy, ResampledPoint, Sample};
pub use scheduler::{Sampler, ValueSource};
pub use storage::{DuckDbBackend, SampleStore};
