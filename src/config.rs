//! Configuration management for the histore service.
//!
//! Configuration is loaded in order of precedence, later sources
//! overriding earlier ones:
//! 1. Default configuration (embedded in the binary)
//! 2. System-wide configuration file (`/etc/histore/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `HISTORE_`)
//! 5. Command-line arguments

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Command-line overrides shared by every subcommand.
#[derive(Debug, Default, Parser)]
pub struct Args {
    /// Configuration file path
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file path
    #[clap(long, global = true)]
    pub db_path: Option<String>,

    /// Export output directory
    #[clap(long, global = true)]
    pub export_dir: Option<String>,
}

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Sample store configuration
    pub storage: StorageSettings,
    /// Export configuration
    pub export: ExportSettings,
    /// Sampling cadence
    #[serde(default)]
    pub sampling: SamplingSettings,
}

/// Sample store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Database file path (`":memory:"` for a transient store)
    pub path: String,
    /// Upper bound on waiting for the store lock, in seconds
    #[serde(default = "default_op_timeout")]
    pub op_timeout_secs: u64,
}

/// Export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Directory receiving export files
    pub directory: String,
    /// Default grid resolution in seconds
    #[serde(default = "default_resolution")]
    pub resolution_secs: u64,
    /// Default format names for exports that do not specify any
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

/// Sampling cadence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingSettings {
    /// Seconds between sampling ticks
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load(args: &Args) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("/etc/histore/config.toml").required(false));

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(config::Environment::with_prefix("HISTORE").separator("__"));

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if let Some(path) = &args.db_path {
            settings.storage.path = path.clone();
        }
        if let Some(dir) = &args.export_dir {
            settings.export.directory = dir.clone();
        }

        Ok(settings)
    }
}

fn default_op_timeout() -> u64 {
    5
}

fn default_resolution() -> u64 {
    60
}

fn default_formats() -> Vec<String> {
    vec!["csv".to_string(), "json".to_string()]
}

fn default_interval() -> u64 {
    10
}
