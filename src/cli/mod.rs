//! Command-line interface definitions.

pub mod handlers;

use clap::{Parser, Subcommand};

use crate::config::Args;

#[derive(Debug, Parser)]
#[clap(name = "histore", version, about = "Entity history sampling and export")]
pub struct Cli {
    #[clap(flatten)]
    pub args: Args,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database schema
    Init,

    /// List known entities
    Entities,

    /// Register an entity for sampling
    AddEntity {
        /// Entity key, e.g. `sensor.kitchen_temperature`
        entity: String,
        /// Integration domain, e.g. `sensor`
        #[clap(long)]
        domain: String,
        #[clap(long)]
        area: Option<String>,
        #[clap(long)]
        device: Option<String>,
        #[clap(long)]
        name: Option<String>,
    },

    /// Select or deselect a metadata field for an entity's exports
    SelectField {
        entity: String,
        /// Field name, e.g. `manufacturer`
        field: String,
        /// Deselect instead of select
        #[clap(long)]
        deselect: bool,
    },

    /// Export an explicit time range
    Export {
        /// Entity keys to export
        #[clap(required = true)]
        entities: Vec<String>,
        /// Range start (RFC 3339)
        #[clap(long)]
        start: String,
        /// Range end, inclusive (RFC 3339)
        #[clap(long)]
        end: String,
        /// Grid resolution in seconds
        #[clap(long)]
        resolution: Option<u64>,
        /// Output formats
        #[clap(long, value_delimiter = ',')]
        formats: Vec<String>,
    },

    /// Export one calendar day
    ExportDay {
        #[clap(required = true)]
        entities: Vec<String>,
        /// Day to export (YYYY-MM-DD)
        #[clap(long)]
        date: String,
        #[clap(long)]
        resolution: Option<u64>,
        #[clap(long, value_delimiter = ',')]
        formats: Vec<String>,
    },

    /// Export the ISO week containing a date
    ExportWeek {
        #[clap(required = true)]
        entities: Vec<String>,
        /// Any day inside the week (YYYY-MM-DD)
        #[clap(long)]
        date: String,
        #[clap(long)]
        resolution: Option<u64>,
        #[clap(long, value_delimiter = ',')]
        formats: Vec<String>,
    },

    /// Export one calendar month
    ExportMonth {
        #[clap(required = true)]
        entities: Vec<String>,
        #[clap(long)]
        year: i32,
        #[clap(long)]
        month: u32,
        #[clap(long)]
        resolution: Option<u64>,
        #[clap(long, value_delimiter = ',')]
        formats: Vec<String>,
    },

    /// Export one calendar year
    ExportYear {
        #[clap(required = true)]
        entities: Vec<String>,
        #[clap(long)]
        year: i32,
        #[clap(long)]
        resolution: Option<u64>,
        #[clap(long, value_delimiter = ',')]
        formats: Vec<String>,
    },
}
