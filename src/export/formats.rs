//! Supported export format kinds.

use serde::{Deserialize, Serialize};

/// Output serialization formats for a resampled series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Csv,
    Json,
    Html,
    Xlsx,
    Sqlite,
    Parquet,
    Feather,
    Arrow,
}

impl FormatKind {
    pub const ALL: [FormatKind; 8] = [
        FormatKind::Csv,
        FormatKind::Json,
        FormatKind::Html,
        FormatKind::Xlsx,
        FormatKind::Sqlite,
        FormatKind::Parquet,
        FormatKind::Feather,
        FormatKind::Arrow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatKind::Csv => "csv",
            FormatKind::Json => "json",
            FormatKind::Html => "html",
            FormatKind::Xlsx => "xlsx",
            FormatKind::Sqlite => "sqlite",
            FormatKind::Parquet => "parquet",
            FormatKind::Feather => "feather",
            FormatKind::Arrow => "arrow",
        }
    }

    /// File extension; identical to the wire name for every format.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn parse(name: &str) -> Option<FormatKind> {
        FormatKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == name)
    }

    /// Filters arbitrary format names down to the supported set,
    /// preserving order and dropping duplicates. Unknown names are
    /// discarded; an empty result is the caller's `InvalidRequest`.
    pub fn filter_supported<S: AsRef<str>>(names: &[S]) -> Vec<FormatKind> {
        let mut kinds = Vec::new();
        for name in names {
            if let Some(kind) = FormatKind::parse(name.as_ref()) {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }
        kinds
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
