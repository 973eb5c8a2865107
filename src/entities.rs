//! Monitored entity records and typed metadata updates.

use chrono::{DateTime, Utc};

/// A monitored entity as stored in the `entities` table.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub entity_key: String,
    pub domain: String,
    pub area: Option<String>,
    pub device: Option<String>,
    pub friendly_name: Option<String>,
    pub auto_added: bool,
    pub last_metadata_update: Option<DateTime<Utc>>,
}

/// Partial update of an entity's descriptive metadata.
///
/// Only the named fields can ever be updated; unset fields keep their
/// stored value. This replaces free-form keyword maps so the update
/// contract is statically checkable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityUpdate {
    pub area: Option<String>,
    pub device: Option<String>,
    pub friendly_name: Option<String>,
}

impl EntityUpdate {
    pub fn is_empty(&self) -> bool {
        self.area.is_none() && self.device.is_none() && self.friendly_name.is_none()
    }
}

/// One logged metadata transition for an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataChange {
    pub entity_key: String,
    pub timestamp: DateTime<Utc>,
    pub old_area: Option<String>,
    pub new_area: Option<String>,
    pub old_device: Option<String>,
    pub new_device: Option<String>,
    pub old_name: Option<String>,
    pub new_name: Option<String>,
}
