//! Entity registry lookups and per-entity metadata selection.
//!
//! The registry is a read-only external collaborator resolving
//! descriptive attributes for an entity at export time. The selector
//! decides which of those attributes accompany an export as a leading
//! comment block.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;

/// Descriptive attributes an export header may carry.
///
/// `ALL` fixes the canonical rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Manufacturer,
    Model,
    SwVersion,
    HwVersion,
    DeviceClass,
    EntityCategory,
    IntegrationDomain,
    AreaName,
    DeviceName,
    EntityName,
}

impl MetadataField {
    pub const ALL: [MetadataField; 10] = [
        MetadataField::Manufacturer,
        MetadataField::Model,
        MetadataField::SwVersion,
        MetadataField::HwVersion,
        MetadataField::DeviceClass,
        MetadataField::EntityCategory,
        MetadataField::IntegrationDomain,
        MetadataField::AreaName,
        MetadataField::DeviceName,
        MetadataField::EntityName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::Manufacturer => "manufacturer",
            MetadataField::Model => "model",
            MetadataField::SwVersion => "sw_version",
            MetadataField::HwVersion => "hw_version",
            MetadataField::DeviceClass => "device_class",
            MetadataField::EntityCategory => "entity_category",
            MetadataField::IntegrationDomain => "integration_domain",
            MetadataField::AreaName => "area_name",
            MetadataField::DeviceName => "device_name",
            MetadataField::EntityName => "entity_name",
        }
    }

    pub fn parse(name: &str) -> Option<MetadataField> {
        MetadataField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == name)
    }
}

/// Resolved descriptive attributes for one entity.
///
/// Any field may be absent; absent fields are skipped when rendering
/// the metadata block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMetadata {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    pub hw_version: Option<String>,
    pub device_class: Option<String>,
    pub entity_category: Option<String>,
    pub integration_domain: Option<String>,
    pub area_name: Option<String>,
    pub device_name: Option<String>,
    pub entity_name: Option<String>,
}

impl EntityMetadata {
    pub fn field(&self, field: MetadataField) -> Option<&str> {
        match field {
            MetadataField::Manufacturer => self.manufacturer.as_deref(),
            MetadataField::Model => self.model.as_deref(),
            MetadataField::SwVersion => self.sw_version.as_deref(),
            MetadataField::HwVersion => self.hw_version.as_deref(),
            MetadataField::DeviceClass => self.device_class.as_deref(),
            MetadataField::EntityCategory => self.entity_category.as_deref(),
            MetadataField::IntegrationDomain => self.integration_domain.as_deref(),
            MetadataField::AreaName => self.area_name.as_deref(),
            MetadataField::DeviceName => self.device_name.as_deref(),
            MetadataField::EntityName => self.entity_name.as_deref(),
        }
    }
}

/// Read-only registry resolving entity metadata at export time.
#[async_trait]
pub trait EntityRegistry: Send + Sync + 'static {
    async fn lookup(&self, entity_key: &str) -> Result<Option<EntityMetadata>>;
}

/// Per-entity choice of which metadata fields accompany an export.
#[async_trait]
pub trait MetadataSelector: Send + Sync + 'static {
    async fn selected_fields(&self, entity_key: &str) -> Result<BTreeSet<MetadataField>>;
}

/// Renders the metadata comment block for one entity.
///
/// An empty selection yields an empty block; otherwise the block leads
/// with the entity key and lists selected, resolvable fields in
/// canonical order.
pub fn metadata_block(
    entity_key: &str,
    metadata: Option<&EntityMetadata>,
    selected: &BTreeSet<MetadataField>,
) -> Vec<String> {
    if selected.is_empty() {
        return Vec::new();
    }

    let mut lines = vec![format!("# Entity: {}", entity_key)];
    for field in MetadataField::ALL {
        if !selected.contains(&field) {
            continue;
        }
        if let Some(value) = metadata.and_then(|meta| meta.field(field)) {
            lines.push(format!("# {}: {}", field.as_str(), value));
        }
    }
    lines
}
