use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant. Catalogs are created out of band and only read by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub id: i64,
    pub name: String,
}

/// Tag read model: `{id, name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Item read model, as produced to the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    pub name: String,
    /// 16 lowercase hex characters.
    pub fingerprint: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

/// Item creation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    pub fingerprint: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
}

/// Tag-replace payload: the complete new tag set of an item.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplaceTags {
    #[serde(default)]
    pub tags: Vec<i64>,
}

/// An item matched by fingerprint similarity, with its Hamming distance to the probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarItem {
    pub distance: u32,
    #[serde(flatten)]
    pub item: Item,
}

/// Per-catalog counts for the status view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CatalogStats {
    pub total_items: usize,
    pub total_tags: usize,
    pub total_links: usize,
}
