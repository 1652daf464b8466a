//! Plain structured results for catalog operations.
//!
//! Tool handlers see only these types — backend handles (HTTP sessions,
//! raw GraphQL payloads) never escape the catalog service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Bucket the hit lives in
    pub bucket: String,
    /// Object key or package handle
    pub key: String,
    /// Relevance score, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Object size in bytes, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Normalized search response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    /// Matching objects/packages
    pub hits: Vec<SearchHit>,
    /// Total matches reported by the backend (may exceed `hits.len()`)
    pub total: u64,
}

/// Search scope: what kind of entity to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Individual objects
    Objects,
    /// Package-level matches
    Packages,
}

impl Default for SearchScope {
    fn default() -> Self {
        Self::Objects
    }
}

/// One bucket visible to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name
    pub name: String,
    /// Human-readable title from the catalog, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One entry inside a package manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEntry {
    /// Logical key within the package
    pub logical_key: String,
    /// Physical location of the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_key: Option<String>,
    /// Object size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A browsed package: manifest entries plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageContents {
    /// Package handle, e.g. `team/dataset`
    pub name: String,
    /// Registry the package was resolved against
    pub registry: String,
    /// Manifest entries
    pub entries: Vec<PackageEntry>,
    /// Package-level metadata
    #[serde(default)]
    pub metadata: Value,
}

/// One package listed from a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package handle
    pub name: String,
    /// Last-modified timestamp, RFC 3339, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}
