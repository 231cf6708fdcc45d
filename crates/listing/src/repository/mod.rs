//! Content repository interface.
//!
//! The repository stores items and taxonomy terms and executes listing
//! queries. It is an external collaborator: the engine only hands it
//! predicate descriptions. `InMemoryRepository` is a reference
//! implementation used by fixtures and tests.

mod memory;

pub use memory::{Fixture, InMemoryRepository};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::archive::ArchiveContext;
use crate::error::RepositoryError;
use crate::facet::ListingQuery;

/// A taxonomy term.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Term {
    /// Unique identifier (UUIDv7).
    pub id: Uuid,

    /// Taxonomy this term belongs to.
    pub taxonomy: String,

    /// Human-readable label.
    pub name: String,

    pub slug: String,

    /// Parent term (None for root terms).
    #[serde(default)]
    pub parent: Option<Uuid>,

    /// Number of items carrying the term.
    #[serde(default)]
    pub count: u64,

    /// Term group.
    #[serde(default)]
    pub group: i64,

    /// Sort weight within its level.
    #[serde(default)]
    pub weight: i16,
}

/// Which level of a taxonomy to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermLevel {
    /// Every term regardless of depth.
    All,
    /// Terms without a parent.
    Roots,
    /// Direct children of a term.
    ChildrenOf(Uuid),
}

/// Term lookup request.
#[derive(Debug, Clone, Copy)]
pub struct TermQuery<'a> {
    pub taxonomy: &'a str,
    pub level: TermLevel,
    /// Include terms with no items.
    pub include_empty: bool,
    /// Restrict counts (and emptiness) to items in this context.
    pub scope: Option<&'a ArchiveContext>,
}

/// A content item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub item_type: String,

    pub title: String,

    #[serde(default)]
    pub author_id: Uuid,

    /// Unix timestamp when created.
    #[serde(default)]
    pub created: i64,

    /// Field values (JSON object).
    #[serde(default = "empty_object")]
    pub fields: serde_json::Value,

    /// Assigned term ids per taxonomy.
    #[serde(default)]
    pub terms: BTreeMap<String, Vec<Uuid>>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ContentItem {
    /// Field value by path; dots traverse nested objects (`meta.color`).
    pub fn field(&self, path: &str) -> Option<&serde_json::Value> {
        path.split('.')
            .try_fold(&self.fields, |current, part| current.get(part))
    }

    /// Non-empty string forms of a field; arrays contribute each element.
    pub fn field_strings(&self, path: &str) -> Vec<String> {
        match self.field(path) {
            Some(serde_json::Value::Array(values)) => {
                values.iter().filter_map(json_value_to_string).collect()
            }
            Some(value) => json_value_to_string(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Numeric forms of a field; strings are parsed, unparseable values skipped.
    pub fn field_numbers(&self, path: &str) -> Vec<f64> {
        match self.field(path) {
            Some(serde_json::Value::Array(values)) => values.iter().filter_map(json_number).collect(),
            Some(value) => json_number(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Term ids assigned in a taxonomy.
    pub fn term_ids(&self, taxonomy: &str) -> &[Uuid] {
        self.terms.get(taxonomy).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Convert a JSON value to its string representation for comparison.
/// Returns `None` for null and blank values to prevent false matches.
pub fn json_value_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn json_number(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Storage and query execution capability.
pub trait ContentRepository: Send + Sync {
    /// Terms of a taxonomy at one level.
    fn terms(&self, query: &TermQuery<'_>) -> Result<Vec<Term>, RepositoryError>;

    /// Raw values of a field, one per item carrying it, optionally narrowed
    /// to the items of an archive context.
    fn field_values(
        &self,
        key: &str,
        scope: Option<&ArchiveContext>,
    ) -> Result<Vec<serde_json::Value>, RepositoryError>;

    /// Number of items matching a listing query (ignoring its slice).
    fn count(&self, query: &ListingQuery) -> Result<u64, RepositoryError>;

    /// Items of the query's slice, in the query's order.
    fn fetch(&self, query: &ListingQuery) -> Result<Vec<ContentItem>, RepositoryError>;
}
