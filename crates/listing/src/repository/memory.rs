//! In-memory content repository.
//!
//! Holds terms and items behind read-write locks and evaluates listing
//! queries with `PredicateNode::matches`. Term counts are computed from the
//! stored items on every lookup, so writes show up immediately for callers
//! that bypass the facet value cache.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ContentItem, ContentRepository, Term, TermLevel, TermQuery};
use crate::archive::ArchiveContext;
use crate::error::RepositoryError;
use crate::facet::{ListingQuery, ListingSort, SortDirection};

/// Serialized repository contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub items: Vec<ContentItem>,
}

/// Repository backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    terms: RwLock<Vec<Term>>,
    items: RwLock<Vec<ContentItem>>,
    /// Number of term and field value scans served.
    scans: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a fixture.
    pub fn from_fixture(fixture: Fixture) -> Self {
        Self {
            terms: RwLock::new(fixture.terms),
            items: RwLock::new(fixture.items),
            scans: AtomicUsize::new(0),
        }
    }

    /// Add or replace a term.
    pub fn insert_term(&self, term: Term) {
        let mut terms = self.terms.write();
        match terms.iter_mut().find(|t| t.id == term.id) {
            Some(existing) => *existing = term,
            None => terms.push(term),
        }
    }

    /// Add or replace an item.
    pub fn insert_item(&self, item: ContentItem) {
        let mut items = self.items.write();
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
    }

    /// Set a top-level field on an item. Returns false if the item is unknown.
    pub fn set_field(&self, item_id: Uuid, key: &str, value: serde_json::Value) -> bool {
        let mut items = self.items.write();
        let Some(item) = items.iter_mut().find(|i| i.id == item_id) else {
            return false;
        };
        if !item.fields.is_object() {
            item.fields = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(fields) = item.fields.as_object_mut() {
            fields.insert(key.to_string(), value);
        }
        true
    }

    /// Assign a term to an item. Returns false if the item is unknown.
    pub fn assign_term(&self, item_id: Uuid, taxonomy: &str, term_id: Uuid) -> bool {
        let mut items = self.items.write();
        let Some(item) = items.iter_mut().find(|i| i.id == item_id) else {
            return false;
        };
        let assigned = item.terms.entry(taxonomy.to_string()).or_default();
        if !assigned.contains(&term_id) {
            assigned.push(term_id);
        }
        true
    }

    /// Remove an item. Returns false if it was not present.
    pub fn remove_item(&self, item_id: Uuid) -> bool {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|i| i.id != item_id);
        items.len() != before
    }

    /// Number of term and field value scans served so far.
    pub fn scan_count(&self) -> usize {
        self.scans.load(AtomicOrdering::Relaxed)
    }

    fn record_scan(&self) {
        self.scans.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn matching(&self, query: &ListingQuery) -> Vec<ContentItem> {
        let items = self.items.read();
        items
            .iter()
            .filter(|item| {
                query
                    .scope
                    .as_ref()
                    .is_none_or(|scope| in_scope(item, scope))
            })
            .filter(|item| {
                query
                    .item_type
                    .as_ref()
                    .is_none_or(|t| &item.item_type == t)
            })
            .filter(|item| {
                query
                    .item_ids
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&item.id))
            })
            .filter(|item| query.predicate.matches(item))
            .cloned()
            .collect()
    }
}

impl ContentRepository for InMemoryRepository {
    fn terms(&self, query: &TermQuery<'_>) -> Result<Vec<Term>, RepositoryError> {
        self.record_scan();
        let terms = self.terms.read();
        let items = self.items.read();

        if !terms.iter().any(|t| t.taxonomy == query.taxonomy) {
            return Err(RepositoryError::UnknownTaxonomy(query.taxonomy.to_string()));
        }

        let scoped: Vec<&ContentItem> = items
            .iter()
            .filter(|item| query.scope.is_none_or(|scope| in_scope(item, scope)))
            .collect();

        let found = terms
            .iter()
            .filter(|t| t.taxonomy == query.taxonomy)
            .filter(|t| match query.level {
                TermLevel::All => true,
                TermLevel::Roots => t.parent.is_none(),
                TermLevel::ChildrenOf(parent) => t.parent == Some(parent),
            })
            .map(|t| {
                let count = scoped
                    .iter()
                    .filter(|item| item.term_ids(query.taxonomy).contains(&t.id))
                    .count() as u64;
                Term {
                    count,
                    ..t.clone()
                }
            })
            .filter(|t| query.include_empty || t.count > 0)
            .collect();

        Ok(found)
    }

    fn field_values(
        &self,
        key: &str,
        scope: Option<&ArchiveContext>,
    ) -> Result<Vec<serde_json::Value>, RepositoryError> {
        self.record_scan();
        let items = self.items.read();
        Ok(items
            .iter()
            .filter(|item| scope.is_none_or(|scope| in_scope(item, scope)))
            .filter_map(|item| item.field(key))
            .filter(|v| !v.is_null())
            .cloned()
            .collect())
    }

    fn count(&self, query: &ListingQuery) -> Result<u64, RepositoryError> {
        Ok(self.matching(query).len() as u64)
    }

    fn fetch(&self, query: &ListingQuery) -> Result<Vec<ContentItem>, RepositoryError> {
        let mut items = self.matching(query);
        items.sort_by(|a, b| compare_items(a, b, &query.sort));
        Ok(items
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .collect())
    }
}

/// Whether an item belongs to an archive context's content set.
fn in_scope(item: &ContentItem, scope: &ArchiveContext) -> bool {
    match scope {
        ArchiveContext::None | ArchiveContext::MainLoop => true,
        ArchiveContext::Author { author_id } => item.author_id == *author_id,
        ArchiveContext::TaxonomyTerm { taxonomy, term_id } => {
            item.term_ids(taxonomy).contains(term_id)
        }
        ArchiveContext::PostType { post_type } => &item.item_type == post_type,
        ArchiveContext::Search { query } => {
            let query = query.trim().to_lowercase();
            query.is_empty() || item.title.to_lowercase().contains(&query)
        }
        ArchiveContext::Singular { item_type, .. } => &item.item_type == item_type,
    }
}

fn compare_items(a: &ContentItem, b: &ContentItem, sort: &ListingSort) -> Ordering {
    let ordering = match sort.field.as_str() {
        "created" => a.created.cmp(&b.created),
        "title" => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        "id" => a.id.cmp(&b.id),
        field => {
            let path = field.strip_prefix("fields.").unwrap_or(field);
            let key = |item: &ContentItem| item.field_strings(path).into_iter().next();
            key(a).cmp(&key(b))
        }
    };
    let ordering = match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    };
    ordering.then_with(|| a.id.cmp(&b.id))
}
