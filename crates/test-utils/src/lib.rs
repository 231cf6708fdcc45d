//! Trovato test utilities.
//!
//! Helpers for listing engine integration tests: item and term fixtures,
//! user contexts, a manual clock, and assertion utilities.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use trovato_listing::archive::{EDIT_LISTINGS_PERMISSION, UserContext};
use trovato_listing::cache::{CacheStore, Clock, MemoryStore, ValueCache};
use trovato_listing::facet::FacetDeclaration;
use trovato_listing::repository::{ContentItem, Term};

/// Create a test item with default values.
pub fn test_item(item_type: &str, title: &str) -> TestItem {
    TestItem {
        id: Uuid::now_v7(),
        item_type: item_type.to_string(),
        title: title.to_string(),
        author_id: Uuid::nil(),
        created: 0,
        fields: serde_json::json!({}),
        terms: BTreeMap::new(),
    }
}

/// A test item builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestItem {
    pub id: Uuid,
    pub item_type: String,
    pub title: String,
    pub author_id: Uuid,
    pub created: i64,
    pub fields: JsonValue,
    pub terms: BTreeMap<String, Vec<Uuid>>,
}

impl TestItem {
    /// Set a custom ID.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Set the author.
    pub fn with_author(mut self, author_id: Uuid) -> Self {
        self.author_id = author_id;
        self
    }

    /// Set the creation timestamp.
    pub fn created_at(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    /// Set fields.
    pub fn with_fields(mut self, fields: JsonValue) -> Self {
        self.fields = fields;
        self
    }

    /// Add a single field.
    pub fn with_field(mut self, name: &str, value: JsonValue) -> Self {
        if let Some(obj) = self.fields.as_object_mut() {
            obj.insert(name.to_string(), value);
        }
        self
    }

    /// Assign a term.
    pub fn with_term(mut self, term: &Term) -> Self {
        self.terms
            .entry(term.taxonomy.clone())
            .or_default()
            .push(term.id);
        self
    }

    /// Finish the item.
    pub fn build(self) -> ContentItem {
        ContentItem {
            id: self.id,
            item_type: self.item_type,
            title: self.title,
            author_id: self.author_id,
            created: self.created,
            fields: self.fields,
            terms: self.terms,
        }
    }
}

/// Create a root term.
pub fn test_term(taxonomy: &str, name: &str) -> Term {
    Term {
        id: Uuid::now_v7(),
        taxonomy: taxonomy.to_string(),
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        parent: None,
        count: 0,
        group: 0,
        weight: 0,
    }
}

/// Create a child of a term in the same taxonomy.
pub fn test_child_term(parent: &Term, name: &str) -> Term {
    Term {
        parent: Some(parent.id),
        ..test_term(&parent.taxonomy, name)
    }
}

/// Create an authenticated user with permissions.
pub fn test_user(permissions: &[&str]) -> UserContext {
    UserContext::authenticated(
        Uuid::now_v7(),
        permissions.iter().map(|s| s.to_string()).collect(),
    )
}

/// Create an anonymous test user.
pub fn anonymous_user() -> UserContext {
    UserContext::anonymous()
}

/// Create an admin test user.
pub fn admin_user() -> UserContext {
    test_user(&["administer site"])
}

/// Create a listing editor.
pub fn editor_user() -> UserContext {
    test_user(&[EDIT_LISTINGS_PERMISSION])
}

/// Facet declaration with defaults.
pub fn declaration(id: &str, source: &str, key: &str) -> FacetDeclaration {
    FacetDeclaration {
        id: id.to_string(),
        source: source.to_string(),
        key: key.to_string(),
        ..Default::default()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    /// A clock at a fixed, arbitrary instant.
    pub fn fixed() -> Arc<Self> {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        Self::new(start)
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// In-process value cache driven by a manual clock.
pub fn memory_cache(clock: Arc<ManualClock>, ttl: Duration) -> ValueCache {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new(1_000, clock.clone()));
    ValueCache::new(store, clock, ttl)
}

/// Assertion helpers for JSON content.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_item_builder() {
        let topic = test_term("topics", "Rust");
        let item = test_item("post", "Test Post")
            .created_at(5)
            .with_field("color", serde_json::json!("red"))
            .with_term(&topic)
            .build();

        assert_eq!(item.item_type, "post");
        assert_eq!(item.created, 5);
        assert_eq!(item.field_strings("color"), vec!["red"]);
        assert_eq!(item.term_ids("topics"), &[topic.id]);
    }

    #[test]
    fn test_child_term_inherits_taxonomy() {
        let parent = test_term("topics", "Languages");
        let child = test_child_term(&parent, "Rust Lang");
        assert_eq!(child.taxonomy, "topics");
        assert_eq!(child.parent, Some(parent.id));
        assert_eq!(child.slug, "rust-lang");
    }

    #[test]
    fn test_users() {
        assert!(admin_user().is_privileged_editor());
        assert!(editor_user().is_privileged_editor());
        assert!(!test_user(&["access content"]).is_privileged_editor());
        assert!(!anonymous_user().authenticated);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::fixed();
        let start = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!((clock.now() - start).num_seconds(), 90);
    }

    #[test]
    fn test_assertions() {
        let json = serde_json::json!({"name": "test", "value": 42});
        assert::has_key(&json, "name");
        assert::contains("hello world", "world");
        assert::not_contains("hello world", "foo");
    }
}
