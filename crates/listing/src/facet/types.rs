//! Facet engine types.
//!
//! Provides type definitions shared by the catalog, resolver and builder:
//! - FacetSpec: normalized declaration of one filterable dimension
//! - FacetValueSet: candidate values (with counts and bounds) for a facet
//! - Selection: user-submitted values for a facet

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveContext;

/// Where a facet draws its candidate values from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Category-like terms of a taxonomy.
    Taxonomy,
    /// Distinct values of an arbitrary item field.
    Field,
    /// Numeric item field, exposed as a range.
    NumericField,
}

impl SourceKind {
    /// Short machine name used in cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Taxonomy => "taxonomy",
            SourceKind::Field => "field",
            SourceKind::NumericField => "numeric",
        }
    }

    /// Parse a declared source kind, accepting the common aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "taxonomy" | "category" | "tag" => Some(SourceKind::Taxonomy),
            "field" | "meta" | "custom_field" => Some(SourceKind::Field),
            "numeric" | "numeric_field" | "range" => Some(SourceKind::NumericField),
            _ => None,
        }
    }
}

/// Presentation style of a facet control.
///
/// Only the presentation collaborator branches on this.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStyle {
    #[default]
    Checkbox,
    Radio,
    List,
    Dropdown,
    MultiSelect,
    Range,
}

impl DisplayStyle {
    /// Parse a declared display style.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "checkbox" | "checkboxes" => Some(DisplayStyle::Checkbox),
            "radio" => Some(DisplayStyle::Radio),
            "list" | "label" => Some(DisplayStyle::List),
            "dropdown" | "select" => Some(DisplayStyle::Dropdown),
            "multi_select" | "multiselect" | "multi-select" => Some(DisplayStyle::MultiSelect),
            "range" | "slider" => Some(DisplayStyle::Range),
            _ => None,
        }
    }
}

/// Ordering key for facet values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Slug,
    Count,
    /// Term group.
    Group,
    /// Explicit editor-defined order (term weight).
    Order,
    Id,
}

impl SortKey {
    /// Parse a declared sort key.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" | "label" => Some(SortKey::Name),
            "slug" => Some(SortKey::Slug),
            "count" => Some(SortKey::Count),
            "group" | "term_group" => Some(SortKey::Group),
            "order" | "term_order" | "weight" => Some(SortKey::Order),
            "id" | "term_id" => Some(SortKey::Id),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Slug => "slug",
            SortKey::Count => "count",
            SortKey::Group => "group",
            SortKey::Order => "order",
            SortKey::Id => "id",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Boolean combinator for predicate groups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    /// Parse a declared combinator ("and"/"or", case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "and" | "all" => Some(Combinator::And),
            "or" | "any" => Some(Combinator::Or),
            _ => None,
        }
    }
}

/// Whether chosen values include or exclude matching items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Include,
    Exclude,
}

/// Normalized declaration of one facet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacetSpec {
    /// Unique facet identifier within a widget.
    pub id: String,

    /// Value source.
    pub kind: SourceKind,

    /// Taxonomy name or field key.
    pub key: String,

    /// Human-readable label.
    pub label: Option<String>,

    /// Presentation style.
    pub display: DisplayStyle,

    /// Value ordering.
    pub sort: SortKey,

    /// Value ordering direction.
    pub direction: SortDirection,

    /// Include taxonomy terms that have no items.
    pub show_empty: bool,

    /// Resolve taxonomy values as roots plus one generation of children.
    pub hierarchical: bool,

    /// Children are collapsed behind a toggle in the control.
    pub child_toggle: bool,

    /// Number of values shown before a "show more" toggle (None = all).
    pub truncate_after: Option<usize>,

    /// How multiple chosen values of this facet combine.
    pub combinator: Combinator,

    /// Whether value counts are shown (and computed for field facets).
    pub show_count: bool,

    /// Include or exclude items carrying the chosen values.
    pub match_mode: MatchMode,

    /// Derive candidate values from the current archive context.
    pub narrow_to_archive: bool,
}

impl FacetSpec {
    /// Create a spec with defaults for everything but the source.
    pub fn new(id: impl Into<String>, kind: SourceKind, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            key: key.into(),
            label: None,
            display: if kind == SourceKind::NumericField {
                DisplayStyle::Range
            } else {
                DisplayStyle::Checkbox
            },
            sort: SortKey::Name,
            direction: SortDirection::Asc,
            show_empty: false,
            hierarchical: false,
            child_toggle: false,
            truncate_after: Some(crate::config::DEFAULT_TRUNCATE_AFTER),
            combinator: Combinator::Or,
            show_count: false,
            match_mode: MatchMode::Include,
            narrow_to_archive: false,
        }
    }

    /// Whether the key can be handed to the repository.
    ///
    /// Allows alphanumeric, underscores, dashes and dots (nested field paths).
    /// Must be non-empty and start with a letter or underscore.
    pub fn has_valid_key(&self) -> bool {
        let mut chars = self.key.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return false;
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    }

    /// Cache key for this facet's value set: `facet:<kind>:<key>[:<context>]`.
    ///
    /// The archive context only participates when dynamic narrowing is on.
    /// Settings that change the contents or order of the set are appended
    /// when they differ from the defaults, so facets sharing a source never
    /// share an entry with a different shape.
    pub fn cache_key(&self, context: &ArchiveContext) -> String {
        let mut key = format!("facet:{}:{}", self.kind.as_str(), self.key);
        if self.narrow_to_archive
            && let Some(ctx) = context.cache_token()
        {
            key.push(':');
            key.push_str(&ctx);
        }
        if self.show_empty {
            key.push_str(":all");
        }
        if self.hierarchical {
            key.push_str(":tree");
        }
        if self.show_count {
            key.push_str(":counts");
        }
        if self.sort != SortKey::Name || self.direction != SortDirection::Asc {
            key.push_str(&format!(
                ":by:{}:{}",
                self.sort.as_str(),
                self.direction.as_str()
            ));
        }
        key
    }

    /// Cache key for the direct children of one taxonomy term.
    pub fn children_cache_key(&self, context: &ArchiveContext, parent_id: &str) -> String {
        format!("{}:children:{parent_id}", self.cache_key(context))
    }
}

/// One selectable facet value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacetValue {
    /// Value identifier submitted back in selections (term id or field value).
    pub value_id: String,

    /// Display label.
    pub label: String,

    /// URL-safe slug, when the source has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    /// Number of items carrying this value, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,

    /// Parent value id for hierarchical taxonomies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl FacetValue {
    /// Create a value with no slug, count, or parent.
    pub fn new(value_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value_id: value_id.into(),
            label: label.into(),
            slug: None,
            count: None,
            parent: None,
        }
    }
}

/// Observed bounds of a numeric facet.
///
/// Always `min <= max`; both zero when no numeric data exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct NumericBounds {
    pub min: f64,
    pub max: f64,
}

impl NumericBounds {
    /// Bounds for a facet with no numeric data.
    pub fn empty() -> Self {
        Self { min: 0.0, max: 0.0 }
    }

    /// Derive bounds from observed values; non-finite values are ignored.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut bounds: Option<(f64, f64)> = None;
        for v in values.into_iter().filter(|v| v.is_finite()) {
            bounds = Some(match bounds {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        bounds
            .map(|(min, max)| Self { min, max })
            .unwrap_or_else(Self::empty)
    }

    /// Whether the range control degenerates to a no-op.
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }
}

/// Resolved candidate values for one facet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacetValueSet {
    /// Facet identifier.
    pub facet_id: String,

    /// Ordered values. For hierarchical taxonomies each root is followed by
    /// its direct children.
    pub values: Vec<FacetValue>,

    /// Numeric bounds (numeric facets only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<NumericBounds>,

    /// When the set was computed.
    pub cached_at: DateTime<Utc>,

    /// Time to live in seconds.
    pub ttl_secs: u64,
}

impl FacetValueSet {
    /// Create an empty set (used when a facet cannot be resolved).
    pub fn empty(facet_id: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            facet_id: facet_id.into(),
            values: Vec::new(),
            bounds: None,
            cached_at: now,
            ttl_secs: ttl.as_secs(),
        }
    }

    /// Instant after which the set must not be served.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        self.cached_at
            .checked_add_signed(chrono::Duration::seconds(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the set may still be served at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    /// Whether no values or bounds were found.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.bounds.is_none_or(|b| b == NumericBounds::empty())
    }

    /// Root-level values (no parent).
    pub fn roots(&self) -> impl Iterator<Item = &FacetValue> {
        self.values.iter().filter(|v| v.parent.is_none())
    }

    /// Direct children of a value.
    pub fn children_of<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a FacetValue> {
        self.values
            .iter()
            .filter(move |v| v.parent.as_deref() == Some(parent_id))
    }
}

/// Operator applied to a selection's values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionOperator {
    In,
    NotIn,
}

/// User-submitted values for one facet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    /// Facet identifier.
    pub facet_id: String,

    /// Chosen values (trimmed, de-duplicated, in submission order).
    pub values: Vec<String>,

    /// Operator derived from the facet's match mode.
    pub operator: SelectionOperator,
}

impl Selection {
    /// Build a selection for a facet, deriving the operator from its match mode.
    pub fn for_spec<I, S>(spec: &FacetSpec, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        let values = values
            .into_iter()
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty())
            .filter(|v| seen.insert(v.clone()))
            .collect();
        Self {
            facet_id: spec.id.clone(),
            values,
            operator: match spec.match_mode {
                MatchMode::Include => SelectionOperator::In,
                MatchMode::Exclude => SelectionOperator::NotIn,
            },
        }
    }

    /// Whether the selection constrains nothing.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether a value is chosen.
    pub fn contains(&self, value_id: &str) -> bool {
        self.values.iter().any(|v| v == value_id)
    }
}
