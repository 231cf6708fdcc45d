//! Facet declarations and selection parsing.
//!
//! Widget settings declare facets loosely (strings for kinds, styles and sort
//! keys). `FacetCatalog` normalizes them into `FacetSpec`s, dropping entries
//! it cannot use, and parses a request's query parameters into selections.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::{
    Combinator, DisplayStyle, FacetSpec, MatchMode, Selection, SortDirection, SortKey, SourceKind,
};
use crate::archive::RequestState;
use crate::config::DEFAULT_TRUNCATE_AFTER;

/// Query parameter prefix for facet selections: `filter[<facet id>]`.
pub const FILTER_PARAM_PREFIX: &str = "filter";

/// Facet declaration as stored in widget settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetDeclaration {
    /// Facet identifier; derived from source and key when blank.
    #[serde(default)]
    pub id: String,

    /// Source kind ("taxonomy", "field", "numeric").
    pub source: String,

    /// Taxonomy name or field path.
    pub key: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub display: Option<String>,

    #[serde(default)]
    pub sort: Option<String>,

    /// "asc" or "desc".
    #[serde(default)]
    pub order: Option<String>,

    #[serde(default)]
    pub show_empty: bool,

    #[serde(default)]
    pub hierarchical: bool,

    #[serde(default)]
    pub child_toggle: bool,

    /// Collapse long value lists (on by default).
    #[serde(default)]
    pub truncate: Option<bool>,

    /// Values shown before collapsing.
    #[serde(default)]
    pub truncate_after: Option<usize>,

    /// "and" or "or" across this facet's values.
    #[serde(default)]
    pub logic: Option<String>,

    #[serde(default)]
    pub show_count: bool,

    /// Chosen values exclude instead of include.
    #[serde(default)]
    pub exclude: bool,
}

/// Catalog-wide defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogOptions {
    /// Facets derive values from the archive context.
    pub dynamic_narrowing: bool,
    pub truncate_after: usize,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            dynamic_narrowing: false,
            truncate_after: DEFAULT_TRUNCATE_AFTER,
        }
    }
}

/// Normalized facets of one widget, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetCatalog {
    specs: Vec<FacetSpec>,
}

impl FacetCatalog {
    /// Build a catalog from already-normalized specs.
    pub fn new(specs: Vec<FacetSpec>) -> Self {
        Self { specs }
    }

    /// Normalize declarations.
    ///
    /// Declarations with an unknown source or a duplicate id are dropped with
    /// a warning. Unknown display styles, sort keys and combinators fall back
    /// to their defaults.
    pub fn from_declarations(declarations: &[FacetDeclaration], options: CatalogOptions) -> Self {
        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(declarations.len());

        for decl in declarations {
            let Some(kind) = SourceKind::parse(&decl.source) else {
                warn!(source = %decl.source, key = %decl.key, "unknown facet source; dropped");
                continue;
            };
            let key = decl.key.trim().to_string();
            let id = match decl.id.trim() {
                "" => format!("{}_{}", kind.as_str(), key.replace('.', "_")),
                id => id.to_string(),
            };
            if !seen.insert(id.clone()) {
                warn!(facet = %id, "duplicate facet id; dropped");
                continue;
            }

            let mut spec = FacetSpec::new(id, kind, key);
            spec.label = decl.label.clone().filter(|l| !l.trim().is_empty());
            if let Some(display) = decl.display.as_deref().and_then(DisplayStyle::parse) {
                spec.display = display;
            }
            if let Some(sort) = decl.sort.as_deref().and_then(SortKey::parse) {
                spec.sort = sort;
            }
            if let Some(order) = decl.order.as_deref() {
                spec.direction = match order.trim().to_ascii_lowercase().as_str() {
                    "desc" => SortDirection::Desc,
                    _ => SortDirection::Asc,
                };
            }
            if let Some(logic) = decl.logic.as_deref().and_then(Combinator::parse) {
                spec.combinator = logic;
            }
            spec.show_empty = decl.show_empty;
            spec.hierarchical = decl.hierarchical && kind == SourceKind::Taxonomy;
            spec.child_toggle = decl.child_toggle && spec.hierarchical;
            spec.truncate_after = match decl.truncate {
                Some(false) => None,
                _ => Some(decl.truncate_after.unwrap_or(options.truncate_after)),
            };
            spec.show_count = decl.show_count;
            spec.match_mode = if decl.exclude {
                MatchMode::Exclude
            } else {
                MatchMode::Include
            };
            spec.narrow_to_archive = options.dynamic_narrowing;

            if !spec.has_valid_key() {
                warn!(facet = %spec.id, key = %spec.key, "facet key is not usable; values will be empty");
            }
            specs.push(spec);
        }

        Self { specs }
    }

    pub fn specs(&self) -> &[FacetSpec] {
        &self.specs
    }

    /// Spec by facet id.
    pub fn get(&self, id: &str) -> Option<&FacetSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Parse selections from name/value pairs.
    ///
    /// Accepts `filter[<id>]=a,b` and `filter[<id>][]=a` (repeated). Values
    /// for the same facet accumulate; pairs for unknown facets are ignored.
    pub fn selections_from_pairs<I, K, V>(&self, pairs: I) -> Vec<Selection>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut raw: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (name, value) in pairs {
            let Some(spec) = facet_id_of(name.as_ref()).and_then(|id| self.get(id)) else {
                continue;
            };
            raw.entry(spec.id.as_str())
                .or_default()
                .extend(value.as_ref().split(',').map(str::to_string));
        }

        self.specs
            .iter()
            .filter_map(|spec| {
                let values = raw.get(spec.id.as_str())?;
                let selection = Selection::for_spec(spec, values);
                (!selection.is_empty()).then_some(selection)
            })
            .collect()
    }

    /// Parse selections from a raw query string.
    pub fn selections_from_query(&self, query: &str) -> Vec<Selection> {
        let query = query.strip_prefix('?').unwrap_or(query);
        self.selections_from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    /// Parse selections from a request's query parameters.
    pub fn selections(&self, state: &RequestState) -> Vec<Selection> {
        self.selections_from_pairs(&state.query_params)
    }
}

/// Facet id of a selection parameter name.
fn facet_id_of(name: &str) -> Option<&str> {
    let rest = name.strip_prefix(FILTER_PARAM_PREFIX)?.strip_prefix('[')?;
    let rest = rest.strip_suffix("[]").unwrap_or(rest);
    let id = rest.strip_suffix(']')?;
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::archive::RouteKind;

    fn decl(source: &str, key: &str) -> FacetDeclaration {
        FacetDeclaration {
            source: source.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    #[test]
    fn normalizes_and_derives_ids() {
        let catalog = FacetCatalog::from_declarations(
            &[decl("taxonomy", "topics"), decl("field", "meta.color")],
            CatalogOptions::default(),
        );
        let ids: Vec<&str> = catalog.specs().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["taxonomy_topics", "field_meta_color"]);
        assert_eq!(catalog.specs()[0].truncate_after, Some(6));
    }

    #[test]
    fn drops_unknown_sources_and_duplicates() {
        let mut first = decl("field", "color");
        first.id = "color".into();
        let mut dup = decl("taxonomy", "colors");
        dup.id = "color".into();

        let catalog = FacetCatalog::from_declarations(
            &[first, decl("bogus", "x"), dup],
            CatalogOptions::default(),
        );
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("color").unwrap().kind, SourceKind::Field);
    }

    #[test]
    fn applies_declared_options() {
        let mut d = decl("taxonomy", "topics");
        d.display = Some("dropdown".into());
        d.sort = Some("count".into());
        d.order = Some("DESC".into());
        d.logic = Some("and".into());
        d.truncate = Some(false);
        d.exclude = true;
        d.hierarchical = true;
        d.child_toggle = true;

        let catalog = FacetCatalog::from_declarations(
            &[d],
            CatalogOptions {
                dynamic_narrowing: true,
                truncate_after: 6,
            },
        );
        let spec = &catalog.specs()[0];
        assert_eq!(spec.display, DisplayStyle::Dropdown);
        assert_eq!(spec.sort, SortKey::Count);
        assert_eq!(spec.direction, SortDirection::Desc);
        assert_eq!(spec.combinator, Combinator::And);
        assert_eq!(spec.truncate_after, None);
        assert_eq!(spec.match_mode, MatchMode::Exclude);
        assert!(spec.child_toggle);
        assert!(spec.narrow_to_archive);
    }

    #[test]
    fn hierarchy_only_for_taxonomies() {
        let mut d = decl("field", "color");
        d.hierarchical = true;
        d.child_toggle = true;
        let catalog = FacetCatalog::from_declarations(&[d], CatalogOptions::default());
        assert!(!catalog.specs()[0].hierarchical);
        assert!(!catalog.specs()[0].child_toggle);
    }

    #[test]
    fn parses_selection_params() {
        let mut color = decl("field", "color");
        color.id = "color".into();
        let mut size = decl("field", "size");
        size.id = "size".into();
        let catalog = FacetCatalog::from_declarations(&[color, size], CatalogOptions::default());

        let selections = catalog.selections_from_query(
            "?filter%5Bcolor%5D=red,blue&filter[size][]=S&filter[size][]=M&filter[nope]=x&q=1",
        );
        assert_eq!(selections.len(), 2);
        assert_eq!(selections[0].values, vec!["red", "blue"]);
        assert_eq!(selections[1].values, vec!["S", "M"]);
    }

    #[test]
    fn blank_selection_values_are_dropped() {
        let mut color = decl("field", "color");
        color.id = "color".into();
        let catalog = FacetCatalog::from_declarations(&[color], CatalogOptions::default());

        let state = RequestState::new(RouteKind::Home, "/").with_param("filter[color]", " , ");
        assert!(catalog.selections(&state).is_empty());
    }

    #[test]
    fn declaration_deserializes_with_defaults() {
        let json = r#"{"source": "numeric", "key": "price", "display": "slider"}"#;
        let d: FacetDeclaration = serde_json::from_str(json).unwrap();
        let catalog = FacetCatalog::from_declarations(&[d], CatalogOptions::default());
        let spec = catalog.get("numeric_price").unwrap();
        assert_eq!(spec.kind, SourceKind::NumericField);
        assert_eq!(spec.display, DisplayStyle::Range);
    }
}
