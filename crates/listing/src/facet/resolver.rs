//! Facet value resolution with caching.
//!
//! Resolution never fails outward: a facet with an invalid key, an unknown
//! taxonomy or an unavailable repository resolves to an empty value set and
//! the listing keeps rendering. Only successful resolutions are cached.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::catalog::FacetCatalog;
use super::types::{
    FacetSpec, FacetValue, FacetValueSet, NumericBounds, SortDirection, SortKey, SourceKind,
};
use crate::archive::ArchiveContext;
use crate::cache::ValueCache;
use crate::error::RepositoryError;
use crate::repository::{ContentRepository, Term, TermLevel, TermQuery, json_value_to_string};

/// Resolves candidate values for facets.
#[derive(Clone)]
pub struct FacetValueResolver {
    repository: Arc<dyn ContentRepository>,
    cache: ValueCache,
}

impl FacetValueResolver {
    pub fn new(repository: Arc<dyn ContentRepository>, cache: ValueCache) -> Self {
        Self { repository, cache }
    }

    /// Resolve the value set of one facet.
    ///
    /// Unprivileged callers are served from cache while the entry is fresh.
    /// Privileged callers always recompute and refresh the entry.
    pub fn resolve(
        &self,
        spec: &FacetSpec,
        context: &ArchiveContext,
        privileged: bool,
    ) -> FacetValueSet {
        if !spec.has_valid_key() {
            warn!(facet = %spec.id, key = %spec.key, "invalid facet key; resolving empty");
            return self.empty(spec);
        }

        let key = spec.cache_key(context);
        if !privileged && let Some(mut set) = self.cache.get(&key) {
            debug!(facet = %spec.id, key = %key, "facet values served from cache");
            // Facets with the same source and settings share one entry.
            set.facet_id.clone_from(&spec.id);
            return set;
        }

        let computed = match spec.kind {
            SourceKind::Taxonomy => self.resolve_taxonomy(spec, context, privileged),
            SourceKind::Field => self.resolve_field(spec, context),
            SourceKind::NumericField => self.resolve_numeric(spec, context),
        };

        match computed {
            Ok(set) => {
                debug!(
                    facet = %spec.id,
                    key = %key,
                    values = set.values.len(),
                    privileged,
                    "facet values computed"
                );
                self.cache.set(&key, &set);
                set
            }
            Err(e) => {
                warn!(facet = %spec.id, error = %e, "facet resolution failed; resolving empty");
                self.empty(spec)
            }
        }
    }

    /// Resolve every facet of a catalog, in declaration order.
    pub fn resolve_all(
        &self,
        catalog: &FacetCatalog,
        context: &ArchiveContext,
        privileged: bool,
    ) -> Vec<FacetValueSet> {
        catalog
            .specs()
            .iter()
            .map(|spec| self.resolve(spec, context, privileged))
            .collect()
    }

    /// Direct children of one taxonomy term, cached under their own key.
    pub fn resolve_children(
        &self,
        spec: &FacetSpec,
        context: &ArchiveContext,
        parent_id: uuid::Uuid,
        privileged: bool,
    ) -> FacetValueSet {
        if spec.kind != SourceKind::Taxonomy || !spec.has_valid_key() {
            return self.empty(spec);
        }
        match self.children(spec, context, parent_id, privileged) {
            Ok(set) => set,
            Err(e) => {
                warn!(facet = %spec.id, parent = %parent_id, error = %e, "child resolution failed");
                self.empty(spec)
            }
        }
    }

    fn children(
        &self,
        spec: &FacetSpec,
        context: &ArchiveContext,
        parent_id: uuid::Uuid,
        privileged: bool,
    ) -> Result<FacetValueSet, RepositoryError> {
        let key = spec.children_cache_key(context, &parent_id.to_string());
        if !privileged && let Some(mut set) = self.cache.get(&key) {
            set.facet_id.clone_from(&spec.id);
            return Ok(set);
        }

        let terms = self.fetch_terms(spec, context, TermLevel::ChildrenOf(parent_id))?;
        let set = self.value_set(spec, terms.into_iter().map(term_value).collect(), None);
        self.cache.set(&key, &set);
        Ok(set)
    }

    /// Hierarchical facets load one generation below the roots eagerly.
    /// Each parent's children are stored under their own key, so a later
    /// `resolve_children` for a root is answered from cache.
    fn resolve_taxonomy(
        &self,
        spec: &FacetSpec,
        context: &ArchiveContext,
        privileged: bool,
    ) -> Result<FacetValueSet, RepositoryError> {
        if !spec.hierarchical {
            let terms = self.fetch_terms(spec, context, TermLevel::All)?;
            return Ok(self.value_set(spec, terms.into_iter().map(term_value).collect(), None));
        }

        let roots = self.fetch_terms(spec, context, TermLevel::Roots)?;
        let mut values = Vec::new();
        for root in roots {
            let children = self.children(spec, context, root.id, privileged)?;
            values.push(term_value(root));
            values.extend(children.values);
        }
        Ok(self.value_set(spec, values, None))
    }

    fn resolve_field(
        &self,
        spec: &FacetSpec,
        context: &ArchiveContext,
    ) -> Result<FacetValueSet, RepositoryError> {
        let raw = self
            .repository
            .field_values(&spec.key, narrowing_scope(spec, context))?;

        // Distinct values in first-seen order, with occurrence counts.
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut order = Vec::new();
        for value in &raw {
            let strings: Vec<String> = match value {
                serde_json::Value::Array(values) => {
                    values.iter().filter_map(json_value_to_string).collect()
                }
                other => json_value_to_string(other).into_iter().collect(),
            };
            for s in strings {
                let count = counts.entry(s.clone()).or_insert(0);
                if *count == 0 {
                    order.push(s);
                }
                *count += 1;
            }
        }

        let values = order
            .into_iter()
            .map(|s| {
                let count = counts.get(&s).copied();
                let mut value = FacetValue::new(s.clone(), s);
                value.count = if spec.show_count { count } else { None };
                value
            })
            .collect();
        Ok(self.value_set(spec, values, None))
    }

    fn resolve_numeric(
        &self,
        spec: &FacetSpec,
        context: &ArchiveContext,
    ) -> Result<FacetValueSet, RepositoryError> {
        let raw = self
            .repository
            .field_values(&spec.key, narrowing_scope(spec, context))?;
        let numbers = raw.iter().flat_map(|v| -> Vec<f64> {
            match v {
                serde_json::Value::Array(values) => values.iter().filter_map(numeric).collect(),
                other => numeric(other).into_iter().collect(),
            }
        });
        let bounds = NumericBounds::from_values(numbers);
        Ok(self.value_set(spec, Vec::new(), Some(bounds)))
    }

    fn fetch_terms(
        &self,
        spec: &FacetSpec,
        context: &ArchiveContext,
        level: TermLevel,
    ) -> Result<Vec<Term>, RepositoryError> {
        let mut terms = self.repository.terms(&TermQuery {
            taxonomy: &spec.key,
            level,
            include_empty: spec.show_empty,
            scope: narrowing_scope(spec, context),
        })?;
        terms.sort_by(|a, b| {
            let ordering = compare_terms(a, b, spec.sort);
            match spec.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
        Ok(terms)
    }

    /// Assemble a set; field values are ordered here, terms arrive ordered.
    fn value_set(
        &self,
        spec: &FacetSpec,
        mut values: Vec<FacetValue>,
        bounds: Option<NumericBounds>,
    ) -> FacetValueSet {
        if spec.kind == SourceKind::Field {
            values.sort_by(|a, b| {
                let ordering = compare_values(a, b, spec.sort);
                match spec.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        FacetValueSet {
            values,
            bounds,
            ..self.empty(spec)
        }
    }

    fn empty(&self, spec: &FacetSpec) -> FacetValueSet {
        FacetValueSet::empty(&spec.id, self.cache.now(), self.cache.ttl())
    }
}

impl std::fmt::Debug for FacetValueResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacetValueResolver")
            .field("cache", &self.cache)
            .finish()
    }
}

/// Context narrowing applies only to facets that opt in.
fn narrowing_scope<'a>(spec: &FacetSpec, context: &'a ArchiveContext) -> Option<&'a ArchiveContext> {
    (spec.narrow_to_archive && context.is_narrowing()).then_some(context)
}

fn term_value(term: Term) -> FacetValue {
    FacetValue {
        value_id: term.id.to_string(),
        label: term.name,
        slug: Some(term.slug),
        count: Some(term.count),
        parent: term.parent.map(|p| p.to_string()),
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_terms(a: &Term, b: &Term, key: SortKey) -> Ordering {
    let by_name = || a.name.to_lowercase().cmp(&b.name.to_lowercase());
    match key {
        SortKey::Name => by_name(),
        SortKey::Slug => a.slug.cmp(&b.slug),
        SortKey::Count => a.count.cmp(&b.count),
        SortKey::Group => a.group.cmp(&b.group),
        SortKey::Order => a.weight.cmp(&b.weight),
        SortKey::Id => a.id.cmp(&b.id),
    }
    .then_with(by_name)
}

fn compare_values(a: &FacetValue, b: &FacetValue, key: SortKey) -> Ordering {
    let by_label = || a.label.to_lowercase().cmp(&b.label.to_lowercase());
    match key {
        SortKey::Count => a.count.cmp(&b.count).then_with(by_label),
        _ => by_label(),
    }
}
