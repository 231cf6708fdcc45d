//! Facet engine.
//!
//! This module provides:
//! - FacetCatalog: normalized facet declarations and selection parsing
//! - FacetValueResolver: cached candidate values per facet
//! - PredicateBuilder: selections to a storage-agnostic predicate tree
//! - PostgresListingQuery: SQL rendering of a listing query
//! - RendererRegistry: presentation per display style

mod catalog;
mod predicate;
mod query_builder;
mod render;
mod resolver;
mod types;

pub use catalog::{CatalogOptions, FILTER_PARAM_PREFIX, FacetCatalog, FacetDeclaration};
pub use predicate::{Condition, PredicateBuilder, PredicateLeaf, PredicateNode};
pub use query_builder::{ListingQuery, ListingSort, PostgresListingQuery};
pub use render::{
    CheckboxRenderer, ControlOption, DropdownRenderer, FacetControl, FacetRenderer, ListRenderer,
    MultiSelectRenderer, RadioRenderer, RangeRenderer, RendererRegistry,
};
pub use resolver::FacetValueResolver;
pub use types::{
    Combinator, DisplayStyle, FacetSpec, FacetValue, FacetValueSet, MatchMode, NumericBounds,
    Selection, SelectionOperator, SortDirection, SortKey, SourceKind,
};
