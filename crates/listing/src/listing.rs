//! Listing orchestration.
//!
//! `ListingService` runs one listing render end to end: detect the archive
//! context, resolve facet values, build the predicate, count and fetch the
//! result slice, resolve pagination, and present each facet.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::archive::{
    ArchiveContext, LoopKind, PaginationMode, PaginationResolver, PaginationState, RequestState,
    RouteKind, detect_archive_context,
};
use crate::cache::{Clock, ValueCache};
use crate::config::ListingConfig;
use crate::error::ListingResult;
use crate::facet::{
    CatalogOptions, Combinator, FacetCatalog, FacetControl, FacetDeclaration, FacetValueResolver,
    FacetValueSet, ListingQuery, ListingSort, PredicateBuilder, PredicateNode, RendererRegistry,
};
use crate::repository::{ContentItem, ContentRepository};

/// Default items per page.
pub const DEFAULT_PER_PAGE: u32 = 10;

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

/// Widget settings for one listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingWidget {
    /// Widget identifier, used for its dedicated pager parameter.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub facets: Vec<FacetDeclaration>,

    /// Logic joining facets.
    #[serde(default)]
    pub parent_logic: Combinator,

    /// Derive facet values from the archive context.
    #[serde(default)]
    pub dynamic_narrowing: bool,

    #[serde(default)]
    pub pagination: PaginationMode,

    #[serde(default = "default_per_page")]
    pub per_page: u32,

    #[serde(default)]
    pub sort: ListingSort,

    /// Restrict results to one item type.
    #[serde(default)]
    pub item_type: Option<String>,
}

impl Default for ListingWidget {
    fn default() -> Self {
        Self {
            id: None,
            facets: Vec::new(),
            parent_logic: Combinator::And,
            dynamic_narrowing: false,
            pagination: PaginationMode::Numbered,
            per_page: DEFAULT_PER_PAGE,
            sort: ListingSort::default(),
            item_type: None,
        }
    }
}

/// One rendered listing.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListingPage {
    pub context: ArchiveContext,
    pub facets: Vec<FacetValueSet>,
    pub controls: Vec<FacetControl>,
    pub predicate: PredicateNode,
    pub items: Vec<ContentItem>,
    pub total: u64,
    pub pagination: PaginationState,
    /// Nothing matched; the host shows its empty-results message.
    pub no_results: bool,
}

/// Renders listings against a repository.
pub struct ListingService {
    repository: Arc<dyn ContentRepository>,
    resolver: FacetValueResolver,
    pagination: PaginationResolver,
    renderers: RendererRegistry,
    config: ListingConfig,
}

impl ListingService {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        cache: ValueCache,
        config: ListingConfig,
    ) -> Self {
        Self {
            resolver: FacetValueResolver::new(repository.clone(), cache),
            pagination: PaginationResolver::new(config.page_param.clone()),
            renderers: RendererRegistry::default(),
            repository,
            config,
        }
    }

    /// Build a service with the cache stack described by the configuration.
    pub fn from_config(
        repository: Arc<dyn ContentRepository>,
        config: ListingConfig,
        clock: Arc<dyn Clock>,
    ) -> ListingResult<Self> {
        config.validate()?;
        let cache = ValueCache::from_config(&config, clock)?;
        Ok(Self::new(repository, cache, config))
    }

    /// Replace the renderer registry.
    pub fn with_renderers(mut self, renderers: RendererRegistry) -> Self {
        self.renderers = renderers;
        self
    }

    pub fn resolver(&self) -> &FacetValueResolver {
        &self.resolver
    }

    /// Render a listing for a request.
    ///
    /// Repository failures degrade to empty results; rendering never fails.
    pub fn render(&self, widget: &ListingWidget, state: &RequestState) -> ListingPage {
        let catalog = FacetCatalog::from_declarations(
            &widget.facets,
            CatalogOptions {
                dynamic_narrowing: widget.dynamic_narrowing,
                truncate_after: self.config.truncate_after,
            },
        );
        let context = detect_archive_context(state);
        let privileged = state.user.is_privileged_editor();

        let facets = self.resolver.resolve_all(&catalog, &context, privileged);

        let builder = PredicateBuilder::new(widget.parent_logic).with_archive(&context);
        let selections = builder.effective_selections(&catalog.selections(state), catalog.specs());
        let predicate = builder.build(&selections, catalog.specs());

        let per_page = self.per_page(widget.per_page);
        let mut query = ListingQuery::new(predicate.clone(), u64::from(per_page));
        query.sort = widget.sort.clone();
        query.item_type = widget.item_type.clone();
        if state.loop_kind == LoopKind::Main && context.is_narrowing() {
            query.scope = Some(context.clone());
        }
        if state.route == RouteKind::SavedItems {
            query.item_ids = Some(state.saved_items.clone());
        }

        let total = self.repository.count(&query).unwrap_or_else(|e| {
            warn!(error = %e, "listing count failed; rendering empty");
            0
        });

        let mut state = state.clone();
        if let Some(id) = &widget.id
            && state.widget_id.is_none()
        {
            state.widget_id = Some(id.clone());
        }
        let pagination = self
            .pagination
            .resolve(&context, widget.pagination, total, per_page, &state);

        // Without a pager only the first slice is reachable.
        let (offset, limit) = match widget.pagination {
            PaginationMode::None => (0, u64::from(per_page)),
            _ => pagination.slice(per_page),
        };
        let query = query.with_slice(offset, limit);
        let items = if total == 0 {
            Vec::new()
        } else {
            self.repository.fetch(&query).unwrap_or_else(|e| {
                warn!(error = %e, "listing fetch failed; rendering empty");
                Vec::new()
            })
        };

        let controls = catalog
            .specs()
            .iter()
            .zip(&facets)
            .map(|(spec, values)| {
                let selection = selections.iter().find(|s| s.facet_id == spec.id);
                self.renderers.present(spec, values, selection)
            })
            .collect();

        debug!(
            scope = ?context.scope(),
            total,
            page = pagination.current_page,
            pages = pagination.total_pages,
            "listing rendered"
        );

        ListingPage {
            context,
            facets,
            controls,
            predicate,
            no_results: items.is_empty(),
            items,
            total,
            pagination,
        }
    }

    /// Clamp a widget's page size to the configured cap.
    fn per_page(&self, requested: u32) -> u32 {
        if requested == 0 {
            return DEFAULT_PER_PAGE.min(self.config.max_per_page);
        }
        if requested > self.config.max_per_page {
            warn!(
                requested,
                max = self.config.max_per_page,
                "per_page exceeds maximum, capping"
            );
            return self.config.max_per_page;
        }
        requested
    }
}

impl std::fmt::Debug for ListingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingService")
            .field("resolver", &self.resolver)
            .field("renderers", &self.renderers)
            .field("config", &self.config)
            .finish()
    }
}
