//! Immutable snapshot of the ambient request.
//!
//! The host builds one `RequestState` per request from its routing and query
//! state. Detection and pagination read it instead of global request state,
//! so both stay pure and testable without a live request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permission that lets an editor bypass the facet value cache.
pub const EDIT_LISTINGS_PERMISSION: &str = "edit listings";

/// User context for the current request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserContext {
    /// User ID (Uuid::nil() for anonymous).
    pub id: Uuid,
    /// Whether the user is authenticated.
    pub authenticated: bool,
    /// Cached permissions for the user.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl UserContext {
    /// Create context for anonymous user.
    pub fn anonymous() -> Self {
        Self {
            id: Uuid::nil(),
            authenticated: false,
            permissions: Vec::new(),
        }
    }

    /// Create context for authenticated user.
    pub fn authenticated(id: Uuid, permissions: Vec<String>) -> Self {
        Self {
            id,
            authenticated: true,
            permissions,
        }
    }

    /// Check if user has a specific permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Check if user is admin.
    pub fn is_admin(&self) -> bool {
        self.has_permission("administer site")
    }

    /// Editors authoring listings always see live facet data.
    pub fn is_privileged_editor(&self) -> bool {
        self.authenticated && (self.is_admin() || self.has_permission(EDIT_LISTINGS_PERMISSION))
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// The host's route classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Home feed (latest items).
    Home,
    /// Static front page.
    FrontPage,
    Author,
    Taxonomy,
    PostTypeArchive,
    Search,
    Singular,
    /// Session-scoped saved items list.
    SavedItems,
    #[default]
    Unknown,
}

/// The object the host resolved the route to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueriedObject {
    Author {
        id: Uuid,
    },
    Term {
        taxonomy: String,
        term_id: Uuid,
        /// Canonical link of the term archive.
        #[serde(default)]
        link: Option<String>,
    },
    PostType {
        slug: String,
    },
    Item {
        id: Uuid,
        item_type: String,
    },
}

/// Which loop renders the listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    /// The listing renders the page's own query.
    #[default]
    Main,
    /// The listing runs its own in-page query.
    Secondary,
}

/// Per-request ambient state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestState {
    /// Route classification.
    #[serde(default)]
    pub route: RouteKind,

    /// Object the route resolved to.
    #[serde(default)]
    pub queried_object: Option<QueriedObject>,

    /// Loop rendering the listing.
    #[serde(default)]
    pub loop_kind: LoopKind,

    /// Another listing on the page already owns the primary pager.
    #[serde(default)]
    pub secondary_pager_active: bool,

    /// Search terms of a search route.
    #[serde(default)]
    pub search_terms: Option<String>,

    /// Host's primary page counter, as requested (may be out of range).
    #[serde(default)]
    pub primary_page: Option<i64>,

    /// Host's secondary-loop page counter, as requested.
    #[serde(default)]
    pub secondary_page: Option<i64>,

    /// Query string parameters.
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,

    /// Current URL (absolute, or a path with optional query string).
    #[serde(default = "default_current_url")]
    pub current_url: String,

    /// Host emits pretty `/page/N/` links instead of `?paged=N`.
    #[serde(default)]
    pub pretty_links: bool,

    /// Identifier of the widget rendering the listing.
    #[serde(default)]
    pub widget_id: Option<String>,

    /// Item ids of the session-scoped saved items list.
    #[serde(default)]
    pub saved_items: Vec<Uuid>,

    /// User context for this request.
    #[serde(default)]
    pub user: UserContext,
}

fn default_current_url() -> String {
    "/".to_string()
}

impl RequestState {
    /// Create a request state for a route at a URL.
    pub fn new(route: RouteKind, current_url: impl Into<String>) -> Self {
        Self {
            route,
            current_url: current_url.into(),
            ..Default::default()
        }
    }

    /// Set the queried object.
    pub fn with_object(mut self, object: QueriedObject) -> Self {
        self.queried_object = Some(object);
        self
    }

    /// Mark the listing as an isolated in-page query.
    pub fn secondary(mut self) -> Self {
        self.loop_kind = LoopKind::Secondary;
        self
    }

    /// Set the primary page counter.
    pub fn with_primary_page(mut self, page: i64) -> Self {
        self.primary_page = Some(page);
        self
    }

    /// Set the secondary-loop page counter.
    pub fn with_secondary_page(mut self, page: i64) -> Self {
        self.secondary_page = Some(page);
        self
    }

    /// Add a query parameter.
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.query_params.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the search terms.
    pub fn with_search(mut self, terms: &str) -> Self {
        self.search_terms = Some(terms.to_string());
        self
    }

    /// Enable pretty page links.
    pub fn with_pretty_links(mut self) -> Self {
        self.pretty_links = true;
        self
    }

    /// Set the widget identifier.
    pub fn with_widget(mut self, widget_id: &str) -> Self {
        self.widget_id = Some(widget_id.to_string());
        self
    }

    /// Set the saved item ids.
    pub fn with_saved_items(mut self, ids: Vec<Uuid>) -> Self {
        self.saved_items = ids;
        self
    }

    /// Set the user context.
    pub fn with_user(mut self, user: UserContext) -> Self {
        self.user = user;
        self
    }

    /// Get a query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Canonical link of the queried term, when the route resolved to one.
    pub fn term_link(&self) -> Option<&str> {
        match &self.queried_object {
            Some(QueriedObject::Term {
                link: Some(link), ..
            }) if !link.trim().is_empty() => Some(link.as_str()),
            _ => None,
        }
    }
}
