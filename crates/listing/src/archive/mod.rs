//! Archive context detection and pagination.
//!
//! This module provides:
//! - RequestState: immutable snapshot of the ambient request
//! - ArchiveContext: classification of the request's scope
//! - PaginationResolver: canonical page number and link format per scope

mod detector;
mod pagination;
mod request_state;

pub use detector::detect_archive_context;
pub use pagination::{
    LinkFormat, PAGE_PLACEHOLDER, PageSource, PagerItem, PagerTrigger, PaginationMode,
    PaginationResolver, PaginationState, TriggerKind,
};
pub use request_state::{
    EDIT_LISTINGS_PERMISSION, LoopKind, QueriedObject, RequestState, RouteKind, UserContext,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scope of the ambient request, without its identifiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveScope {
    None,
    Author,
    TaxonomyTerm,
    PostType,
    Search,
    Singular,
    MainLoop,
}

/// Classified ambient request scope with its narrowing identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ArchiveContext {
    /// Unrecognized or unscoped request.
    #[default]
    None,
    Author {
        author_id: Uuid,
    },
    TaxonomyTerm {
        taxonomy: String,
        term_id: Uuid,
    },
    PostType {
        post_type: String,
    },
    Search {
        query: String,
    },
    Singular {
        item_id: Uuid,
        item_type: String,
    },
    /// Home feed or front page main loop.
    MainLoop,
}

impl ArchiveContext {
    /// Scope without identifiers.
    pub fn scope(&self) -> ArchiveScope {
        match self {
            ArchiveContext::None => ArchiveScope::None,
            ArchiveContext::Author { .. } => ArchiveScope::Author,
            ArchiveContext::TaxonomyTerm { .. } => ArchiveScope::TaxonomyTerm,
            ArchiveContext::PostType { .. } => ArchiveScope::PostType,
            ArchiveContext::Search { .. } => ArchiveScope::Search,
            ArchiveContext::Singular { .. } => ArchiveScope::Singular,
            ArchiveContext::MainLoop => ArchiveScope::MainLoop,
        }
    }

    /// Token identifying the narrowed content set, for cache keys.
    ///
    /// Unscoped contexts narrow nothing and return None.
    pub fn cache_token(&self) -> Option<String> {
        match self {
            ArchiveContext::None | ArchiveContext::MainLoop => None,
            ArchiveContext::Author { author_id } => Some(format!("author:{author_id}")),
            ArchiveContext::TaxonomyTerm { taxonomy, term_id } => {
                Some(format!("term:{taxonomy}:{term_id}"))
            }
            ArchiveContext::PostType { post_type } => Some(format!("post_type:{post_type}")),
            ArchiveContext::Search { query } => {
                Some(format!("search:{}", query.trim().to_lowercase()))
            }
            ArchiveContext::Singular { item_id, .. } => Some(format!("item:{item_id}")),
        }
    }

    /// Whether the context narrows the content set at all.
    pub fn is_narrowing(&self) -> bool {
        self.cache_token().is_some()
    }

    /// Taxonomy term the context is scoped to.
    pub fn term(&self) -> Option<(&str, Uuid)> {
        match self {
            ArchiveContext::TaxonomyTerm { taxonomy, term_id } => Some((taxonomy.as_str(), *term_id)),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn cache_tokens() {
        let id = Uuid::nil();
        assert_eq!(ArchiveContext::None.cache_token(), None);
        assert_eq!(ArchiveContext::MainLoop.cache_token(), None);
        assert_eq!(
            ArchiveContext::Author { author_id: id }.cache_token(),
            Some(format!("author:{id}"))
        );
        assert_eq!(
            ArchiveContext::Search {
                query: " Rust ".into()
            }
            .cache_token(),
            Some("search:rust".to_string())
        );
    }

    #[test]
    fn context_serialization_is_tagged() {
        let ctx = ArchiveContext::PostType {
            post_type: "product".into(),
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["scope"], "post_type");
        assert_eq!(json["post_type"], "product");
        assert_eq!(ctx.scope(), ArchiveScope::PostType);
    }
}
