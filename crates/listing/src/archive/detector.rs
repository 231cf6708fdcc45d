//! Archive context detection.
//!
//! Classifies a `RequestState` into exactly one `ArchiveContext`. Detection is
//! total: a route whose queried object is missing or of the wrong kind maps
//! to `ArchiveContext::None`.

use super::ArchiveContext;
use super::request_state::{QueriedObject, RequestState, RouteKind};

/// Classify the ambient request.
pub fn detect_archive_context(state: &RequestState) -> ArchiveContext {
    let object = state.queried_object.as_ref();

    let context = match state.route {
        RouteKind::Home | RouteKind::FrontPage => ArchiveContext::MainLoop,
        RouteKind::Author => match object {
            Some(QueriedObject::Author { id }) => ArchiveContext::Author { author_id: *id },
            _ => ArchiveContext::None,
        },
        RouteKind::Taxonomy => match object {
            Some(QueriedObject::Term {
                taxonomy, term_id, ..
            }) if !taxonomy.is_empty() => ArchiveContext::TaxonomyTerm {
                taxonomy: taxonomy.clone(),
                term_id: *term_id,
            },
            _ => ArchiveContext::None,
        },
        RouteKind::PostTypeArchive => match object {
            Some(QueriedObject::PostType { slug }) if !slug.is_empty() => {
                ArchiveContext::PostType {
                    post_type: slug.clone(),
                }
            }
            _ => ArchiveContext::None,
        },
        RouteKind::Search => ArchiveContext::Search {
            query: state.search_terms.clone().unwrap_or_default(),
        },
        RouteKind::Singular => match object {
            Some(QueriedObject::Item { id, item_type }) => ArchiveContext::Singular {
                item_id: *id,
                item_type: item_type.clone(),
            },
            _ => ArchiveContext::None,
        },
        RouteKind::SavedItems | RouteKind::Unknown => ArchiveContext::None,
    };

    tracing::debug!(route = ?state.route, scope = ?context.scope(), "archive context detected");
    context
}
