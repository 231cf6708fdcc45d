//! Trovato Listing Engine Library
//!
//! Faceted, paginated content listings: facet value resolution with caching,
//! predicate construction from selections, archive context detection, and
//! pagination that stays consistent across archive scopes.
//! The `trovato-listing` binary renders listings from fixture files.

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod facet;
pub mod listing;
pub mod repository;

pub use config::ListingConfig;
pub use error::{ListingError, ListingResult, RepositoryError};
pub use listing::{ListingPage, ListingService, ListingWidget};
