//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::{ListingError, ListingResult};

/// Default facet value ttl (12 hours).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 12 * 60 * 60;

/// Default in-process cache capacity.
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Default prefix of the dedicated pager query parameter.
pub const DEFAULT_PAGE_PARAM: &str = "lpage";

/// Maximum items per page (enforced by performance guardrails).
pub const DEFAULT_MAX_PER_PAGE: u32 = 100;

/// Default number of facet values shown before a "show more" toggle.
pub const DEFAULT_TRUNCATE_AFTER: usize = 6;

/// Listing engine configuration.
#[derive(Debug, Clone)]
pub struct ListingConfig {
    /// Facet value cache ttl (default: 12 hours).
    pub cache_ttl: Duration,

    /// Maximum in-process cache entries (default: 10000).
    pub cache_capacity: u64,

    /// Redis connection URL for the shared cache tier. When None, only the
    /// in-process tier is used.
    pub redis_url: Option<String>,

    /// Prefix of the dedicated pager parameter used by isolated listings.
    pub page_param: String,

    /// Per-page cap (default: 100).
    pub max_per_page: u32,

    /// Default truncation point for facet value lists (default: 6).
    pub truncate_after: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            redis_url: None,
            page_param: DEFAULT_PAGE_PARAM.to_string(),
            max_per_page: DEFAULT_MAX_PER_PAGE,
            truncate_after: DEFAULT_TRUNCATE_AFTER,
        }
    }
}

impl ListingConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cache_ttl_secs: u64 = env::var("LISTING_CACHE_TTL_SECS")
            .unwrap_or_else(|_| DEFAULT_CACHE_TTL_SECS.to_string())
            .parse()
            .context("LISTING_CACHE_TTL_SECS must be a valid u64")?;

        let cache_capacity = env::var("LISTING_CACHE_CAPACITY")
            .unwrap_or_else(|_| DEFAULT_CACHE_CAPACITY.to_string())
            .parse()
            .context("LISTING_CACHE_CAPACITY must be a valid u64")?;

        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty());

        let page_param =
            env::var("LISTING_PAGE_PARAM").unwrap_or_else(|_| DEFAULT_PAGE_PARAM.to_string());

        let max_per_page = env::var("LISTING_MAX_PER_PAGE")
            .unwrap_or_else(|_| DEFAULT_MAX_PER_PAGE.to_string())
            .parse()
            .context("LISTING_MAX_PER_PAGE must be a valid u32")?;

        let truncate_after = env::var("LISTING_TRUNCATE_AFTER")
            .unwrap_or_else(|_| DEFAULT_TRUNCATE_AFTER.to_string())
            .parse()
            .context("LISTING_TRUNCATE_AFTER must be a valid usize")?;

        let config = Self {
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            cache_capacity,
            redis_url,
            page_param,
            max_per_page,
            truncate_after,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> ListingResult<()> {
        if self.cache_ttl.is_zero() {
            return Err(ListingError::Config("cache ttl must be positive".into()));
        }
        if self.max_per_page == 0 {
            return Err(ListingError::Config("max per page must be positive".into()));
        }
        if self.page_param.is_empty()
            || !self
                .page_param
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ListingError::Config(format!(
                "page parameter '{}' must be non-empty and URL-safe",
                self.page_param
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ListingConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(43_200));
        assert_eq!(config.truncate_after, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unsafe_page_param() {
        let config = ListingConfig {
            page_param: "page&x".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ListingError::Config(_))));
    }

    #[test]
    fn rejects_zero_ttl() {
        let config = ListingConfig {
            cache_ttl: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
