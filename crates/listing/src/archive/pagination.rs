//! Archive-aware pagination.
//!
//! Every ambient scope converges on one canonical page number and one link
//! format. The current page source is chosen by ordered precedence:
//!
//! 1. Main loop with no competing pager: the host's primary page counter.
//! 2. Isolated listing in any scoped request (or a main loop whose primary
//!    pager is taken): a dedicated, non-colliding query parameter.
//! 3. Taxonomy term archive with a canonical link: the term link plus a
//!    `page/{page}/` suffix.
//! 4. Anything else: the host's secondary-loop counter.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use super::ArchiveContext;
use super::request_state::{LoopKind, RequestState};

/// Token replaced by the page number in path-segment link bases.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Query parameter carrying the host's primary page counter.
const PRIMARY_PAGE_PARAM: &str = "paged";

/// Query parameter carrying the host's secondary-loop page counter.
const SECONDARY_PAGE_PARAM: &str = "page";

/// Matches a trailing `/page/N` segment of a path.
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static PAGE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/page/\d+/?$").expect("valid regex literal"));

/// Base used to resolve relative URLs; never emitted.
const RELATIVE_BASE: &str = "http://localhost";

/// Pagination display mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// No pager; only the first result slice is shown.
    None,
    /// Numbered page links.
    #[default]
    Numbered,
    /// Numbered page links with previous/next links.
    NumberedPrevNext,
    /// Hidden numbered pager plus a "load more" button.
    LoadMore,
    /// Hidden numbered pager plus a scroll sentinel.
    Infinite,
}

impl PaginationMode {
    /// Parse a declared mode.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Some(PaginationMode::None),
            "numbers" | "numbered" => Some(PaginationMode::Numbered),
            "numbers_and_prev_next" | "numbered_prev_next" | "prev_next" => {
                Some(PaginationMode::NumberedPrevNext)
            }
            "load_more" | "load_more_on_click" => Some(PaginationMode::LoadMore),
            "infinite" | "load_more_infinite_scroll" => Some(PaginationMode::Infinite),
            _ => None,
        }
    }

    /// Whether the mode requests further pages through a trigger.
    pub fn is_progressive(self) -> bool {
        matches!(self, PaginationMode::LoadMore | PaginationMode::Infinite)
    }
}

/// How a page number is written into a link.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkFormat {
    /// `/page/{page}/`: the base contains the placeholder.
    PathSegment,
    /// `?param={page}`: the number is appended as a query parameter.
    QueryParameter,
}

impl LinkFormat {
    /// Detect the format of a link base.
    pub fn detect(link_base: &str) -> Self {
        if link_base.contains(PAGE_PLACEHOLDER) {
            LinkFormat::PathSegment
        } else {
            LinkFormat::QueryParameter
        }
    }
}

/// Where the current page number was read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PageSource {
    Primary,
    Dedicated { param: String },
    TermLink,
    Secondary,
}

/// Progressive-loading trigger kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Button,
    ScrollSentinel,
}

/// Trigger requesting the next page for load-more/infinite modes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PagerTrigger {
    pub kind: TriggerKind,
    /// Next page number, None on the last page.
    pub next_page: Option<u32>,
    /// Link to the next page, None on the last page.
    pub next_link: Option<String>,
}

/// One entry of a numbered pager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PagerItem {
    Prev { link: String },
    Page { number: u32, link: String, current: bool },
    Ellipsis,
    Next { link: String },
}

/// Resolved pagination for one listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationState {
    pub mode: PaginationMode,

    /// Current page (1-based, within `1..=total_pages`).
    pub current_page: u32,

    /// Total number of pages (at least 1).
    pub total_pages: u32,

    /// Link template. Contains `{page}` for path-segment format.
    pub link_base: String,

    pub format: LinkFormat,

    /// Query parameter name for query-parameter format.
    pub page_param: String,

    /// Where the current page was read from.
    pub source: PageSource,

    /// Numbered pager is shown (hidden for load-more/infinite).
    pub visible: bool,

    /// Previous/next links are shown.
    pub prev_next: bool,

    /// Trigger for progressive modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<PagerTrigger>,
}

impl PaginationState {
    /// Whether there's a previous page.
    pub fn has_prev(&self) -> bool {
        self.current_page > 1
    }

    /// Whether there's a next page.
    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    /// Offset/limit of the current page's result slice.
    pub fn slice(&self, per_page: u32) -> (u64, u64) {
        let offset = u64::from(self.current_page.saturating_sub(1)) * u64::from(per_page);
        (offset, u64::from(per_page))
    }

    /// Concrete link to a page number.
    ///
    /// Page 1 links to the bare base so the first page keeps one canonical URL.
    pub fn link_for(&self, page: u32) -> String {
        match self.format {
            LinkFormat::PathSegment => {
                if page <= 1 {
                    self.link_base
                        .replace(&format!("page/{PAGE_PLACEHOLDER}/"), "")
                        .replace(PAGE_PLACEHOLDER, "1")
                } else {
                    self.link_base.replace(PAGE_PLACEHOLDER, &page.to_string())
                }
            }
            LinkFormat::QueryParameter => {
                if page <= 1 {
                    self.link_base.clone()
                } else {
                    set_query_param(&self.link_base, &self.page_param, &page.to_string())
                }
            }
        }
    }

    /// Entries of a numbered pager.
    ///
    /// Shows `end_size` pages at each end and `mid_size` pages around the
    /// current one; gaps collapse into a single ellipsis.
    pub fn pager_items(&self, end_size: u32, mid_size: u32) -> Vec<PagerItem> {
        let mut items = Vec::new();
        if self.total_pages <= 1 {
            return items;
        }

        if self.prev_next && self.has_prev() {
            items.push(PagerItem::Prev {
                link: self.link_for(self.current_page - 1),
            });
        }

        let mut gap = false;
        for n in 1..=self.total_pages {
            let near_current = n + mid_size >= self.current_page && n <= self.current_page + mid_size;
            let near_ends = n <= end_size || n > self.total_pages.saturating_sub(end_size);
            if n == self.current_page || near_current || near_ends {
                items.push(PagerItem::Page {
                    number: n,
                    link: self.link_for(n),
                    current: n == self.current_page,
                });
                gap = false;
            } else if !gap {
                items.push(PagerItem::Ellipsis);
                gap = true;
            }
        }

        if self.prev_next && self.has_next() {
            items.push(PagerItem::Next {
                link: self.link_for(self.current_page + 1),
            });
        }

        items
    }
}

/// Computes pagination state for a listing.
#[derive(Debug, Clone)]
pub struct PaginationResolver {
    /// Prefix of the dedicated pager parameter.
    page_param: String,
}

impl PaginationResolver {
    /// Create a resolver using a dedicated-parameter prefix.
    pub fn new(page_param: impl Into<String>) -> Self {
        Self {
            page_param: page_param.into(),
        }
    }

    /// Total pages for a result count; at least 1.
    pub fn total_pages(total_results: u64, per_page: u32) -> u32 {
        if per_page == 0 {
            return 1;
        }
        let pages = total_results.div_ceil(u64::from(per_page));
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }

    /// Clamp a requested page into `1..=total_pages`.
    pub fn clamp_page(requested: Option<i64>, total_pages: u32) -> u32 {
        let requested = requested.unwrap_or(1);
        let clamped = requested.clamp(1, i64::from(total_pages.max(1)));
        if clamped != requested {
            tracing::debug!(requested, clamped, total_pages, "requested page out of range");
        }
        // In range after clamping.
        u32::try_from(clamped).unwrap_or(1)
    }

    /// Dedicated pager parameter for a widget.
    pub fn dedicated_param(&self, widget_id: Option<&str>) -> String {
        let suffix: String = widget_id
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if suffix.is_empty() {
            self.page_param.clone()
        } else {
            format!("{}-{suffix}", self.page_param)
        }
    }

    /// Resolve pagination for a listing.
    pub fn resolve(
        &self,
        context: &ArchiveContext,
        mode: PaginationMode,
        total_results: u64,
        per_page: u32,
        state: &RequestState,
    ) -> PaginationState {
        let total_pages = Self::total_pages(total_results, per_page);
        let isolated = state.loop_kind == LoopKind::Secondary;
        let competing = isolated || state.secondary_pager_active;

        let (requested, link_base, page_param, source) = match context {
            ArchiveContext::MainLoop if !competing => {
                let (base, param) = host_link_base(state, PRIMARY_PAGE_PARAM);
                (state.primary_page, base, param, PageSource::Primary)
            }
            ArchiveContext::MainLoop
            | ArchiveContext::Author { .. }
            | ArchiveContext::TaxonomyTerm { .. }
            | ArchiveContext::PostType { .. }
            | ArchiveContext::Search { .. }
            | ArchiveContext::Singular { .. }
                if competing =>
            {
                let param = self.dedicated_param(state.widget_id.as_deref());
                let requested = state.param(&param).and_then(parse_page);
                let base = remove_query_params(&state.current_url, &[param.as_str()]);
                (requested, base, param.clone(), PageSource::Dedicated { param })
            }
            ArchiveContext::TaxonomyTerm { .. } if state.term_link().is_some() => {
                let link = state.term_link().unwrap_or_default();
                let base = format!("{}page/{PAGE_PLACEHOLDER}/", with_trailing_slash(link));
                (
                    state.primary_page,
                    base,
                    PRIMARY_PAGE_PARAM.to_string(),
                    PageSource::TermLink,
                )
            }
            // Rule 4: links use the secondary `page` parameter. A request
            // that only carries the primary counter still lands on its page.
            _ => {
                let (base, param) = host_link_base(state, SECONDARY_PAGE_PARAM);
                (
                    state.secondary_page.or(state.primary_page),
                    base,
                    param,
                    PageSource::Secondary,
                )
            }
        };

        let current_page = Self::clamp_page(requested, total_pages);
        let format = LinkFormat::detect(&link_base);

        let mut pagination = PaginationState {
            mode,
            current_page,
            total_pages,
            link_base,
            format,
            page_param,
            source,
            visible: matches!(
                mode,
                PaginationMode::Numbered | PaginationMode::NumberedPrevNext
            ),
            prev_next: mode == PaginationMode::NumberedPrevNext,
            trigger: None,
        };

        if mode.is_progressive() {
            let next_page = pagination.has_next().then_some(current_page + 1);
            pagination.trigger = Some(PagerTrigger {
                kind: if mode == PaginationMode::Infinite {
                    TriggerKind::ScrollSentinel
                } else {
                    TriggerKind::Button
                },
                next_page,
                next_link: next_page.map(|n| pagination.link_for(n)),
            });
        }

        tracing::debug!(
            scope = ?context.scope(),
            source = ?pagination.source,
            current_page,
            total_pages,
            "pagination resolved"
        );

        pagination
    }
}

/// Parse a raw page parameter; anything non-numeric is treated as absent.
fn parse_page(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Link base for the host's own page counters.
///
/// Pretty links strip any `/page/N/` segment and append `page/{page}/`;
/// otherwise the counter parameter is removed and re-appended per page.
fn host_link_base(state: &RequestState, param: &str) -> (String, String) {
    let cleaned = remove_query_params(&state.current_url, &[PRIMARY_PAGE_PARAM, param]);
    if !state.pretty_links {
        return (cleaned, param.to_string());
    }

    let (path, query) = match cleaned.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (cleaned, None),
    };
    let path = PAGE_SEGMENT.replace(&path, "/").into_owned();
    let mut base = format!("{}page/{PAGE_PLACEHOLDER}/", with_trailing_slash(&path));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        base.push('?');
        base.push_str(&query);
    }
    (base, param.to_string())
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Parse an absolute or relative URL. The flag is true for relative input.
fn parse_url(raw: &str) -> Option<(Url, bool)> {
    match Url::parse(raw) {
        Ok(url) => Some((url, false)),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(RELATIVE_BASE)
            .ok()?
            .join(raw)
            .ok()
            .map(|url| (url, true)),
        Err(_) => None,
    }
}

fn render_url(url: &Url, relative: bool) -> String {
    if !relative {
        return url.to_string();
    }
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

/// Remove query parameters (and the fragment) from a URL.
fn remove_query_params(raw: &str, names: &[&str]) -> String {
    let Some((mut url, relative)) = parse_url(raw) else {
        return raw.to_string();
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !names.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    url.set_fragment(None);
    if !kept.is_empty() {
        url.query_pairs_mut().extend_pairs(kept);
    }
    render_url(&url, relative)
}

/// Set a query parameter, replacing any existing value.
fn set_query_param(raw: &str, name: &str, value: &str) -> String {
    let cleaned = remove_query_params(raw, &[name]);
    let Some((mut url, relative)) = parse_url(&cleaned) else {
        return raw.to_string();
    };
    url.query_pairs_mut().append_pair(name, value);
    render_url(&url, relative)
}
