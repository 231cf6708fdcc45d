#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end listing render tests against the in-memory repository.

use std::sync::Arc;
use std::time::Duration;

use trovato_listing::archive::{
    ArchiveContext, PageSource, PaginationMode, QueriedObject, RequestState, RouteKind,
};
use trovato_listing::facet::{
    Combinator, FacetControl, ListingSort, SortDirection,
};
use trovato_listing::repository::{Fixture, InMemoryRepository, Term};
use trovato_listing::{ListingConfig, ListingService, ListingWidget};
use trovato_test_utils::{
    ManualClock, admin_user, anonymous_user, declaration, memory_cache, test_item, test_term,
};

struct Site {
    repo: Arc<InMemoryRepository>,
    books: Term,
    films: Term,
}

/// Twelve posts: eight books, four films; even-numbered ones are red.
fn site() -> Site {
    let books = test_term("genre", "Books");
    let films = test_term("genre", "Films");
    let items = (0..12)
        .map(|n| {
            let genre = if n < 8 { &books } else { &films };
            let color = if n % 2 == 0 { "red" } else { "blue" };
            test_item("post", &format!("Post {n:02}"))
                .created_at(n)
                .with_term(genre)
                .with_field("color", serde_json::json!(color))
                .with_field("price", serde_json::json!(n * 10))
                .build()
        })
        .collect();
    let repo = InMemoryRepository::from_fixture(Fixture {
        terms: vec![books.clone(), films.clone()],
        items,
    });
    Site {
        repo: Arc::new(repo),
        books,
        films,
    }
}

fn service(repo: Arc<InMemoryRepository>, clock: Arc<ManualClock>) -> ListingService {
    ListingService::new(
        repo,
        memory_cache(clock, Duration::from_secs(3600)),
        ListingConfig::default(),
    )
}

fn widget() -> ListingWidget {
    ListingWidget {
        facets: vec![
            declaration("genre", "taxonomy", "genre"),
            declaration("color", "field", "color"),
            declaration("price", "numeric", "price"),
        ],
        per_page: 5,
        sort: ListingSort {
            field: "created".into(),
            direction: SortDirection::Asc,
        },
        ..Default::default()
    }
}

fn titles(page: &trovato_listing::ListingPage) -> Vec<&str> {
    page.items.iter().map(|i| i.title.as_str()).collect()
}

#[test]
fn test_home_listing_first_page() {
    let site = site();
    let svc = service(site.repo, ManualClock::fixed());
    let page = svc.render(&widget(), &RequestState::new(RouteKind::Home, "/"));

    assert_eq!(page.context, ArchiveContext::MainLoop);
    assert_eq!(page.total, 12);
    assert_eq!(page.pagination.total_pages, 3);
    assert_eq!(page.pagination.source, PageSource::Primary);
    assert_eq!(
        titles(&page),
        vec!["Post 00", "Post 01", "Post 02", "Post 03", "Post 04"]
    );
    assert!(!page.no_results);
    assert_eq!(page.controls.len(), 3);
    assert!(page.predicate.is_match_all());
}

#[test]
fn test_selection_filters_results() {
    let site = site();
    let svc = service(site.repo, ManualClock::fixed());
    let state = RequestState::new(RouteKind::Home, "/")
        .with_param("filter[color]", "red")
        .with_param("filter[price]", "30,90")
        .with_primary_page(2);
    let page = svc.render(&widget(), &state);

    // Red posts priced 30..=90: 40, 60, 80.
    assert_eq!(page.total, 3);
    assert_eq!(page.pagination.total_pages, 1);
    assert_eq!(page.pagination.current_page, 1);
    assert_eq!(titles(&page), vec!["Post 04", "Post 06", "Post 08"]);

    let color = page
        .controls
        .iter()
        .find(|c| c.facet_id() == "color")
        .unwrap();
    let FacetControl::Choice { options, .. } = color else {
        panic!("expected a choice control");
    };
    let checked: Vec<&str> = options
        .iter()
        .filter(|o| o.checked)
        .map(|o| o.value_id.as_str())
        .collect();
    assert_eq!(checked, vec!["red"]);

    let price = page
        .controls
        .iter()
        .find(|c| c.facet_id() == "price")
        .unwrap();
    assert_eq!(
        *price,
        FacetControl::Range {
            facet_id: "price".into(),
            label: None,
            min: 0.0,
            max: 110.0,
            current_min: 30.0,
            current_max: 90.0,
            disabled: false,
        }
    );
}

#[test]
fn test_parent_logic_or_widens_results() {
    let site = site();
    let svc = service(site.repo, ManualClock::fixed());
    let state = RequestState::new(RouteKind::Home, "/")
        .with_param("filter[genre]", &site.films.id.to_string())
        .with_param("filter[color]", "red");

    let and = svc.render(&widget(), &state);
    assert_eq!(and.total, 2);

    let or = svc.render(
        &ListingWidget {
            parent_logic: Combinator::Or,
            ..widget()
        },
        &state,
    );
    // Four films plus the four red books.
    assert_eq!(or.total, 8);
}

#[test]
fn test_term_archive_narrows_listing_and_facets() {
    let site = site();
    let svc = service(site.repo, ManualClock::fixed());
    let state = RequestState::new(RouteKind::Taxonomy, "/genre/books/").with_object(
        QueriedObject::Term {
            taxonomy: "genre".into(),
            term_id: site.books.id,
            link: Some("/genre/books/".into()),
        },
    );
    let narrowing = ListingWidget {
        dynamic_narrowing: true,
        ..widget()
    };
    let page = svc.render(&narrowing, &state);

    assert_eq!(page.total, 8);
    assert_eq!(page.pagination.source, PageSource::TermLink);
    assert_eq!(page.pagination.link_for(2), "/genre/books/page/2/");

    // Values come from books only: prices 0..=70.
    let price = page.facets.iter().find(|f| f.facet_id == "price").unwrap();
    let bounds = price.bounds.unwrap();
    assert_eq!((bounds.min, bounds.max), (0.0, 70.0));

    // The archive term shows as the selected genre.
    let genre = page
        .controls
        .iter()
        .find(|c| c.facet_id() == "genre")
        .unwrap();
    let FacetControl::Choice { options, .. } = genre else {
        panic!("expected a choice control");
    };
    let checked: Vec<&str> = options
        .iter()
        .filter(|o| o.checked)
        .map(|o| o.label.as_str())
        .collect();
    assert_eq!(checked, vec!["Books"]);
}

#[test]
fn test_explicit_selection_overrides_archive_term() {
    let site = site();
    let svc = service(site.repo, ManualClock::fixed());
    let state = RequestState::new(RouteKind::Taxonomy, "/genre/books/")
        .with_object(QueriedObject::Term {
            taxonomy: "genre".into(),
            term_id: site.books.id,
            link: None,
        })
        .secondary()
        .with_param("filter[genre]", &site.films.id.to_string());
    let narrowing = ListingWidget {
        dynamic_narrowing: true,
        ..widget()
    };
    let page = svc.render(&narrowing, &state);

    // A secondary loop runs its own query, so only the explicit films
    // selection applies.
    assert_eq!(page.total, 4);
    assert!(matches!(
        page.pagination.source,
        PageSource::Dedicated { .. }
    ));
}

#[test]
fn test_no_results() {
    let site = site();
    let svc = service(site.repo, ManualClock::fixed());
    let state = RequestState::new(RouteKind::Search, "/?s=nothing").with_search("nothing");
    let page = svc.render(&widget(), &state);

    assert!(page.no_results);
    assert!(page.items.is_empty());
    assert_eq!(page.pagination.total_pages, 1);
    assert_eq!(page.pagination.current_page, 1);
}

#[test]
fn test_pagination_none_shows_first_slice() {
    let site = site();
    let svc = service(site.repo, ManualClock::fixed());
    let state = RequestState::new(RouteKind::Home, "/").with_primary_page(3);
    let page = svc.render(
        &ListingWidget {
            pagination: PaginationMode::None,
            ..widget()
        },
        &state,
    );
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.items[0].title, "Post 00");
    assert!(!page.pagination.visible);
}

#[test]
fn test_per_page_capped_by_config() {
    let site = site();
    let svc = ListingService::new(
        site.repo,
        memory_cache(ManualClock::fixed(), Duration::from_secs(60)),
        ListingConfig {
            max_per_page: 4,
            ..Default::default()
        },
    );
    let page = svc.render(
        &ListingWidget {
            per_page: 50,
            ..widget()
        },
        &RequestState::new(RouteKind::Home, "/"),
    );
    assert_eq!(page.items.len(), 4);
    assert_eq!(page.pagination.total_pages, 3);
}

#[test]
fn test_editors_see_live_values() {
    let site = site();
    let clock = ManualClock::fixed();
    let svc = service(site.repo.clone(), clock);
    let anonymous = RequestState::new(RouteKind::Home, "/").with_user(anonymous_user());
    let editor = RequestState::new(RouteKind::Home, "/").with_user(admin_user());

    let colors = |page: &trovato_listing::ListingPage| -> usize {
        page.facets
            .iter()
            .find(|f| f.facet_id == "color")
            .map(|f| f.values.len())
            .unwrap_or(0)
    };

    assert_eq!(colors(&svc.render(&widget(), &anonymous)), 2);
    site.repo.insert_item(
        test_item("post", "Green")
            .with_field("color", serde_json::json!("green"))
            .build(),
    );

    assert_eq!(colors(&svc.render(&widget(), &anonymous)), 2);
    assert_eq!(colors(&svc.render(&widget(), &editor)), 3);
}

#[test]
fn test_saved_items_listing() {
    let site = site();
    let keep: Vec<_> = {
        let all = service(site.repo.clone(), ManualClock::fixed())
            .render(&widget(), &RequestState::new(RouteKind::Home, "/"));
        all.items.iter().take(2).map(|i| i.id).collect()
    };
    let svc = service(site.repo, ManualClock::fixed());
    let state = RequestState::new(RouteKind::SavedItems, "/saved/").with_saved_items(keep.clone());
    let page = svc.render(&widget(), &state);

    assert_eq!(page.context, ArchiveContext::None);
    assert_eq!(page.total, 2);
    let ids: Vec<_> = page.items.iter().map(|i| i.id).collect();
    assert_eq!(ids, keep);
}
