mod common;

use std::sync::Arc;

use common::{block_spec, url, venue, StaticFetcher};
use venue_extractor::pipeline::schedule::ScheduleScraper;
use venue_extractor::storage::MemoryCache;
use venue_extractor::types::PaginationSpec;

const LISTING: &str = r#"
<html><body>
  <nav><a href="/">Inicio</a></nav>
  <ul class="agenda">
    <li><a href="/evento/la-noche">La noche</a></li>
    <li><a href="https://example.org/evento/el-dia">El día</a></li>
    <li><a href="/noticias/cierre">Cierre por vacaciones</a></li>
  </ul>
</body></html>
"#;

#[tokio::test]
async fn single_page_yields_only_matching_absolute_urls() {
    let fetcher = Arc::new(StaticFetcher::new().page("https://example.org/agenda", LISTING));
    let cache = Arc::new(MemoryCache::new());
    let spec = venue(
        "Sala",
        "https://example.org/agenda",
        "(https://example\\.org)?/evento/",
        vec![block_spec("main")],
    );
    let scraper = ScheduleScraper::new(&spec, fetcher.clone(), cache).unwrap();

    let urls = scraper.discover().await.unwrap();
    let urls: Vec<String> = urls.into_iter().map(|u| u.to_string()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.org/evento/el-dia",
            "https://example.org/evento/la-noche",
        ]
    );
}

#[tokio::test]
async fn url_linked_from_two_pages_is_discovered_once() {
    let fetcher = Arc::new(
        StaticFetcher::new()
            .page(
                "https://example.org/agenda?p=1",
                r#"<a href="/evento/1">1</a><a href="/evento/2">2</a>"#,
            )
            .page(
                "https://example.org/agenda?p=2",
                r#"<a href="/evento/2">2 otra vez</a><a href="/evento/3">3</a>"#,
            ),
    );
    let mut spec = venue("Sala", "unused", "/evento/", vec![block_spec("main")]);
    spec.schedule.pagination = PaginationSpec::Simple {
        url_template: "https://example.org/agenda?p={n}".to_string(),
        start: 1,
        count: 2,
    };
    let scraper = ScheduleScraper::new(&spec, fetcher.clone(), Arc::new(MemoryCache::new())).unwrap();

    let urls = scraper.discover().await.unwrap();
    assert_eq!(urls.len(), 3);
    assert!(urls.contains(&url("https://example.org/evento/2")));
    assert_eq!(fetcher.total_calls(), 2);
}

#[tokio::test]
async fn cached_pages_are_not_fetched_again() {
    let fetcher = Arc::new(StaticFetcher::new().page("https://example.org/agenda", LISTING));
    let cache = Arc::new(MemoryCache::new());
    let spec = venue("Sala", "https://example.org/agenda", "/evento/", vec![block_spec("main")]);

    let first = ScheduleScraper::new(&spec, fetcher.clone(), cache.clone())
        .unwrap()
        .discover()
        .await
        .unwrap();
    let second = ScheduleScraper::new(&spec, fetcher.clone(), cache.clone())
        .unwrap()
        .discover()
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.calls("https://example.org/agenda"), 1);
    let expected_key = format!("schedule_page_scraper:{}:example.org/agenda", spec.venue_id);
    assert_eq!(cache.keys(), vec![expected_key]);
}

#[tokio::test]
async fn failed_pages_are_skipped_and_not_cached() {
    let fetcher = Arc::new(
        StaticFetcher::new()
            .page("https://example.org/agenda?p=1", r#"<a href="/evento/1">1</a>"#)
            .status("https://example.org/agenda?p=2", 503, "mantenimiento"),
    );
    let cache = Arc::new(MemoryCache::new());
    let mut spec = venue("Sala", "unused", "/evento/", vec![block_spec("main")]);
    spec.schedule.pagination = PaginationSpec::Simple {
        url_template: "https://example.org/agenda?p={n}".to_string(),
        start: 1,
        count: 2,
    };
    let scraper = ScheduleScraper::new(&spec, fetcher.clone(), cache.clone()).unwrap();

    let urls = scraper.discover().await.unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(cache.len(), 1);

    // The failed page is retried on the next discovery, the good one is not.
    scraper.discover().await.unwrap();
    assert_eq!(fetcher.calls("https://example.org/agenda?p=1"), 1);
    assert_eq!(fetcher.calls("https://example.org/agenda?p=2"), 2);
}

#[tokio::test]
async fn by_day_listing_pages_start_from_the_given_date() {
    let fetcher = Arc::new(
        StaticFetcher::new()
            .page(
                "https://example.org/cartelera?fecha=31-12-2025",
                r#"<a href="/evento/nochevieja">Nochevieja</a>"#,
            )
            .page(
                "https://example.org/cartelera?fecha=01-01-2026",
                r#"<a href="/evento/concierto-de-ano-nuevo">Año nuevo</a>"#,
            ),
    );
    let mut spec = venue("Sala", "unused", "/evento/", vec![block_spec("main")]);
    spec.schedule.pagination = PaginationSpec::ByDay {
        url_template: "https://example.org/cartelera?fecha={date}".to_string(),
        date_format: "%d-%m-%Y".to_string(),
        count: 2,
    };
    let scraper = ScheduleScraper::new(&spec, fetcher.clone(), Arc::new(MemoryCache::new())).unwrap();

    let today = chrono::NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
    let urls = scraper.discover_at(today).await.unwrap();

    assert_eq!(
        urls.into_iter().map(|u| u.to_string()).collect::<Vec<_>>(),
        vec![
            "https://example.org/evento/concierto-de-ano-nuevo",
            "https://example.org/evento/nochevieja",
        ]
    );
    assert_eq!(fetcher.total_calls(), 2);
}
