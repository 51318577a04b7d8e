use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::app::cache_json::{get_json, set_json};
use crate::app::ports::{Cache, Fetcher};
use crate::constants::{cache_key, SCHEDULE_CACHE_NS};
use crate::error::{ExtractorError, Result};
use crate::pipeline::pagination;
use crate::types::{PaginationSpec, VenueExtractionSpec};

static HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("[href]").unwrap());

/// Absolute event URLs linked from `html` whose href, or resolved form,
/// matches `pattern` from its first character.
pub fn event_links(html: &str, page_url: &Url, pattern: &Regex) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for href in document.select(&HREF).filter_map(|el| el.value().attr("href")) {
        let href = href.trim();
        let Ok(mut url) = page_url.join(href) else {
            debug!(href, "Skipping unresolvable href");
            continue;
        };
        if !pattern.is_match(href) && !pattern.is_match(url.as_str()) {
            continue;
        }
        url.set_fragment(None);
        links.push(url);
    }
    links
}

/// Discovers a venue's event pages from its listing pages.
pub struct ScheduleScraper {
    venue_id: Uuid,
    venue: String,
    pagination: PaginationSpec,
    pattern: Regex,
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn Cache>,
}

impl ScheduleScraper {
    pub fn new(spec: &VenueExtractionSpec, fetcher: Arc<dyn Fetcher>, cache: Arc<dyn Cache>) -> Result<Self> {
        spec.schedule.pagination.validate()?;
        let anchored = format!("^(?:{})", spec.schedule.event_url_pattern);
        let pattern = Regex::new(&anchored).map_err(|e| {
            ExtractorError::config(format!("venue {}: invalid event_url_pattern: {}", spec.label(), e))
        })?;
        Ok(Self {
            venue_id: spec.venue_id,
            venue: spec.label(),
            pagination: spec.schedule.pagination.clone(),
            pattern,
            fetcher,
            cache,
        })
    }

    pub fn listing_pages(&self) -> Result<Vec<Url>> {
        pagination::resolve(&self.pagination)
    }

    /// Every distinct event URL linked from the venue's listing pages.
    pub async fn discover(&self) -> Result<BTreeSet<Url>> {
        self.discover_pages(self.listing_pages()?).await
    }

    pub async fn discover_at(&self, today: NaiveDate) -> Result<BTreeSet<Url>> {
        self.discover_pages(pagination::resolve_at(&self.pagination, today)?).await
    }

    #[instrument(skip(self, pages), fields(venue = %self.venue))]
    async fn discover_pages(&self, pages: Vec<Url>) -> Result<BTreeSet<Url>> {
        let page_count = pages.len();
        let results = join_all(pages.iter().map(|page| self.scrape_page(page))).await;
        let urls: BTreeSet<Url> = results.into_iter().flatten().collect();
        info!(pages = page_count, urls = urls.len(), "Discovered event URLs");
        Ok(urls)
    }

    async fn scrape_page(&self, page: &Url) -> Vec<Url> {
        let key = cache_key(SCHEDULE_CACHE_NS, &self.venue_id.to_string(), page);
        if let Some(urls) = get_json::<Vec<Url>>(self.cache.as_ref(), SCHEDULE_CACHE_NS, &key).await {
            return urls;
        }
        let body = match self.fetcher.get(page).await.and_then(|p| p.into_body(page)) {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %page, error = %e, "Listing page fetch failed, skipping");
                return Vec::new();
            }
        };
        let urls: Vec<Url> = event_links(&body, page, &self.pattern)
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        debug!(url = %page, links = urls.len(), "Parsed listing page");
        set_json(self.cache.as_ref(), &key, &urls).await;
        urls
    }
}
