use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::app::ports::{Cache, EventStore, Fetcher};
use crate::error::Result;
use crate::metrics;
use crate::pipeline::content_blocks::ContentBlockScraper;
use crate::pipeline::extractor::StructuredExtractor;
use crate::pipeline::schedule::ScheduleScraper;
use crate::types::{validate_specs, VenueExtractionSpec};

/// Scrapers bound to one venue's spec.
struct VenuePipeline {
    spec: VenueExtractionSpec,
    schedule: ScheduleScraper,
    blocks: ContentBlockScraper,
}

impl VenuePipeline {
    fn new(spec: VenueExtractionSpec, fetcher: Arc<dyn Fetcher>, cache: Arc<dyn Cache>) -> Result<Self> {
        spec.validate()?;
        let schedule = ScheduleScraper::new(&spec, fetcher.clone(), cache.clone())?;
        let blocks = ContentBlockScraper::new(&spec, fetcher, cache)?;
        Ok(Self { spec, schedule, blocks })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Discover and diff only; nothing is scraped, extracted or persisted.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VenueReport {
    pub venue_id: Uuid,
    pub venue: String,
    pub discovered: usize,
    pub new_urls: Vec<Url>,
    pub persisted_events: usize,
    pub failed_urls: Vec<Url>,
}

impl VenueReport {
    fn new(spec: &VenueExtractionSpec) -> Self {
        Self {
            venue_id: spec.venue_id,
            venue: spec.label(),
            discovered: 0,
            new_urls: Vec::new(),
            persisted_events: 0,
            failed_urls: Vec::new(),
        }
    }
}

impl fmt::Display for VenueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} discovered, {} new, {} events persisted, {} failed",
            self.venue,
            self.discovered,
            self.new_urls.len(),
            self.persisted_events,
            self.failed_urls.len()
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub venues: Vec<VenueReport>,
}

impl RunReport {
    pub fn discovered(&self) -> usize {
        self.venues.iter().map(|v| v.discovered).sum()
    }

    pub fn new_urls(&self) -> usize {
        self.venues.iter().map(|v| v.new_urls.len()).sum()
    }

    pub fn persisted_events(&self) -> usize {
        self.venues.iter().map(|v| v.persisted_events).sum()
    }

    pub fn failed_urls(&self) -> usize {
        self.venues.iter().map(|v| v.failed_urls.len()).sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for venue in &self.venues {
            writeln!(f, "{}", venue)?;
        }
        write!(
            f,
            "total: {} discovered, {} new, {} events persisted, {} failed",
            self.discovered(),
            self.new_urls(),
            self.persisted_events(),
            self.failed_urls()
        )
    }
}

/// Drives every venue through discover, diff, scrape, extract and persist.
pub struct Orchestrator {
    venues: Vec<VenuePipeline>,
    extractor: Arc<StructuredExtractor>,
    store: Arc<dyn EventStore>,
}

impl Orchestrator {
    /// Builds every venue pipeline up front so bad configuration fails
    /// before any network activity.
    pub fn new(
        specs: Vec<VenueExtractionSpec>,
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn Cache>,
        extractor: Arc<StructuredExtractor>,
        store: Arc<dyn EventStore>,
    ) -> Result<Self> {
        validate_specs(&specs)?;
        let venues = specs
            .into_iter()
            .map(|spec| VenuePipeline::new(spec, fetcher.clone(), cache.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            venues,
            extractor,
            store,
        })
    }

    #[instrument(skip(self))]
    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        let known: HashSet<Url> = self.store.existing_event_urls().await?;
        info!(venues = self.venues.len(), known = known.len(), "Starting run");

        let discovered = join_all(self.venues.iter().map(|v| async move {
            match v.schedule.discover().await {
                Ok(urls) => urls,
                Err(e) => {
                    error!(venue = %v.spec.label(), error = %e, "Discovery failed");
                    BTreeSet::new()
                }
            }
        }))
        .await;

        // Earlier venues in configuration order win URLs shared across venues.
        let mut claimed = known;
        let mut reports = Vec::with_capacity(self.venues.len());
        for (venue, urls) in self.venues.iter().zip(discovered) {
            let mut report = VenueReport::new(&venue.spec);
            report.discovered = urls.len();
            report.new_urls = claim_new(&urls, &mut claimed);
            metrics::urls_discovered(&report.venue, report.discovered);
            metrics::urls_new(&report.venue, report.new_urls.len());
            info!(
                venue = %report.venue,
                discovered = report.discovered,
                new = report.new_urls.len(),
                "Diffed against known URLs"
            );
            reports.push(report);
        }

        if options.dry_run {
            return Ok(RunReport { venues: reports });
        }

        let processed = join_all(
            self.venues
                .iter()
                .zip(reports)
                .map(|(venue, report)| self.process_venue(venue, report)),
        )
        .await;
        let report = RunReport { venues: processed };
        info!(
            persisted = report.persisted_events(),
            failed = report.failed_urls(),
            "Run finished"
        );
        Ok(report)
    }

    /// Every URL either persists or lands in `failed_urls`; events already
    /// committed for other URLs are always reported.
    async fn process_venue(&self, venue: &VenuePipeline, mut report: VenueReport) -> VenueReport {
        let outcomes = join_all(report.new_urls.iter().map(|url| self.process_url(venue, url))).await;
        for (url, outcome) in report.new_urls.iter().zip(outcomes) {
            match outcome {
                Ok(n) => report.persisted_events += n,
                Err(e) => {
                    if e.is_recoverable() {
                        error!(venue = %report.venue, url = %url, error = %e, "Skipping URL");
                    } else {
                        error!(venue = %report.venue, url = %url, error = %e, "Unrecoverable failure, skipping URL");
                    }
                    metrics::url_failed(&report.venue);
                    report.failed_urls.push(url.clone());
                }
            }
        }
        metrics::events_persisted(&report.venue, report.persisted_events);
        info!("{}", report);
        report
    }

    /// Scrape, extract and persist one event page. Returns the number of
    /// events stored.
    async fn process_url(&self, venue: &VenuePipeline, url: &Url) -> Result<usize> {
        let blocks = venue.blocks.extract(url).await?;
        let result = self
            .extractor
            .extract(url, &blocks, venue.spec.extraction)
            .await?;
        if let Some(tag) = result.extraction_error() {
            warn!(url = %url, tag = ?tag, "Model flagged the page");
        }
        let events = result.into_events(venue.spec.venue_id, url);
        if !events.is_empty() {
            self.store.persist(&events).await?;
        }
        Ok(events.len())
    }
}

/// URLs of `urls` not yet in `claimed`, in order. They are claimed on return.
fn claim_new(urls: &BTreeSet<Url>, claimed: &mut HashSet<Url>) -> Vec<Url> {
    urls.iter().filter(|u| claimed.insert((*u).clone())).cloned().collect()
}
