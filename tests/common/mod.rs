#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;
use uuid::Uuid;

use venue_extractor::app::ports::{FetchedPage, Fetcher, StructuredModel, StructuredRequest};
use venue_extractor::error::{ExtractorError, ModelError, Result};
use venue_extractor::pipeline::extractor::{ExtractionGate, ExtractorSettings, StructuredExtractor};
use venue_extractor::pipeline::retry::RetryPolicy;
use venue_extractor::storage::MemoryCache;
use venue_extractor::types::{
    ContentBlockSpec, ExtractionMode, PaginationSpec, ScheduleSpec, VenueExtractionSpec,
};

pub const MODEL: &str = "test-model";

/// Serves canned pages and counts every request. Unknown URLs are 404s.
#[derive(Default)]
pub struct StaticFetcher {
    pages: Mutex<HashMap<String, (u16, String)>>,
    broken: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, body: &str) -> Self {
        self.status(url, 200, body)
    }

    pub fn status(self, url: &str, status: u16, body: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
        self
    }

    /// Fetching `url` fails with an unrecoverable configuration error.
    pub fn broken(self, url: &str) -> Self {
        self.broken.lock().unwrap().insert(url.to_string());
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn get(&self, url: &Url) -> Result<FetchedPage> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if self.broken.lock().unwrap().contains(url.as_str()) {
            return Err(ExtractorError::config(format!("no handler for {}", url)));
        }
        let page = self.pages.lock().unwrap().get(url.as_str()).cloned();
        Ok(match page {
            Some((status, body)) => FetchedPage { status, body },
            None => FetchedPage {
                status: 404,
                body: String::new(),
            },
        })
    }
}

type Responder = Box<dyn Fn(&StructuredRequest) -> std::result::Result<Value, ModelError> + Send + Sync>;

/// Plays back queued responses, then falls back to a responder.
pub struct ScriptedModel {
    queue: Mutex<VecDeque<std::result::Result<Value, ModelError>>>,
    fallback: Responder,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
    requests: Mutex<Vec<StructuredRequest>>,
}

impl ScriptedModel {
    pub fn new(
        fallback: impl Fn(&StructuredRequest) -> std::result::Result<Value, ModelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Box::new(fallback),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the same single event.
    pub fn single_event() -> Self {
        Self::new(|_| Ok(single_response("Evento", "Descripción del evento")))
    }

    pub fn then(self, response: std::result::Result<Value, ModelError>) -> Self {
        self.queue.lock().unwrap().push_back(response);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl StructuredModel for ScriptedModel {
    async fn generate(&self, request: &StructuredRequest) -> std::result::Result<Value, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let queued = self.queue.lock().unwrap().pop_front();
        match queued {
            Some(response) => response,
            None => (self.fallback)(request),
        }
    }
}

pub fn event_json(title: &str, description: &str, when: &str) -> Value {
    json!({
        "schedule": [when],
        "title": title,
        "author": null,
        "description": description,
        "duration_minutes": 90
    })
}

pub fn single_response(title: &str, description: &str) -> Value {
    json!({
        "event_data": event_json(title, description, "2025-06-01T20:00:00"),
        "extraction_error": null
    })
}

pub fn block_spec(selector: &str) -> ContentBlockSpec {
    ContentBlockSpec {
        selector: selector.to_string(),
        relevant: format!("event data in {}", selector),
        irrelevant: None,
        remove_regex: vec![],
        strip_elements: vec!["a".to_string(), "img".to_string()],
    }
}

pub fn venue(name: &str, listing: &str, pattern: &str, blocks: Vec<ContentBlockSpec>) -> VenueExtractionSpec {
    VenueExtractionSpec {
        venue_id: Uuid::new_v4(),
        name: Some(name.to_string()),
        extraction: ExtractionMode::Single,
        schedule: ScheduleSpec {
            pagination: PaginationSpec::None {
                url: listing.to_string(),
            },
            event_url_pattern: pattern.to_string(),
        },
        blocks,
    }
}

pub fn extractor(model: Arc<ScriptedModel>, cache: Arc<MemoryCache>, permits: usize) -> StructuredExtractor {
    StructuredExtractor::new(
        model,
        cache,
        ExtractionGate::new(permits),
        ExtractorSettings {
            model: MODEL.to_string(),
            max_tokens: 512,
            temperature: None,
            retry: RetryPolicy::immediate(3),
        },
    )
    .unwrap()
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}
