//! In-memory cache and event store for development and tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::app::ports::{Cache, EventStore};
use crate::error::{ExtractorError, Result};
use crate::types::Event;

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    m.lock()
        .map_err(|_| ExtractorError::Store(format!("{} lock poisoned", what)))
}

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(lock(&self.entries, "cache")?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        lock(&self.entries, "cache")?.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryEventStore {
    events: Arc<Mutex<Vec<Event>>>,
    known_urls: Arc<Mutex<HashSet<Url>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already knows `urls`, as if earlier runs had persisted them.
    pub fn with_known_urls(urls: impl IntoIterator<Item = Url>) -> Self {
        let store = Self::default();
        if let Ok(mut known) = store.known_urls.lock() {
            known.extend(urls);
        }
        store
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn existing_event_urls(&self) -> Result<HashSet<Url>> {
        let mut urls = lock(&self.known_urls, "event store")?.clone();
        urls.extend(lock(&self.events, "event store")?.iter().map(|e| e.url.clone()));
        Ok(urls)
    }

    async fn persist(&self, events: &[Event]) -> Result<()> {
        let mut stored = lock(&self.events, "event store")?;
        stored.extend_from_slice(events);
        debug!("Stored {} events in memory", events.len());
        Ok(())
    }
}
