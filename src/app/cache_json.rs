//! JSON helpers over the byte cache. Cache trouble never fails a caller:
//! unreadable entries behave as misses and failed writes are only logged.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::app::ports::Cache;
use crate::metrics;

pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, component: &str, key: &str) -> Option<T> {
    let bytes = match cache.get(key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!(key, "Cache miss");
            return None;
        }
        Err(e) => {
            warn!(key, error = %e, "Cache read failed, treating as miss");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => {
            debug!(key, "Cache hit");
            metrics::cache_hit(component);
            Some(value)
        }
        Err(e) => {
            warn!(key, error = %e, "Undecodable cache entry, treating as miss");
            None
        }
    }
}

pub async fn set_json<T: Serialize + ?Sized>(cache: &dyn Cache, key: &str, value: &T) {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key, error = %e, "Could not serialize cache entry");
            return;
        }
    };
    if let Err(e) = cache.set(key, &bytes).await {
        warn!(key, error = %e, "Cache write failed");
    }
}
