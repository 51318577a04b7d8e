use std::net::SocketAddr;

use ::metrics::counter;
use tracing::{info, warn};

/// Installs the Prometheus exporter on `addr`. Failure only disables metrics.
pub fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed: {}", e),
    }
}

pub fn urls_discovered(venue: &str, n: usize) {
    counter!("venue_extractor_urls_discovered_total", "venue" => venue.to_string()).increment(n as u64);
}

pub fn urls_new(venue: &str, n: usize) {
    counter!("venue_extractor_urls_new_total", "venue" => venue.to_string()).increment(n as u64);
}

pub fn events_persisted(venue: &str, n: usize) {
    counter!("venue_extractor_events_persisted_total", "venue" => venue.to_string()).increment(n as u64);
}

pub fn url_failed(venue: &str) {
    counter!("venue_extractor_url_failures_total", "venue" => venue.to_string()).increment(1);
}

pub fn cache_hit(component: &str) {
    counter!("venue_extractor_cache_hits_total", "component" => component.to_string()).increment(1);
}

pub fn model_attempt(model: &str) {
    counter!("venue_extractor_model_attempts_total", "model" => model.to_string()).increment(1);
}
