/// Cache namespaces, one per producing component.
/// Keys look like `<namespace>:<discriminator>:<url-without-scheme>`.
pub const SCHEDULE_CACHE_NS: &str = "schedule_page_scraper";
pub const CONTENT_BLOCKS_CACHE_NS: &str = "content_blocks_scraper";
pub const EXTRACTOR_CACHE_NS: &str = "event_data_extractor";

// Headers sent with every page fetch
pub const DEFAULT_USER_AGENT: &str =
    "venue_extractor/0.1 (+event listings collector; contact via repository issues)";
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const ACCEPT_LANGUAGE: &str = "es-ES,es;q=0.9,en;q=0.5";

// Structured extraction defaults
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_MAX_CONCURRENCY: usize = 1;

// Retry defaults, in seconds
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_MULTIPLIER_SECS: f64 = 10.0;
pub const DEFAULT_RETRY_MIN_SECS: f64 = 5.0;
pub const DEFAULT_RETRY_MAX_SECS: f64 = 120.0;

/// Elements removed from every event page before any block selector runs.
pub const NOISE_ELEMENTS: &str = "script, style, nav, header, footer";

/// Tags rendered as plain text when a block does not configure its own list.
pub fn default_strip_elements() -> Vec<String> {
    vec!["a".to_string(), "img".to_string()]
}

/// Cache-key form of a URL: the URL without its `http://` or `https://` prefix.
pub fn url_key(url: &url::Url) -> &str {
    let s = url.as_str();
    s.strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(s)
}

pub fn cache_key(namespace: &str, discriminator: &str, url: &url::Url) -> String {
    format!("{}:{}:{}", namespace, discriminator, url_key(url))
}
