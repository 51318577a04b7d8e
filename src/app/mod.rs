pub mod cache_json;
pub mod ports;
