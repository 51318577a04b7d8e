pub mod http_client;
pub mod model_client;
pub mod sqlite_cache;
pub mod sqlite_store;
