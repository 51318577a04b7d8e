// Scrape-cache-extract pipeline, leaf stages first

pub mod markdown;
pub mod pagination;
pub mod retry;
pub mod schema;
pub mod prompt;

pub mod content_blocks;
pub mod extractor;
pub mod orchestrator;
pub mod schedule;

pub use content_blocks::ContentBlockScraper;
pub use extractor::{ExtractionGate, StructuredExtractor};
pub use orchestrator::{Orchestrator, RunOptions, RunReport, VenueReport};
pub use schedule::ScheduleScraper;
