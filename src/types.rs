use std::collections::HashSet;

use chrono::NaiveDateTime;
use regex::Regex;
use schemars::JsonSchema;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::constants::default_strip_elements;
use crate::error::{ExtractorError, FieldIssue, Result, ValidationError};

/// How a venue's listing pages are enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum PaginationSpec {
    /// A single listing page.
    None { url: String },
    /// `{n}` replaced by `start, start + 1, ..., start + count - 1`.
    Simple {
        url_template: String,
        #[serde(default = "default_start")]
        start: i64,
        count: u32,
    },
    /// `{date}` replaced by today and the following days.
    ByDay {
        url_template: String,
        date_format: String,
        count: u32,
    },
    /// `{month}` replaced by the current month and the following ones.
    ByMonth {
        url_template: String,
        month_format: String,
        count: u32,
    },
}

fn default_start() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub pagination: PaginationSpec,
    /// Matched against the start of every `href` on a listing page.
    pub event_url_pattern: String,
}

/// A named, selector-addressed region of an event page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlockSpec {
    pub selector: String,
    /// What the model should look for in this block. Context only.
    pub relevant: String,
    #[serde(default)]
    pub irrelevant: Option<String>,
    /// Applied in order to the markdown text; matches are removed.
    #[serde(default)]
    pub remove_regex: Vec<String>,
    /// Tags rendered as their text content only.
    #[serde(default = "default_strip_elements")]
    pub strip_elements: Vec<String>,
}

/// Response shape demanded from the model for a venue's pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    #[default]
    Single,
    Multiple,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueExtractionSpec {
    pub venue_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extraction: ExtractionMode,
    pub schedule: ScheduleSpec,
    pub blocks: Vec<ContentBlockSpec>,
}

impl VenueExtractionSpec {
    /// Name for logs and reports; falls back to the venue id.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.venue_id.to_string())
    }

    /// Rejects a spec that would fail or waste calls once the run starts.
    pub fn validate(&self) -> Result<()> {
        let venue = self.label();
        self.schedule
            .pagination
            .validate()
            .map_err(|e| ExtractorError::config(format!("venue {}: {}", venue, e)))?;
        Regex::new(&self.schedule.event_url_pattern).map_err(|e| {
            ExtractorError::config(format!("venue {}: invalid event_url_pattern: {}", venue, e))
        })?;
        if self.blocks.is_empty() {
            return Err(ExtractorError::config(format!(
                "venue {}: at least one content block is required",
                venue
            )));
        }
        for block in &self.blocks {
            Selector::parse(&block.selector).map_err(|e| {
                ExtractorError::config(format!(
                    "venue {}: invalid selector `{}`: {:?}",
                    venue, block.selector, e
                ))
            })?;
            for pattern in &block.remove_regex {
                Regex::new(pattern).map_err(|e| {
                    ExtractorError::config(format!(
                        "venue {}: invalid remove_regex `{}`: {}",
                        venue, pattern, e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// Validates every spec and rejects duplicated venue ids.
pub fn validate_specs(specs: &[VenueExtractionSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        spec.validate()?;
        if !seen.insert(spec.venue_id) {
            return Err(ExtractorError::config(format!(
                "venue id {} is defined more than once",
                spec.venue_id
            )));
        }
    }
    Ok(())
}

/// One block of an event page, as HTML until converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub relevant: String,
    pub irrelevant: Option<String>,
    /// `None` when the selector matched nothing or cleaning left nothing.
    pub content: Option<String>,
    pub is_markdown: bool,
}

impl ContentBlock {
    pub fn new(spec: &ContentBlockSpec, content: Option<String>) -> Self {
        Self {
            relevant: spec.relevant.clone(),
            irrelevant: spec.irrelevant.clone(),
            content: content.filter(|c| !c.is_empty()),
            is_markdown: false,
        }
    }

    /// Refreshes the labels from the current spec, keeping the content.
    pub fn relabel(mut self, spec: &ContentBlockSpec) -> Self {
        self.relevant = spec.relevant.clone();
        self.irrelevant = spec.irrelevant.clone();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
    }
}

/// Cleaned blocks of one event page: the unit handed to the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcedContentBlocks {
    pub url: Url,
    pub venue_id: Uuid,
    pub blocks: Vec<ContentBlock>,
}

/// Advisory tag the model attaches when a page did not yield a clean record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ExtractionErrorTag {
    EmptyPage,
    MissingData,
    MalformedData,
}

/// A single event as described by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EventRecord {
    /// Every date and time at which the event takes place, as ISO 8601 local
    /// datetimes (YYYY-MM-DDTHH:MM:SS).
    pub schedule: Vec<NaiveDateTime>,
    /// Title of the event. Do not include the cycle or festival name.
    pub title: Option<String>,
    /// Author, director or main performer of the event.
    pub author: Option<String>,
    /// Description of the event.
    pub description: String,
    /// Duration of the event in minutes (e.g. 93).
    pub duration_minutes: Option<u32>,
}

impl EventRecord {
    fn issues(&self, prefix: &str) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if self.schedule.is_empty() {
            issues.push(FieldIssue {
                path: format!("{}/schedule", prefix),
                message: "at least one event datetime is required".to_string(),
                input: "[]".to_string(),
            });
        }
        if self.description.trim().is_empty() {
            issues.push(FieldIssue {
                path: format!("{}/description", prefix),
                message: "description must not be blank".to_string(),
                input: format!("{:?}", self.description),
            });
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                issues.push(FieldIssue {
                    path: format!("{}/title", prefix),
                    message: "title must be null or non-blank".to_string(),
                    input: format!("{:?}", title),
                });
            }
        }
        issues
    }
}

/// Model response for venues with one event per page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SingleExtraction {
    /// Event data extracted from the page, or null if none could be extracted.
    pub event_data: Option<EventRecord>,
    /// Error that occurred during extraction, if any.
    pub extraction_error: Option<ExtractionErrorTag>,
}

/// Model response for venues listing several events per page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MultipleExtraction {
    /// Events extracted from the page; empty if none could be extracted.
    pub event_data: Vec<EventRecord>,
    /// Error that occurred during extraction, if any.
    pub extraction_error: Option<ExtractionErrorTag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionResult {
    Single(SingleExtraction),
    Multiple(MultipleExtraction),
}

impl ExtractionResult {
    pub fn mode(&self) -> ExtractionMode {
        match self {
            ExtractionResult::Single(_) => ExtractionMode::Single,
            ExtractionResult::Multiple(_) => ExtractionMode::Multiple,
        }
    }

    pub fn extraction_error(&self) -> Option<ExtractionErrorTag> {
        match self {
            ExtractionResult::Single(s) => s.extraction_error,
            ExtractionResult::Multiple(m) => m.extraction_error,
        }
    }

    pub fn records(&self) -> Vec<&EventRecord> {
        match self {
            ExtractionResult::Single(s) => s.event_data.iter().collect(),
            ExtractionResult::Multiple(m) => m.event_data.iter().collect(),
        }
    }

    /// Checks the minimal shape every record needs before it is persisted.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let issues: Vec<FieldIssue> = match self {
            ExtractionResult::Single(s) => s
                .event_data
                .as_ref()
                .map(|r| r.issues("/event_data"))
                .unwrap_or_default(),
            ExtractionResult::Multiple(m) => m
                .event_data
                .iter()
                .enumerate()
                .flat_map(|(i, r)| r.issues(&format!("/event_data/{}", i)))
                .collect(),
        };
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn into_events(self, venue_id: Uuid, url: &Url) -> Vec<Event> {
        let records = match self {
            ExtractionResult::Single(s) => s.event_data.into_iter().collect::<Vec<_>>(),
            ExtractionResult::Multiple(m) => m.event_data,
        };
        records
            .into_iter()
            .map(|record| Event::from_record(record, venue_id, url.clone()))
            .collect()
    }
}

/// A persisted event entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub url: Url,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: String,
    pub duration_minutes: Option<u32>,
    pub schedule: Vec<NaiveDateTime>,
}

impl Event {
    pub fn from_record(record: EventRecord, venue_id: Uuid, url: Url) -> Self {
        Self {
            id: Uuid::new_v4(),
            venue_id,
            url,
            title: record.title,
            author: record.author,
            description: record.description,
            duration_minutes: record.duration_minutes,
            schedule: record.schedule,
        }
    }
}
