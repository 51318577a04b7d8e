//! Listing-page URL resolution. Pure computation, no network.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Days, Local, NaiveDate, NaiveDateTime};
use url::Url;

use crate::error::{ExtractorError, Result};
use crate::types::PaginationSpec;

impl PaginationSpec {
    fn template(&self) -> &str {
        match self {
            PaginationSpec::None { url } => url,
            PaginationSpec::Simple { url_template, .. }
            | PaginationSpec::ByDay { url_template, .. }
            | PaginationSpec::ByMonth { url_template, .. } => url_template,
        }
    }

    fn placeholder(&self) -> Option<&'static str> {
        match self {
            PaginationSpec::None { .. } => None,
            PaginationSpec::Simple { .. } => Some("{n}"),
            PaginationSpec::ByDay { .. } => Some("{date}"),
            PaginationSpec::ByMonth { .. } => Some("{month}"),
        }
    }

    /// Checks the placeholder, count and date format of the variant.
    pub fn validate(&self) -> Result<()> {
        if let Some(placeholder) = self.placeholder() {
            if !self.template().contains(placeholder) {
                return Err(ExtractorError::config(format!(
                    "pagination template `{}` must contain `{}`",
                    self.template(),
                    placeholder
                )));
            }
        }
        match self {
            PaginationSpec::None { url } => {
                parse_url(url)?;
            }
            PaginationSpec::Simple { start, count, .. } => {
                check_count(*count)?;
                start.checked_add(i64::from(*count) - 1).ok_or_else(|| {
                    ExtractorError::config(format!(
                        "pagination start {} with count {} overflows",
                        start, count
                    ))
                })?;
            }
            PaginationSpec::ByDay { date_format, count, .. } => {
                check_count(*count)?;
                check_format(date_format)?;
            }
            PaginationSpec::ByMonth { month_format, count, .. } => {
                check_count(*count)?;
                check_format(month_format)?;
            }
        }
        Ok(())
    }
}

fn check_count(count: u32) -> Result<()> {
    if count == 0 {
        return Err(ExtractorError::config("pagination count must be at least 1"));
    }
    Ok(())
}

fn check_format(format: &str) -> Result<()> {
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ExtractorError::config(format!(
            "invalid date format `{}`",
            format
        )));
    }
    Ok(())
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| ExtractorError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn format_datetime(at: NaiveDateTime, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", at.format(format))
        .map_err(|_| ExtractorError::config(format!("invalid date format `{}`", format)))?;
    Ok(out)
}

fn midnight(day: NaiveDate) -> NaiveDateTime {
    day.and_time(chrono::NaiveTime::MIN)
}

/// First day of the month `offset` months after `month_start`'s month.
fn add_months(month_start: NaiveDate, offset: u32) -> Option<NaiveDate> {
    let index = month_start.year() as i64 * 12 + month_start.month0() as i64 + offset as i64;
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Listing page URLs for `spec`, in order, relative to the local date.
pub fn resolve(spec: &PaginationSpec) -> Result<Vec<Url>> {
    resolve_at(spec, Local::now().date_naive())
}

/// Listing page URLs for `spec`, in order, with `today` fixed.
pub fn resolve_at(spec: &PaginationSpec, today: NaiveDate) -> Result<Vec<Url>> {
    spec.validate()?;
    match spec {
        PaginationSpec::None { url } => Ok(vec![parse_url(url)?]),
        PaginationSpec::Simple {
            url_template,
            start,
            count,
        } => (0..i64::from(*count))
            .map(|i| {
                let n = start
                    .checked_add(i)
                    .ok_or_else(|| ExtractorError::config("page number out of range"))?;
                parse_url(&url_template.replace("{n}", &n.to_string()))
            })
            .collect(),
        PaginationSpec::ByDay {
            url_template,
            date_format,
            count,
        } => (0..*count)
            .map(|i| {
                let day = today
                    .checked_add_days(Days::new(i as u64))
                    .ok_or_else(|| ExtractorError::config("day pagination out of range"))?;
                let formatted = format_datetime(midnight(day), date_format)?;
                parse_url(&url_template.replace("{date}", &formatted))
            })
            .collect(),
        PaginationSpec::ByMonth {
            url_template,
            month_format,
            count,
        } => {
            let month_start = today
                .with_day(1)
                .ok_or_else(|| ExtractorError::config("month pagination out of range"))?;
            (0..*count)
                .map(|i| {
                    let month = add_months(month_start, i)
                        .ok_or_else(|| ExtractorError::config("month pagination out of range"))?;
                    let formatted = format_datetime(midnight(month), month_format)?;
                    parse_url(&url_template.replace("{month}", &formatted))
                })
                .collect()
        }
    }
}
