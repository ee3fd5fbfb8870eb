//! Report filename patterns and rollover cadence.
//!
//! A configured path may carry one `{…}` placeholder built from the tokens
//! `YYYY, YY, MM, DD, HH, mm, SS`. The smallest token present selects how
//! often the streamer re-opens the file.

use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, TimeZone, Timelike};
use regex::Regex;
use std::path::PathBuf;

/// Smallest time unit mentioned in a filename pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverUnit {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

struct TokenMapping {
    token: &'static str,
    strftime: &'static str,
    unit: RolloverUnit,
}

/// Ordered from largest to smallest so longer tokens are replaced first and
/// the last match determines the smallest unit.
const TOKEN_MAPPINGS: [TokenMapping; 7] = [
    TokenMapping { token: "YYYY", strftime: "%Y", unit: RolloverUnit::Year },
    TokenMapping { token: "YY", strftime: "%y", unit: RolloverUnit::Year },
    TokenMapping { token: "MM", strftime: "%m", unit: RolloverUnit::Month },
    TokenMapping { token: "DD", strftime: "%d", unit: RolloverUnit::Day },
    TokenMapping { token: "HH", strftime: "%H", unit: RolloverUnit::Hour },
    TokenMapping { token: "mm", strftime: "%M", unit: RolloverUnit::Minute },
    TokenMapping { token: "SS", strftime: "%S", unit: RolloverUnit::Second },
];

/// How the report file on disk is named.
#[derive(Debug, Clone)]
pub enum ReportNaming {
    /// Fixed filename: truncated at open, never rotates.
    Static(PathBuf),
    /// Time-substituted filename that rolls over at each cadence boundary.
    Rotating(ReportPattern),
}

#[derive(Debug, Clone)]
pub struct ReportPattern {
    /// Full path with the placeholder replaced by strftime codes. Literal
    /// `%` from the configured path is escaped so it cannot inject format
    /// items.
    template: String,
    unit: RolloverUnit,
}

/// Parse a configured report path. A `{…}` placeholder must mention at
/// least one time token, otherwise the streamer refuses to start.
pub fn parse_report_naming(configured: &str) -> Result<ReportNaming, anyhow::Error> {
    let placeholder = Regex::new(r"\{([^}]+)\}").context("placeholder regex")?;
    let escaped = configured.replace('%', "%%");

    let captures = match placeholder.captures(&escaped) {
        Some(captures) => captures,
        None => return Ok(ReportNaming::Static(PathBuf::from(configured))),
    };

    let (translated, unit) = translate_pattern(&captures[1])?;
    let template = placeholder
        .replace(&escaped, regex::NoExpand(translated.as_str()))
        .into_owned();
    Ok(ReportNaming::Rotating(ReportPattern { template, unit }))
}

fn translate_pattern(pattern: &str) -> Result<(String, RolloverUnit), anyhow::Error> {
    let mut formatted = pattern.to_string();
    let mut unit = RolloverUnit::Year;
    let mut matched = false;

    for mapping in &TOKEN_MAPPINGS {
        if formatted.contains(mapping.token) {
            formatted = formatted.replace(mapping.token, mapping.strftime);
            unit = mapping.unit;
            matched = true;
        }
    }

    if !matched {
        anyhow::bail!("no valid time unit placeholders found in pattern '{pattern}'");
    }
    Ok((formatted, unit))
}

impl ReportPattern {
    pub fn unit(&self) -> RolloverUnit {
        self.unit
    }

    /// Filename for the given instant.
    pub fn filename_at(&self, now: DateTime<Local>) -> PathBuf {
        PathBuf::from(now.format(&self.template).to_string())
    }

    pub fn next_rollover(&self, now: DateTime<Local>) -> DateTime<Local> {
        next_rollover(self.unit, now)
    }
}

/// The next boundary of `unit` strictly after `now`, in local time.
pub fn next_rollover(unit: RolloverUnit, now: DateTime<Local>) -> DateTime<Local> {
    let naive = now.naive_local();
    let truncated = naive.with_nanosecond(0).unwrap_or(naive);

    let next = match unit {
        RolloverUnit::Second => truncated + Duration::seconds(1),
        RolloverUnit::Minute => {
            truncated.with_second(0).unwrap_or(truncated) + Duration::minutes(1)
        }
        RolloverUnit::Hour => {
            let hour_start = truncated
                .with_second(0)
                .and_then(|t| t.with_minute(0))
                .unwrap_or(truncated);
            hour_start + Duration::hours(1)
        }
        RolloverUnit::Day => next_midnight(naive.date()),
        RolloverUnit::Month => {
            let (year, month) = if naive.month() == 12 {
                (naive.year() + 1, 1)
            } else {
                (naive.year(), naive.month() + 1)
            };
            first_of(year, month)
        }
        RolloverUnit::Year => first_of(naive.year() + 1, 1),
    };

    resolve_local(next)
}

fn next_midnight(date: NaiveDate) -> chrono::NaiveDateTime {
    date.succ_opt()
        .unwrap_or(date)
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
}

fn first_of(year: i32, month: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("first of month")
}

fn resolve_local(naive: chrono::NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // DST gap: the nominal boundary does not exist locally, roll past it
        LocalResult::None => resolve_local(naive + Duration::hours(1)),
    }
}
