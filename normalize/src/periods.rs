//! Date ranges such as `Jan 2019 - Present`, and the education and work
//! timelines built from them.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

const MONTHS: &str = "january|february|march|april|june|july|august|september|october|november|december|jan|feb|mar|apr|may|jun|jul|aug|sept|sep|oct|nov|dec";

const MONTH_PREFIXES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Words that close an open-ended range.
const ONGOING: [&str; 4] = ["present", "current", "ongoing", "now"];

/// Longest entry label kept, in characters.
const MAX_ENTRY_CHARS: usize = 160;

static DATE_RANGE: OnceLock<Option<Regex>> = OnceLock::new();

fn date_range() -> Option<&'static Regex> {
    DATE_RANGE
        .get_or_init(|| {
            let date = format!(r"(?:{MONTHS})\.?\s+\d{{4}}|\d{{1,2}}/\d{{4}}|\d{{4}}");
            let ongoing = ONGOING.join("|");
            Regex::new(&format!(
                r"(?i)\b(?P<start>{date})\s*(?:-|–|—|to)\s*(?P<end>{date}|{ongoing})\b"
            ))
            .ok()
        })
        .as_ref()
}

/// A dated entry: a job, a degree, a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// The line the range appeared on, with the range itself removed.
    pub entry: String,

    /// First month of the period.
    pub start: NaiveDate,

    /// Last month of the period. `None` while ongoing.
    pub end: Option<NaiveDate>,
}

impl Period {
    /// Whether the period is still running.
    pub fn is_ongoing(&self) -> bool {
        self.end.is_none()
    }

    /// `Jan 2019 - Present` style label.
    pub fn label(&self) -> String {
        let end = self
            .end
            .map_or_else(|| "Present".to_string(), |end| end.format("%b %Y").to_string());
        format!("{} - {end}", self.start.format("%b %Y"))
    }
}

/// Months without any period between two consecutive periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    /// Entry of the period that ended.
    pub after: String,

    /// Entry of the period that started next.
    pub before: String,

    /// Whole months in between.
    pub months: u32,
}

/// Education and experience periods of one document, with their gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub education: Vec<Period>,
    pub experience: Vec<Period>,
    pub education_gaps: Vec<Gap>,
    pub experience_gaps: Vec<Gap>,

    /// Months between the end of the last education period and the start
    /// of the first job. `None` when either side is missing or education
    /// is still ongoing.
    pub education_to_first_job_months: Option<u32>,
}

impl Timeline {
    /// Build the timeline of a document.
    pub fn from_text(text: &str) -> Self {
        let (education_text, experience_text) = split_sections(text);
        let education = extract_periods(education_text);
        let experience = extract_periods(experience_text);

        let last_education_end = if education.iter().any(Period::is_ongoing) {
            None
        } else {
            education.iter().filter_map(|p| p.end).max()
        };
        let first_job_start = experience.iter().map(|p| p.start).min();
        let education_to_first_job_months = match (last_education_end, first_job_start) {
            (Some(end), Some(start)) => Some(months_between(end, start).saturating_sub(1)),
            _ => None,
        };

        Self {
            education_gaps: gaps(&education),
            experience_gaps: gaps(&experience),
            education,
            experience,
            education_to_first_job_months,
        }
    }

    /// Whether no period was found at all.
    pub fn is_empty(&self) -> bool {
        self.education.is_empty() && self.experience.is_empty()
    }
}

/// Every date range in `text`, in order of appearance.
///
/// Years without a month start in January and end in December. Ranges
/// that end before they start are dropped.
pub fn extract_periods(text: &str) -> Vec<Period> {
    let Some(re) = date_range() else {
        return Vec::new();
    };

    re.captures_iter(text)
        .filter_map(|caps| {
            let range = caps.get(0)?;
            let start = parse_date(caps.name("start")?.as_str(), false)?;
            let end_token = caps.name("end")?.as_str();
            let end = if ONGOING.contains(&end_token.to_ascii_lowercase().as_str()) {
                None
            } else {
                Some(parse_date(end_token, true)?)
            };
            if end.is_some_and(|end| end < start) {
                return None;
            }

            Some(Period {
                entry: entry_label(text, range.start(), range.end()),
                start,
                end,
            })
        })
        .collect()
}

/// Split a document into its education and experience sections.
///
/// Sections start at the first `education` / `experience` heading. Without
/// either heading the whole text counts as experience.
pub fn split_sections(text: &str) -> (&str, &str) {
    // ASCII lowercasing keeps byte offsets valid for `text`.
    let lower = text.to_ascii_lowercase();
    match (lower.find("education"), lower.find("experience")) {
        (Some(edu), Some(exp)) if edu < exp => (&text[edu..exp], &text[exp..]),
        (Some(edu), Some(exp)) => (&text[edu..], &text[exp..edu]),
        (Some(edu), None) => (&text[edu..], &text[..edu]),
        (None, _) => ("", text),
    }
}

/// Uncovered stretches between periods, ordered by start.
///
/// Overlapping periods cover each other. Nothing after an ongoing period
/// can be a gap.
pub fn gaps(periods: &[Period]) -> Vec<Gap> {
    let mut ordered: Vec<&Period> = periods.iter().collect();
    ordered.sort_by_key(|p| p.start);

    let mut gaps = Vec::new();
    let mut covered: Option<(NaiveDate, &Period)> = None;
    for period in ordered {
        if let Some((end, last)) = covered {
            let months = months_between(end, period.start).saturating_sub(1);
            if months > 0 {
                gaps.push(Gap {
                    after: last.entry.clone(),
                    before: period.entry.clone(),
                    months,
                });
            }
        }
        let Some(end) = period.end else {
            break;
        };
        covered = match covered {
            Some((current, last)) if current >= end => Some((current, last)),
            _ => Some((end, period)),
        };
    }
    gaps
}

/// Calendar months from `from` to `to`, zero when `to` is not later.
fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    u32::try_from(months).unwrap_or(0)
}

/// Parse `Jan 2019`, `01/2019` or `2019`.
fn parse_date(token: &str, is_end: bool) -> Option<NaiveDate> {
    let token = token.trim();
    if let Some((month, year)) = token.split_once('/') {
        return NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1);
    }

    let mut parts = token.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(year), None) => {
            let month = if is_end { 12 } else { 1 };
            NaiveDate::from_ymd_opt(year.parse().ok()?, month, 1)
        }
        (Some(month), Some(year)) => {
            NaiveDate::from_ymd_opt(year.parse().ok()?, month_number(month)?, 1)
        }
        _ => None,
    }
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    let index = MONTH_PREFIXES.iter().position(|m| *m == prefix)?;
    u32::try_from(index + 1).ok()
}

/// The line around `start..end` without the range and its separators.
fn entry_label(text: &str, start: usize, end: usize) -> String {
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);
    let is_separator = |c: char| c.is_whitespace() || ",;:|()[]-–—".contains(c);

    let before = text[line_start..start].trim_matches(is_separator);
    let after = text[end..line_end].trim_matches(is_separator);
    let label = match (before.is_empty(), after.is_empty()) {
        (false, false) => format!("{before} {after}"),
        (false, true) => before.to_string(),
        _ => after.to_string(),
    };
    label.chars().take(MAX_ENTRY_CHARS).collect()
}
