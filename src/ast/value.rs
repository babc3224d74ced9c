//! Typed metadata values.
//!
//! A raw value is classified in this order: comma list (array), quoted string, link, date range,
//! datetime, number, query (`entity where ...`), plain text. A bare word is plain text, never an
//! entity-only query; callers that expect queries (synthesis `sources`) reinterpret it.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{LinkId, Timestamp};
use crate::query::{Condition, Query};

static DATE_BOUND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}(?:-\d{2}(?:-\d{2})?)?$").expect("date bound pattern is valid"));

static DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?:T\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?$")
        .expect("datetime pattern is valid")
});

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").expect("number pattern is valid"));

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\^[^\s,\^#]+$").expect("link pattern is valid"));

static QUERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*\s+where\s+\S").expect("query pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueContent {
    QuotedString(String),
    Link(LinkId),
    /// A date (`2026-01-05`) or date-time, kept as written.
    Datetime(String),
    /// `start ~ end`; each bound is a year, year-month, date or date-time.
    DateRange {
        start: String,
        end: String,
    },
    Number(f64),
    Query(Query),
    Array(Vec<ValueContent>),
    Plain(String),
}

impl ValueContent {
    pub fn parse(raw: &str) -> ValueContent {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .unwrap_or(trimmed);
        let parts = split_top_level(body, ',');
        if parts.len() > 1 || body.len() != trimmed.len() {
            return ValueContent::Array(
                parts
                    .into_iter()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(parse_scalar)
                    .collect(),
            );
        }
        parse_scalar(trimmed)
    }

    /// Links referenced by this value, including link conditions of embedded queries.
    pub fn links(&self) -> Vec<&LinkId> {
        match self {
            ValueContent::Link(link) => vec![link],
            ValueContent::Array(items) => items.iter().flat_map(|item| item.links()).collect(),
            ValueContent::Query(query) => query.links(),
            _ => vec![],
        }
    }

    /// Scalars of this value: the elements of an array, otherwise the value itself.
    pub fn scalars(&self) -> Vec<&ValueContent> {
        match self {
            ValueContent::Array(items) => items.iter().collect(),
            scalar => vec![scalar],
        }
    }

    /// Comparison text used by query field conditions: strings without quotes, links with their
    /// caret, everything else as written.
    pub fn normalized(&self) -> String {
        match self {
            ValueContent::QuotedString(s) | ValueContent::Plain(s) | ValueContent::Datetime(s) => {
                s.clone()
            }
            ValueContent::Link(link) => link.to_string(),
            ValueContent::DateRange { start, end } => format!("{start} ~ {end}"),
            ValueContent::Number(n) => n.to_string(),
            ValueContent::Query(query) => query.to_string(),
            ValueContent::Array(items) => items
                .iter()
                .map(|item| item.normalized())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Queries carried by this value. Plain entity names count as entity-only queries.
    pub fn queries(&self) -> Vec<Query> {
        self.scalars()
            .into_iter()
            .filter_map(|scalar| match scalar {
                ValueContent::Query(query) => Some(query.clone()),
                ValueContent::Plain(text) => Query::from_str(text).ok(),
                _ => None,
            })
            .collect()
    }
}

fn parse_scalar(text: &str) -> ValueContent {
    if text.starts_with('"') {
        if let Some(unquoted) = unquote(text) {
            return ValueContent::QuotedString(unquoted);
        }
    }
    if LINK_RE.is_match(text) {
        return ValueContent::Link(LinkId::new(text));
    }
    if let Some((start, end)) = text.split_once('~') {
        let (start, end) = (start.trim(), end.trim());
        if is_date_bound(start) && is_date_bound(end) {
            return ValueContent::DateRange {
                start: start.to_string(),
                end: end.to_string(),
            };
        }
    }
    if DATETIME_RE.is_match(text) {
        return ValueContent::Datetime(text.to_string());
    }
    if NUMBER_RE.is_match(text) {
        if let Ok(number) = text.parse::<f64>() {
            return ValueContent::Number(number);
        }
    }
    if QUERY_RE.is_match(text) {
        if let Ok(query) = Query::from_str(text) {
            return ValueContent::Query(query);
        }
    }
    ValueContent::Plain(text.to_string())
}

fn is_date_bound(text: &str) -> bool {
    DATE_BOUND_RE.is_match(text) || DATETIME_RE.is_match(text)
}

/// Earliest instant a date bound can denote (`2022` → 2022-01-01T00:00). Bounds with a timezone
/// are converted to UTC. `None` for impossible calendar values.
pub fn date_bound_start(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.contains('T') {
        return Timestamp::parse(text)
            .ok()
            .map(|ts| ts.instant().naive_utc())
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M")
                    .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
                    .ok()
            });
    }
    let mut parts = text.split('-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next().map(|m| m.parse::<u32>()).transpose().ok()?.unwrap_or(1);
    let day = parts.next().map(|d| d.parse::<u32>()).transpose().ok()?.unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
}

/// Strip surrounding quotes and resolve `\"` / `\\` escapes. `None` when `text` is not a complete
/// quoted string.
pub fn unquote(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => return None,
            },
            '"' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

/// Split on `sep` outside double-quoted strings and parentheses.
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if c == sep && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

impl Query {
    /// Link ids named by `^id` conditions.
    pub fn links(&self) -> Vec<&LinkId> {
        self.conditions
            .iter()
            .filter_map(|condition| match condition {
                Condition::Link(link) => Some(link),
                _ => None,
            })
            .collect()
    }
}
