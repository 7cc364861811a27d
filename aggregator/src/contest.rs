//! Contest records as received from the upstream and as returned to clients.
//!
//! Every raw record goes through [`normalize`], which is the only place that
//! maps upstream fields to the client-facing shape and orders the result.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Naive layouts the upstream uses for start times. They carry no offset and
/// are read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Payload of one upstream listing call. Fields other than `objects` are
/// ignored, and a missing or null `objects` counts as an empty listing.
#[derive(Debug, Deserialize)]
pub struct ContestListing {
    #[serde(default)]
    pub objects: Option<Vec<RawContest>>,
}

impl ContestListing {
    pub fn into_contests(self) -> Vec<RawContest> {
        self.objects.unwrap_or_default()
    }
}

/// A contest as reported by the upstream. A missing or null `event` or
/// `href` reads as an empty string.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RawContest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub event: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub href: String,
    #[serde(default)]
    pub start: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A contest as returned to API clients.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Contest {
    pub name: String,
    pub url: String,
    /// Start time exactly as the upstream reported it
    pub start: String,
}

impl Contest {
    /// Maps a raw record to the client shape along with its parsed start
    /// time. Returns `None` when the start time is missing or unparseable.
    pub fn from_raw(raw: RawContest) -> Option<(DateTime<Utc>, Contest)> {
        let start = raw.start?;
        let starts_at = parse_start(&start)?;

        Some((
            starts_at,
            Contest {
                name: raw.event,
                url: raw.href,
                start,
            },
        ))
    }
}

/// Parses an upstream start time. Accepts RFC 3339 and naive timestamps.
pub fn parse_start(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Formats the lower bound on start time sent to the upstream, e.g.
/// `2025-01-01T12:00:00.000Z`.
pub fn format_start_bound(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Flattens per-resource listings, maps them to [`Contest`] and sorts them
/// by start time. The sort is stable, so contests starting at the same
/// instant keep the order of `listings`.
pub fn normalize(listings: Vec<Vec<RawContest>>) -> Vec<Contest> {
    let mut contests: Vec<(DateTime<Utc>, Contest)> = listings
        .into_iter()
        .flatten()
        .filter_map(|raw| {
            let event = raw.event.clone();
            let normalized = Contest::from_raw(raw);
            if normalized.is_none() {
                tracing::warn!(event = %event, "Dropping contest without a valid start time");
            }
            normalized
        })
        .collect();

    contests.sort_by_key(|(starts_at, _)| *starts_at);

    contests.into_iter().map(|(_, contest)| contest).collect()
}
