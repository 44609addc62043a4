//! JSON shapes of the HTTP interface. Field names are PascalCase to match the
//! existing frontend.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::reservation::{EntryRequest, SeriesRequest};

fn to_utc(ms: Ms) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntryBody {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    #[serde(default)]
    pub series_id: Option<SeriesId>,
    #[serde(default)]
    pub is_blocker: bool,
}

impl From<EntryBody> for EntryRequest {
    fn from(b: EntryBody) -> Self {
        EntryRequest {
            owner: Owner::new(b.first_name, b.last_name, b.email),
            start: b.start.timestamp_millis(),
            end: b.end.timestamp_millis(),
            is_blocker: b.is_blocker,
            series_id: b.series_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeriesRuleBody {
    pub interval: String,
    pub repetitions: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeriesBody {
    pub series: SeriesRuleBody,
    pub entry: EntryBody,
}

impl From<SeriesBody> for SeriesRequest {
    fn from(b: SeriesBody) -> Self {
        SeriesRequest {
            interval: b.series.interval,
            repetitions: b.series.repetitions,
            entry: b.entry.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicEntryDto {
    pub id: EntryId,
    pub first_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub series_id: Option<SeriesId>,
    pub is_blocker: bool,
}

impl From<&PublicEntry> for PublicEntryDto {
    fn from(e: &PublicEntry) -> Self {
        Self {
            id: e.id,
            first_name: e.first_name.clone(),
            start: to_utc(e.span.start),
            end: to_utc(e.span.end),
            series_id: e.series_id,
            is_blocker: e.is_blocker,
        }
    }
}

impl From<&Entry> for PublicEntryDto {
    fn from(e: &Entry) -> Self {
        (&PublicEntry::from(e)).into()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FullEntryDto {
    pub id: EntryId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub series_id: Option<SeriesId>,
    pub is_blocker: bool,
}

impl From<&Entry> for FullEntryDto {
    fn from(e: &Entry) -> Self {
        Self {
            id: e.id,
            first_name: e.owner.first_name.clone(),
            last_name: e.owner.last_name.clone(),
            email: e.owner.email.clone(),
            start: to_utc(e.span.start),
            end: to_utc(e.span.end),
            series_id: e.series_id,
            is_blocker: e.is_blocker,
        }
    }
}

/// Week listing in the shape the caller's role allows.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WeekDto {
    Redacted(Vec<PublicEntryDto>),
    Full(Vec<FullEntryDto>),
}

impl From<&WeekListing> for WeekDto {
    fn from(listing: &WeekListing) -> Self {
        match listing {
            WeekListing::Redacted(v) => WeekDto::Redacted(v.iter().map(Into::into).collect()),
            WeekListing::Full(v) => WeekDto::Full(v.iter().map(Into::into).collect()),
        }
    }
}
