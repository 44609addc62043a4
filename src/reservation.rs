//! Business rules around the entry store.
//!
//! The boundary hands in already-parsed requests plus the caller's role and
//! gets typed outcomes back; status codes are its business, not ours.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::{now_ms, Engine, StoreError};
use crate::limits::{MAX_ENTRY_DURATION_MS, MAX_SERIES_REPETITIONS};
use crate::model::*;
use crate::observability;
use crate::series::{self, SeriesError};

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("{0}")]
    Validation(String),
    #[error("time slot is already taken")]
    Conflict,
    #[error("{0}")]
    NotFound(String),
    #[error("administrator role required")]
    Forbidden,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ReservationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) | StoreError::BatchOverlap(_, _) => ReservationError::Conflict,
            StoreError::EntryNotFound(_) | StoreError::SeriesNotFound(_) => {
                ReservationError::NotFound(e.to_string())
            }
            StoreError::InvalidSpan(_) | StoreError::LimitExceeded(_) => {
                ReservationError::Validation(e.to_string())
            }
            StoreError::WalError(_) => ReservationError::Internal(e.to_string()),
        }
    }
}

impl From<SeriesError> for ReservationError {
    fn from(e: SeriesError) -> Self {
        ReservationError::Validation(e.to_string())
    }
}

impl ReservationError {
    pub fn label(&self) -> &'static str {
        match self {
            ReservationError::Validation(_) => "invalid",
            ReservationError::Conflict => "conflict",
            ReservationError::NotFound(_) => "not_found",
            ReservationError::Forbidden => "forbidden",
            ReservationError::Internal(_) => "error",
        }
    }
}

/// Whether the caller proved the administrator role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Public,
    Admin,
}

impl Role {
    fn visibility(self) -> Visibility {
        match self {
            Role::Public => Visibility::Public,
            Role::Admin => Visibility::Admin,
        }
    }

    /// Admins act on any row; everyone else only on rows carrying their email.
    fn scope(self, email: &str) -> OwnerScope {
        match self {
            Role::Admin => OwnerScope::Admin,
            Role::Public => OwnerScope::Owner(email.to_string()),
        }
    }
}

/// A single reservation as submitted.
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub owner: Owner,
    pub start: Ms,
    pub end: Ms,
    pub is_blocker: bool,
    /// Ignored: a direct reservation never joins an existing series.
    pub series_id: Option<SeriesId>,
}

#[derive(Debug, Clone)]
pub struct SeriesRequest {
    pub interval: String,
    pub repetitions: i64,
    pub entry: EntryRequest,
}

/// Apply the per-entry rules and turn a request into a store candidate.
fn prepare(req: EntryRequest, now: Ms) -> Result<NewEntry, ReservationError> {
    if req.start <= now {
        return Err(ReservationError::Validation("start time must be in the future".into()));
    }
    if req.start >= req.end {
        return Err(ReservationError::Validation("start must be before end".into()));
    }
    if req.end - req.start > MAX_ENTRY_DURATION_MS {
        return Err(ReservationError::Validation("duration may not exceed 24 hours".into()));
    }
    if let Some(series_id) = req.series_id {
        debug!("dropping series reference {series_id} from direct reservation");
    }

    let owner = if req.is_blocker { Owner::blocker() } else { req.owner };
    Ok(NewEntry {
        owner,
        span: Span::new(req.start, req.end),
        is_blocker: req.is_blocker,
    })
}

fn parse_rule(interval: &str, repetitions: i64) -> Result<(RepeatInterval, u32), ReservationError> {
    let interval: RepeatInterval = interval
        .parse()
        .map_err(|e: UnknownInterval| ReservationError::Validation(e.to_string()))?;
    if repetitions < 1 {
        return Err(SeriesError::NoRepetitions.into());
    }
    let repetitions = u32::try_from(repetitions)
        .ok()
        .filter(|r| *r <= MAX_SERIES_REPETITIONS)
        .ok_or_else(|| ReservationError::Validation(format!("too many repetitions: {repetitions}")))?;
    Ok((interval, repetitions))
}

fn record<T>(kind: &'static str, result: &Result<T, ReservationError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(observability::RESERVATIONS_TOTAL, "kind" => kind, "outcome" => outcome)
        .increment(1);
}

pub struct ReservationService {
    engine: Arc<Engine>,
}

impl ReservationService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub async fn list_week(&self, week_start: NaiveDate, role: Role) -> WeekListing {
        let start = week_start.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        self.engine.list_for_week(start, role.visibility()).await
    }

    pub async fn reserve(&self, req: EntryRequest) -> Result<Entry, ReservationError> {
        let result = self.reserve_inner(req).await;
        record("entry", &result);
        result
    }

    async fn reserve_inner(&self, req: EntryRequest) -> Result<Entry, ReservationError> {
        let candidate = prepare(req, now_ms())?;
        let entry = self.engine.insert_entry(candidate).await?;
        info!("reserved entry {} [{}, {})", entry.id, entry.span.start, entry.span.end);
        Ok(entry)
    }

    pub async fn reserve_series(
        &self,
        req: SeriesRequest,
    ) -> Result<(Series, Vec<Entry>), ReservationError> {
        let result = self.reserve_series_inner(req).await;
        record("series", &result);
        result
    }

    async fn reserve_series_inner(
        &self,
        req: SeriesRequest,
    ) -> Result<(Series, Vec<Entry>), ReservationError> {
        let (interval, repetitions) = parse_rule(&req.interval, req.repetitions)?;
        let seed = prepare(req.entry, now_ms())?;
        let batch = series::expand(&seed, interval, repetitions)?;
        let (series, entries) = self.engine.insert_series(interval, batch).await?;
        info!(
            "reserved series {} ({} x {}), entries {:?}",
            series.id,
            series.repetitions,
            series.interval,
            entries.iter().map(|e| e.id).collect::<Vec<_>>()
        );
        Ok((series, entries))
    }

    pub async fn cancel_entry(
        &self,
        id: EntryId,
        role: Role,
        email: &str,
    ) -> Result<(), ReservationError> {
        let removed = self.engine.delete_entry(id, &role.scope(email)).await?;
        info!("deleted entry {} ({:?})", removed.id, role);
        Ok(())
    }

    pub async fn cancel_series(
        &self,
        id: SeriesId,
        role: Role,
        email: &str,
    ) -> Result<usize, ReservationError> {
        let removed = self.engine.delete_series(id, &role.scope(email)).await?;
        info!("deleted {removed} entries of series {id} ({role:?})");
        Ok(removed)
    }

    pub async fn scrub_user(&self, role: Role, owner: Owner) -> Result<ScrubReport, ReservationError> {
        if role != Role::Admin {
            return Err(ReservationError::Forbidden);
        }
        let report = self.engine.scrub_user(&owner, now_ms()).await?;
        info!(
            "scrubbed user data: {} future entries deleted, {} past entries redacted",
            report.deleted, report.redacted
        );
        Ok(report)
    }
}
