use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unix milliseconds, UTC. The store never sees any other time type.
pub type Ms = i64;

pub type EntryId = i64;
pub type SeriesId = i64;

/// First name given to every blocker entry.
pub const BLOCKER_NAME: &str = "Blocker";

/// Replacement for names and emails removed by a scrub.
pub const REDACTED: &str = "---";

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Repetition rule of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepeatInterval {
    Daily,
    Weekly,
    Monthly,
}

impl RepeatInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatInterval::Daily => "daily",
            RepeatInterval::Weekly => "weekly",
            RepeatInterval::Monthly => "monthly",
        }
    }
}

impl fmt::Display for RepeatInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownInterval(pub String);

impl fmt::Display for UnknownInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid interval: {:?}", self.0)
    }
}

impl FromStr for RepeatInterval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(RepeatInterval::Daily),
            "weekly" => Ok(RepeatInterval::Weekly),
            "monthly" => Ok(RepeatInterval::Monthly),
            other => Err(UnknownInterval(other.to_string())),
        }
    }
}

/// Who an entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl Owner {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
        }
    }

    /// The anonymous owner every blocker carries.
    pub fn blocker() -> Self {
        Self::new(BLOCKER_NAME, "", "")
    }

    pub fn redacted() -> Self {
        Self::new(REDACTED, REDACTED, REDACTED)
    }
}

/// A candidate entry that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub owner: Owner,
    pub span: Span,
    pub is_blocker: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub owner: Owner,
    pub span: Span,
    pub is_blocker: bool,
    pub series_id: Option<SeriesId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesId,
    pub interval: RepeatInterval,
    pub repetitions: u32,
}

/// Which fields a week listing exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Admin,
}

/// Entry as shown to callers without the admin role: no last name, no email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicEntry {
    pub id: EntryId,
    pub first_name: String,
    pub span: Span,
    pub is_blocker: bool,
    pub series_id: Option<SeriesId>,
}

impl From<&Entry> for PublicEntry {
    fn from(e: &Entry) -> Self {
        Self {
            id: e.id,
            first_name: e.owner.first_name.clone(),
            span: e.span,
            is_blocker: e.is_blocker,
            series_id: e.series_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeekListing {
    Redacted(Vec<PublicEntry>),
    Full(Vec<Entry>),
}

impl WeekListing {
    pub fn len(&self) -> usize {
        match self {
            WeekListing::Redacted(v) => v.len(),
            WeekListing::Full(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Restricts deletes to one owner, or lifts the restriction for admins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerScope {
    Owner(String),
    Admin,
}

impl OwnerScope {
    /// An empty email never matches: blockers carry one and are admin-only.
    pub fn permits(&self, entry: &Entry) -> bool {
        match self {
            OwnerScope::Admin => true,
            OwnerScope::Owner(email) => !email.is_empty() && entry.owner.email == *email,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrubReport {
    pub deleted: usize,
    pub redacted: usize,
}

/// The whole calendar: both tables plus the id counters.
#[derive(Debug, Clone)]
pub struct CalendarState {
    /// Sorted by `span.start`. Non-overlapping, so also sorted by `span.end`.
    pub entries: Vec<Entry>,
    pub series: BTreeMap<SeriesId, Series>,
    pub next_entry_id: EntryId,
    pub next_series_id: SeriesId,
}

impl Default for CalendarState {
    fn default() -> Self {
        Self::new()
    }
}

impl CalendarState {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            series: BTreeMap::new(),
            next_entry_id: 1,
            next_series_id: 1,
        }
    }

    /// Insert entry maintaining sort order by span.start.
    pub fn insert_entry(&mut self, entry: Entry) {
        if entry.id >= self.next_entry_id {
            self.next_entry_id = entry.id + 1;
        }
        let pos = self
            .entries
            .binary_search_by_key(&entry.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, entry);
    }

    pub fn remove_entry(&mut self, id: EntryId) -> Option<Entry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn get_entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_entry_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn insert_series(&mut self, series: Series) {
        if series.id >= self.next_series_id {
            self.next_series_id = series.id + 1;
        }
        self.series.insert(series.id, series);
    }

    /// Return only entries whose span overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Entry> {
        let right_bound = self.entries.partition_point(|e| e.span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }
}

/// Log record format. Flat, one variant per row-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Written first by compaction so ids stay unique after deleted rows vanish.
    IdWatermark {
        next_entry_id: EntryId,
        next_series_id: SeriesId,
    },
    SeriesCreated {
        id: SeriesId,
        interval: RepeatInterval,
        repetitions: u32,
    },
    SeriesDeleted {
        id: SeriesId,
    },
    EntryInserted {
        id: EntryId,
        owner: Owner,
        span: Span,
        is_blocker: bool,
        series_id: Option<SeriesId>,
    },
    EntryDeleted {
        id: EntryId,
    },
    EntryRedacted {
        id: EntryId,
    },
}

impl Event {
    pub fn inserted(entry: &Entry) -> Self {
        Event::EntryInserted {
            id: entry.id,
            owner: entry.owner.clone(),
            span: entry.span,
            is_blocker: entry.is_blocker,
            series_id: entry.series_id,
        }
    }
}
