use crate::limits::WEEK_MS;
use crate::model::*;

use super::Engine;

impl Engine {
    /// Entries intersecting `[week_start, week_start + 7d)`, ascending by start.
    pub async fn list_for_week(&self, week_start: Ms, visibility: Visibility) -> WeekListing {
        let window = Span::new(week_start, week_start + WEEK_MS);
        let cal = self.calendar.read().await;
        let hits = cal.overlapping(&window);
        match visibility {
            Visibility::Public => WeekListing::Redacted(hits.map(PublicEntry::from).collect()),
            Visibility::Admin => WeekListing::Full(hits.cloned().collect()),
        }
    }

    pub async fn get_entry(&self, id: EntryId) -> Option<Entry> {
        self.calendar.read().await.get_entry(id).cloned()
    }

    pub async fn get_series(&self, id: SeriesId) -> Option<Series> {
        self.calendar.read().await.series.get(&id).cloned()
    }

    pub async fn entry_count(&self) -> usize {
        self.calendar.read().await.entries.len()
    }
}
