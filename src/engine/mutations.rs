use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_batch, validate_span};
use super::{Engine, StoreError};

fn validate_owner(owner: &Owner) -> Result<(), StoreError> {
    if owner.first_name.len() > MAX_NAME_LEN || owner.last_name.len() > MAX_NAME_LEN {
        return Err(StoreError::LimitExceeded("name too long"));
    }
    if owner.email.len() > MAX_EMAIL_LEN {
        return Err(StoreError::LimitExceeded("email too long"));
    }
    Ok(())
}

impl Engine {
    /// Insert one entry if, and only if, nothing overlaps it.
    pub async fn insert_entry(&self, candidate: NewEntry) -> Result<Entry, StoreError> {
        validate_span(&candidate.span)?;
        validate_owner(&candidate.owner)?;

        let cal = self.write().await;
        check_no_conflict(&cal, &candidate.span)?;

        let entry = Entry {
            id: cal.next_entry_id,
            owner: candidate.owner,
            span: candidate.span,
            is_blocker: candidate.is_blocker,
            series_id: None,
        };
        self.commit(cal, vec![Event::inserted(&entry)]).await?;
        Ok(entry)
    }

    /// Insert a series row and all of its entries as one unit.
    ///
    /// The batch is validated against the stored entries and against itself
    /// under the write lock, then committed as a single WAL record. Either
    /// every row appears or none does.
    pub async fn insert_series(
        &self,
        interval: RepeatInterval,
        batch: Vec<NewEntry>,
    ) -> Result<(Series, Vec<Entry>), StoreError> {
        if batch.is_empty() {
            return Err(StoreError::LimitExceeded("series without entries"));
        }
        if batch.len() > MAX_SERIES_REPETITIONS as usize {
            return Err(StoreError::LimitExceeded("too many repetitions"));
        }
        for candidate in &batch {
            validate_owner(&candidate.owner)?;
        }

        let cal = self.write().await;
        validate_batch(&cal, &batch)?;

        let series = Series {
            id: cal.next_series_id,
            interval,
            repetitions: batch.len() as u32,
        };
        let first_id = cal.next_entry_id;
        let entries: Vec<Entry> = batch
            .into_iter()
            .enumerate()
            .map(|(i, c)| Entry {
                id: first_id + i as EntryId,
                owner: c.owner,
                span: c.span,
                is_blocker: c.is_blocker,
                series_id: Some(series.id),
            })
            .collect();

        let mut events = Vec::with_capacity(entries.len() + 1);
        events.push(Event::SeriesCreated {
            id: series.id,
            interval: series.interval,
            repetitions: series.repetitions,
        });
        events.extend(entries.iter().map(Event::inserted));
        self.commit(cal, events).await?;
        Ok((series, entries))
    }

    /// Delete exactly one entry visible to `scope`.
    pub async fn delete_entry(&self, id: EntryId, scope: &OwnerScope) -> Result<Entry, StoreError> {
        let cal = self.write().await;
        let entry = cal
            .get_entry(id)
            .filter(|e| scope.permits(e))
            .cloned()
            .ok_or(StoreError::EntryNotFound(id))?;
        self.commit(cal, vec![Event::EntryDeleted { id }]).await?;
        Ok(entry)
    }

    /// Delete every entry of a series visible to `scope`, then the series row
    /// once nothing references it any more. Returns the number of entries removed.
    pub async fn delete_series(&self, id: SeriesId, scope: &OwnerScope) -> Result<usize, StoreError> {
        let cal = self.write().await;
        let (doomed, kept): (Vec<&Entry>, Vec<&Entry>) = cal
            .entries
            .iter()
            .filter(|e| e.series_id == Some(id))
            .partition(|e| scope.permits(e));
        if doomed.is_empty() {
            return Err(StoreError::SeriesNotFound(id));
        }

        let removed = doomed.len();
        let mut events: Vec<Event> = doomed
            .iter()
            .map(|e| Event::EntryDeleted { id: e.id })
            .collect();
        let kept = kept.len();
        if kept == 0 && cal.series.contains_key(&id) {
            events.push(Event::SeriesDeleted { id });
        } else if kept > 0 {
            tracing::debug!("series {id} keeps {kept} entries of other owners");
        }
        self.commit(cal, events).await?;
        Ok(removed)
    }

    /// Remove a person's future entries and redact their past ones.
    ///
    /// Only entries whose owner matches all three fields exactly are touched.
    /// Entries starting after `now` are deleted; the remaining matches get
    /// their names and email replaced by the redaction placeholder.
    pub async fn scrub_user(&self, owner: &Owner, now: Ms) -> Result<ScrubReport, StoreError> {
        let cal = self.write().await;

        let mut deletes = Vec::new();
        let mut redactions = Vec::new();
        for entry in cal.entries.iter().filter(|e| e.owner == *owner) {
            if entry.span.start > now {
                deletes.push(Event::EntryDeleted { id: entry.id });
            } else {
                redactions.push(Event::EntryRedacted { id: entry.id });
            }
        }

        let report = ScrubReport {
            deleted: deletes.len(),
            redacted: redactions.len(),
        };
        // Deletes first: a future row must vanish, never linger redacted.
        deletes.append(&mut redactions);
        self.commit(cal, deletes).await?;
        Ok(report)
    }
}
