use crate::limits::*;
use crate::model::*;

use super::StoreError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Shape checks every stored span must pass, independent of other entries.
pub(crate) fn validate_span(span: &Span) -> Result<(), StoreError> {
    if span.start >= span.end {
        return Err(StoreError::InvalidSpan(*span));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(StoreError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_ENTRY_DURATION_MS {
        return Err(StoreError::LimitExceeded("entry longer than 24 hours"));
    }
    Ok(())
}

/// Any stored entry overlapping `span` is a conflict. Caller holds the write lock.
pub(crate) fn check_no_conflict(cal: &CalendarState, span: &Span) -> Result<(), StoreError> {
    match cal.overlapping(span).next() {
        Some(existing) => Err(StoreError::Conflict(existing.id)),
        None => Ok(()),
    }
}

/// Validate a whole batch before anything is written.
///
/// Every candidate is checked against the stored entries and against its
/// siblings; the first problem rejects the batch.
pub(crate) fn validate_batch(cal: &CalendarState, batch: &[NewEntry]) -> Result<(), StoreError> {
    for candidate in batch {
        validate_span(&candidate.span)?;
        check_no_conflict(cal, &candidate.span)?;
    }

    // Expansion produces ascending spans, but do not rely on it.
    let mut spans: Vec<Span> = batch.iter().map(|c| c.span).collect();
    spans.sort_by_key(|s| s.start);
    for pair in spans.windows(2) {
        if pair[0].overlaps(&pair[1]) {
            return Err(StoreError::BatchOverlap(pair[0], pair[1]));
        }
    }
    Ok(())
}
