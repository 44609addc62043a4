//! Expansion of a seed entry into the full candidate batch of a series.
//!
//! Steps are applied to the previous candidate, not to the seed, and start and
//! end are shifted independently. Monthly steps add one to the month component
//! and let an out-of-range day spill into the following month, so Jan 31 steps
//! to Mar 3 (Mar 2 in a leap year) and the series continues from there. All
//! arithmetic is on UTC calendar components.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use thiserror::Error;

use crate::limits::{DAY_MS, MAX_SERIES_REPETITIONS};
use crate::model::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeriesError {
    #[error("a series needs at least one repetition")]
    NoRepetitions,
    #[error("too many repetitions: {0}")]
    TooManyRepetitions(u32),
    #[error("series runs past the supported date range")]
    OutOfRange,
}

/// Add `months` to the month component, normalizing day overflow forward.
fn add_months_naive(ms: Ms, months: i32) -> Option<Ms> {
    let at = DateTime::<Utc>::from_timestamp_millis(ms)?.naive_utc();
    let month_index = at.year() * 12 + at.month0() as i32 + months;
    let first_of_month =
        NaiveDate::from_ymd_opt(month_index.div_euclid(12), month_index.rem_euclid(12) as u32 + 1, 1)?;
    let date = first_of_month.checked_add_days(Days::new(u64::from(at.day() - 1)))?;
    Some(date.and_time(at.time()).and_utc().timestamp_millis())
}

fn step(ms: Ms, interval: RepeatInterval) -> Option<Ms> {
    match interval {
        RepeatInterval::Daily => ms.checked_add(DAY_MS),
        RepeatInterval::Weekly => ms.checked_add(7 * DAY_MS),
        RepeatInterval::Monthly => add_months_naive(ms, 1),
    }
}

/// Materialize all `repetitions` candidates, the seed first.
///
/// Spans are not validated here; a month overflow can shift a start past its
/// end, which the batch validator rejects.
pub fn expand(
    seed: &NewEntry,
    interval: RepeatInterval,
    repetitions: u32,
) -> Result<Vec<NewEntry>, SeriesError> {
    if repetitions == 0 {
        return Err(SeriesError::NoRepetitions);
    }
    if repetitions > MAX_SERIES_REPETITIONS {
        return Err(SeriesError::TooManyRepetitions(repetitions));
    }

    let mut batch = Vec::with_capacity(repetitions as usize);
    batch.push(seed.clone());
    for _ in 1..repetitions {
        let prev = &batch[batch.len() - 1];
        let start = step(prev.span.start, interval).ok_or(SeriesError::OutOfRange)?;
        let end = step(prev.span.end, interval).ok_or(SeriesError::OutOfRange)?;
        let next = NewEntry {
            owner: prev.owner.clone(),
            span: Span { start, end },
            is_blocker: prev.is_blocker,
        };
        batch.push(next);
    }
    Ok(batch)
}
