use thiserror::Error;

use crate::model::{EntryId, SeriesId, Span};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("time slot overlaps entry {0}")]
    Conflict(EntryId),
    #[error("candidates {0:?} and {1:?} of the same batch overlap")]
    BatchOverlap(Span, Span),
    #[error("entry not found: {0}")]
    EntryNotFound(EntryId),
    #[error("no entries of series {0} found")]
    SeriesNotFound(SeriesId),
    #[error("invalid time range [{}, {})", .0.start, .0.end)]
    InvalidSpan(Span),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}
