mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use error::StoreError;

pub(crate) use conflict::now_ms;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};

use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Rewrite {
        snapshot: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingCommit = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches commits.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One fsync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (events, response) = match cmd {
            WalCommand::Append { events, response } => (events, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(events, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { events, response }) => batch.push((events, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

/// Write and fsync a whole batch. The batch succeeds or fails as one: on any
/// error every byte of it is rolled back, so no caller that is told `Err`
/// has its commit come back on replay.
fn flush_batch(wal: &mut Wal, batch: &[PendingCommit]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(events, _)| wal.append_buffered(events))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result
        && let Err(rollback_err) = wal.rollback()
    {
        tracing::error!("wal rollback after failed batch ({e}) also failed: {rollback_err}");
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Rewrite { snapshot, response } => {
            let _ = response.send(wal.rewrite(&snapshot));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Apply a logged event to the calendar (caller holds the lock).
fn apply_event(cal: &mut CalendarState, event: &Event) {
    match event {
        Event::IdWatermark {
            next_entry_id,
            next_series_id,
        } => {
            cal.next_entry_id = cal.next_entry_id.max(*next_entry_id);
            cal.next_series_id = cal.next_series_id.max(*next_series_id);
        }
        Event::SeriesCreated {
            id,
            interval,
            repetitions,
        } => cal.insert_series(Series {
            id: *id,
            interval: *interval,
            repetitions: *repetitions,
        }),
        Event::SeriesDeleted { id } => {
            cal.series.remove(id);
        }
        Event::EntryInserted {
            id,
            owner,
            span,
            is_blocker,
            series_id,
        } => cal.insert_entry(Entry {
            id: *id,
            owner: owner.clone(),
            span: *span,
            is_blocker: *is_blocker,
            series_id: *series_id,
        }),
        Event::EntryDeleted { id } => {
            cal.remove_entry(*id);
        }
        Event::EntryRedacted { id } => {
            if let Some(entry) = cal.get_entry_mut(*id) {
                entry.owner = Owner::redacted();
            }
        }
    }
}

/// Minimal event list that recreates `cal`, watermark first.
fn snapshot_events(cal: &CalendarState) -> Vec<Event> {
    let mut events = Vec::with_capacity(1 + cal.series.len() + cal.entries.len());
    events.push(Event::IdWatermark {
        next_entry_id: cal.next_entry_id,
        next_series_id: cal.next_series_id,
    });
    events.extend(cal.series.values().map(|s| Event::SeriesCreated {
        id: s.id,
        interval: s.interval,
        repetitions: s.repetitions,
    }));
    events.extend(cal.entries.iter().map(Event::inserted));
    events
}

/// Write one commit to the WAL via the background group-commit writer.
async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, events: Vec<Event>) -> Result<(), StoreError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append { events, response: tx })
        .await
        .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
        .map_err(|e| StoreError::WalError(e.to_string()))
}

/// The entry store: both tables in memory, every change durably logged first.
///
/// All mutations hold the calendar write lock from the conflict check until
/// the change is applied, so overlapping writers are strictly serialized.
/// Once a change is handed to the log it is finished by a detached task, so a
/// caller that gives up mid-commit cannot leave memory behind the log.
pub struct Engine {
    calendar: Arc<RwLock<CalendarState>>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut cal = CalendarState::new();
        for event in &events {
            apply_event(&mut cal, event);
        }
        tracing::info!(
            "replayed {} events: {} entries, {} series",
            events.len(),
            cal.entries.len(),
            cal.series.len()
        );
        metrics::gauge!(crate::observability::ENTRIES_STORED).set(cal.entries.len() as f64);

        Ok(Self {
            calendar: Arc::new(RwLock::new(cal)),
            wal_tx,
        })
    }

    /// Take the write lock as an owned guard, so it can move into a commit.
    async fn write(&self) -> OwnedRwLockWriteGuard<CalendarState> {
        self.calendar.clone().write_owned().await
    }

    /// WAL-append + apply under `cal`. Nothing is applied if the append fails.
    ///
    /// Runs on its own task: dropping the returned future does not stop it,
    /// and the guard is only released once the events are applied.
    async fn commit(
        &self,
        mut cal: OwnedRwLockWriteGuard<CalendarState>,
        events: Vec<Event>,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let wal_tx = self.wal_tx.clone();
        let task = tokio::spawn(async move {
            wal_append(&wal_tx, events.clone()).await?;
            for event in &events {
                apply_event(&mut cal, event);
            }
            metrics::gauge!(crate::observability::ENTRIES_STORED).set(cal.entries.len() as f64);
            Ok::<(), StoreError>(())
        });
        task.await
            .map_err(|e| StoreError::WalError(format!("commit task failed: {e}")))?
    }

    /// Rewrite the WAL as a snapshot of the current state.
    ///
    /// Holds the read lock until the rewrite lands, so no commit can slip in
    /// between taking the snapshot and replacing the log.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let cal = self.calendar.read().await;
        let snapshot = snapshot_events(&cal);
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Rewrite { snapshot, response: tx })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
