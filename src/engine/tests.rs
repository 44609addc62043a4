use std::path::PathBuf;
use std::sync::Arc;

use super::*;
use crate::limits::*;

const H: Ms = HOUR_MS;
const BASE: Ms = 1_900_000_000_000; // well in the future, stable across runs

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotbook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn ada() -> Owner {
    Owner::new("Ada", "Lovelace", "ada@example.com")
}

fn grace() -> Owner {
    Owner::new("Grace", "Hopper", "grace@example.com")
}

fn candidate(owner: Owner, start: Ms, end: Ms) -> NewEntry {
    NewEntry {
        owner,
        span: Span::new(start, end),
        is_blocker: false,
    }
}

fn blocker(start: Ms, end: Ms) -> NewEntry {
    NewEntry {
        owner: Owner::blocker(),
        span: Span::new(start, end),
        is_blocker: true,
    }
}

// ── Insert & conflict ────────────────────────────────────

#[tokio::test]
async fn insert_assigns_increasing_ids() {
    let engine = Engine::new(test_wal_path("ids.wal")).unwrap();
    let a = engine.insert_entry(candidate(ada(), BASE, BASE + H)).await.unwrap();
    let b = engine.insert_entry(candidate(ada(), BASE + H, BASE + 2 * H)).await.unwrap();
    assert_eq!(a.id, 1);
    assert_eq!(b.id, 2);
    assert_eq!(a.series_id, None);
    assert_eq!(engine.get_entry(2).await.unwrap().owner, ada());
}

#[tokio::test]
async fn overlap_is_rejected_and_store_unchanged() {
    let engine = Engine::new(test_wal_path("overlap.wal")).unwrap();
    let first = engine.insert_entry(candidate(ada(), BASE, BASE + 2 * H)).await.unwrap();

    let err = engine
        .insert_entry(candidate(grace(), BASE + H, BASE + 3 * H))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(id) if id == first.id));

    // Enclosing the existing slot is an overlap too.
    let err = engine
        .insert_entry(candidate(grace(), BASE - H, BASE + 3 * H))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    assert_eq!(engine.entry_count().await, 1);

    // The failed attempts did not consume ids.
    let next = engine.insert_entry(candidate(grace(), BASE + 2 * H, BASE + 3 * H)).await.unwrap();
    assert_eq!(next.id, 2);
}

#[tokio::test]
async fn touching_slots_do_not_conflict() {
    let engine = Engine::new(test_wal_path("touching.wal")).unwrap();
    engine.insert_entry(candidate(ada(), BASE + H, BASE + 2 * H)).await.unwrap();
    engine.insert_entry(candidate(grace(), BASE, BASE + H)).await.unwrap();
    engine.insert_entry(candidate(grace(), BASE + 2 * H, BASE + 3 * H)).await.unwrap();
    assert_eq!(engine.entry_count().await, 3);
}

#[tokio::test]
async fn blockers_conflict_like_any_entry() {
    let engine = Engine::new(test_wal_path("blocker_conflict.wal")).unwrap();
    engine.insert_entry(blocker(BASE, BASE + 4 * H)).await.unwrap();
    let err = engine
        .insert_entry(candidate(ada(), BASE + H, BASE + 2 * H))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn invalid_spans_rejected() {
    let engine = Engine::new(test_wal_path("invalid_span.wal")).unwrap();
    let too_long = candidate(ada(), BASE, BASE + DAY_MS + 1);
    assert!(matches!(
        engine.insert_entry(too_long).await,
        Err(StoreError::LimitExceeded(_))
    ));
    let long_name = candidate(Owner::new("x".repeat(MAX_NAME_LEN + 1), "", ""), BASE, BASE + H);
    assert!(matches!(
        engine.insert_entry(long_name).await,
        Err(StoreError::LimitExceeded(_))
    ));
    assert_eq!(engine.entry_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_inserts_have_one_winner() {
    let engine = Arc::new(Engine::new(test_wal_path("race.wal")).unwrap());

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        // Every candidate covers [BASE + H, BASE + 2H) at least partially.
        let start = BASE + (i % 4) * 15 * 60_000;
        handles.push(tokio::spawn(async move {
            engine
                .insert_entry(candidate(ada(), start, start + 2 * H))
                .await
        }));
    }

    let mut winners = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(_) => winners += 1,
            Err(StoreError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(engine.entry_count().await, 1);
}

#[tokio::test]
async fn abandoned_insert_still_lands_whole() {
    use futures::FutureExt;

    let path = test_wal_path("abandoned.wal");
    let engine = Engine::new(path.clone()).unwrap();

    // Polled once, far enough to hand the commit to the log, then dropped.
    let abandoned = engine
        .insert_entry(candidate(ada(), BASE, BASE + 2 * H))
        .now_or_never();
    assert!(abandoned.is_none());

    let err = engine
        .insert_entry(candidate(grace(), BASE + H, BASE + 3 * H))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(1)));
    let next = engine
        .insert_entry(candidate(grace(), BASE + 2 * H, BASE + 3 * H))
        .await
        .unwrap();
    assert_eq!(next.id, 2);
    drop(engine);

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.entry_count().await, 2);
    assert_eq!(engine.get_entry(1).await.unwrap().owner, ada());
    assert_eq!(engine.get_entry(2).await.unwrap().owner, grace());
}

#[test]
fn failed_batch_is_rolled_back_whole() {
    let path = test_wal_path("failed_batch.wal");
    let inserted = |id: EntryId| {
        Event::inserted(&Entry {
            id,
            owner: ada(),
            span: Span::new(BASE + id * H, BASE + id * H + H / 2),
            is_blocker: false,
            series_id: None,
        })
    };

    let mut wal = Wal::open(&path).unwrap();
    wal.append(&[inserted(1)]).unwrap();

    // The second commit of the batch fails after the first was buffered.
    wal.fail_appends_after(1);
    let batch: Vec<PendingCommit> = (2..=3)
        .map(|id| (vec![inserted(id)], oneshot::channel().0))
        .collect();
    assert!(flush_batch(&mut wal, &batch).is_err());
    drop(wal);

    assert_eq!(Wal::replay(&path).unwrap(), vec![inserted(1)]);
}

// ── Series ───────────────────────────────────────────────

fn weekly(owner: Owner, n: i64) -> Vec<NewEntry> {
    (0..n)
        .map(|i| candidate(owner.clone(), BASE + i * WEEK_MS, BASE + i * WEEK_MS + H))
        .collect()
}

#[tokio::test]
async fn series_insert_links_entries() {
    let engine = Engine::new(test_wal_path("series.wal")).unwrap();
    let (series, entries) = engine
        .insert_series(RepeatInterval::Weekly, weekly(ada(), 3))
        .await
        .unwrap();
    assert_eq!(series.id, 1);
    assert_eq!(series.repetitions, 3);
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.series_id == Some(series.id)));
    assert_eq!(
        entries.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(engine.get_series(1).await.unwrap().interval, RepeatInterval::Weekly);
}

#[tokio::test]
async fn series_conflict_creates_nothing() {
    let engine = Engine::new(test_wal_path("series_conflict.wal")).unwrap();
    // Occupy the slot of the third occurrence.
    engine
        .insert_entry(candidate(grace(), BASE + 2 * WEEK_MS, BASE + 2 * WEEK_MS + H))
        .await
        .unwrap();

    let err = engine
        .insert_series(RepeatInterval::Weekly, weekly(ada(), 4))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(1)));
    assert_eq!(engine.entry_count().await, 1);
    assert!(engine.get_series(1).await.is_none());

    // Nothing was half-written: the next series still gets id 1.
    let (series, _) = engine
        .insert_series(RepeatInterval::Weekly, weekly(ada(), 2))
        .await
        .unwrap();
    assert_eq!(series.id, 1);
}

#[tokio::test]
async fn series_siblings_may_not_overlap() {
    let engine = Engine::new(test_wal_path("series_self.wal")).unwrap();
    let batch = vec![
        candidate(ada(), BASE, BASE + 3 * H),
        candidate(ada(), BASE + 2 * H, BASE + 4 * H),
    ];
    let err = engine.insert_series(RepeatInterval::Daily, batch).await.unwrap_err();
    assert!(matches!(err, StoreError::BatchOverlap(_, _)));
    assert_eq!(engine.entry_count().await, 0);
}

#[tokio::test]
async fn empty_series_rejected() {
    let engine = Engine::new(test_wal_path("series_empty.wal")).unwrap();
    let err = engine.insert_series(RepeatInterval::Daily, vec![]).await.unwrap_err();
    assert!(matches!(err, StoreError::LimitExceeded(_)));
}

// ── Deletes ──────────────────────────────────────────────

#[tokio::test]
async fn delete_entry_requires_owner_email() {
    let engine = Engine::new(test_wal_path("delete_owner.wal")).unwrap();
    let entry = engine.insert_entry(candidate(ada(), BASE, BASE + H)).await.unwrap();

    let wrong = OwnerScope::Owner("grace@example.com".into());
    assert!(matches!(
        engine.delete_entry(entry.id, &wrong).await,
        Err(StoreError::EntryNotFound(_))
    ));
    assert_eq!(engine.entry_count().await, 1);

    let right = OwnerScope::Owner("ada@example.com".into());
    let removed = engine.delete_entry(entry.id, &right).await.unwrap();
    assert_eq!(removed.id, entry.id);
    assert_eq!(engine.entry_count().await, 0);

    assert!(matches!(
        engine.delete_entry(entry.id, &OwnerScope::Admin).await,
        Err(StoreError::EntryNotFound(_))
    ));
}

#[tokio::test]
async fn blockers_only_deletable_by_admin() {
    let engine = Engine::new(test_wal_path("delete_blocker.wal")).unwrap();
    let entry = engine.insert_entry(blocker(BASE, BASE + H)).await.unwrap();

    let anonymous = OwnerScope::Owner(String::new());
    assert!(engine.delete_entry(entry.id, &anonymous).await.is_err());
    engine.delete_entry(entry.id, &OwnerScope::Admin).await.unwrap();
    assert_eq!(engine.entry_count().await, 0);
}

#[tokio::test]
async fn delete_series_removes_row_when_empty() {
    let engine = Engine::new(test_wal_path("delete_series.wal")).unwrap();
    let (series, _) = engine
        .insert_series(RepeatInterval::Weekly, weekly(ada(), 3))
        .await
        .unwrap();
    engine.insert_entry(candidate(grace(), BASE + H, BASE + 2 * H)).await.unwrap();

    let removed = engine
        .delete_series(series.id, &OwnerScope::Owner("ada@example.com".into()))
        .await
        .unwrap();
    assert_eq!(removed, 3);
    assert_eq!(engine.entry_count().await, 1);
    assert!(engine.get_series(series.id).await.is_none());

    assert!(matches!(
        engine.delete_series(series.id, &OwnerScope::Admin).await,
        Err(StoreError::SeriesNotFound(_))
    ));
}

#[tokio::test]
async fn delete_series_wrong_email_is_not_found() {
    let engine = Engine::new(test_wal_path("delete_series_wrong.wal")).unwrap();
    let (series, _) = engine
        .insert_series(RepeatInterval::Daily, weekly(ada(), 2))
        .await
        .unwrap();
    let err = engine
        .delete_series(series.id, &OwnerScope::Owner("grace@example.com".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::SeriesNotFound(_)));
    assert_eq!(engine.entry_count().await, 2);
}

#[tokio::test]
async fn delete_series_keeps_row_for_foreign_members() {
    let engine = Engine::new(test_wal_path("delete_series_partial.wal")).unwrap();
    let mut batch = weekly(ada(), 2);
    batch.push(candidate(grace(), BASE + 2 * WEEK_MS, BASE + 2 * WEEK_MS + H));
    let (series, _) = engine
        .insert_series(RepeatInterval::Weekly, batch)
        .await
        .unwrap();

    let removed = engine
        .delete_series(series.id, &OwnerScope::Owner("ada@example.com".into()))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(engine.get_series(series.id).await.is_some());

    let removed = engine
        .delete_series(series.id, &OwnerScope::Admin)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(engine.get_series(series.id).await.is_none());
}

// ── Scrub ────────────────────────────────────────────────

#[tokio::test]
async fn scrub_deletes_future_and_redacts_past() {
    let engine = Engine::new(test_wal_path("scrub.wal")).unwrap();
    let now = BASE + 10 * H;
    let past = engine.insert_entry(candidate(ada(), BASE, BASE + H)).await.unwrap();
    let future = engine
        .insert_entry(candidate(ada(), now + H, now + 2 * H))
        .await
        .unwrap();
    let other = engine
        .insert_entry(candidate(grace(), now + 3 * H, now + 4 * H))
        .await
        .unwrap();
    // Same email, different name: not the same person for scrubbing.
    let namesake = engine
        .insert_entry(candidate(
            Owner::new("Ada", "Byron", "ada@example.com"),
            BASE + 2 * H,
            BASE + 3 * H,
        ))
        .await
        .unwrap();

    let report = engine.scrub_user(&ada(), now).await.unwrap();
    assert_eq!(report, ScrubReport { deleted: 1, redacted: 1 });

    assert!(engine.get_entry(future.id).await.is_none());
    let redacted = engine.get_entry(past.id).await.unwrap();
    assert_eq!(redacted.owner, Owner::redacted());
    assert_eq!(redacted.span, past.span);
    assert_eq!(engine.get_entry(other.id).await.unwrap().owner, grace());
    assert_eq!(engine.get_entry(namesake.id).await.unwrap().owner.last_name, "Byron");
}

#[tokio::test]
async fn scrub_without_matches_is_a_no_op() {
    let engine = Engine::new(test_wal_path("scrub_none.wal")).unwrap();
    engine.insert_entry(candidate(grace(), BASE, BASE + H)).await.unwrap();
    let report = engine.scrub_user(&ada(), BASE).await.unwrap();
    assert_eq!(report, ScrubReport { deleted: 0, redacted: 0 });
    assert_eq!(engine.wal_appends_since_compact().await, 1);
}

// ── Listing ──────────────────────────────────────────────

#[tokio::test]
async fn week_listing_window_is_half_open() {
    let engine = Engine::new(test_wal_path("week.wal")).unwrap();
    let ws = BASE;
    let before = engine.insert_entry(candidate(ada(), ws - H, ws)).await.unwrap();
    let first = engine.insert_entry(candidate(ada(), ws, ws + H)).await.unwrap();
    let inside = engine.insert_entry(candidate(ada(), ws + 3 * DAY_MS, ws + 3 * DAY_MS + H)).await.unwrap();
    let last = engine.insert_entry(candidate(ada(), ws + WEEK_MS - H, ws + WEEK_MS)).await.unwrap();
    let after = engine.insert_entry(candidate(ada(), ws + WEEK_MS, ws + WEEK_MS + H)).await.unwrap();

    let ids = |listing: WeekListing| match listing {
        WeekListing::Full(entries) => entries.iter().map(|e| e.id).collect::<Vec<_>>(),
        WeekListing::Redacted(_) => panic!("admin listing must be full"),
    };

    assert_eq!(
        ids(engine.list_for_week(ws, Visibility::Admin).await),
        vec![first.id, inside.id, last.id]
    );

    // Entries straddling either edge of the window are included.
    assert_eq!(
        ids(engine.list_for_week(ws + H / 2, Visibility::Admin).await),
        vec![first.id, inside.id, last.id, after.id]
    );
    assert_eq!(
        ids(engine.list_for_week(ws - H / 2 - WEEK_MS + H, Visibility::Admin).await),
        vec![before.id, first.id]
    );
}

#[tokio::test]
async fn public_listing_is_redacted() {
    let engine = Engine::new(test_wal_path("week_public.wal")).unwrap();
    engine.insert_entry(candidate(ada(), BASE + H, BASE + 2 * H)).await.unwrap();
    engine.insert_entry(blocker(BASE, BASE + H)).await.unwrap();

    let listing = engine.list_for_week(BASE, Visibility::Public).await;
    let WeekListing::Redacted(entries) = listing else {
        panic!("public listing must be redacted");
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].first_name, BLOCKER_NAME);
    assert!(entries[0].is_blocker);
    assert_eq!(entries[1].first_name, "Ada");
}

// ── Persistence ──────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    {
        let engine = Engine::new(path.clone()).unwrap();
        engine.insert_entry(candidate(ada(), BASE, BASE + H)).await.unwrap();
        engine
            .insert_series(RepeatInterval::Daily, weekly(grace(), 2))
            .await
            .unwrap_err(); // overlaps the first entry at BASE
        engine
            .insert_series(RepeatInterval::Weekly, weekly(grace(), 2).into_iter().map(|mut c| {
                c.span = Span::new(c.span.start + 2 * H, c.span.end + 2 * H);
                c
            }).collect())
            .await
            .unwrap();
        engine.scrub_user(&ada(), BASE + 2 * H).await.unwrap();
    }

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.entry_count().await, 3);
    assert_eq!(engine.get_entry(1).await.unwrap().owner, Owner::redacted());
    assert_eq!(engine.get_entry(2).await.unwrap().series_id, Some(1));
    assert!(engine.get_series(1).await.is_some());

    let next = engine
        .insert_entry(candidate(ada(), BASE + 5 * H, BASE + 6 * H))
        .await
        .unwrap();
    assert_eq!(next.id, 4);
}

#[tokio::test]
async fn compaction_keeps_id_watermark() {
    let path = test_wal_path("compact.wal");
    {
        let engine = Engine::new(path.clone()).unwrap();
        for i in 0..3 {
            engine
                .insert_entry(candidate(ada(), BASE + i * H, BASE + (i + 1) * H))
                .await
                .unwrap();
        }
        let (series, _) = engine
            .insert_series(RepeatInterval::Weekly, weekly(grace(), 2).into_iter().map(|mut c| {
                c.span = Span::new(c.span.start + DAY_MS, c.span.end + DAY_MS);
                c
            }).collect())
            .await
            .unwrap();
        // Delete the highest ids so only the watermark remembers them.
        engine.delete_series(series.id, &OwnerScope::Admin).await.unwrap();
        engine.delete_entry(3, &OwnerScope::Admin).await.unwrap();
        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.entry_count().await, 2);
    let entry = engine
        .insert_entry(candidate(ada(), BASE + 10 * H, BASE + 11 * H))
        .await
        .unwrap();
    assert_eq!(entry.id, 6);
    let (series, _) = engine
        .insert_series(RepeatInterval::Daily, vec![candidate(ada(), BASE + 12 * H, BASE + 13 * H)])
        .await
        .unwrap();
    assert_eq!(series.id, 2);
}

#[test]
fn snapshot_starts_with_watermark() {
    let mut cal = CalendarState::new();
    cal.insert_entry(Entry {
        id: 7,
        owner: ada(),
        span: Span::new(BASE, BASE + H),
        is_blocker: false,
        series_id: None,
    });
    cal.next_entry_id = 9;
    let events = snapshot_events(&cal);
    assert!(matches!(
        events[0],
        Event::IdWatermark { next_entry_id: 9, next_series_id: 1 }
    ));
    assert_eq!(events.len(), 2);

    let mut rebuilt = CalendarState::new();
    for e in &events {
        apply_event(&mut rebuilt, e);
    }
    assert_eq!(rebuilt.next_entry_id, 9);
    assert_eq!(rebuilt.entries.len(), 1);
}
