use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use autolot_core::{Checkpoint, Record, RunStatus};
use autolot_ingest::{
    CompletionReason, IngestConfig, Ingestor, RunControl, RunOutcome, SuspendReason, SyncRequest,
    SyncStatus,
};
use autolot_source::{FetchError, MockResponse, MockSource, SourcePage};
use autolot_store::{CheckpointStore, MemoryCheckpointStore, MemoryRecordStore};

const STREAM: &str = "listings";

struct Harness {
    source: MockSource,
    records: MemoryRecordStore,
    checkpoints: MemoryCheckpointStore,
    ingestor: Ingestor<MockSource, MemoryRecordStore, MemoryCheckpointStore>,
}

fn harness(source: MockSource, config: IngestConfig) -> Harness {
    let records = MemoryRecordStore::new();
    let checkpoints = MemoryCheckpointStore::new();
    let ingestor = Ingestor::new(
        source.clone(),
        records.clone(),
        checkpoints.clone(),
        config,
    );
    Harness {
        source,
        records,
        checkpoints,
        ingestor,
    }
}

fn config() -> IngestConfig {
    IngestConfig {
        retry_base_delay: Duration::from_millis(100),
        ..IngestConfig::default()
    }
}

fn records(prefix: &str, n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record::new(format!("{}-{}", prefix, i)).with_price(i as f64))
        .collect()
}

fn checkpoint(
    last_page: u64,
    total_processed: u64,
    age: chrono::Duration,
    status: RunStatus,
) -> Checkpoint {
    let mut cp = Checkpoint::start(Utc::now() - age);
    cp.last_page = last_page;
    cp.total_processed = total_processed;
    cp.status = status;
    cp
}

fn resume() -> SyncRequest {
    SyncRequest::default()
}

#[tokio::test]
async fn test_resume_far_into_the_catalog() {
    let source = MockSource::new();
    source
        .page(109_000, records("a", 200))
        .push(
            109_001,
            MockResponse::Page(SourcePage::with_records(records("b", 50)).last()),
        );
    let h = harness(source, config());

    let previous = checkpoint(108_999, 21_799_800, chrono::Duration::hours(1), RunStatus::Idle);
    h.checkpoints.save(STREAM, &previous).await.unwrap();

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls(), vec![109_000, 109_001]);
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
    assert_eq!(report.run_id, previous.run_id);
    assert_eq!(report.start_page, 109_000);
    assert_eq!(report.total_processed, 21_799_800 + 250);

    let saved = h.checkpoints.get(STREAM).unwrap();
    assert_eq!(saved.status, RunStatus::Completed);
    assert_eq!(saved.last_page, 109_001);
    assert_eq!(saved.total_processed, 21_799_800 + 250);
    assert_eq!(saved.start_time, previous.start_time);
}

#[tokio::test]
async fn test_ceiling_never_blocks_the_resume_page() {
    let source = MockSource::new();
    source.set_fallback(MockResponse::Page(SourcePage::with_records(records("x", 1))));
    let h = harness(
        source,
        IngestConfig {
            page_floor: 2000,
            page_lookahead: 0,
            ..config()
        },
    );
    h.checkpoints
        .save(
            STREAM,
            &checkpoint(108_999, 10, chrono::Duration::hours(1), RunStatus::Idle),
        )
        .await
        .unwrap();

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls(), vec![109_000]);
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::PageCeiling));
    assert_eq!(report.last_page, 109_000);
}

#[tokio::test]
async fn test_stale_checkpoint_restarts_from_page_one() {
    let h = harness(MockSource::from_records(records("r", 3), 2), config());
    let stale = checkpoint(500, 100_000, chrono::Duration::hours(25), RunStatus::Idle);
    h.checkpoints.save(STREAM, &stale).await.unwrap();

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls(), vec![1, 2]);
    assert_ne!(report.run_id, stale.run_id);
    assert_eq!(report.total_processed, 3);
    assert_eq!(h.checkpoints.get(STREAM).unwrap().total_processed, 3);
}

#[tokio::test]
async fn test_malformed_checkpoint_starts_fresh() {
    let h = harness(MockSource::from_records(records("r", 3), 2), config());
    h.checkpoints.put_raw(STREAM, "{\"lastPage\": oops");

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls()[0], 1);
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
    let saved = h.checkpoints.get(STREAM).unwrap();
    assert_eq!(saved.last_page, 2);
    assert_eq!(saved.total_processed, 3);
}

#[tokio::test]
async fn test_fresh_request_ignores_checkpoint() {
    let h = harness(MockSource::from_records(records("r", 3), 2), config());
    h.checkpoints
        .save(
            STREAM,
            &checkpoint(40, 8000, chrono::Duration::minutes(10), RunStatus::Idle),
        )
        .await
        .unwrap();

    let report = h
        .ingestor
        .run(SyncRequest {
            resume: false,
            max_pages: None,
        })
        .await;

    assert_eq!(h.source.calls()[0], 1);
    assert_eq!(report.total_processed, 3);
}

#[tokio::test]
async fn test_completed_run_is_not_resumed() {
    let h = harness(MockSource::from_records(records("r", 3), 2), config());
    let done = checkpoint(2, 3, chrono::Duration::minutes(10), RunStatus::Completed);
    h.checkpoints.save(STREAM, &done).await.unwrap();

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls()[0], 1);
    assert_ne!(report.run_id, done.run_id);
    assert_eq!(report.total_processed, 3);
}

#[tokio::test]
async fn test_empty_pages_below_threshold_keep_going() {
    let source = MockSource::new();
    source.page(1, records("a", 5));
    for page in 2..=11 {
        source.empty(page);
    }
    source.page(12, records("b", 5));
    source.set_fallback(MockResponse::Page(SourcePage::empty()));
    let h = harness(source, config());

    let report = h.ingestor.run(resume()).await;

    // Ten empties did not end the run; twenty in a row after page 12 did.
    let calls = h.source.calls();
    assert!(calls.contains(&12));
    assert_eq!(calls.len(), 32);
    assert_eq!(calls.last(), Some(&32));
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EmptyPages));
    assert_eq!(report.empty_pages, 30);

    // Empty pages move the cursor but not the last committed page.
    let saved = h.checkpoints.get(STREAM).unwrap();
    assert_eq!(saved.last_page, 12);
    assert_eq!(saved.resume_page(), 33);
    assert_eq!(saved.empty_streak, 20);
    assert_eq!(saved.total_processed, 10);
}

#[tokio::test]
async fn test_end_of_data_beats_empty_threshold() {
    let source = MockSource::new();
    source.page(1, records("a", 5));
    // Unscripted pages are empty and final.
    let h = harness(source, config());

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls(), vec![1, 2]);
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_errors_are_retried_with_backoff() {
    let source = MockSource::new();
    source
        .page(1, records("a", 3))
        .error(2, FetchError::Transport("connection reset".into()))
        .error(2, FetchError::Transport("connection reset".into()))
        .push(
            2,
            MockResponse::Page(SourcePage::with_records(records("b", 2)).last()),
        );
    let h = harness(source, config());

    let started = tokio::time::Instant::now();
    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls(), vec![1, 2, 2, 2]);
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
    assert_eq!(report.total_processed, 5);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_and_preserve_checkpoint() {
    let source = MockSource::new();
    source.page(1, records("a", 3));
    for _ in 0..4 {
        source.error(2, FetchError::Status {
            status: 503,
            message: "unavailable".into(),
        });
    }
    source.push(
        2,
        MockResponse::Page(SourcePage::with_records(records("b", 2)).last()),
    );
    let h = harness(source, config());

    let failed = h.ingestor.run(resume()).await;

    assert!(failed.is_failed());
    assert_eq!(failed.to_response().status, SyncStatus::Failed);
    assert_eq!(h.source.calls(), vec![1, 2, 2, 2, 2]);
    let saved = h.checkpoints.get(STREAM).unwrap();
    assert_eq!(saved.status, RunStatus::Failed);
    assert_eq!(saved.last_page, 1);
    assert_eq!(saved.total_processed, 3);
    assert!(saved.last_error.unwrap().contains("503"));

    // A later run picks up where the failed one stopped.
    let resumed = h.ingestor.run(resume()).await;
    assert_eq!(resumed.run_id, failed.run_id);
    assert_eq!(resumed.start_page, 2);
    assert_eq!(resumed.total_processed, 5);
    assert_eq!(resumed.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_fetch_error_fails_immediately() {
    let source = MockSource::new();
    source.page(1, records("a", 3)).error(
        2,
        FetchError::Status {
            status: 404,
            message: "not found".into(),
        },
    );
    let h = harness(source, config());

    let report = h.ingestor.run(resume()).await;

    assert!(report.is_failed());
    assert_eq!(h.source.calls(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_is_retried() {
    let source = MockSource::new();
    source
        .push(
            1,
            MockResponse::Delayed(
                Duration::from_secs(120),
                Box::new(MockResponse::Page(SourcePage::end())),
            ),
        )
        .push(
            1,
            MockResponse::Page(SourcePage::with_records(records("a", 2)).last()),
        );
    let h = harness(
        source,
        IngestConfig {
            fetch_timeout: Duration::from_secs(5),
            ..config()
        },
    );

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls(), vec![1, 1]);
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
    assert_eq!(report.total_processed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_upsert_is_retried_once() {
    let source = MockSource::from_records(records("r", 4), 4);
    let h = harness(source, config());
    h.records.fail_next_upserts(1);

    let report = h.ingestor.run(resume()).await;

    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
    assert_eq!(h.records.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_upsert_failure_fails_run() {
    let source = MockSource::new();
    source.page(1, records("a", 3)).page(2, records("b", 3));
    let h = harness(source, config());

    // Let page 1 through, then break the store.
    let report = h
        .ingestor
        .run(SyncRequest {
            resume: true,
            max_pages: Some(1),
        })
        .await;
    assert_eq!(report.outcome, RunOutcome::Suspended(SuspendReason::PageLimit));

    h.records.fail_next_upserts(2);
    let report = h.ingestor.run(resume()).await;

    assert!(report.is_failed());
    let saved = h.checkpoints.get(STREAM).unwrap();
    assert_eq!(saved.status, RunStatus::Failed);
    assert_eq!(saved.last_page, 1);
    assert_eq!(saved.total_processed, 3);
    assert!(h.records.get("b-0").is_none());
}

#[tokio::test]
async fn test_pages_are_split_into_upsert_batches() {
    let source = MockSource::from_records(records("r", 250), 250);
    let h = harness(
        source,
        IngestConfig {
            upsert_batch_size: 100,
            ..config()
        },
    );

    h.ingestor.run(resume()).await;

    assert_eq!(h.records.upsert_calls(), vec![100, 100, 50]);
}

#[tokio::test]
async fn test_total_reconciles_across_invocations() {
    let all = records("r", 1000);
    let h = harness(MockSource::from_records(all, 100), config());

    let first = h
        .ingestor
        .run(SyncRequest {
            resume: true,
            max_pages: Some(4),
        })
        .await;
    assert_eq!(first.outcome, RunOutcome::Suspended(SuspendReason::PageLimit));
    assert_eq!(first.total_processed, 400);
    assert_eq!(first.to_response().status, SyncStatus::Running);
    assert_eq!(h.checkpoints.get(STREAM).unwrap().status, RunStatus::Idle);

    let second = h.ingestor.run(resume()).await;
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.start_page, 5);
    assert_eq!(second.records_upserted, 600);
    assert_eq!(second.total_processed, 400 + 600);
    assert_eq!(
        second.total_processed,
        h.records.upsert_calls().iter().sum::<usize>() as u64
    );
    assert_eq!(h.records.len(), 1000);
}

#[tokio::test]
async fn test_active_run_is_not_raced() {
    let h = harness(MockSource::from_records(records("r", 3), 2), config());
    let active = checkpoint(7, 1400, chrono::Duration::seconds(30), RunStatus::Running);
    h.checkpoints.save(STREAM, &active).await.unwrap();

    let report = h.ingestor.run(resume()).await;

    assert_eq!(
        report.outcome,
        RunOutcome::Skipped {
            active_run_id: active.run_id.clone()
        }
    );
    assert_eq!(report.to_response().status, SyncStatus::Running);
    assert!(h.source.calls().is_empty());
    assert_eq!(h.checkpoints.get(STREAM), Some(active));
}

#[tokio::test]
async fn test_stale_running_state_is_taken_over() {
    let source = MockSource::new();
    source.push(
        3,
        MockResponse::Page(SourcePage::with_records(records("c", 10)).last()),
    );
    let h = harness(source, config());
    let crashed = checkpoint(2, 400, chrono::Duration::minutes(5), RunStatus::Running);
    h.checkpoints.save(STREAM, &crashed).await.unwrap();

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls(), vec![3]);
    assert_eq!(report.run_id, crashed.run_id);
    assert_eq!(report.total_processed, 410);
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_when_taken_over() {
    let source = MockSource::new();
    source.set_fallback(MockResponse::Delayed(
        Duration::from_secs(1),
        Box::new(MockResponse::Page(SourcePage::with_records(records("x", 1)))),
    ));
    let h = Arc::new(harness(source, config()));

    let runner = h.clone();
    let task = tokio::spawn(async move { runner.ingestor.run(resume()).await });
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // Another process writes the state behind this run's back.
    let usurper = checkpoint(99, 99, chrono::Duration::zero(), RunStatus::Running);
    h.checkpoints.save(STREAM, &usurper).await.unwrap();

    let report = task.await.unwrap();
    assert!(report.is_failed());
    assert_eq!(h.checkpoints.get(STREAM), Some(usurper));
}

#[tokio::test]
async fn test_completion_threshold_override() {
    let source = MockSource::new();
    source.push(
        1,
        MockResponse::Page(SourcePage::with_records(records("a", 96)).with_known_total(100)),
    );
    source.set_fallback(MockResponse::Page(SourcePage::empty()));
    let h = harness(
        source,
        IngestConfig {
            completion_threshold: Some(0.95),
            ..config()
        },
    );

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls(), vec![1, 2]);
    assert_eq!(
        report.outcome,
        RunOutcome::Completed(CompletionReason::CompletionThreshold)
    );
    assert_eq!(h.checkpoints.get(STREAM).unwrap().known_total, Some(100));
}

#[tokio::test]
async fn test_completion_threshold_needs_an_empty_page() {
    let source = MockSource::new();
    source
        .push(
            1,
            MockResponse::Page(SourcePage::with_records(records("a", 96)).with_known_total(100)),
        )
        .push(
            2,
            MockResponse::Page(SourcePage::with_records(records("b", 4)).with_known_total(100)),
        )
        .push(
            3,
            MockResponse::Page(SourcePage::with_records(records("c", 3)).last()),
        );
    let h = harness(
        source,
        IngestConfig {
            completion_threshold: Some(0.95),
            ..config()
        },
    );

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls(), vec![1, 2, 3]);
    assert_eq!(report.total_processed, 103);
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
}

#[tokio::test]
async fn test_without_threshold_empty_pages_decide() {
    let source = MockSource::new();
    source.push(
        1,
        MockResponse::Page(SourcePage::with_records(records("a", 96)).with_known_total(100)),
    );
    source.set_fallback(MockResponse::Page(SourcePage::empty()));
    let h = harness(source, config());

    let report = h.ingestor.run(resume()).await;

    assert_eq!(h.source.calls().len(), 21);
    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EmptyPages));
}

#[tokio::test]
async fn test_status_reflects_persisted_state() {
    let h = harness(MockSource::from_records(records("r", 3), 2), config());
    assert_eq!(h.ingestor.status().await.status, SyncStatus::Completed);
    assert_eq!(h.ingestor.status().await.total_processed, 0);

    h.ingestor
        .run(SyncRequest {
            resume: true,
            max_pages: Some(1),
        })
        .await;
    let status = h.ingestor.status().await;
    assert_eq!(status.status, SyncStatus::Running);
    assert_eq!(status.last_page, 1);
    assert_eq!(status.total_processed, 2);
}

fn bounded(max_pages: u64) -> SyncRequest {
    SyncRequest {
        resume: true,
        max_pages: Some(max_pages),
    }
}

#[tokio::test]
async fn test_bounded_invocations_cross_an_empty_stretch() {
    let source = MockSource::new();
    source.page(1, records("a", 5));
    source.set_fallback(MockResponse::Page(SourcePage::empty()));
    let h = harness(source, config());

    let mut reports = Vec::new();
    for _ in 0..10 {
        let report = h.ingestor.run(bounded(5)).await;
        let done = matches!(report.outcome, RunOutcome::Completed(_));
        reports.push(report);
        if done {
            break;
        }
    }

    let starts: Vec<u64> = reports.iter().map(|r| r.start_page).collect();
    assert_eq!(starts, vec![1, 6, 11, 16, 21]);
    for report in &reports[..4] {
        assert_eq!(report.outcome, RunOutcome::Suspended(SuspendReason::PageLimit));
        assert_eq!(report.run_id, reports[0].run_id);
    }
    let last = &reports[4];
    assert_eq!(last.outcome, RunOutcome::Completed(CompletionReason::EmptyPages));
    assert_eq!(last.run_id, reports[0].run_id);
    assert_eq!(last.pages_fetched, 1);

    // Every page fetched exactly once across the invocations.
    assert_eq!(h.source.calls(), (1..=21).collect::<Vec<u64>>());

    let saved = h.checkpoints.get(STREAM).unwrap();
    assert_eq!(saved.status, RunStatus::Completed);
    assert_eq!(saved.last_page, 1);
    assert_eq!(saved.total_processed, 5);
    assert_eq!(saved.empty_streak, 20);
}

#[tokio::test]
async fn test_stop_keeps_the_empty_streak() {
    let source = MockSource::new();
    source.page(1, records("a", 5));
    source.set_fallback(MockResponse::Page(SourcePage::empty()));
    let h = harness(
        source,
        IngestConfig {
            empty_page_threshold: 5,
            ..config()
        },
    );

    let first = h.ingestor.run(bounded(3)).await;
    assert_eq!(first.outcome, RunOutcome::Suspended(SuspendReason::PageLimit));

    let control = RunControl::new();
    control.request_stop();
    let stopped = h.ingestor.run_controlled(resume(), &control).await;
    assert_eq!(stopped.outcome, RunOutcome::Suspended(SuspendReason::StopRequested));
    assert_eq!(stopped.pages_fetched, 0);
    assert_eq!(stopped.start_page, 4);

    let saved = h.checkpoints.get(STREAM).unwrap();
    assert_eq!(saved.status, RunStatus::Idle);
    assert_eq!(saved.resume_page(), 4);
    assert_eq!(saved.empty_streak, 2);

    // Two empties carried over plus three more reach the threshold.
    let last = h.ingestor.run(resume()).await;
    assert_eq!(last.outcome, RunOutcome::Completed(CompletionReason::EmptyPages));
    assert_eq!(last.start_page, 4);
    assert_eq!(h.source.calls(), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(last.run_id, first.run_id);
}

#[tokio::test]
async fn test_repeated_ids_count_per_occurrence() {
    let source = MockSource::new();
    source.push(
        1,
        MockResponse::Page(
            SourcePage::with_records(vec![
                Record::new("dup").with_price(1.0),
                Record::new("dup").with_price(2.0),
                Record::new("solo").with_price(3.0),
            ])
            .last(),
        ),
    );
    let h = harness(source, config());

    let report = h.ingestor.run(resume()).await;

    assert_eq!(report.outcome, RunOutcome::Completed(CompletionReason::EndOfData));
    assert_eq!(report.total_processed, 3);
    assert_eq!(h.checkpoints.get(STREAM).unwrap().total_processed, 3);
    assert_eq!(h.records.len(), 2);
}
