//! The ingestion loop.
//!
//! One invocation claims the stream, resumes from (or replaces) its
//! checkpoint, then walks the upstream page by page: fetch, upsert, persist.
//! Every checkpoint write is a compare-and-set against the version this run
//! last wrote, so a run that has been taken over stops instead of racing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use autolot_core::{
    claim_decision, resumable, BatchConfig, Batcher, Checkpoint, ClaimDecision, Record, RunStatus,
};
use autolot_source::{FetchError, PagedSource, SourcePage};
use autolot_store::{CheckpointStore, RecordStore};

use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::report::{
    CompletionReason, RunOutcome, RunReport, SuspendReason, SyncRequest, SyncResponse,
};

/// Live progress of a run, readable while it is paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunProgress {
    pub run_id: String,
    pub last_page: u64,
    pub total_processed: u64,
}

/// Shared between a running invocation and whoever started it.
#[derive(Debug, Default)]
pub struct RunControl {
    stop: AtomicBool,
    progress: Mutex<Option<RunProgress>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop at the next page boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> Option<RunProgress> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, checkpoint: &Checkpoint) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = Some(RunProgress {
            run_id: checkpoint.run_id.clone(),
            last_page: checkpoint.last_page,
            total_processed: checkpoint.total_processed,
        });
    }
}

/// How the paging loop ended.
enum LoopExit {
    Completed(CompletionReason),
    Suspended(SuspendReason),
    Failed(IngestError),
}

/// Counters for one invocation.
#[derive(Default)]
struct Tally {
    pages_fetched: u64,
    records_upserted: u64,
    records_skipped: u64,
    empty_pages: u64,
}

/// Pulls a paged source into a record store.
pub struct Ingestor<S, R, C> {
    source: S,
    records: R,
    checkpoints: C,
    config: IngestConfig,
}

impl<S, R, C> Ingestor<S, R, C>
where
    S: PagedSource,
    R: RecordStore,
    C: CheckpointStore,
{
    pub fn new(source: S, records: R, checkpoints: C, config: IngestConfig) -> Self {
        Self {
            source,
            records,
            checkpoints,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// The persisted state of the stream in wire form.
    pub async fn status(&self) -> SyncResponse {
        let checkpoint = self.checkpoints.load(&self.config.stream).await;
        SyncResponse::from_checkpoint(checkpoint.as_ref())
    }

    /// Run one invocation to its end.
    pub async fn run(&self, request: SyncRequest) -> RunReport {
        self.run_controlled(request, &RunControl::new()).await
    }

    /// Run one invocation, honouring stop requests made through `control`.
    pub async fn run_controlled(&self, request: SyncRequest, control: &RunControl) -> RunReport {
        let stream = self.config.stream.as_str();
        let now = Utc::now();
        info!(
            stream,
            resume = request.resume,
            max_pages = ?request.max_pages,
            state = "Starting",
            "Starting ingestion run"
        );

        let versioned = match self.checkpoints.load_versioned(stream).await {
            Ok(versioned) => versioned,
            Err(e) => {
                error!(stream, error = %e, "Could not read sync state");
                return unclaimed_failure(e.to_string());
            }
        };
        let existing = versioned.checkpoint.as_ref();

        match claim_decision(existing, now, self.config.stale_run_after) {
            ClaimDecision::Proceed => {}
            ClaimDecision::Skip {
                active_run_id,
                idle_for,
            } => {
                info!(
                    stream,
                    active_run_id = %active_run_id,
                    idle_secs = idle_for.as_secs(),
                    "Another run is active, skipping"
                );
                return match existing {
                    Some(active) => RunReport::skipped(active),
                    None => unclaimed_failure("active run without state".into()),
                };
            }
            ClaimDecision::TakeOver {
                stale_run_id,
                idle_for,
            } => {
                warn!(
                    stream,
                    stale_run_id = %stale_run_id,
                    idle_secs = idle_for.as_secs(),
                    "Taking over stale run"
                );
            }
        }

        let mut checkpoint = match resumable(
            existing,
            request.resume,
            now,
            self.config.freshness_window,
        ) {
            Some(previous) => {
                let mut checkpoint = previous.clone();
                checkpoint.status = RunStatus::Running;
                checkpoint.last_error = None;
                checkpoint.touch(now);
                info!(
                    run_id = %checkpoint.run_id,
                    last_page = checkpoint.last_page,
                    next_page = checkpoint.resume_page(),
                    empty_streak = checkpoint.empty_streak,
                    total_processed = checkpoint.total_processed,
                    "Resuming from checkpoint"
                );
                checkpoint
            }
            None => {
                if let Some(previous) = existing {
                    info!(
                        previous_run_id = %previous.run_id,
                        previous_status = %previous.status,
                        "Not resuming previous checkpoint, starting fresh"
                    );
                }
                Checkpoint::start(now)
            }
        };

        let mut version = match self
            .checkpoints
            .compare_and_set(stream, versioned.version, &checkpoint)
            .await
        {
            Ok(Some(version)) => version,
            Ok(None) => {
                info!(stream, "Lost the claim to a concurrent run, skipping");
                let active = self.checkpoints.load(stream).await;
                return match active {
                    Some(active) => RunReport::skipped(&active),
                    None => unclaimed_failure("claim lost".into()),
                };
            }
            Err(e) => {
                error!(stream, error = %e, "Could not claim stream");
                return unclaimed_failure(e.to_string());
            }
        };
        control.publish(&checkpoint);

        let start_page = checkpoint.resume_page();
        let mut tally = Tally::default();
        let exit = self
            .page_loop(
                &request,
                control,
                &mut checkpoint,
                &mut version,
                start_page,
                &mut tally,
            )
            .await;

        let outcome = self.finish(exit, &mut checkpoint, &mut version).await;
        control.publish(&checkpoint);

        RunReport {
            run_id: checkpoint.run_id.clone(),
            outcome,
            total_processed: checkpoint.total_processed,
            last_page: checkpoint.last_page,
            start_page,
            pages_fetched: tally.pages_fetched,
            records_upserted: tally.records_upserted,
            records_skipped: tally.records_skipped,
            empty_pages: tally.empty_pages,
        }
    }

    async fn page_loop(
        &self,
        request: &SyncRequest,
        control: &RunControl,
        checkpoint: &mut Checkpoint,
        version: &mut i64,
        start_page: u64,
        tally: &mut Tally,
    ) -> LoopExit {
        let ceiling = self.config.page_ceiling(start_page);
        let mut page = start_page;
        let mut fetch_failures: u32 = 0;

        info!(
            run_id = %checkpoint.run_id,
            start_page,
            ceiling,
            empty_streak = checkpoint.empty_streak,
            state = "Paging",
            "Paging upstream"
        );

        loop {
            if control.stop_requested() {
                info!(run_id = %checkpoint.run_id, page, "Stop requested");
                return LoopExit::Suspended(SuspendReason::StopRequested);
            }
            if request.max_pages.is_some_and(|max| tally.pages_fetched >= max) {
                info!(run_id = %checkpoint.run_id, page, "Page limit reached");
                return LoopExit::Suspended(SuspendReason::PageLimit);
            }

            let fetched: SourcePage = match self.fetch(page).await {
                Ok(fetched) => {
                    fetch_failures = 0;
                    fetched
                }
                Err(e) => {
                    fetch_failures += 1;
                    if !e.is_retryable() || fetch_failures > self.config.max_fetch_retries {
                        return LoopExit::Failed(e.into());
                    }
                    let delay = self.config.retry_delay(fetch_failures);
                    warn!(
                        run_id = %checkpoint.run_id,
                        page,
                        attempt = fetch_failures,
                        max_retries = self.config.max_fetch_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        state = "Paused",
                        "Fetch failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            tally.pages_fetched += 1;
            tally.records_skipped += fetched.skipped as u64;
            if fetched.known_total.is_some() {
                checkpoint.known_total = fetched.known_total;
            }

            if fetched.is_empty() {
                tally.empty_pages += 1;
                checkpoint.record_empty(page, Utc::now());
                debug!(page, empty_streak = checkpoint.empty_streak, "Empty page");
            } else {
                let written = match self.upsert_page(fetched.records).await {
                    Ok(written) => written,
                    Err(e) => return LoopExit::Failed(e),
                };
                tally.records_upserted += written;
                checkpoint.record_page(page, written, Utc::now());
                debug!(
                    page,
                    written,
                    total_processed = checkpoint.total_processed,
                    "Page committed"
                );
            }

            if let Err(e) = self.persist(checkpoint, version).await {
                return LoopExit::Failed(e);
            }
            control.publish(checkpoint);

            if !fetched.has_more {
                return LoopExit::Completed(CompletionReason::EndOfData);
            }
            if checkpoint.empty_streak >= self.config.empty_page_threshold {
                return LoopExit::Completed(CompletionReason::EmptyPages);
            }
            if checkpoint.empty_streak > 0 && self.reached_completion_threshold(checkpoint) {
                return LoopExit::Completed(CompletionReason::CompletionThreshold);
            }
            if page + 1 > ceiling {
                warn!(run_id = %checkpoint.run_id, page, ceiling, "Page ceiling reached");
                return LoopExit::Completed(CompletionReason::PageCeiling);
            }
            page += 1;
        }
    }

    async fn fetch(&self, page: u64) -> Result<SourcePage, FetchError> {
        match tokio::time::timeout(self.config.fetch_timeout, self.source.fetch_page(page)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }

    /// Whether the ingested share of the upstream total allows stopping.
    fn reached_completion_threshold(&self, checkpoint: &Checkpoint) -> bool {
        let (Some(threshold), Some(total)) =
            (self.config.completion_threshold, checkpoint.known_total)
        else {
            return false;
        };
        if total == 0 {
            return false;
        }

        let ratio = checkpoint.total_processed as f64 / total as f64;
        if ratio < threshold {
            return false;
        }

        warn!(
            run_id = %checkpoint.run_id,
            total_processed = checkpoint.total_processed,
            known_total = total,
            ratio,
            threshold,
            "Completing on share of upstream total instead of natural completion"
        );
        true
    }

    /// Upsert a page in batches. Each batch is retried once.
    ///
    /// Returns the summed batch sizes. Repeated ids within a batch count once
    /// per occurrence even though the store keeps a single row.
    async fn upsert_page(&self, records: Vec<Record>) -> IngestResult<u64> {
        let config = BatchConfig::with_max_rows(self.config.upsert_batch_size);
        let mut written = 0;

        for batch in Batcher::split(config, records) {
            let rows = batch.len();
            let distinct = match self.records.upsert(batch.records.clone()).await {
                Ok(distinct) => distinct,
                Err(e) => {
                    warn!(rows, error = %e, "Upsert failed, retrying once");
                    tokio::time::sleep(self.config.retry_base_delay).await;
                    self.records.upsert(batch.records).await?
                }
            };
            if distinct < rows {
                debug!(rows, distinct, "Batch carried repeated ids");
            }
            written += rows as u64;
        }

        Ok(written)
    }

    /// Write the checkpoint if this run still owns the stream. A store error
    /// is retried once; losing the compare-and-set is final.
    async fn persist(&self, checkpoint: &Checkpoint, version: &mut i64) -> IngestResult<()> {
        let stream = self.config.stream.as_str();
        let mut retried = false;

        loop {
            match self
                .checkpoints
                .compare_and_set(stream, Some(*version), checkpoint)
                .await
            {
                Ok(Some(next)) => {
                    *version = next;
                    return Ok(());
                }
                Ok(None) => {
                    return Err(IngestError::LeaseLost {
                        stream: stream.to_string(),
                    })
                }
                Err(e) if !retried => {
                    warn!(stream, error = %e, "Checkpoint write failed, retrying once");
                    retried = true;
                    tokio::time::sleep(self.config.retry_base_delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Record the terminal state of this invocation.
    async fn finish(
        &self,
        exit: LoopExit,
        checkpoint: &mut Checkpoint,
        version: &mut i64,
    ) -> RunOutcome {
        let run_id = checkpoint.run_id.clone();

        let (status, outcome) = match exit {
            LoopExit::Completed(reason) => (RunStatus::Completed, RunOutcome::Completed(reason)),
            LoopExit::Suspended(reason) => (RunStatus::Idle, RunOutcome::Suspended(reason)),
            LoopExit::Failed(IngestError::LeaseLost { stream }) => {
                error!(run_id = %run_id, stream = %stream, state = "Failed", "Run was taken over");
                return RunOutcome::Failed {
                    error: format!("another run took over stream '{}'", stream),
                };
            }
            LoopExit::Failed(e) => {
                checkpoint.last_error = Some(e.to_string());
                (
                    RunStatus::Failed,
                    RunOutcome::Failed {
                        error: e.to_string(),
                    },
                )
            }
        };

        checkpoint.status = status;
        checkpoint.touch(Utc::now());
        if let Err(e) = self.persist(checkpoint, version).await {
            error!(run_id = %run_id, error = %e, "Could not record final run status");
            if !matches!(outcome, RunOutcome::Failed { .. }) {
                return RunOutcome::Failed {
                    error: e.to_string(),
                };
            }
        }

        match &outcome {
            RunOutcome::Completed(reason) => info!(
                run_id = %run_id,
                reason = %reason,
                total_processed = checkpoint.total_processed,
                last_page = checkpoint.last_page,
                state = "Completed",
                "Ingestion run completed"
            ),
            RunOutcome::Suspended(reason) => info!(
                run_id = %run_id,
                reason = ?reason,
                last_page = checkpoint.last_page,
                "Ingestion run suspended"
            ),
            RunOutcome::Failed { error } => error!(
                run_id = %run_id,
                error = %error,
                last_page = checkpoint.last_page,
                state = "Failed",
                "Ingestion run failed"
            ),
            RunOutcome::Skipped { .. } => {}
        }

        outcome
    }
}

/// A failure before the run owned any state.
fn unclaimed_failure(error: String) -> RunReport {
    RunReport {
        run_id: String::new(),
        outcome: RunOutcome::Failed { error },
        total_processed: 0,
        last_page: 0,
        start_page: 0,
        pages_fetched: 0,
        records_upserted: 0,
        records_skipped: 0,
        empty_pages: 0,
    }
}
