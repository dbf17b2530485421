use std::fmt;

use serde::{Deserialize, Serialize};

use autolot_core::{Checkpoint, RunStatus};

/// Why a run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The upstream said there are no more pages.
    EndOfData,
    /// Too many consecutive empty pages.
    EmptyPages,
    /// Enough of the upstream total was ingested and the upstream went quiet.
    CompletionThreshold,
    /// The page ceiling was reached.
    PageCeiling,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompletionReason::EndOfData => "end of data",
            CompletionReason::EmptyPages => "empty page threshold",
            CompletionReason::CompletionThreshold => "completion threshold",
            CompletionReason::PageCeiling => "page ceiling",
        })
    }
}

/// Why an invocation stopped before the run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    StopRequested,
    PageLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(CompletionReason),
    /// Stopped early; the next invocation resumes where this one left off.
    Suspended(SuspendReason),
    /// Another run owns the stream.
    Skipped { active_run_id: String },
    Failed { error: String },
}

/// Summary of one ingestion invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    /// Records processed by the run across all of its invocations.
    pub total_processed: u64,
    pub last_page: u64,
    pub start_page: u64,
    pub pages_fetched: u64,
    /// Records upserted by this invocation.
    pub records_upserted: u64,
    pub records_skipped: u64,
    pub empty_pages: u64,
}

impl RunReport {
    pub(crate) fn skipped(active: &Checkpoint) -> Self {
        Self {
            run_id: active.run_id.clone(),
            outcome: RunOutcome::Skipped {
                active_run_id: active.run_id.clone(),
            },
            total_processed: active.total_processed,
            last_page: active.last_page,
            start_page: active.resume_page(),
            pages_fetched: 0,
            records_upserted: 0,
            records_skipped: 0,
            empty_pages: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed { .. })
    }

    pub fn status(&self) -> SyncStatus {
        match self.outcome {
            RunOutcome::Completed(_) => SyncStatus::Completed,
            RunOutcome::Suspended(_) | RunOutcome::Skipped { .. } => SyncStatus::Running,
            RunOutcome::Failed { .. } => SyncStatus::Failed,
        }
    }

    pub fn to_response(&self) -> SyncResponse {
        SyncResponse {
            status: self.status(),
            total_processed: self.total_processed,
            last_page: self.last_page,
        }
    }
}

/// Body of an ingestion trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default = "default_resume")]
    pub resume: bool,
    #[serde(default)]
    pub max_pages: Option<u64>,
}

fn default_resume() -> bool {
    true
}

impl Default for SyncRequest {
    fn default() -> Self {
        Self {
            resume: true,
            max_pages: None,
        }
    }
}

/// Run status as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Completed,
    Running,
    Failed,
}

impl From<RunStatus> for SyncStatus {
    /// An idle stream has a resumable run in progress.
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Completed => SyncStatus::Completed,
            RunStatus::Idle | RunStatus::Running => SyncStatus::Running,
            RunStatus::Failed => SyncStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub status: SyncStatus,
    pub total_processed: u64,
    pub last_page: u64,
}

impl SyncResponse {
    pub fn from_checkpoint(checkpoint: Option<&Checkpoint>) -> Self {
        match checkpoint {
            Some(cp) => Self {
                status: cp.status.into(),
                total_processed: cp.total_processed,
                last_page: cp.last_page,
            },
            // Nothing has ever run, so nothing is pending.
            None => Self {
                status: SyncStatus::Completed,
                total_processed: 0,
                last_page: 0,
            },
        }
    }
}
