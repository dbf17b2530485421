//! Resumable ingestion progress.
//!
//! A checkpoint is the single durable record of one ingestion stream. It is
//! overwritten after every page and doubles as the run-status flag that keeps
//! two ingestion runs from overlapping.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle status of an ingestion stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub run_id: String,
    /// Last page whose records were committed (0 = none yet).
    pub last_page: u64,
    /// First page the next invocation fetches. Runs ahead of `last_page`
    /// across a stretch of empty pages.
    #[serde(default)]
    pub next_page: u64,
    /// Consecutive empty pages immediately before `next_page`.
    #[serde(default)]
    pub empty_streak: u32,
    /// Records upserted by this run, across all of its invocations.
    pub total_processed: u64,
    pub start_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    #[serde(default)]
    pub status: RunStatus,
    /// Upstream total as last reported by the source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Checkpoint {
    /// A brand new run that has not processed anything.
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            last_page: 0,
            next_page: 1,
            empty_streak: 0,
            total_processed: 0,
            start_time: now,
            last_update_time: now,
            status: RunStatus::Running,
            known_total: None,
            last_error: None,
        }
    }

    /// Time since the last update. A timestamp in the future counts as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_update_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// True iff the checkpoint was updated less than `max_age` ago.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) < max_age
    }

    /// Page an invocation resuming this checkpoint starts at. States that
    /// predate `next_page` resume after `last_page`.
    pub fn resume_page(&self) -> u64 {
        self.next_page.max(self.last_page + 1)
    }

    /// Record a committed page.
    pub fn record_page(&mut self, page: u64, processed: u64, now: DateTime<Utc>) {
        self.last_page = page;
        self.next_page = page + 1;
        self.empty_streak = 0;
        self.total_processed += processed;
        self.last_update_time = now;
    }

    /// Record a page that came back empty: move past it and extend the streak.
    pub fn record_empty(&mut self, page: u64, now: DateTime<Utc>) {
        self.next_page = page + 1;
        self.empty_streak = self.empty_streak.saturating_add(1);
        self.last_update_time = now;
    }

    /// Move the resume point back to just after `last_page`.
    pub fn rewind(&mut self, last_page: u64, total_processed: u64) {
        self.last_page = last_page;
        self.next_page = last_page + 1;
        self.empty_streak = 0;
        self.total_processed = total_processed;
    }

    /// Refresh the activity timestamp without moving the resume point.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_update_time = now;
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// What a new invocation should do given the persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Nothing is running; start or resume.
    Proceed,
    /// A run is marked running but has been silent for longer than the
    /// staleness timeout; treat it as failed and take over.
    TakeOver { stale_run_id: String, idle_for: Duration },
    /// Another run is active; do not race it.
    Skip { active_run_id: String, idle_for: Duration },
}

/// Decide whether a new invocation may claim the stream.
pub fn claim_decision(
    existing: Option<&Checkpoint>,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> ClaimDecision {
    match existing {
        Some(cp) if cp.status == RunStatus::Running => {
            let idle_for = cp.age(now);
            if idle_for < stale_after {
                ClaimDecision::Skip {
                    active_run_id: cp.run_id.clone(),
                    idle_for,
                }
            } else {
                ClaimDecision::TakeOver {
                    stale_run_id: cp.run_id.clone(),
                    idle_for,
                }
            }
        }
        _ => ClaimDecision::Proceed,
    }
}

/// Pick the checkpoint to resume from, if any.
///
/// Only fresh checkpoints of unfinished runs are resumable; a completed run
/// is never resumed and a stale one is ignored.
pub fn resumable<'a>(
    existing: Option<&'a Checkpoint>,
    resume: bool,
    now: DateTime<Utc>,
    freshness_window: Duration,
) -> Option<&'a Checkpoint> {
    if !resume {
        return None;
    }

    existing.filter(|cp| cp.status != RunStatus::Completed && cp.is_fresh(now, freshness_window))
}
