use std::time::Duration;

/// Tuning for the ingestion loop.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Name of the checkpoint row this loop owns.
    pub stream: String,
    /// Maximum records per upsert call.
    pub upsert_batch_size: usize,
    /// Consecutive empty pages that mean the upstream has run dry.
    pub empty_page_threshold: u32,
    /// Lower bound of the page ceiling.
    pub page_floor: u64,
    /// How far past the start page a single run may go.
    pub page_lookahead: u64,
    /// Retries of one page before the run fails.
    pub max_fetch_retries: u32,
    /// First backoff delay; doubled on each consecutive failure.
    pub retry_base_delay: Duration,
    /// Bound on a single page fetch.
    pub fetch_timeout: Duration,
    /// Checkpoints older than this are not resumed.
    pub freshness_window: Duration,
    /// A `running` state silent for this long may be taken over.
    pub stale_run_after: Duration,
    /// Fraction of the upstream total after which an empty page may end the
    /// run early. `None` disables the override.
    pub completion_threshold: Option<f64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stream: "listings".into(),
            upsert_batch_size: 1000,
            empty_page_threshold: 20,
            page_floor: 2000,
            page_lookahead: 5000,
            max_fetch_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            fetch_timeout: Duration::from_secs(30),
            freshness_window: Duration::from_secs(24 * 60 * 60),
            stale_run_after: Duration::from_secs(180),
            completion_threshold: None,
        }
    }
}

impl IngestConfig {
    /// Last page a run starting at `start_page` may fetch. Never below
    /// `start_page`, so a resumed run can always make progress.
    pub fn page_ceiling(&self, start_page: u64) -> u64 {
        self.page_floor
            .max(start_page.saturating_add(self.page_lookahead))
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_base_delay.saturating_mul(factor)
    }
}
