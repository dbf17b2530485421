//! A task that owns ingestion for one stream.
//!
//! Triggers (HTTP handlers, the periodic timer) talk to it only through
//! [`SyncHandle`]. At most one run is active per controller; the checkpoint
//! claim keeps separate processes apart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use autolot_source::PagedSource;
use autolot_store::{CheckpointStore, RecordStore};

use crate::error::{IngestError, IngestResult};
use crate::ingestor::{Ingestor, RunControl};
use crate::report::{RunOutcome, RunReport, SyncRequest, SyncResponse, SyncStatus};

enum SyncCommand {
    Start {
        request: SyncRequest,
        reply: oneshot::Sender<SyncResponse>,
    },
    Stop,
    Status {
        reply: oneshot::Sender<SyncResponse>,
    },
    Shutdown {
        reply: oneshot::Sender<Option<RunReport>>,
    },
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    /// Start a run unless one is already active. Either way, report the
    /// state of the active run.
    pub async fn start(&self, request: SyncRequest) -> IngestResult<SyncResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(SyncCommand::Start { request, reply }).await?;
        rx.await.map_err(|_| IngestError::ControllerClosed)
    }

    /// Ask the active run, if any, to stop at the next page boundary.
    pub async fn stop(&self) -> IngestResult<()> {
        self.send(SyncCommand::Stop).await
    }

    pub async fn status(&self) -> IngestResult<SyncResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(SyncCommand::Status { reply }).await?;
        rx.await.map_err(|_| IngestError::ControllerClosed)
    }

    /// Stop the active run, wait for it and end the controller. Returns the
    /// report of the run that was interrupted, if any.
    pub async fn shutdown(&self) -> IngestResult<Option<RunReport>> {
        let (reply, rx) = oneshot::channel();
        self.send(SyncCommand::Shutdown { reply }).await?;
        rx.await.map_err(|_| IngestError::ControllerClosed)
    }

    async fn send(&self, command: SyncCommand) -> IngestResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| IngestError::ControllerClosed)
    }
}

struct ActiveRun {
    control: Arc<RunControl>,
    handle: JoinHandle<RunReport>,
}

pub struct SyncController<S, R, C> {
    ingestor: Arc<Ingestor<S, R, C>>,
    rx: mpsc::Receiver<SyncCommand>,
    interval: Option<Duration>,
    active: Option<ActiveRun>,
    last: Option<RunReport>,
}

impl<S, R, C> SyncController<S, R, C>
where
    S: PagedSource + 'static,
    R: RecordStore + 'static,
    C: CheckpointStore + 'static,
{
    /// Spawn the controller. With `interval` set it also starts a resuming
    /// run every period.
    pub fn spawn(
        ingestor: Arc<Ingestor<S, R, C>>,
        interval: Option<Duration>,
    ) -> (SyncHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let controller = Self {
            ingestor,
            rx,
            interval,
            active: None,
            last: None,
        };
        let task = tokio::spawn(controller.run());
        (SyncHandle { tx }, task)
    }

    async fn run(mut self) {
        let mut ticker = self.interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        info!(interval_secs = ?self.interval.map(|d| d.as_secs()), "Sync controller started");

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(SyncCommand::Start { request, reply }) => {
                        let response = self.start(request).await;
                        let _ = reply.send(response);
                    }
                    Some(SyncCommand::Stop) => {
                        if let Some(active) = &self.active {
                            info!("Stop requested for active run");
                            active.control.request_stop();
                        }
                    }
                    Some(SyncCommand::Status { reply }) => {
                        let response = self.status().await;
                        let _ = reply.send(response);
                    }
                    Some(SyncCommand::Shutdown { reply }) => {
                        let report = self.stop_active().await;
                        let _ = reply.send(report);
                        break;
                    }
                    None => {
                        self.stop_active().await;
                        break;
                    }
                },
                report = wait_for(&mut self.active) => {
                    self.active = None;
                    self.record(report);
                }
                _ = tick(&mut ticker) => {
                    if self.active.is_none() {
                        debug!("Periodic sync trigger");
                        self.start(SyncRequest::default()).await;
                    }
                }
            }
        }

        info!("Sync controller stopped");
    }

    async fn start(&mut self, request: SyncRequest) -> SyncResponse {
        if self.active.is_some() {
            debug!("Run already active, not starting another");
            return self.status().await;
        }

        let control = Arc::new(RunControl::new());
        let ingestor = self.ingestor.clone();
        let run_control = control.clone();
        let handle =
            tokio::spawn(async move { ingestor.run_controlled(request, &run_control).await });
        self.active = Some(ActiveRun { control, handle });

        let mut response = self.ingestor.status().await;
        response.status = SyncStatus::Running;
        response
    }

    async fn status(&self) -> SyncResponse {
        if let Some(progress) = self.active.as_ref().and_then(|a| a.control.progress()) {
            return SyncResponse {
                status: SyncStatus::Running,
                total_processed: progress.total_processed,
                last_page: progress.last_page,
            };
        }
        if self.active.is_none() {
            if let Some(last) = &self.last {
                return last.to_response();
            }
        }

        let mut response = self.ingestor.status().await;
        if self.active.is_some() {
            response.status = SyncStatus::Running;
        }
        response
    }

    async fn stop_active(&mut self) -> Option<RunReport> {
        let active = self.active.take()?;
        active.control.request_stop();
        let report = join(active).await;
        self.record(report.clone());
        Some(report)
    }

    fn record(&mut self, report: RunReport) {
        debug!(run_id = %report.run_id, outcome = ?report.outcome, "Run finished");
        self.last = Some(report);
    }
}

async fn join(active: ActiveRun) -> RunReport {
    let ActiveRun { control, handle } = active;
    match handle.await {
        Ok(report) => report,
        Err(e) => panicked(&control, e),
    }
}

/// Resolves when the active run ends; pending forever when there is none.
async fn wait_for(active: &mut Option<ActiveRun>) -> RunReport {
    match active {
        Some(run) => match (&mut run.handle).await {
            Ok(report) => report,
            Err(e) => panicked(&run.control, e),
        },
        None => std::future::pending().await,
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn panicked(control: &RunControl, e: tokio::task::JoinError) -> RunReport {
    error!(error = %e, "Ingestion task ended abnormally");
    let progress = control.progress();
    RunReport {
        run_id: progress
            .as_ref()
            .map(|p| p.run_id.clone())
            .unwrap_or_default(),
        outcome: RunOutcome::Failed {
            error: e.to_string(),
        },
        total_processed: progress.as_ref().map_or(0, |p| p.total_processed),
        last_page: progress.as_ref().map_or(0, |p| p.last_page),
        start_page: 0,
        pages_fetched: 0,
        records_upserted: 0,
        records_skipped: 0,
        empty_pages: 0,
    }
}
