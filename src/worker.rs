//! Lifecycle event loop.
//!
//! The worker task owns the controller and handles one event at a time: an
//! event's handler runs to completion before the next event is taken off
//! the queue. Shutdown is only observed between events.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::controller::{
    ActivateReport, FetchOutcome, InstallReport, OfflineCacheController, WorkerState,
};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::generation::GenerationName;
use crate::request::Request;
use crate::state::WorkerRecord;
use crate::stats::{FetchCounters, FetchSnapshot};
use crate::storage::CacheStorage;

const QUEUE_DEPTH: usize = 64;

/// Snapshot of the worker for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    /// Generation the controller owns.
    pub generation: GenerationName,
    /// Lifecycle state.
    pub state: WorkerState,
    /// Whether the current version controls clients.
    pub controls_clients: bool,
    /// Fetch outcome counters.
    pub fetches: FetchSnapshot,
}

enum LifecycleEvent {
    Install(oneshot::Sender<Result<InstallReport>>),
    Activate(oneshot::Sender<Result<ActivateReport>>),
    Fetch(Request, oneshot::Sender<Result<FetchOutcome>>),
    Status(oneshot::Sender<WorkerStatus>),
}

/// Cloneable handle used to deliver events to the worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<LifecycleEvent>,
    shutdown: CancellationToken,
}

fn stopped() -> Error {
    Error::InvalidState("worker has stopped".into())
}

impl WorkerHandle {
    async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> LifecycleEvent,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.map_err(|_| stopped())?;
        reply_rx.await.map_err(|_| stopped())
    }

    /// Delivers an install event and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the install error, or [`Error::InvalidState`] if the worker
    /// has stopped.
    pub async fn install(&self) -> Result<InstallReport> {
        self.send(LifecycleEvent::Install).await?
    }

    /// Delivers an activate event and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the activation error, or [`Error::InvalidState`] if the
    /// worker has stopped.
    pub async fn activate(&self) -> Result<ActivateReport> {
        self.send(LifecycleEvent::Activate).await?
    }

    /// Installs and, because install asks to skip waiting, activates
    /// straight away.
    ///
    /// # Errors
    ///
    /// Returns the first lifecycle error; activation is not attempted after
    /// a failed install.
    pub async fn start(&self) -> Result<(InstallReport, ActivateReport)> {
        let installed = self.install().await?;
        let activated = self.activate().await?;
        Ok((installed, activated))
    }

    /// Delivers a fetch event and waits for the response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] when nothing could serve the request.
    pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
        self.send(|reply| LifecycleEvent::Fetch(request, reply)).await?
    }

    /// Reads the worker status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the worker has stopped.
    pub async fn status(&self) -> Result<WorkerStatus> {
        self.send(LifecycleEvent::Status).await
    }

    /// Asks the worker to stop after the event it is handling.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Options for [`spawn`].
#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    /// Directory to persist a [`WorkerRecord`] into after each lifecycle
    /// event, if any.
    pub record_dir: Option<PathBuf>,
}

struct Worker<S: CacheStorage, F: Fetcher> {
    controller: OfflineCacheController<S, F>,
    record: WorkerRecord,
    record_dir: Option<PathBuf>,
    counters: Arc<FetchCounters>,
}

impl<S: CacheStorage, F: Fetcher> Worker<S, F> {
    fn persist(&self) {
        if let Some(dir) = &self.record_dir
            && let Err(e) = self.record.save(dir)
        {
            log::warn!("could not save worker record: {e}");
        }
    }

    async fn handle(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Install(reply) => {
                let result = self.controller.install().await;
                match &result {
                    Ok(report) => self.record.mark_installed(report.stats.entries_stored),
                    Err(_) => self.record.mark_redundant(),
                }
                self.persist();
                let _ = reply.send(result);
            }
            LifecycleEvent::Activate(reply) => {
                let result = self.controller.activate().await;
                if let Ok(report) = &result {
                    let lingering = report.failed.iter().map(|f| f.generation.clone()).collect();
                    self.record.mark_activated(lingering);
                    self.persist();
                }
                let _ = reply.send(result);
            }
            LifecycleEvent::Fetch(request, reply) => {
                let result = self.controller.fetch(&request).await;
                match &result {
                    Ok(outcome) => self.counters.record(outcome.served_from),
                    Err(_) => self.counters.record_failure(),
                }
                let _ = reply.send(result);
            }
            LifecycleEvent::Status(reply) => {
                let _ = reply.send(WorkerStatus {
                    generation: self.controller.current().clone(),
                    state: self.controller.state(),
                    controls_clients: self.controller.controls_clients(),
                    fetches: self.counters.snapshot(),
                });
            }
        }
    }
}

/// Spawns the worker task. The join handle yields the controller back once
/// the worker stops (on [`WorkerHandle::shutdown`] or when every handle is
/// dropped).
pub fn spawn<S, F>(
    controller: OfflineCacheController<S, F>,
    options: WorkerOptions,
) -> (WorkerHandle, JoinHandle<OfflineCacheController<S, F>>)
where
    S: CacheStorage + 'static,
    F: Fetcher + 'static,
{
    let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();

    let mut record = options
        .record_dir
        .as_deref()
        .and_then(|dir| {
            WorkerRecord::load(dir).unwrap_or_else(|e| {
                log::warn!("ignoring unreadable worker record: {e}");
                None
            })
        })
        .filter(|r| r.generation == *controller.current())
        .unwrap_or_else(|| WorkerRecord::new(controller.current().clone()));
    record.state = controller.state();
    let mut worker = Worker {
        controller,
        record,
        record_dir: options.record_dir,
        counters: Arc::new(FetchCounters::new()),
    };

    let join = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                () = token.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Some(event) => worker.handle(event).await,
                None => break,
            }
        }
        log::debug!("worker for {} stopped", worker.controller.current());
        worker.controller
    });

    (WorkerHandle { tx, shutdown }, join)
}
