//! The owner loop that mediates between a UI and a [`Chain`].
//!
//! [`PipelineHost::spawn`] starts two threads: the host loop, which
//! owns the chain and is the only place it mutates, and a recompute
//! worker that evaluates [`Snapshot`]s. UI code talks to the loop
//! through a [`HostHandle`] and observes results on the [`Event`]
//! channel.
//!
//! Parameter edits are debounced: each edit restarts a per-stage quiet
//! timer, and only when a timer elapses does the loop capture a
//! snapshot and hand it to the worker. At most one snapshot is in
//! flight at a time; a timer firing while one is running sets a re-arm
//! flag and the loop dispatches again as soon as the result lands.
//! Structural edits and view changes skip the debounce.
//!
//! Staleness is handled in two layers. Replacing the whole chain (a
//! file load) bumps an epoch, and results stamped with an old epoch are
//! dropped without looking inside. Within an epoch, `Chain::commit`
//! drops any per-stage result whose generation no longer matches.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use kasane_pipeline::sink::{ErrorSink, NullSink};
use kasane_pipeline::{
    Chain, ChainError, DisplayImage, Stage, StageError, StageKind, StageParams,
};
use tracing::{debug, warn};

use crate::debounce::Debouncer;
use crate::store::{self, StoreError};
use crate::worker::{Job, JobResult, Worker};

/// Idle timeout when no debounce deadline is pending.
const IDLE_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The host loop has shut down.
    #[error("pipeline host is not running")]
    Disconnected,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Notifications emitted by the host loop.
#[derive(Debug)]
pub enum Event {
    /// A stage recomputed successfully; its display image is fresh.
    StageUpdated { index: usize },
    /// A stage recomputed and failed; its display image is `Failed`.
    StageFailed { index: usize, error: StageError },
    /// The whole chain was replaced by a file load.
    PipelineReplaced,
}

enum Command {
    SetParams {
        index: usize,
        params: StageParams,
        reply: Sender<Result<(), ChainError>>,
    },
    ReplaceRoot {
        bytes: Vec<u8>,
        path: Option<PathBuf>,
    },
    Push {
        kind: StageKind,
        reply: Sender<Result<usize, ChainError>>,
    },
    PushStage {
        stage: Stage,
        reply: Sender<Result<usize, ChainError>>,
    },
    Insert {
        index: usize,
        kind: StageKind,
        reply: Sender<Result<usize, ChainError>>,
    },
    Remove {
        index: usize,
        reply: Sender<Result<(), ChainError>>,
    },
    SetView {
        index: usize,
        reply: Sender<Result<(), ChainError>>,
    },
    DisplayImage {
        index: usize,
        reply: Sender<DisplayImage>,
    },
    ParamsAt {
        index: usize,
        reply: Sender<Option<StageParams>>,
    },
    Save {
        path: PathBuf,
        reply: Sender<Result<(), StoreError>>,
    },
    Load {
        path: PathBuf,
        reply: Sender<Result<(), StoreError>>,
    },
    Shutdown,
}

/// UI-facing handle to a running host loop. Request/reply methods block
/// until the loop has handled the command, which keeps callers' view of
/// the chain ordered with their own edits.
pub struct HostHandle {
    commands: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl HostHandle {
    /// Replace a stage's parameters. The recompute itself happens after
    /// the debounce quiet period.
    ///
    /// # Errors
    ///
    /// [`HostError::Chain`] for a bad index or mismatched params
    /// variant, [`HostError::Disconnected`] if the loop is gone.
    pub fn set_params(&self, index: usize, params: StageParams) -> Result<(), HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::SetParams {
            index,
            params,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|_| HostError::Disconnected)?
            .map_err(HostError::from)
    }

    /// Swap in a new root image. Every stage becomes stale and the
    /// current view recomputes immediately.
    ///
    /// # Errors
    ///
    /// [`HostError::Disconnected`].
    pub fn replace_root(&self, bytes: Vec<u8>, path: Option<PathBuf>) -> Result<(), HostError> {
        self.send(Command::ReplaceRoot { bytes, path })
    }

    /// Append a stage of `kind` with its default params, returning its
    /// index.
    ///
    /// # Errors
    ///
    /// [`HostError::Chain`] or [`HostError::Disconnected`].
    pub fn push(&self, kind: StageKind) -> Result<usize, HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::Push {
            kind,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|_| HostError::Disconnected)?
            .map_err(HostError::from)
    }

    /// Append an already-constructed stage, e.g. one with a custom
    /// filter.
    ///
    /// # Errors
    ///
    /// [`HostError::Chain`] or [`HostError::Disconnected`].
    pub fn push_stage(&self, stage: Stage) -> Result<usize, HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::PushStage {
            stage,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|_| HostError::Disconnected)?
            .map_err(HostError::from)
    }

    /// Insert a stage of `kind` with default params at `index`.
    ///
    /// # Errors
    ///
    /// [`HostError::Chain`] or [`HostError::Disconnected`].
    pub fn insert(&self, index: usize, kind: StageKind) -> Result<usize, HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::Insert {
            index,
            kind,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|_| HostError::Disconnected)?
            .map_err(HostError::from)
    }

    /// Remove the stage at `index`.
    ///
    /// # Errors
    ///
    /// [`HostError::Chain`] or [`HostError::Disconnected`].
    pub fn remove(&self, index: usize) -> Result<(), HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::Remove {
            index,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|_| HostError::Disconnected)?
            .map_err(HostError::from)
    }

    /// Point the view at `index`. If that stage is stale it recomputes
    /// immediately, without debouncing.
    ///
    /// # Errors
    ///
    /// [`HostError::Chain`] or [`HostError::Disconnected`].
    pub fn set_view(&self, index: usize) -> Result<(), HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::SetView {
            index,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|_| HostError::Disconnected)?
            .map_err(HostError::from)
    }

    /// What the UI should show for the stage at `index` right now.
    ///
    /// # Errors
    ///
    /// [`HostError::Disconnected`].
    pub fn display_image(&self, index: usize) -> Result<DisplayImage, HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::DisplayImage {
            index,
            reply: reply_tx,
        })?;
        reply_rx.recv().map_err(|_| HostError::Disconnected)
    }

    /// Current params of the stage at `index`, if it exists.
    ///
    /// # Errors
    ///
    /// [`HostError::Disconnected`].
    pub fn params_at(&self, index: usize) -> Result<Option<StageParams>, HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::ParamsAt {
            index,
            reply: reply_tx,
        })?;
        reply_rx.recv().map_err(|_| HostError::Disconnected)
    }

    /// Write the chain to a pipeline file.
    ///
    /// # Errors
    ///
    /// [`HostError::Store`] or [`HostError::Disconnected`].
    pub fn save(&self, path: PathBuf) -> Result<(), HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::Save {
            path,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|_| HostError::Disconnected)?
            .map_err(HostError::from)
    }

    /// Replace the chain with the contents of a pipeline file. On any
    /// failure the running chain is left untouched.
    ///
    /// # Errors
    ///
    /// [`HostError::Store`] or [`HostError::Disconnected`].
    pub fn load(&self, path: PathBuf) -> Result<(), HostError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::Load {
            path,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|_| HostError::Disconnected)?
            .map_err(HostError::from)
    }

    /// Stop the host loop and wait for it to exit.
    pub fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn send(&self, command: Command) -> Result<(), HostError> {
        self.commands
            .send(command)
            .map_err(|_| HostError::Disconnected)
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// The loop state. Lives entirely on the host thread.
pub struct PipelineHost {
    chain: Chain,
    sink: Arc<dyn ErrorSink>,
    debouncer: Debouncer,
    worker: Worker,
    commands: Receiver<Command>,
    results: Receiver<JobResult>,
    events: Sender<Event>,
    view: usize,
    epoch: u64,
    in_flight: bool,
    rearm: bool,
}

impl PipelineHost {
    /// Start the host loop and its recompute worker.
    ///
    /// # Errors
    ///
    /// [`HostError::Store`] wrapping the OS error if a thread cannot be
    /// spawned.
    pub fn spawn() -> Result<(HostHandle, Receiver<Event>), HostError> {
        Self::spawn_with_parts(Arc::new(NullSink), Debouncer::new())
    }

    /// Start the host loop with a custom debounce quiet period.
    ///
    /// # Errors
    ///
    /// Same as [`spawn`](Self::spawn).
    pub fn spawn_with_quiet(
        quiet: Duration,
    ) -> Result<(HostHandle, Receiver<Event>), HostError> {
        Self::spawn_with_parts(Arc::new(NullSink), Debouncer::with_quiet(quiet))
    }

    /// Start the host loop with a custom [`ErrorSink`]. The sink stays
    /// attached across pipeline file loads.
    ///
    /// # Errors
    ///
    /// Same as [`spawn`](Self::spawn).
    pub fn spawn_with_sink(
        sink: Arc<dyn ErrorSink>,
    ) -> Result<(HostHandle, Receiver<Event>), HostError> {
        Self::spawn_with_parts(sink, Debouncer::new())
    }

    fn spawn_with_parts(
        sink: Arc<dyn ErrorSink>,
        debouncer: Debouncer,
    ) -> Result<(HostHandle, Receiver<Event>), HostError> {
        let chain = Chain::with_sink(Arc::clone(&sink));
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let (results_tx, results_rx) = crossbeam_channel::unbounded();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        let worker = Worker::spawn(results_tx).map_err(StoreError::from)?;
        let host = Self {
            chain,
            sink,
            debouncer,
            worker,
            commands: commands_rx,
            results: results_rx,
            events: events_tx,
            view: 0,
            epoch: 0,
            in_flight: false,
            rearm: false,
        };
        let handle = std::thread::Builder::new()
            .name("kasane-host".into())
            .spawn(move || host.run())
            .map_err(StoreError::from)?;

        Ok((
            HostHandle {
                commands: commands_tx,
                handle: Some(handle),
            },
            events_rx,
        ))
    }

    fn run(mut self) {
        loop {
            let timeout = self.debouncer.next_deadline().map_or(IDLE_TICK, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            let timeout_rx = crossbeam_channel::after(timeout);

            crossbeam_channel::select_biased! {
                recv(self.commands) -> msg => {
                    match msg {
                        Ok(command) => {
                            if self.handle_command(command) {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                recv(self.results) -> msg => {
                    match msg {
                        Ok(result) => self.handle_result(result),
                        Err(_) => break,
                    }
                }
                recv(timeout_rx) -> _ => {}
            }

            if !self.debouncer.due(Instant::now()).is_empty() {
                self.schedule_recompute();
            }
        }
        debug!("host loop exiting");
    }

    /// Returns `true` on shutdown.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::SetParams {
                index,
                params,
                reply,
            } => {
                let result = self.chain.set_params(index, params);
                if result.is_ok() {
                    self.debouncer.request(index, Instant::now());
                }
                let _ = reply.send(result);
            }
            Command::ReplaceRoot { bytes, path } => {
                self.chain.set_root_image(bytes, path);
                self.schedule_recompute();
            }
            Command::Push { kind, reply } => {
                let result = self.chain.push(kind, kind.default_params());
                self.after_structural(result.is_ok());
                let _ = reply.send(result);
            }
            Command::PushStage { stage, reply } => {
                let result = self.chain.push_stage(stage);
                self.after_structural(result.is_ok());
                let _ = reply.send(result);
            }
            Command::Insert { index, kind, reply } => {
                let result = self.chain.insert(index, kind, kind.default_params());
                self.after_structural(result.is_ok());
                let _ = reply.send(result);
            }
            Command::Remove { index, reply } => {
                let result = self.chain.remove(index).map(drop);
                if result.is_ok() {
                    self.debouncer.cancel(index);
                    self.view = self.view.min(self.chain.len() - 1);
                    self.schedule_recompute();
                }
                let _ = reply.send(result);
            }
            Command::SetView { index, reply } => {
                if index < self.chain.len() {
                    self.view = index;
                    self.schedule_recompute();
                    let _ = reply.send(Ok(()));
                } else {
                    let _ = reply.send(Err(ChainError::OutOfBounds {
                        index,
                        len: self.chain.len(),
                    }));
                }
            }
            Command::DisplayImage { index, reply } => {
                let _ = reply.send(self.chain.display_image(index));
            }
            Command::ParamsAt { index, reply } => {
                let _ = reply.send(self.chain.params_at(index));
            }
            Command::Save { path, reply } => {
                let _ = reply.send(store::save(&self.chain, &path));
            }
            Command::Load { path, reply } => {
                let result = store::load(&path).map(|mut chain| {
                    // The loaded chain comes back with a null sink.
                    chain.set_sink(Arc::clone(&self.sink));
                    self.chain = chain;
                    self.epoch += 1;
                    self.debouncer.clear();
                    self.rearm = false;
                    self.view = self.chain.len() - 1;
                    self.emit(Event::PipelineReplaced);
                    self.schedule_recompute();
                });
                let _ = reply.send(result);
            }
            Command::Shutdown => return true,
        }
        false
    }

    fn after_structural(&mut self, changed: bool) {
        if changed {
            self.view = self.chain.len() - 1;
            self.schedule_recompute();
        }
    }

    fn handle_result(&mut self, result: JobResult) {
        if result.epoch != self.epoch {
            debug!(
                got = result.epoch,
                current = self.epoch,
                "dropping results from a replaced pipeline"
            );
            self.in_flight = false;
            if self.rearm {
                self.rearm = false;
                self.schedule_recompute();
            }
            return;
        }

        for outcome in result.outcomes {
            let index = outcome.index;
            let error = outcome.result.as_ref().err().cloned();
            if self.chain.commit(outcome) {
                match error {
                    None => self.emit(Event::StageUpdated { index }),
                    Some(error) => self.emit(Event::StageFailed { index, error }),
                }
            } else {
                debug!(index, "dropped a superseded stage result");
            }
        }

        self.in_flight = false;
        if self.rearm {
            self.rearm = false;
            self.schedule_recompute();
        }
    }

    /// Dispatch a snapshot up to the viewed stage, unless one is
    /// already running (re-arm instead) or the view is already fresh.
    fn schedule_recompute(&mut self) {
        if self.in_flight {
            self.rearm = true;
            return;
        }
        if !self.chain.has_root_image() {
            return;
        }
        if matches!(self.chain.display_image(self.view), DisplayImage::Fresh(_)) {
            return;
        }
        match self.chain.snapshot(self.view) {
            Ok(snapshot) => {
                let submitted = self.worker.submit(Job {
                    epoch: self.epoch,
                    snapshot,
                });
                if submitted {
                    self.in_flight = true;
                } else {
                    warn!("recompute worker is gone; results will not update");
                }
            }
            Err(error) => warn!(%error, view = self.view, "could not capture a snapshot"),
        }
    }

    fn emit(&self, event: Event) {
        // A dropped event receiver is not an error; the chain state is
        // still queryable through the handle.
        let _ = self.events.send(event);
    }
}
