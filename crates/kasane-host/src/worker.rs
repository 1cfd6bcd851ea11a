//! Background recompute thread.
//!
//! [`Worker`] owns a dedicated thread that receives [`Snapshot`]s,
//! evaluates them, and sends the resulting outcomes back over a
//! channel the host loop selects on. Heavy filters therefore never
//! block command handling.
//!
//! Each job carries the epoch it was dispatched under. The host bumps
//! its epoch whenever the whole chain is replaced, so results from a
//! superseded chain are recognizable and dropped wholesale; within an
//! epoch, per-stage generation checks in `Chain::commit` handle the
//! finer-grained races.

use std::io;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use kasane_pipeline::{Snapshot, StageOutcome};
use tracing::debug;

/// One recompute request for the worker thread.
pub struct Job {
    /// Host epoch at dispatch time, echoed back in the result.
    pub epoch: u64,
    /// The captured evaluation plan.
    pub snapshot: Snapshot,
}

/// The outcomes of one evaluated job.
pub struct JobResult {
    /// Epoch copied from the job.
    pub epoch: u64,
    /// Per-stage outcomes, ready for `Chain::commit`.
    pub outcomes: Vec<StageOutcome>,
}

/// Handle to the recompute thread. Dropping it closes the job channel,
/// which ends the thread; the join happens in `Drop`.
pub struct Worker {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn the recompute thread. Results are delivered on `results`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(results: Sender<JobResult>) -> io::Result<Self> {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<Job>();
        let handle = std::thread::Builder::new()
            .name("kasane-recompute".into())
            .spawn(move || worker_main(&jobs_rx, &results))?;
        Ok(Self {
            jobs: Some(jobs_tx),
            handle: Some(handle),
        })
    }

    /// Queue a job for evaluation.
    ///
    /// Returns `false` when the worker thread has already exited.
    pub fn submit(&self, job: Job) -> bool {
        self.jobs
            .as_ref()
            .is_some_and(|jobs| jobs.send(job).is_ok())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_main(jobs: &Receiver<Job>, results: &Sender<JobResult>) {
    for job in jobs {
        let target = job.snapshot.target();
        let outcomes = job.snapshot.run();
        debug!(target, count = outcomes.len(), "evaluated snapshot");
        if results
            .send(JobResult {
                epoch: job.epoch,
                outcomes,
            })
            .is_err()
        {
            break;
        }
    }
    debug!("recompute thread exiting");
}
