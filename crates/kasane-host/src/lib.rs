//! Threaded host for interactive `kasane` pipelines.
//!
//! `kasane-pipeline` is deliberately free of threads, timers, and file
//! I/O; this crate supplies all three for an interactive application:
//!
//! - [`debounce`]: per-stage quiet timers that collapse slider-drag
//!   bursts into a single recompute.
//! - [`worker`]: a background thread that evaluates chain snapshots.
//! - [`host`]: the owner loop wiring commands, timers, and worker
//!   results together behind a [`HostHandle`].
//! - [`store`]: pipeline files on disk, with paths kept relative so
//!   project folders stay portable.

pub mod debounce;
pub mod host;
pub mod store;
pub mod worker;

pub use debounce::{DEFAULT_QUIET, Debouncer};
pub use host::{Event, HostError, HostHandle, PipelineHost};
pub use store::StoreError;
pub use worker::{Job, JobResult, Worker};
