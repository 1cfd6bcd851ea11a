//! kasane-pipeline: stage chain engine for interactive image processing
//! (sans-IO).
//!
//! A [`Chain`] is an ordered sequence of stages from a root image to the
//! currently viewed result. Each stage wraps one filter operation, owns
//! its params, and holds a lazily computed, cached output derived from
//! its predecessor. Any mutation (params, the root image, the chain
//! structure) marks the affected stage and everything downstream
//! stale; evaluation is pull-based, so stages that are never viewed
//! never pay their computation cost.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! bytes and frames and returns structured data. File storage, debounce
//! scheduling, and worker offload live in `kasane-host`.
//!
//! ```rust
//! # use kasane_pipeline::{Chain, StageKind, StageParams};
//! # use kasane_pipeline::params::BlurParams;
//! # fn run(png: Vec<u8>) -> Result<(), kasane_pipeline::ChainError> {
//! let mut chain = Chain::new();
//! chain.set_root_image(png, None);
//! let blur = chain.push(StageKind::Blur, StageParams::Blur(BlurParams { sigma: 2.0 }))?;
//! let frame = chain.image_at(blur)?;
//! # let _ = frame;
//! # Ok(())
//! # }
//! ```

pub mod blur;
pub mod chain;
pub mod codec;
pub mod kind;
pub mod params;
pub mod registry;
pub mod resize;
pub mod sink;
pub mod stage;
pub mod threshold;
pub mod tone;
pub mod types;

pub use chain::{Chain, ChainError, DisplayImage, Snapshot, StageOutcome};
pub use codec::{CodecError, PersistedItem};
pub use kind::StageKind;
pub use params::StageParams;
pub use sink::{CollectingSink, ErrorSink, NullSink};
pub use stage::{FilterFn, Stage};
pub use types::{Dimensions, Frame, SharedFrame, StageError};
