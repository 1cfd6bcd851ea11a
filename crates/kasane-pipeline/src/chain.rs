//! The stage chain: an ordered sequence of stages from a root image to
//! the currently viewed result.
//!
//! Position 0 is always the root (the loaded source image); positions
//! 1..N-1 are filter stages. The chain is strictly linear: a stage's
//! upstream is the stage at the previous index, by construction, so
//! there are no stored back-references to keep consistent and no cycles
//! to guard against. All structural mutation goes through [`Chain`]
//! methods; each one marks the affected stage and everything downstream
//! stale.
//!
//! Evaluation is pull-based and lazy: [`Chain::image_at`] reuses the
//! deepest fresh cache and recomputes forward only as far as the
//! requested index. A stage that is never viewed never runs its filter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::kind::StageKind;
use crate::params::{SourceParams, StageParams};
use crate::sink::{ErrorSink, NullSink};
use crate::stage::{FilterFn, Stage};
use crate::types::{Frame, SharedFrame, StageError};

/// Errors from chain structure operations and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The index does not name a stage in this chain.
    #[error("stage index {index} out of bounds (chain has {len} stages)")]
    OutOfBounds {
        /// The offending index.
        index: usize,
        /// Current chain length.
        len: usize,
    },

    /// The root stage cannot be removed, replaced, or rewired.
    #[error("the root stage cannot be removed or replaced")]
    RootImmutable,

    /// A `source` stage is only legal at position 0.
    #[error("a source stage is only legal at position 0")]
    SourceNotRoot,

    /// The supplied params are the wrong variant for the stage's kind.
    #[error("params mismatch: stage kind {expected} got {got} params")]
    ParamsMismatch {
        /// The stage's kind discriminator.
        expected: &'static str,
        /// The supplied params variant.
        got: &'static str,
    },

    /// A stage evaluation failed.
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// The root: position 0. Holds the loaded image bytes and a decode
/// cache instead of an upstream reference.
struct RootStage {
    params: SourceParams,
    bytes: Vec<u8>,
    cache: Option<SharedFrame>,
    dirty: bool,
    last_error: Option<StageError>,
    generation: u64,
}

impl RootStage {
    fn empty() -> Self {
        Self {
            params: SourceParams::default(),
            bytes: Vec::new(),
            cache: None,
            dirty: true,
            last_error: None,
            generation: 0,
        }
    }

    fn invalidate(&mut self) {
        self.dirty = true;
        self.generation += 1;
    }

    fn fresh_output(&self) -> Option<SharedFrame> {
        if self.dirty { None } else { self.cache.clone() }
    }

    fn decode(&self) -> Result<Frame, StageError> {
        if self.bytes.is_empty() {
            return Err(StageError::EmptyInput);
        }
        Ok(image::load_from_memory(&self.bytes)?.to_rgba8())
    }
}

/// What the UI should display for a stage right now.
#[derive(Debug, Clone)]
pub enum DisplayImage {
    /// A valid, current result.
    Fresh(SharedFrame),
    /// A stale previous result, shown while a recompute is pending.
    Stale(SharedFrame),
    /// The stage failed; show a placeholder. The previous result, if
    /// one is retained, is available for "show last good" display.
    Failed {
        /// The stage's own most recent error.
        error: StageError,
        /// The retained stale cache, if any.
        fallback: Option<SharedFrame>,
    },
    /// Nothing computed yet and nothing retained.
    Empty,
}

/// Outcome of one stage recompute, produced by [`Snapshot::run`] and
/// applied through [`Chain::commit`].
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Chain position of the stage.
    pub index: usize,
    /// The stage's generation at snapshot time. A commit is dropped if
    /// the stage has been invalidated again since.
    pub generation: u64,
    /// The computed frame, or the stage's own failure.
    pub result: Result<SharedFrame, StageError>,
}

struct StageSnapshot {
    filter: FilterFn,
    params: StageParams,
    fresh: Option<SharedFrame>,
    generation: u64,
}

enum RootSnapshot {
    Fresh(SharedFrame),
    Pending { bytes: Vec<u8>, generation: u64 },
}

/// An immutable capture of everything needed to recompute a chain up to
/// a target index, taken on the owner thread and safe to run on a
/// worker. Params and upstream frames are captured by value/`Arc` at
/// dispatch time; a later params change on the live chain does not
/// affect a running snapshot, and its result simply fails the
/// generation check at commit.
pub struct Snapshot {
    root: RootSnapshot,
    stages: Vec<StageSnapshot>,
    target: usize,
}

impl Snapshot {
    /// Run the captured evaluation, producing an outcome per stage that
    /// actually needed recomputation. Stops at the first failure;
    /// stages after it (up to the target) get their own
    /// [`StageError::UpstreamUnavailable`] outcome.
    #[must_use]
    pub fn run(&self) -> Vec<StageOutcome> {
        let mut outcomes = Vec::new();

        let mut upstream = match &self.root {
            RootSnapshot::Fresh(frame) => Arc::clone(frame),
            RootSnapshot::Pending { bytes, generation } => {
                let decoded = if bytes.is_empty() {
                    Err(StageError::EmptyInput)
                } else {
                    image::load_from_memory(bytes)
                        .map(|img| Arc::new(img.to_rgba8()))
                        .map_err(StageError::from)
                };
                match decoded {
                    Ok(frame) => {
                        outcomes.push(StageOutcome {
                            index: 0,
                            generation: *generation,
                            result: Ok(Arc::clone(&frame)),
                        });
                        frame
                    }
                    Err(error) => {
                        outcomes.push(StageOutcome {
                            index: 0,
                            generation: *generation,
                            result: Err(error),
                        });
                        self.push_unavailable(&mut outcomes, 1);
                        return outcomes;
                    }
                }
            }
        };

        for (slot, snap) in self.stages.iter().enumerate() {
            let index = slot + 1;
            if let Some(frame) = &snap.fresh {
                upstream = Arc::clone(frame);
                continue;
            }
            match (snap.filter)(&upstream, &snap.params) {
                Ok(frame) => {
                    let frame = Arc::new(frame);
                    outcomes.push(StageOutcome {
                        index,
                        generation: snap.generation,
                        result: Ok(Arc::clone(&frame)),
                    });
                    upstream = frame;
                }
                Err(error) => {
                    outcomes.push(StageOutcome {
                        index,
                        generation: snap.generation,
                        result: Err(error),
                    });
                    self.push_unavailable(&mut outcomes, index + 1);
                    return outcomes;
                }
            }
        }

        outcomes
    }

    /// The target index this snapshot evaluates up to.
    #[must_use]
    pub const fn target(&self) -> usize {
        self.target
    }

    fn push_unavailable(&self, outcomes: &mut Vec<StageOutcome>, from: usize) {
        for index in from..=self.target {
            if index == 0 {
                continue;
            }
            outcomes.push(StageOutcome {
                index,
                generation: self.stages[index - 1].generation,
                result: Err(StageError::UpstreamUnavailable),
            });
        }
    }
}

/// An ordered, mutable chain of stages with a distinguished root.
pub struct Chain {
    root: RootStage,
    stages: Vec<Stage>,
    sink: Arc<dyn ErrorSink>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// Create an empty chain (root only, no image loaded).
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(Arc::new(NullSink))
    }

    /// Create an empty chain reporting failures to `sink`.
    #[must_use]
    pub fn with_sink(sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            root: RootStage::empty(),
            stages: Vec::new(),
            sink,
        }
    }

    /// Replace the failure sink, replaying each stage's current error
    /// into it so the new sink reflects the chain's state.
    pub fn set_sink(&mut self, sink: Arc<dyn ErrorSink>) {
        self.sink = sink;
        self.resync_sink(0, self.len());
    }

    /// Sink entries are keyed by stage index, so structural edits that
    /// shift stages must re-key the shifted range. `upto` may name
    /// indices that only existed before a removal; those get cleared.
    fn resync_sink(&self, from: usize, upto: usize) {
        for position in from..upto {
            match self.last_error_at(position) {
                Some(error) => self.sink.report(position, &error),
                None => self.sink.clear(position),
            }
        }
    }

    /// Number of stages including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.stages.len()
    }

    /// A chain always contains its root, so it is never empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The kind of the stage at `index`.
    #[must_use]
    pub fn kind_at(&self, index: usize) -> Option<StageKind> {
        if index == 0 {
            Some(StageKind::Source)
        } else {
            self.stages.get(index - 1).map(Stage::kind)
        }
    }

    /// A copy of the params of the stage at `index`.
    #[must_use]
    pub fn params_at(&self, index: usize) -> Option<StageParams> {
        if index == 0 {
            Some(StageParams::Source(self.root.params.clone()))
        } else {
            self.stages.get(index - 1).map(|s| s.params().clone())
        }
    }

    /// Whether the stage at `index` is stale.
    #[must_use]
    pub fn dirty_at(&self, index: usize) -> Option<bool> {
        if index == 0 {
            Some(self.root.dirty)
        } else {
            self.stages.get(index - 1).map(Stage::is_dirty)
        }
    }

    /// The most recent error of the stage at `index`, if any.
    #[must_use]
    pub fn last_error_at(&self, index: usize) -> Option<StageError> {
        if index == 0 {
            self.root.last_error.clone()
        } else {
            self.stages
                .get(index - 1)
                .and_then(|s| s.last_error().cloned())
        }
    }

    /// The root image path hint used for persistence.
    #[must_use]
    pub fn root_path(&self) -> &Path {
        &self.root.params.path
    }

    /// Update the root image path hint without touching loaded bytes.
    /// Used by the codec while restoring a persisted chain.
    pub fn set_root_path(&mut self, path: PathBuf) {
        self.root.params.path = path;
    }

    /// Whether root image bytes have been loaded.
    #[must_use]
    pub fn has_root_image(&self) -> bool {
        !self.root.bytes.is_empty()
    }

    /// Replace the root image. Marks the whole chain stale.
    pub fn set_root_image(&mut self, bytes: Vec<u8>, path: Option<PathBuf>) {
        self.root.bytes = bytes;
        if let Some(path) = path {
            self.root.params.path = path;
        }
        self.invalidate_from(0);
    }

    /// Append a stage built from a kind and params.
    ///
    /// # Errors
    ///
    /// [`ChainError::SourceNotRoot`] for the root kind,
    /// [`ChainError::ParamsMismatch`] when the params variant does not
    /// match the kind.
    pub fn push(&mut self, kind: StageKind, params: StageParams) -> Result<usize, ChainError> {
        let stage = Self::build_stage(kind, params)?;
        self.push_stage(stage)
    }

    /// Append an already-constructed stage (e.g. one with an injected
    /// filter).
    ///
    /// # Errors
    ///
    /// [`ChainError::SourceNotRoot`] for a stage of the root kind.
    pub fn push_stage(&mut self, stage: Stage) -> Result<usize, ChainError> {
        if stage.kind() == StageKind::Source {
            return Err(ChainError::SourceNotRoot);
        }
        self.stages.push(stage);
        let index = self.stages.len();
        self.invalidate_from(index);
        Ok(index)
    }

    /// Insert a stage at `index`, shifting later stages down. The stage
    /// at `index` and everything after it become stale.
    ///
    /// # Errors
    ///
    /// [`ChainError::RootImmutable`] for index 0,
    /// [`ChainError::OutOfBounds`] past the end, plus the
    /// [`push`](Self::push) errors.
    pub fn insert(
        &mut self,
        index: usize,
        kind: StageKind,
        params: StageParams,
    ) -> Result<usize, ChainError> {
        if index == 0 {
            return Err(ChainError::RootImmutable);
        }
        if index > self.len() {
            return Err(ChainError::OutOfBounds {
                index,
                len: self.len(),
            });
        }
        let stage = Self::build_stage(kind, params)?;
        self.stages.insert(index - 1, stage);
        self.resync_sink(index, self.len());
        self.invalidate_from(index);
        Ok(index)
    }

    /// Remove the stage at `index`. The former next stage takes its
    /// position, is rewired to the former previous stage (implicitly,
    /// by index order), and becomes stale along with everything after
    /// it.
    ///
    /// # Errors
    ///
    /// [`ChainError::RootImmutable`] for index 0,
    /// [`ChainError::OutOfBounds`] otherwise out of range.
    pub fn remove(&mut self, index: usize) -> Result<Stage, ChainError> {
        if index == 0 {
            return Err(ChainError::RootImmutable);
        }
        if index >= self.len() {
            return Err(ChainError::OutOfBounds {
                index,
                len: self.len(),
            });
        }
        let upto = self.len();
        let removed = self.stages.remove(index - 1);
        self.resync_sink(index, upto);
        self.invalidate_from(index);
        Ok(removed)
    }

    /// Replace the params of the stage at `index` (clamped at this
    /// boundary) and mark it and everything downstream stale.
    ///
    /// # Errors
    ///
    /// [`ChainError::OutOfBounds`] or [`ChainError::ParamsMismatch`].
    pub fn set_params(&mut self, index: usize, params: StageParams) -> Result<(), ChainError> {
        let params = params.clamped();
        if index == 0 {
            let StageParams::Source(source) = params else {
                return Err(ChainError::ParamsMismatch {
                    expected: StageKind::Source.name(),
                    got: params.variant_name(),
                });
            };
            self.root.params = source;
        } else {
            let Some(stage) = self.stages.get_mut(index - 1) else {
                return Err(ChainError::OutOfBounds {
                    index,
                    len: self.len(),
                });
            };
            if !stage.kind().accepts(&params) {
                return Err(ChainError::ParamsMismatch {
                    expected: stage.kind().name(),
                    got: params.variant_name(),
                });
            }
            stage.set_params(params);
        }
        self.invalidate_from(index);
        Ok(())
    }

    /// Mark the stage at `index` and every stage after it stale, in
    /// index order, with no early stop: a later stage may hold an
    /// independently cached result that is now stale too. Idempotent;
    /// re-marking a dirty stage only bumps its generation.
    pub fn invalidate_from(&mut self, index: usize) {
        if index == 0 {
            self.root.invalidate();
        }
        let first_slot = index.saturating_sub(1);
        for stage in self.stages.iter_mut().skip(first_slot) {
            stage.invalidate();
        }
    }

    /// Current invalidation generation of the stage at `index`.
    #[must_use]
    pub fn generation_at(&self, index: usize) -> Option<u64> {
        if index == 0 {
            Some(self.root.generation)
        } else {
            self.stages.get(index - 1).map(Stage::generation)
        }
    }

    /// Pull-evaluate up to `index` and return its image.
    ///
    /// Fresh caches are reused without invoking any filter; stale
    /// stages between the deepest fresh cache and `index` are
    /// recomputed in order. On a stage failure: that stage records its
    /// own error (reported to the sink), every later stage up to
    /// `index` records its own [`StageError::UpstreamUnavailable`], no
    /// upstream cache is touched, and the failing stage's error is
    /// returned.
    ///
    /// # Errors
    ///
    /// [`ChainError::OutOfBounds`], or the failing stage's
    /// [`StageError`].
    pub fn image_at(&mut self, index: usize) -> Result<SharedFrame, ChainError> {
        if index >= self.len() {
            return Err(ChainError::OutOfBounds {
                index,
                len: self.len(),
            });
        }

        let mut upstream = match self.ensure_root() {
            Ok(frame) => frame,
            Err(error) => {
                self.record_unavailable(1, index);
                return Err(error.into());
            }
        };

        for position in 1..=index {
            let stage = &mut self.stages[position - 1];
            if let Some(frame) = stage.fresh_output() {
                upstream = frame;
                continue;
            }
            match stage.compute(&upstream) {
                Ok(frame) => {
                    let frame = Arc::new(frame);
                    stage.store_success(Arc::clone(&frame));
                    self.sink.clear(position);
                    upstream = frame;
                }
                Err(error) => {
                    stage.store_failure(error.clone());
                    self.sink.report(position, &error);
                    self.record_unavailable(position + 1, index);
                    return Err(error.into());
                }
            }
        }

        Ok(upstream)
    }

    /// What the UI should display for the stage at `index`, without
    /// triggering any computation.
    #[must_use]
    pub fn display_image(&self, index: usize) -> DisplayImage {
        let (fresh, retained, error) = if index == 0 {
            (
                self.root.fresh_output(),
                self.root.cache.clone(),
                self.root.last_error.clone(),
            )
        } else {
            match self.stages.get(index - 1) {
                Some(stage) => (
                    stage.fresh_output(),
                    stage.retained_output(),
                    stage.last_error().cloned(),
                ),
                None => return DisplayImage::Empty,
            }
        };

        if let Some(frame) = fresh {
            return DisplayImage::Fresh(frame);
        }
        if let Some(error) = error {
            return DisplayImage::Failed {
                error,
                fallback: retained,
            };
        }
        match retained {
            Some(frame) => DisplayImage::Stale(frame),
            None => DisplayImage::Empty,
        }
    }

    /// Capture an immutable evaluation plan up to `index` for worker
    /// offload. Cheap: frames and filters are `Arc`-cloned; root bytes
    /// are copied only when the root itself needs re-decoding.
    ///
    /// # Errors
    ///
    /// [`ChainError::OutOfBounds`].
    pub fn snapshot(&self, index: usize) -> Result<Snapshot, ChainError> {
        if index >= self.len() {
            return Err(ChainError::OutOfBounds {
                index,
                len: self.len(),
            });
        }
        let root = self.root.fresh_output().map_or_else(
            || RootSnapshot::Pending {
                bytes: self.root.bytes.clone(),
                generation: self.root.generation,
            },
            RootSnapshot::Fresh,
        );
        let stages = self
            .stages
            .iter()
            .take(index)
            .map(|stage| StageSnapshot {
                filter: stage.filter(),
                params: stage.params().clone(),
                fresh: stage.fresh_output(),
                generation: stage.generation(),
            })
            .collect();
        Ok(Snapshot {
            root,
            stages,
            target: index,
        })
    }

    /// Apply a worker outcome. Commits only when the stage's generation
    /// still matches the one captured at dispatch, so a late result
    /// from a superseded recompute is dropped rather than overwriting a
    /// newer one.
    ///
    /// Returns `true` when the outcome was committed.
    pub fn commit(&mut self, outcome: StageOutcome) -> bool {
        let StageOutcome {
            index,
            generation,
            result,
        } = outcome;

        if index == 0 {
            if self.root.generation != generation {
                return false;
            }
            match result {
                Ok(frame) => {
                    self.root.cache = Some(frame);
                    self.root.dirty = false;
                    self.root.last_error = None;
                    self.sink.clear(0);
                }
                Err(error) => {
                    self.root.last_error = Some(error.clone());
                    self.sink.report(0, &error);
                }
            }
            return true;
        }

        let Some(stage) = self.stages.get_mut(index - 1) else {
            return false;
        };
        if stage.generation() != generation {
            return false;
        }
        match result {
            Ok(frame) => {
                stage.store_success(frame);
                self.sink.clear(index);
            }
            Err(error) => {
                stage.store_failure(error.clone());
                self.sink.report(index, &error);
            }
        }
        true
    }

    fn build_stage(kind: StageKind, params: StageParams) -> Result<Stage, ChainError> {
        if kind == StageKind::Source {
            return Err(ChainError::SourceNotRoot);
        }
        let params = params.clamped();
        if !kind.accepts(&params) {
            return Err(ChainError::ParamsMismatch {
                expected: kind.name(),
                got: params.variant_name(),
            });
        }
        Ok(Stage::new(kind, params))
    }

    fn ensure_root(&mut self) -> Result<SharedFrame, StageError> {
        if let Some(frame) = self.root.fresh_output() {
            return Ok(frame);
        }
        match self.root.decode() {
            Ok(frame) => {
                let frame = Arc::new(frame);
                self.root.cache = Some(Arc::clone(&frame));
                self.root.dirty = false;
                self.root.last_error = None;
                self.sink.clear(0);
                Ok(frame)
            }
            Err(error) => {
                self.root.last_error = Some(error.clone());
                self.sink.report(0, &error);
                Err(error)
            }
        }
    }

    /// Record `UpstreamUnavailable` as each downstream stage's own
    /// condition, distinct from the originating failure.
    fn record_unavailable(&mut self, from: usize, to: usize) {
        for position in from..=to {
            if position == 0 || position > self.stages.len() {
                continue;
            }
            let stage = &mut self.stages[position - 1];
            stage.store_failure(StageError::UpstreamUnavailable);
            self.sink.report(position, &StageError::UpstreamUnavailable);
        }
    }
}
