//! A single chain link: one filter operation, its params, and its
//! cached output.

use std::sync::Arc;

use crate::kind::StageKind;
use crate::params::StageParams;
use crate::types::{Frame, SharedFrame, StageError};

/// The filter a stage wraps: an opaque, fallible `Frame -> Frame`.
///
/// `Arc` so a [`Snapshot`](crate::chain::Snapshot) can carry the same
/// filter to a worker thread; `Send + Sync` for the same reason.
pub type FilterFn =
    Arc<dyn Fn(&Frame, &StageParams) -> Result<Frame, StageError> + Send + Sync>;

/// One non-root stage in a chain.
///
/// Caching invariant: a clean (`!dirty`) stage with a cache holds a
/// valid result for its current params and upstream. A dirty stage may
/// still retain its previous cache, kept only for fallback display and
/// never returned as a fresh result.
pub struct Stage {
    kind: StageKind,
    params: StageParams,
    filter: FilterFn,
    cache: Option<SharedFrame>,
    dirty: bool,
    last_error: Option<StageError>,
    /// Bumped on every invalidation; a recompute dispatched against an
    /// older generation must not commit its result.
    generation: u64,
}

impl Stage {
    /// Create a stage using the kind's built-in filter.
    #[must_use]
    pub fn new(kind: StageKind, params: StageParams) -> Self {
        let filter: FilterFn = Arc::new(move |frame, params| kind.apply(frame, params));
        Self::with_filter(kind, params, filter)
    }

    /// Create a stage with an explicit filter function.
    ///
    /// This is the injection seam for tests (counting filters) and for
    /// callers wrapping external filter libraries that are not part of
    /// the built-in kind set.
    #[must_use]
    pub fn with_filter(kind: StageKind, params: StageParams, filter: FilterFn) -> Self {
        Self {
            kind,
            params,
            filter,
            cache: None,
            dirty: true,
            last_error: None,
            generation: 0,
        }
    }

    /// This stage's kind.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        self.kind
    }

    /// This stage's current params.
    #[must_use]
    pub const fn params(&self) -> &StageParams {
        &self.params
    }

    /// Whether the cached output (if any) is stale.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The most recent failure of this stage, if not cleared by a later
    /// successful recompute.
    #[must_use]
    pub const fn last_error(&self) -> Option<&StageError> {
        self.last_error.as_ref()
    }

    /// Current invalidation generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The cached output, only when it is valid for the current params
    /// and upstream.
    #[must_use]
    pub fn fresh_output(&self) -> Option<SharedFrame> {
        if self.dirty {
            None
        } else {
            self.cache.clone()
        }
    }

    /// The cached output regardless of staleness, as a fallback for
    /// display while a recompute is pending or after a failure.
    #[must_use]
    pub fn retained_output(&self) -> Option<SharedFrame> {
        self.cache.clone()
    }

    /// Replace params and mark stale.
    pub fn set_params(&mut self, params: StageParams) {
        self.params = params;
        self.invalidate();
    }

    /// Mark the cached output stale. The cache itself is retained for
    /// fallback display; it will not be returned as a fresh result.
    pub fn invalidate(&mut self) {
        self.dirty = true;
        self.generation += 1;
    }

    /// Run the wrapped filter against `input` with the current params.
    ///
    /// Pure with respect to stage state: callers decide whether to
    /// commit the result (see [`store_success`](Self::store_success) and
    /// [`store_failure`](Self::store_failure)).
    ///
    /// # Errors
    ///
    /// Whatever the wrapped filter returns.
    pub fn compute(&self, input: &Frame) -> Result<Frame, StageError> {
        (self.filter)(input, &self.params)
    }

    /// A clone of the filter for snapshot capture.
    #[must_use]
    pub fn filter(&self) -> FilterFn {
        Arc::clone(&self.filter)
    }

    /// Commit a successful result: cache it, clear dirty and the error.
    pub fn store_success(&mut self, output: SharedFrame) {
        self.cache = Some(output);
        self.dirty = false;
        self.last_error = None;
    }

    /// Commit a failure: record the error, keep the stale cache for
    /// fallback display, stay dirty.
    pub fn store_failure(&mut self, error: StageError) {
        self.last_error = Some(error);
        self.dirty = true;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::params::BlurParams;

    fn blur_stage() -> Stage {
        Stage::new(
            StageKind::Blur,
            StageParams::Blur(BlurParams { sigma: 1.0 }),
        )
    }

    #[test]
    fn new_stage_is_dirty_with_no_cache() {
        let stage = blur_stage();
        assert!(stage.is_dirty());
        assert!(stage.fresh_output().is_none());
        assert!(stage.retained_output().is_none());
        assert!(stage.last_error().is_none());
    }

    #[test]
    fn store_success_makes_output_fresh() {
        let mut stage = blur_stage();
        stage.store_success(Arc::new(Frame::new(2, 2)));
        assert!(!stage.is_dirty());
        assert!(stage.fresh_output().is_some());
    }

    #[test]
    fn invalidate_hides_fresh_output_but_retains_cache() {
        let mut stage = blur_stage();
        stage.store_success(Arc::new(Frame::new(2, 2)));
        stage.invalidate();
        assert!(stage.fresh_output().is_none());
        assert!(stage.retained_output().is_some());
    }

    #[test]
    fn set_params_bumps_generation() {
        let mut stage = blur_stage();
        let before = stage.generation();
        stage.set_params(StageParams::Blur(BlurParams { sigma: 2.0 }));
        assert!(stage.generation() > before);
        assert!(stage.is_dirty());
    }

    #[test]
    fn store_failure_keeps_stale_cache_and_records_error() {
        let mut stage = blur_stage();
        stage.store_success(Arc::new(Frame::new(2, 2)));
        stage.invalidate();
        stage.store_failure(StageError::Filter {
            message: "boom".to_string(),
        });
        assert!(stage.is_dirty());
        assert!(stage.retained_output().is_some());
        assert!(matches!(
            stage.last_error(),
            Some(StageError::Filter { .. })
        ));
    }

    #[test]
    fn success_after_failure_clears_error() {
        let mut stage = blur_stage();
        stage.store_failure(StageError::UpstreamUnavailable);
        stage.store_success(Arc::new(Frame::new(1, 1)));
        assert!(stage.last_error().is_none());
    }

    #[test]
    fn injected_filter_is_invoked() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stage = Stage::with_filter(
            StageKind::Invert,
            StageKind::Invert.default_params(),
            Arc::new(move |frame, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(frame.clone())
            }),
        );
        let input = Frame::new(1, 1);
        stage.compute(&input).unwrap();
        stage.compute(&input).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
