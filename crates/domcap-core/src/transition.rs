//! Atomic-transition boundary.
//!
//! Visible tree mutations (append, replace, remove, gate show/hide) run
//! through a scoped-execution seam: if the host environment can provide an
//! atomic visual boundary, the mutation and its rendering are perceived as
//! one step; otherwise the mutation applies immediately and synchronously.
//! Availability is queried per use and never assumed — the immediate
//! fallback is mandatory, and no correctness property may depend on the
//! boundary being present.

/// A host that may provide atomic visual transitions.
pub trait TransitionHost {
    /// Whether this host can provide an atomic boundary right now.
    fn supports_transitions(&self) -> bool {
        false
    }

    /// Opens a boundary. Only called when
    /// [`TransitionHost::supports_transitions`] returned `true`.
    fn begin(&mut self) {}

    /// Closes the boundary opened by the matching
    /// [`TransitionHost::begin`].
    fn commit(&mut self) {}
}

/// Runs `mutation`, wrapped in an atomic boundary when the host supports
/// one and immediately otherwise.
pub fn run_scoped<T>(host: &mut dyn TransitionHost, mutation: impl FnOnce() -> T) -> T {
    if host.supports_transitions() {
        host.begin();
        let result = mutation();
        host.commit();
        result
    } else {
        mutation()
    }
}

/// A host with no transition support; every mutation applies immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransitions;

impl TransitionHost for NoTransitions {}

/// Test host that counts boundary frames.
#[derive(Debug, Default)]
pub struct RecordingTransitions {
    frames: usize,
    open: bool,
}

impl RecordingTransitions {
    /// Creates a recording host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed boundary frames.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl TransitionHost for RecordingTransitions {
    fn supports_transitions(&self) -> bool {
        true
    }

    fn begin(&mut self) {
        assert!(!self.open, "transition boundaries must not nest");
        self.open = true;
    }

    fn commit(&mut self) {
        assert!(self.open, "commit without begin");
        self.open = false;
        self.frames += 1;
    }
}
