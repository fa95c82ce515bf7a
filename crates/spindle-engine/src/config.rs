//! Pipeline configuration and its validation.
//!
//! [`PipelineConfig`] is plain data with sensible defaults. Call
//! [`validate()`](PipelineConfig::validate) before use;
//! [`PipelineBuilder::build`](crate::PipelineBuilder::build) does so.

use thiserror::Error;

/// Upper bound on worker threads, for explicit and detected counts alike.
pub const MAX_WORKERS: usize = 64;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`PipelineConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The bounded event queue would hold nothing.
    #[error("event_queue_capacity must be at least 1")]
    EventQueueZero,

    /// The pipeline was built without any module.
    #[error("pipeline has no modules")]
    NoModules,
}

// ── PipelineConfig ─────────────────────────────────────────────────

/// Settings for building and running a [`Pipeline`](crate::Pipeline).
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Worker threads for [`run_parallel`](crate::Pipeline::run_parallel).
    /// `None` = auto-detect (`available_parallelism`, clamped to
    /// `[1, 64]`).
    pub worker_count: Option<usize>,
    /// Capacity of the queue feeding event IDs to workers. Default: 64.
    pub event_queue_capacity: usize,
    /// Reject the pipeline at build time if a subscription has no
    /// declared producer, and warn about dispatches nobody receives.
    /// Default: false.
    pub strict_contracts: bool,
    /// Skip a module whose REQUIRED inputs are missing when its turn
    /// comes, instead of failing the event at its end. Default: false.
    pub skip_unsatisfied_modules: bool,
    /// Stop scheduling new events after the first failed one.
    /// Default: false.
    pub stop_on_error: bool,
    /// Base seed from which every event derives its own. Default: 0.
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            event_queue_capacity: 64,
            strict_contracts: false,
            skip_unsatisfied_modules: false,
            stop_on_error: false,
            seed: 0,
        }
    }
}

impl PipelineConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::EventQueueZero);
        }
        Ok(())
    }

    /// Resolve the actual worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, MAX_WORKERS),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(1, MAX_WORKERS),
        }
    }
}
