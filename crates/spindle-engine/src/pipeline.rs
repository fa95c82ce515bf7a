//! Pipeline construction and the sequential and parallel run loops.
//!
//! [`PipelineBuilder`] constructs modules in order, handing each factory
//! a [`Subscriptions`] guard so the module can register its inputs.
//! [`Pipeline`] then runs events either on the calling thread
//! ([`run`](Pipeline::run)) or on a scoped worker pool
//! ([`run_parallel`](Pipeline::run_parallel)).
//!
//! # Lifecycle
//!
//! ```text
//! build → initialize → run / run_parallel (any number of times) → finalize → shutdown
//! ```
//!
//! `run` and `run_parallel` initialize lazily. `shutdown` releases every
//! module's subscriptions in reverse construction order; dropping the
//! pipeline does the same but can only log failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use spindle_core::{DelegateId, EventId, MissingInput, ModuleId, ModuleInfo};
use spindle_messenger::{EventInbox, Messenger, Subscriptions};

use crate::config::{ConfigError, PipelineConfig};
use crate::error::{EventError, ModuleError, PipelineError};
use crate::metrics::{EventMetrics, RunMetrics};
use crate::module::Module;
use crate::worker::{process_event, worker_loop, Driver, EventOutcome};

/// One constructed module together with the guard owning its delegates.
pub(crate) struct ModuleEntry {
    pub(crate) info: Arc<ModuleInfo>,
    pub(crate) module: Box<dyn Module>,
    pub(crate) subscriptions: Subscriptions,
    /// REQUIRED delegates of the module, fixed once construction ends.
    pub(crate) required: Vec<(DelegateId, MissingInput)>,
}

// ── RunSummary ─────────────────────────────────────────────────────

/// What happened during one call to [`Pipeline::run`] or
/// [`Pipeline::run_parallel`].
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Events that were processed, successfully or not.
    pub events_processed: u64,
    /// Failed events, ordered by event ID.
    pub failures: Vec<EventError>,
    /// Whether scheduling stopped early because of `stop_on_error`.
    pub aborted: bool,
    /// Accumulated metrics.
    pub metrics: RunMetrics,
}

impl RunSummary {
    /// Whether every processed event succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, result: Result<EventMetrics, EventError>) {
        self.events_processed += 1;
        match result {
            Ok(metrics) => self.metrics.record(&metrics),
            Err(err) => {
                debug!(error = %err, "event failed");
                self.metrics.record_failure();
                self.failures.push(err);
            }
        }
    }
}

// ── PipelineBuilder ────────────────────────────────────────────────

/// Constructs the modules of a [`Pipeline`] against a shared messenger.
pub struct PipelineBuilder {
    config: PipelineConfig,
    messenger: Arc<Messenger>,
    modules: Vec<ModuleEntry>,
}

impl PipelineBuilder {
    /// Start a pipeline with a fresh messenger.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_messenger(config, Arc::new(Messenger::new()))
    }

    /// Start a pipeline around an existing messenger.
    pub fn with_messenger(config: PipelineConfig, messenger: Arc<Messenger>) -> Self {
        Self {
            config,
            messenger,
            modules: Vec::new(),
        }
    }

    /// The messenger modules subscribe to.
    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    /// Construct a module and append it to the pipeline.
    ///
    /// `factory` receives the module's subscription guard and returns the
    /// module. If it fails, every delegate it registered is removed again
    /// and the error is returned as [`PipelineError::Construction`].
    pub fn add_module<M, F>(
        &mut self,
        info: ModuleInfo,
        factory: F,
    ) -> Result<ModuleId, PipelineError>
    where
        M: Module,
        F: FnOnce(&mut Subscriptions) -> Result<M, ModuleError>,
    {
        let info = Arc::new(info);
        let mut subscriptions = self.messenger.subscriptions(Arc::clone(&info));
        let module = factory(&mut subscriptions).map_err(|source| {
            PipelineError::Construction {
                module: info.to_string(),
                source,
            }
        })?;
        debug!(
            module = %info,
            delegates = subscriptions.delegate_ids().len(),
            "module constructed"
        );
        let id = info.id();
        let required = self.messenger.required_inputs(id);
        self.modules.push(ModuleEntry {
            info,
            module: Box::new(module),
            subscriptions,
            required,
        });
        Ok(id)
    }

    /// Validate the configuration and, with `strict_contracts`, the
    /// subscription contracts.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;
        if self.modules.is_empty() {
            return Err(ConfigError::NoModules.into());
        }
        if self.config.strict_contracts {
            self.messenger
                .validate_contracts()
                .map_err(PipelineError::Contracts)?;
        }
        Ok(Pipeline {
            config: self.config,
            messenger: self.messenger,
            modules: self.modules,
            next_event: 0,
            initialized: false,
        })
    }
}

// ── Pipeline ───────────────────────────────────────────────────────

/// A built set of modules ready to process events.
pub struct Pipeline {
    config: PipelineConfig,
    messenger: Arc<Messenger>,
    modules: Vec<ModuleEntry>,
    next_event: u64,
    initialized: bool,
}

impl Pipeline {
    /// The shared messenger.
    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    /// The configuration the pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Module identities in execution order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.iter().map(|entry| &*entry.info)
    }

    /// ID the next scheduled event will get.
    pub fn next_event(&self) -> EventId {
        EventId(self.next_event)
    }

    fn driver(&self) -> Driver<'_> {
        Driver {
            modules: &self.modules,
            messenger: &self.messenger,
            config: &self.config,
        }
    }

    /// Call every module's `initialize`, in order. Idempotent.
    pub fn initialize(&mut self) -> Result<(), PipelineError> {
        if self.initialized {
            return Ok(());
        }
        for entry in &self.modules {
            entry
                .module
                .initialize()
                .map_err(|source| PipelineError::Initialize {
                    module: entry.info.to_string(),
                    source,
                })?;
        }
        self.initialized = true;
        info!(modules = self.modules.len(), "pipeline initialized");
        Ok(())
    }

    /// Process one event on the calling thread, reusing `inbox`.
    ///
    /// The event ID is taken from the inbox.
    pub fn run_event(&self, inbox: &mut EventInbox) -> Result<EventMetrics, EventError> {
        process_event(self.driver(), inbox)
    }

    /// Process `events` events sequentially on the calling thread.
    pub fn run(&mut self, events: u64) -> Result<RunSummary, PipelineError> {
        self.initialize()?;
        let first = self.next_event;
        info!(first, events, "sequential run started");

        let start = Instant::now();
        let mut summary = RunSummary::default();
        let mut inbox = EventInbox::default();
        for id in first..first + events {
            inbox.begin(EventId(id));
            let result = self.run_event(&mut inbox);
            let failed = result.is_err();
            summary.record(result);
            if failed && self.config.stop_on_error {
                summary.aborted = id + 1 < first + events;
                break;
            }
        }
        self.next_event = first + events;
        summary.metrics.wall_us = start.elapsed().as_micros() as u64;
        info!(
            processed = summary.events_processed,
            failed = summary.failures.len(),
            "sequential run finished"
        );
        Ok(summary)
    }

    /// Process `events` events on a pool of worker threads.
    ///
    /// Every event is processed exactly once, by one worker, with its own
    /// inbox. Completion order is unspecified; failures in the summary are
    /// sorted by event ID.
    pub fn run_parallel(&mut self, events: u64) -> Result<RunSummary, PipelineError> {
        self.initialize()?;
        let first = self.next_event;
        let worker_count = self.config.resolved_worker_count();
        info!(first, events, workers = worker_count, "parallel run started");

        let start = Instant::now();
        let driver = self.driver();
        let capacity = self.config.event_queue_capacity;
        let abort = AtomicBool::new(false);

        let mut summary = thread::scope(|scope| -> Result<RunSummary, PipelineError> {
            let (job_tx, job_rx) = crossbeam_channel::bounded::<EventId>(capacity);
            let (result_tx, result_rx) = crossbeam_channel::unbounded::<EventOutcome>();

            let mut workers = Vec::with_capacity(worker_count);
            for index in 0..worker_count {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let abort = &abort;
                let handle = thread::Builder::new()
                    .name(format!("spindle-worker-{index}"))
                    .spawn_scoped(scope, move || {
                        worker_loop(index, driver, jobs, results, abort);
                    })
                    .map_err(|e| PipelineError::ThreadSpawnFailed {
                        reason: e.to_string(),
                    })?;
                workers.push(handle);
            }
            drop(job_rx);
            drop(result_tx);

            let mut scheduled = 0u64;
            for id in first..first + events {
                if abort.load(Ordering::Acquire) {
                    break;
                }
                if job_tx.send(EventId(id)).is_err() {
                    break;
                }
                scheduled += 1;
            }
            drop(job_tx);

            let mut outcomes: Vec<EventOutcome> = result_rx.iter().collect();
            outcomes.sort_by_key(|outcome| outcome.event);

            let panicked = workers
                .into_iter()
                .map(|handle| handle.join())
                .filter(Result::is_err)
                .count();
            if panicked > 0 {
                warn!(panicked, "worker threads panicked");
                return Err(PipelineError::WorkerPanicked);
            }

            let mut summary = RunSummary::default();
            for outcome in outcomes {
                summary.record(outcome.result);
            }
            summary.aborted = summary.events_processed < events;
            debug!(scheduled, processed = summary.events_processed, "workers joined");
            Ok(summary)
        })?;

        self.next_event = first + events;
        summary.metrics.wall_us = start.elapsed().as_micros() as u64;
        info!(
            processed = summary.events_processed,
            failed = summary.failures.len(),
            "parallel run finished"
        );
        Ok(summary)
    }

    /// Call every module's `finalize`, in order.
    ///
    /// All modules are finalized; the first failure is returned.
    pub fn finalize(&mut self) -> Result<(), PipelineError> {
        let mut first_error = None;
        for entry in &self.modules {
            if let Err(source) = entry.module.finalize() {
                warn!(module = %entry.info, error = %source, "finalize failed");
                first_error.get_or_insert(PipelineError::Finalize {
                    module: entry.info.to_string(),
                    source,
                });
            }
        }
        self.initialized = false;
        first_error.map_or(Ok(()), Err)
    }

    /// Release every module's subscriptions, newest module first.
    ///
    /// Modules are dropped after their subscriptions are released. The
    /// first release failure is returned.
    pub fn shutdown(mut self) -> Result<(), PipelineError> {
        let mut first_error = None;
        while let Some(entry) = self.modules.pop() {
            let ModuleEntry {
                info,
                module,
                subscriptions,
                ..
            } = entry;
            if let Err(source) = subscriptions.release() {
                first_error.get_or_insert(PipelineError::Release {
                    module: info.to_string(),
                    source,
                });
            }
            drop(module);
        }
        info!("pipeline shut down");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Subscriptions log their own release failures.
        while let Some(entry) = self.modules.pop() {
            drop(entry);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("modules", &self.modules.len())
            .field("next_event", &self.next_event)
            .field("initialized", &self.initialized)
            .finish()
    }
}

// Compile-time assertion: a pipeline can be moved to another thread.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<Pipeline>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    struct Noop;

    impl Module for Noop {
        fn run(&self, _event: &mut Event<'_>) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    #[test]
    fn build_requires_a_module() {
        let err = PipelineBuilder::new(PipelineConfig::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::NoModules)));
    }

    #[test]
    fn failed_factory_leaves_no_delegates() {
        let mut builder = PipelineBuilder::new(PipelineConfig::default());
        let err = builder
            .add_module(ModuleInfo::new("broken"), |subs| {
                subs.bind_multi::<u32>(spindle_core::MsgFlags::NONE);
                Err::<Noop, _>(ModuleError::failed("bad parameter"))
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::Construction { .. }));
        assert_eq!(builder.messenger().delegate_count(), 0);
    }

    #[test]
    fn event_ids_continue_across_runs() {
        let mut builder = PipelineBuilder::new(PipelineConfig::default());
        builder
            .add_module(ModuleInfo::new("noop"), |_| Ok(Noop))
            .unwrap();
        let mut pipeline = builder.build().unwrap();
        assert_eq!(pipeline.run(3).unwrap().events_processed, 3);
        assert_eq!(pipeline.next_event(), EventId(3));
        pipeline.run(2).unwrap();
        assert_eq!(pipeline.next_event(), EventId(5));
        pipeline.shutdown().unwrap();
    }
}
