//! Per-event driver shared by the sequential and parallel run modes.
//!
//! [`process_event`] runs every module once against one inbox.
//! [`worker_loop`] is the body of a pool thread: it receives event IDs
//! over a crossbeam channel, processes each with its own reusable inbox,
//! and sends the outcome back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, debug_span, trace};

use spindle_core::{EventId, ModuleId};
use spindle_messenger::{EventInbox, Messenger};

use crate::config::PipelineConfig;
use crate::error::EventError;
use crate::event::{event_seed, Event};
use crate::metrics::EventMetrics;
use crate::pipeline::ModuleEntry;

/// Result of one event, reported by a worker.
pub(crate) struct EventOutcome {
    pub(crate) event: EventId,
    pub(crate) result: Result<EventMetrics, EventError>,
}

/// Borrowed state every worker needs.
#[derive(Clone, Copy)]
pub(crate) struct Driver<'p> {
    pub(crate) modules: &'p [ModuleEntry],
    pub(crate) messenger: &'p Messenger,
    pub(crate) config: &'p PipelineConfig,
}

/// Run every module once for the event `inbox` belongs to.
///
/// The inbox is empty again when this returns, whatever the outcome.
pub(crate) fn process_event(
    driver: Driver<'_>,
    inbox: &mut EventInbox,
) -> Result<EventMetrics, EventError> {
    let event = inbox.event();
    let span = debug_span!("event", id = %event);
    let _enter = span.enter();

    let start = Instant::now();
    let seed = event_seed(driver.config.seed, event);
    let mut metrics = EventMetrics::default();
    let mut skipped: Vec<ModuleId> = Vec::new();

    for entry in driver.modules {
        if driver.config.skip_unsatisfied_modules {
            let mut missing = entry
                .required
                .iter()
                .filter(|(delegate, _)| !inbox.is_fulfilled(*delegate))
                .map(|(_, input)| input);
            if let Some(first) = missing.next() {
                debug!(
                    module = %entry.info,
                    input = %first,
                    others = missing.count(),
                    "skipping module with missing required input"
                );
                metrics.skipped_modules += 1;
                skipped.push(entry.info.id());
                continue;
            }
        }

        let module_start = Instant::now();
        let result = {
            let mut ctx = Event::new(driver.messenger, &entry.info, inbox, seed)
                .warn_unreceived(driver.config.strict_contracts);
            entry.module.run(&mut ctx)
        };
        let elapsed = module_start.elapsed().as_micros() as u64;
        trace!(module = %entry.info, elapsed_us = elapsed, "module done");

        if let Err(source) = result {
            inbox.clear();
            return Err(EventError::Module {
                event,
                module: entry.info.to_string(),
                source,
            });
        }
        metrics.module_us.push((entry.info.to_string(), elapsed));
    }

    metrics.dispatches = inbox.log().len() as u32;
    metrics.messages_held = inbox.message_count();
    // Inputs of skipped modules are already accounted for.
    driver
        .messenger
        .reset_event_state_excluding(inbox, &skipped)
        .map_err(|source| EventError::Requirements { event, source })?;
    metrics.total_us = start.elapsed().as_micros() as u64;
    Ok(metrics)
}

/// Main loop of a pool worker.
///
/// Runs until the job channel is closed. Once `abort` is raised, queued
/// events are drained without being processed.
pub(crate) fn worker_loop(
    index: usize,
    driver: Driver<'_>,
    jobs: Receiver<EventId>,
    results: Sender<EventOutcome>,
    abort: &AtomicBool,
) {
    debug!(worker = index, "worker started");
    let mut inbox = EventInbox::default();
    let mut processed = 0u64;
    while let Ok(event) = jobs.recv() {
        if abort.load(Ordering::Acquire) {
            continue;
        }
        inbox.begin(event);
        let result = process_event(driver, &mut inbox);
        if result.is_err() && driver.config.stop_on_error {
            abort.store(true, Ordering::Release);
        }
        processed += 1;
        if results.send(EventOutcome { event, result }).is_err() {
            break;
        }
    }
    debug!(worker = index, processed, "worker stopped");
}
