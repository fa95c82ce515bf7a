//! Reusable module fixtures.
//!
//! - [`HitSource`]: dispatches a batch of [`Hit`]s under each configured name.
//! - [`HitCollector`]: multi-binds hits and records them into a shared log.
//! - [`ParticleSource`]: dispatches one [`Particle`] on every n-th event.
//! - [`ParticleConsumer`]: REQUIRED single-bind on [`Particle`].
//! - [`FailingModule`]: fails on chosen events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use spindle_core::{EventId, Message, MsgFlags};
use spindle_engine::{Event, Module, ModuleError};
use spindle_messenger::{Multi, Single, Subscriptions};

use crate::{unit_from_seed, Hit, Particle};

/// Hits recorded by a [`HitCollector`]: `(event, hit indices)` per event.
pub type HitLog = Arc<Mutex<Vec<(EventId, Vec<u32>)>>>;

/// Produces `hits_per_name` hits under each name, in order.
pub struct HitSource {
    names: Vec<String>,
    hits_per_name: u32,
    detector: Option<String>,
}

impl HitSource {
    pub fn new(subs: &mut Subscriptions, names: &[&str], hits_per_name: u32) -> Self {
        subs.declare_output::<Hit>();
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            hits_per_name,
            detector: None,
        }
    }

    /// Tag every dispatched message with `detector`.
    pub fn for_detector(mut self, detector: impl Into<String>) -> Self {
        self.detector = Some(detector.into());
        self
    }
}

impl Module for HitSource {
    fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
        let mut index = 0;
        for name in &self.names {
            let hits: Vec<Hit> = (0..self.hits_per_name)
                .map(|_| {
                    let hit = Hit {
                        event: event.id().0,
                        index,
                        charge: unit_from_seed(event.seed().wrapping_add(u64::from(index))),
                    };
                    index += 1;
                    hit
                })
                .collect();
            let message = match &self.detector {
                Some(detector) => Message::for_detector(hits, detector.clone()),
                None => Message::new(hits),
            };
            event.dispatch_named(message, name)?;
        }
        Ok(())
    }
}

/// Records the indices of every hit it receives.
pub struct HitCollector {
    hits: Multi<Hit>,
    log: HitLog,
}

impl HitCollector {
    /// Collect hits sent under the module's input name (or any name with
    /// [`MsgFlags::IGNORE_NAME`]).
    pub fn new(subs: &mut Subscriptions, flags: MsgFlags, log: HitLog) -> Self {
        Self {
            hits: subs.bind_multi(flags),
            log,
        }
    }

    /// Collect hits sent under `name`.
    pub fn named(subs: &mut Subscriptions, name: &str, flags: MsgFlags, log: HitLog) -> Self {
        Self {
            hits: subs.bind_multi_named(name, flags),
            log,
        }
    }
}

impl Module for HitCollector {
    fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
        let indices = event
            .multi(&self.hits)
            .iter()
            .flat_map(|message| message.data().iter().map(|hit| hit.index))
            .collect();
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.id(), indices));
        Ok(())
    }
}

/// Emits one particle on events whose ID is a multiple of `every`.
pub struct ParticleSource {
    every: u64,
}

impl ParticleSource {
    pub fn new(subs: &mut Subscriptions, every: u64) -> Self {
        subs.declare_output::<Particle>();
        Self {
            every: every.max(1),
        }
    }
}

impl Module for ParticleSource {
    fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
        if event.id().0 % self.every == 0 {
            let particle = Particle {
                event: event.id().0,
                energy: unit_from_seed(event.seed()) * 100.0,
            };
            event.dispatch(Message::new(vec![particle]))?;
        }
        Ok(())
    }
}

/// Requires one particle per event and counts the events it saw one in.
pub struct ParticleConsumer {
    particle: Single<Particle>,
    seen: Arc<AtomicUsize>,
}

impl ParticleConsumer {
    pub fn new(subs: &mut Subscriptions, seen: Arc<AtomicUsize>) -> Self {
        Self {
            particle: subs.bind_single(MsgFlags::REQUIRED),
            seen,
        }
    }
}

impl Module for ParticleConsumer {
    fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
        let particle = event
            .single(&self.particle)
            .ok_or_else(|| ModuleError::failed("particle missing"))?;
        if particle.data()[0].event != event.id().0 {
            return Err(ModuleError::failed("particle from another event"));
        }
        self.seen.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Fails on the listed events and succeeds on all others.
///
/// The call counter is shared so tests can read it after the module has
/// been moved into a pipeline.
pub struct FailingModule {
    fail_on: Vec<EventId>,
    call_count: Arc<AtomicUsize>,
}

impl FailingModule {
    pub fn new(fail_on: &[u64]) -> Self {
        Self {
            fail_on: fail_on.iter().copied().map(EventId).collect(),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle to the call counter.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.call_count)
    }
}

impl Module for FailingModule {
    fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_on.contains(&event.id()) {
            return Err(ModuleError::failed(format!(
                "deliberate failure in event {}",
                event.id()
            )));
        }
        Ok(())
    }
}
