//! Spindle Quickstart: a three-module pipeline from scratch.
//!
//! Demonstrates:
//!   1. Declaring payload types and modules
//!   2. Subscribing with single, multi and filter bindings
//!   3. Building a pipeline with strict contracts
//!   4. Running events sequentially and on a worker pool
//!   5. Shutting down and checking the bus is empty
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example quickstart

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use spindle_core::{Message, ModuleInfo, MsgFlags, SharedMessage};
use spindle_engine::{Event, Module, ModuleError, PipelineBuilder, PipelineConfig};
use spindle_messenger::{Filtered, Multi, Single, Subscriptions};

// ─── Payloads ───────────────────────────────────────────────────

/// Raw energy deposit in ADC counts.
struct Deposit {
    counts: u32,
}

/// Deposit converted to MeV.
struct Energy {
    mev: f64,
}

// ─── Digitizer: produces raw deposits ───────────────────────────

struct Digitizer {
    channels: u32,
}

impl Module for Digitizer {
    fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
        let seed = event.seed();
        let deposits = (0..self.channels)
            .map(|channel| Deposit {
                counts: ((seed >> (channel % 48)) & 0x3ff) as u32,
            })
            .collect();
        event.dispatch(Message::new(deposits))?;
        Ok(())
    }
}

// ─── Calibrator: deposits → energies ────────────────────────────
//
// Single-binds the deposits and requires them every event.

struct Calibrator {
    deposits: Single<Deposit>,
    gain: f64,
}

impl Calibrator {
    fn new(subs: &mut Subscriptions, gain: f64) -> Self {
        subs.declare_output::<Energy>();
        Self {
            deposits: subs.bind_single(MsgFlags::REQUIRED),
            gain,
        }
    }
}

impl Module for Calibrator {
    fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
        let deposits = event
            .single(&self.deposits)
            .ok_or_else(|| ModuleError::failed("no deposits"))?;
        let energies: Vec<Energy> = deposits
            .data()
            .iter()
            .map(|d| Energy {
                mev: f64::from(d.counts) * self.gain,
            })
            .collect();
        event.dispatch(Message::new(energies))?;
        Ok(())
    }
}

// ─── Summer: accumulates totals, counts hot events ──────────────

struct Summer {
    energies: Multi<Energy>,
    hot: Filtered<Energy>,
    total_kev: Arc<AtomicU64>,
    hot_events: Arc<AtomicUsize>,
}

impl Summer {
    fn new(
        subs: &mut Subscriptions,
        total_kev: Arc<AtomicU64>,
        hot_events: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            energies: subs.bind_multi(MsgFlags::NONE),
            hot: subs.register_filter(MsgFlags::NONE, |message: &SharedMessage<Energy>| {
                message.data().iter().any(|e| e.mev > 40.0)
            }),
            total_kev,
            hot_events,
        }
    }
}

impl Module for Summer {
    fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
        let sum: f64 = event
            .multi(&self.energies)
            .iter()
            .flat_map(|m| m.data().iter().map(|e| e.mev))
            .sum();
        self.total_kev.fetch_add((sum * 1000.0) as u64, Ordering::Relaxed);
        if !event.accepted(&self.hot).is_empty() {
            self.hot_events.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = PipelineConfig {
        worker_count: Some(4),
        strict_contracts: true,
        seed: 42,
        ..PipelineConfig::default()
    };

    let total_kev = Arc::new(AtomicU64::new(0));
    let hot_events = Arc::new(AtomicUsize::new(0));

    let mut builder = PipelineBuilder::new(config);
    builder.add_module(ModuleInfo::new("digitizer"), |subs| {
        subs.declare_output::<Deposit>();
        Ok(Digitizer { channels: 16 })
    })?;
    builder.add_module(ModuleInfo::new("calibrator"), |subs| {
        Ok(Calibrator::new(subs, 0.05))
    })?;
    let (total, hot) = (Arc::clone(&total_kev), Arc::clone(&hot_events));
    builder.add_module(ModuleInfo::new("summer"), move |subs| {
        Ok(Summer::new(subs, total, hot))
    })?;
    let mut pipeline = builder.build()?;
    let messenger = Arc::clone(pipeline.messenger());

    for route in messenger.routes() {
        println!(
            "route {:<24} name={:?} delegates={:?}",
            route.message_type.unwrap_or("*"),
            route.name,
            route.delegates
        );
    }

    let warmup = pipeline.run(10)?;
    println!(
        "sequential: {} events, mean {} us/event",
        warmup.events_processed,
        warmup.metrics.mean_event_us()
    );

    let summary = pipeline.run_parallel(1_000)?;
    println!(
        "parallel:   {} events, {} failed, wall {} us",
        summary.events_processed,
        summary.failures.len(),
        summary.metrics.wall_us
    );
    println!(
        "total energy {:.1} MeV, {} hot events",
        total_kev.load(Ordering::Relaxed) as f64 / 1000.0,
        hot_events.load(Ordering::Relaxed)
    );

    let stats = messenger.stats();
    println!(
        "bus: {} dispatched, {} delivered, {} unreceived",
        stats.dispatched, stats.delivered, stats.unreceived
    );

    pipeline.finalize()?;
    pipeline.shutdown()?;
    assert_eq!(messenger.delegate_count(), 0);
    Ok(())
}
