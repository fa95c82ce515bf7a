//! Test utilities and fixture types for Spindle development.
//!
//! Provides plain payload types ([`Hit`], [`Particle`]) and a handful of
//! fixture modules in [`fixtures`] for building test pipelines.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    FailingModule, HitCollector, HitLog, HitSource, ParticleConsumer, ParticleSource,
};

/// A detector hit.
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    /// Event the hit was produced in.
    pub event: u64,
    /// Position of the hit within its message.
    pub index: u32,
    /// Deposited charge, derived from the event seed.
    pub charge: f64,
}

/// A simulated particle.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub event: u64,
    pub energy: f64,
}

/// Map a seed to a value in `[0, 1)`.
pub fn unit_from_seed(seed: u64) -> f64 {
    (seed >> 11) as f64 / (1u64 << 53) as f64
}
