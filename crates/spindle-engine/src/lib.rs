//! Event driver for Spindle pipelines.
//!
//! A [`Pipeline`] owns a set of long-lived [`Module`]s sharing one
//! [`Messenger`](spindle_messenger::Messenger). Each event runs every
//! module once, in registration order, against a fresh
//! [`EventInbox`](spindle_messenger::EventInbox); the end of the event
//! verifies REQUIRED subscriptions and releases every delivered message.
//! Events can be processed sequentially or by a pool of worker threads.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod module;
pub mod pipeline;
mod worker;

pub use config::{ConfigError, PipelineConfig};
pub use error::{EventError, ModuleError, PipelineError};
pub use event::Event;
pub use metrics::{EventMetrics, RunMetrics};
pub use module::Module;
pub use pipeline::{Pipeline, PipelineBuilder, RunSummary};
