//! Spindle: a typed in-process message bus and event pipeline.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Spindle sub-crates. For most users, adding `spindle` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use spindle::prelude::*;
//!
//! struct Hit(u32);
//!
//! struct Source;
//! impl Module for Source {
//!     fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
//!         event.dispatch(Message::new(vec![Hit(1), Hit(2)]))?;
//!         Ok(())
//!     }
//! }
//!
//! struct Counter {
//!     hits: Single<Hit>,
//!     seen: Arc<AtomicUsize>,
//! }
//! impl Module for Counter {
//!     fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
//!         if let Some(hits) = event.single(&self.hits) {
//!             self.seen.fetch_add(hits.len(), Ordering::Relaxed);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let seen = Arc::new(AtomicUsize::new(0));
//! let mut builder = PipelineBuilder::new(PipelineConfig::default());
//! builder.add_module(ModuleInfo::new("source"), |subs| {
//!     subs.declare_output::<Hit>();
//!     Ok(Source)
//! }).unwrap();
//! let counter = Arc::clone(&seen);
//! builder.add_module(ModuleInfo::new("counter"), move |subs| {
//!     Ok(Counter { hits: subs.bind_single(MsgFlags::REQUIRED), seen: counter })
//! }).unwrap();
//!
//! let mut pipeline = builder.build().unwrap();
//! let summary = pipeline.run(3).unwrap();
//! assert!(summary.is_success());
//! assert_eq!(seen.load(Ordering::Relaxed), 6);
//! pipeline.shutdown().unwrap();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `spindle-core` | IDs, flags, messages, module identity, errors |
//! | [`messenger`] | `spindle-messenger` | Dispatcher, registry, typed handles, event inbox |
//! | [`engine`] | `spindle-engine` | Module trait, pipeline, worker pool, metrics |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, flags, and errors (`spindle-core`).
///
/// Contains [`types::Message`], [`types::AnyMessage`], [`types::MsgFlags`],
/// [`types::ModuleInfo`] and the bus error types.
pub use spindle_core as types;

/// The message bus (`spindle-messenger`).
///
/// [`messenger::Messenger`] routes messages to delegates registered through
/// a [`messenger::Subscriptions`] guard; [`messenger::EventInbox`] holds
/// what each delegate received during one event.
pub use spindle_messenger as messenger;

/// The event driver (`spindle-engine`).
///
/// [`engine::PipelineBuilder`] constructs modules against a shared
/// messenger; [`engine::Pipeline`] runs them sequentially or on a pool.
pub use spindle_engine as engine;

/// Common imports for typical Spindle usage.
///
/// ```rust
/// use spindle::prelude::*;
/// ```
pub mod prelude {
    // Messages and identity
    pub use spindle_core::{
        AnyMessage, EventId, Message, ModuleId, ModuleInfo, MsgFlags, Payload, SharedMessage,
    };

    // Errors
    pub use spindle_core::{DispatchError, MessengerError, MissingInput};

    // Bus
    pub use spindle_messenger::{
        EventInbox, Filtered, FilteredAny, Messenger, Multi, Single, Subscriptions,
    };

    // Engine
    pub use spindle_engine::{
        Event, EventError, Module, ModuleError, Pipeline, PipelineBuilder, PipelineConfig,
        PipelineError, RunSummary,
    };
}
