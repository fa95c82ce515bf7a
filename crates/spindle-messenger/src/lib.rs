//! Typed publish/subscribe dispatcher connecting Spindle modules.
//!
//! The [`Messenger`] routes [`Message`](spindle_core::Message)s from
//! producing modules to the delegates other modules registered through a
//! [`Subscriptions`] guard. Delivered messages land in the per-event
//! [`EventInbox`], never in module fields, so events sharing the same
//! module instances can be processed in parallel.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod delegate;
pub mod handle;
pub mod inbox;
pub mod messenger;
pub mod registry;
pub mod subscriptions;

pub use delegate::{DelegateKindTag, DelegateSummary};
pub use handle::{Filtered, FilteredAny, Multi, Single};
pub use inbox::{DispatchRecord, EventInbox, SlotOccupied, SlotSink};
pub use messenger::{Messenger, MessengerStats};
pub use registry::RouteEntry;
pub use subscriptions::Subscriptions;
