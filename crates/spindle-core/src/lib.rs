//! Core types and traits for the Spindle message bus.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Spindle workspace:
//! identifiers, delegate flags, the message container, module metadata,
//! and error types.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod flags;
pub mod id;
pub mod message;
pub mod module;

pub use error::{DispatchError, MessengerError, MissingInput};
pub use flags::MsgFlags;
pub use id::{DelegateId, EventId, MessageTypeId, ModuleId};
pub use message::{AnyMessage, BaseMessage, Message, Payload, SharedMessage};
pub use module::ModuleInfo;
