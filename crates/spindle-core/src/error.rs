//! Error types for the Spindle message bus.
//!
//! [`MessengerError`] covers the individual failure kinds of the bus.
//! [`DispatchError`] aggregates the per-delegate failures of one dispatch
//! call, since delivery continues past a failing delegate.

use std::fmt;

use thiserror::Error;

use crate::id::DelegateId;

/// A REQUIRED subscription that received nothing during an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingInput {
    /// Display name of the owning module (`name` or `name:detector`).
    pub module: String,
    /// Payload type the subscription listens to, or `"*"` for wildcards.
    pub message_type: &'static str,
    /// Required instance name, `None` when the name is ignored.
    pub name: Option<String>,
}

impl fmt::Display for MissingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' in module '{}'", self.message_type, self.module)?;
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            write!(f, " (name '{name}')")?;
        }
        Ok(())
    }
}

fn join_missing(missing: &[MissingInput]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn name_suffix(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!(" named '{name}'")
    }
}

/// Failure kinds of the message bus.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MessengerError {
    /// A single-bind slot received a second message in the same event
    /// without `ALLOW_OVERWRITE`.
    #[error(
        "module '{module}' received a second '{message_type}' message{} in one event",
        name_suffix(.name)
    )]
    DuplicateBinding {
        /// Display name of the receiving module.
        module: String,
        /// Payload type of the rejected message.
        message_type: &'static str,
        /// Instance name the message was dispatched under.
        name: String,
    },

    /// One or more REQUIRED subscriptions received nothing by end of event.
    #[error("required input not delivered: {}", join_missing(.missing))]
    UnsatisfiedRequirement {
        /// Every unsatisfied subscription, in registration order.
        missing: Vec<MissingInput>,
    },

    /// Removal requested for a delegate that is not registered.
    #[error("delegate {delegate} is not registered")]
    UnregisteredDelegate {
        /// The unknown delegate.
        delegate: DelegateId,
    },

    /// A subscription listens to a type no module declares as output.
    #[error("module '{module}' subscribes to '{message_type}' but no module produces it")]
    TypeMismatch {
        /// Display name of the subscribing module.
        module: String,
        /// The subscribed payload type.
        message_type: &'static str,
    },
}

/// Failures collected while dispatching one message.
///
/// Delivery is attempted on every matching delegate even after one fails,
/// so a single dispatch can produce several failures. [`first`] is the
/// failure of the earliest-registered delegate.
///
/// [`first`]: DispatchError::first
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("dispatch of '{message_type}' failed: {first}{}", more_suffix(.others))]
pub struct DispatchError {
    message_type: &'static str,
    first: MessengerError,
    others: Vec<MessengerError>,
    delivered: usize,
}

fn more_suffix(others: &[MessengerError]) -> String {
    if others.is_empty() {
        String::new()
    } else {
        format!(" (and {} more)", others.len())
    }
}

impl DispatchError {
    /// Build from the failures of one dispatch; `None` when there were none.
    pub fn from_failures(
        message_type: &'static str,
        failures: Vec<MessengerError>,
        delivered: usize,
    ) -> Option<Self> {
        let mut failures = failures.into_iter();
        let first = failures.next()?;
        Some(Self {
            message_type,
            first,
            others: failures.collect(),
            delivered,
        })
    }

    /// Payload type of the dispatched message.
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    /// Failure of the earliest-registered failing delegate.
    pub fn first(&self) -> &MessengerError {
        &self.first
    }

    /// All failures in registration order.
    pub fn failures(&self) -> impl Iterator<Item = &MessengerError> {
        std::iter::once(&self.first).chain(self.others.iter())
    }

    /// Number of failures.
    pub fn failure_count(&self) -> usize {
        1 + self.others.len()
    }

    /// Number of delegates that still took the message.
    pub fn delivered(&self) -> usize {
        self.delivered
    }
}
