//! Error types for modules, events and pipelines.

use thiserror::Error;

use spindle_core::{DispatchError, EventId, MessengerError};

use crate::config::ConfigError;

/// Failure reported by a module.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// A dispatch made by the module failed for one or more receivers.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The module's own computation failed.
    #[error("{reason}")]
    Failed {
        /// Human-readable cause.
        reason: String,
    },
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Why one event did not complete.
#[derive(Debug, Error)]
pub enum EventError {
    /// A module returned an error; later modules did not run.
    #[error("event {event}: module '{module}' failed: {source}")]
    Module {
        /// The failed event.
        event: EventId,
        /// Display name of the failing module.
        module: String,
        /// What the module reported.
        #[source]
        source: ModuleError,
    },

    /// REQUIRED subscriptions received nothing during the event.
    #[error("event {event}: {source}")]
    Requirements {
        /// The failed event.
        event: EventId,
        /// The unsatisfied requirements.
        #[source]
        source: MessengerError,
    },
}

impl EventError {
    /// The event that failed.
    pub fn event(&self) -> EventId {
        match self {
            Self::Module { event, .. } | Self::Requirements { event, .. } => *event,
        }
    }
}

fn join_errors(errors: &[MessengerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure to build, start, run or stop a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A module factory failed.
    #[error("failed to construct module '{module}': {source}")]
    Construction {
        /// Display name of the module.
        module: String,
        /// What the factory reported.
        #[source]
        source: ModuleError,
    },

    /// A module failed to initialize.
    #[error("module '{module}' failed to initialize: {source}")]
    Initialize {
        /// Display name of the module.
        module: String,
        /// What the module reported.
        #[source]
        source: ModuleError,
    },

    /// A module failed to finalize.
    #[error("module '{module}' failed to finalize: {source}")]
    Finalize {
        /// Display name of the module.
        module: String,
        /// What the module reported.
        #[source]
        source: ModuleError,
    },

    /// Subscriptions listen to types no module declares as output.
    #[error("{} unproduced subscription(s): {}", .0.len(), join_errors(.0))]
    Contracts(Vec<MessengerError>),

    /// A module's subscriptions could not be released at shutdown.
    #[error("failed to release subscriptions of '{module}': {source}")]
    Release {
        /// Display name of the module.
        module: String,
        /// The first release failure.
        #[source]
        source: MessengerError,
    },

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {reason}")]
    ThreadSpawnFailed {
        /// OS error description.
        reason: String,
    },

    /// A worker thread panicked while processing events.
    #[error("worker thread panicked")]
    WorkerPanicked,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn event_error_exposes_event_and_source() {
        let err = EventError::Module {
            event: EventId(4),
            module: "Digitizer:dut".into(),
            source: ModuleError::failed("adc saturated"),
        };
        assert_eq!(err.event(), EventId(4));
        assert_eq!(
            err.to_string(),
            "event 4: module 'Digitizer:dut' failed: adc saturated"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn contracts_lists_violations() {
        let err = PipelineError::Contracts(vec![
            MessengerError::TypeMismatch {
                module: "a".into(),
                message_type: "Hit",
            },
            MessengerError::TypeMismatch {
                module: "b".into(),
                message_type: "Track",
            },
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 unproduced subscription(s): "));
        assert!(text.contains("'Track'"));
    }
}
