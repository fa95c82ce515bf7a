//! Module identity as seen by the message bus.

use std::fmt;

use crate::id::ModuleId;

/// Identity and routing attributes of a module instance.
///
/// The bus never calls into a module; it only needs to know who owns a
/// delegate, which detector (if any) the module is bound to, and which
/// instance name its subscriptions listen to by default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    id: ModuleId,
    name: String,
    detector: Option<String>,
    input: String,
}

impl ModuleInfo {
    /// A module not bound to a detector, listening to unnamed messages.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ModuleId::next(),
            name: name.into(),
            detector: None,
            input: String::new(),
        }
    }

    /// Bind the module to a detector.
    ///
    /// A detector-bound module only receives messages that carry no
    /// detector or carry this one.
    pub fn with_detector(mut self, detector: impl Into<String>) -> Self {
        self.detector = Some(detector.into());
        self
    }

    /// Set the default instance name subscriptions listen to.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    /// Unique ID of this instance.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Module type name, e.g. `"DetectorHistogrammer"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Detector this instance is bound to.
    pub fn detector(&self) -> Option<&str> {
        self.detector.as_deref()
    }

    /// Default instance name for subscriptions.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Whether a message tagged with `detector` may be delivered here.
    pub fn accepts_detector(&self, detector: Option<&str>) -> bool {
        match (self.detector(), detector) {
            (Some(own), Some(other)) => own == other,
            _ => true,
        }
    }
}

impl fmt::Display for ModuleInfo {
    /// `name` for unique modules, `name:detector` for detector instances.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detector {
            Some(detector) => write!(f, "{}:{}", self.name, detector),
            None => write!(f, "{}", self.name),
        }
    }
}
