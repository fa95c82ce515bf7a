//! Strongly-typed identifiers for modules, delegates, message types and events.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Counter for unique [`ModuleId`] allocation.
static MODULE_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Identifies a module instance.
///
/// Allocated from a monotonic atomic counter via [`ModuleId::next`], so two
/// module instances never share an ID within a process, even when they have
/// the same name and detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    /// Allocate a fresh, unique module ID. Thread-safe.
    pub fn next() -> Self {
        Self(MODULE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one registered delegate.
///
/// Delegate IDs are handed out by a messenger in strictly increasing order,
/// so comparing two IDs from the same messenger compares their registration
/// order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelegateId(pub u64);

impl fmt::Display for DelegateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for DelegateId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Interned identifier of a message payload type.
///
/// Assigned sequentially by the registry the first time a type is
/// subscribed to or declared as an output. `MessageTypeId(n)` is the n-th
/// distinct payload type seen by that registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageTypeId(pub u32);

impl fmt::Display for MessageTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MessageTypeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Sequence number of one processed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
