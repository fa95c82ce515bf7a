//! The [`Messenger`]: registration, removal and dispatch of messages.
//!
//! All registry access goes through one mutex. Dispatch holds the lock
//! only while it collects matching delegates; the delegate actions then
//! run without the lock against the caller's [`EventInbox`], so workers
//! processing different events only contend for the lookup.

use std::any::{type_name, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use spindle_core::{
    AnyMessage, DelegateId, DispatchError, MessengerError, MissingInput, ModuleId, ModuleInfo,
    MsgFlags, Payload, SharedMessage,
};

use crate::delegate::{DelegateKind, DelegateSummary, Subject};
use crate::inbox::{DispatchRecord, EventInbox};
use crate::registry::{Registry, RouteEntry};
use crate::subscriptions::Subscriptions;

/// Point-in-time copy of the dispatch counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessengerStats {
    /// Messages passed to dispatch.
    pub dispatched: u64,
    /// Successful deliveries, summed over all delegates.
    pub delivered: u64,
    /// Dispatched messages that matched no delegate at all.
    pub unreceived: u64,
    /// Delegate actions that failed.
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    unreceived: AtomicU64,
    failures: AtomicU64,
}

/// Shared dispatcher routing messages between modules.
///
/// A `Messenger` is created once per pipeline, wrapped in an [`Arc`] and
/// shared by every module and worker. Modules subscribe through
/// [`Messenger::subscriptions`]; producers dispatch into the inbox of the
/// event they are processing.
///
/// ```
/// use std::sync::Arc;
/// use spindle_core::{EventId, Message, ModuleInfo, MsgFlags};
/// use spindle_messenger::{EventInbox, Messenger};
///
/// struct Hit(u32);
///
/// let messenger = Arc::new(Messenger::new());
/// let mut subs = messenger.subscriptions(ModuleInfo::new("consumer"));
/// let hits = subs.bind_multi::<Hit>(MsgFlags::NONE);
///
/// let producer = ModuleInfo::new("producer");
/// let mut inbox = EventInbox::new(EventId(0));
/// messenger
///     .dispatch(&producer, Arc::new(Message::new(vec![Hit(7)])), "", &mut inbox)
///     .unwrap();
/// assert_eq!(inbox.multi(&hits)[0].data()[0].0, 7);
/// ```
pub struct Messenger {
    registry: Mutex<Registry>,
    counters: Counters,
}

impl Default for Messenger {
    fn default() -> Self {
        Self::new()
    }
}

impl Messenger {
    /// Create a messenger with no delegates.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            counters: Counters::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a registration guard for `module`.
    ///
    /// Every delegate registered through the guard is removed again when
    /// it is released or dropped.
    pub fn subscriptions(self: &Arc<Self>, module: impl Into<Arc<ModuleInfo>>) -> Subscriptions {
        Subscriptions::new(Arc::clone(self), module.into())
    }

    // ── Registration ───────────────────────────────────────────

    pub(crate) fn register_delegate(
        &self,
        subject: Subject,
        module: &Arc<ModuleInfo>,
        name: Option<&str>,
        flags: MsgFlags,
        kind: DelegateKind,
    ) -> DelegateId {
        let id = self.lock().insert(subject, module, name, flags, kind);
        debug!(
            delegate = %id,
            module = %module,
            message_type = subject.type_name(),
            instance = name.unwrap_or(module.input()),
            flags = %flags,
            "registered delegate"
        );
        id
    }

    /// Remove a delegate.
    ///
    /// Fails with [`MessengerError::UnregisteredDelegate`] if `delegate`
    /// was never registered or has already been removed.
    pub fn remove_delegate(&self, delegate: DelegateId) -> Result<(), MessengerError> {
        let removed = self.lock().remove(delegate)?;
        debug!(
            delegate = %delegate,
            module = %removed.module,
            message_type = removed.type_name,
            "removed delegate"
        );
        Ok(())
    }

    pub(crate) fn declare_output(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        module: ModuleId,
    ) {
        self.lock().declare_output(type_id, type_name, module);
    }

    pub(crate) fn retract_output(&self, type_id: TypeId, module: ModuleId) {
        self.lock().retract_output(type_id, module);
    }

    /// Check that every typed subscription has a declared producer.
    ///
    /// Returns one [`MessengerError::TypeMismatch`] per offending delegate.
    /// Wildcard filters never violate the check.
    pub fn validate_contracts(&self) -> Result<(), Vec<MessengerError>> {
        let violations = self.lock().contract_violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    // ── Dispatch ───────────────────────────────────────────────

    /// Dispatch a typed message under instance `name`.
    ///
    /// See [`dispatch_any`](Self::dispatch_any).
    pub fn dispatch<T: Payload>(
        &self,
        sender: &ModuleInfo,
        message: SharedMessage<T>,
        name: &str,
        inbox: &mut EventInbox,
    ) -> Result<usize, DispatchError> {
        self.dispatch_any(sender, AnyMessage::new(message), name, inbox)
    }

    /// Deliver `message` to every matching delegate, in registration order.
    ///
    /// Delivery continues past failing delegates; all failures are returned
    /// together once every delegate has been tried. Returns the number of
    /// delegates that took the message. The dispatch is appended to the
    /// inbox log either way.
    pub fn dispatch_any(
        &self,
        sender: &ModuleInfo,
        message: AnyMessage,
        name: &str,
        inbox: &mut EventInbox,
    ) -> Result<usize, DispatchError> {
        let (candidates, message_type) = {
            let registry = self.lock();
            let candidates =
                registry.lookup(message.payload_type(), name, message.detector(), true);
            (candidates, registry.message_type(message.payload_type()))
        };
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        if candidates.is_empty() {
            self.counters.unreceived.fetch_add(1, Ordering::Relaxed);
            debug!(
                sender = %sender,
                message_type = message.type_name(),
                instance = name,
                "dispatched message has no receiver"
            );
        }

        let mut delivered = 0;
        let mut failures = Vec::new();
        for delegate in &candidates {
            debug_assert!(delegate.matches(&message, message_type, name));
            match delegate.act(&message, name, &mut *inbox) {
                Ok(true) => {
                    delivered += 1;
                    trace!(delegate = %delegate.id, receiver = %delegate.module, "delivered");
                }
                Ok(false) => {
                    trace!(delegate = %delegate.id, receiver = %delegate.module, "filtered out");
                }
                Err(err) => {
                    debug!(delegate = %delegate.id, error = %err, "delivery failed");
                    failures.push(err);
                }
            }
        }

        self.counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.counters
            .failures
            .fetch_add(failures.len() as u64, Ordering::Relaxed);
        let payload_type = message.type_name();
        inbox.record(DispatchRecord {
            message,
            message_type: payload_type,
            name: name.to_string(),
            sender: sender.to_string(),
            delivered,
            failed: failures.len(),
        });

        match DispatchError::from_failures(payload_type, failures, delivered) {
            Some(err) => Err(err),
            None => Ok(delivered),
        }
    }

    /// Whether dispatching a `T` message under `name` from `detector`
    /// would invoke at least one non-filter delegate.
    pub fn has_receiver<T: Payload>(&self, name: &str, detector: Option<&str>) -> bool {
        self.lock()
            .lookup(TypeId::of::<T>(), name, detector, false)
            .iter()
            .any(|d| !d.is_filter())
    }

    /// [`has_receiver`](Self::has_receiver) for an already built message.
    pub fn has_receiver_for(&self, message: &AnyMessage, name: &str) -> bool {
        self.lock()
            .lookup(message.payload_type(), name, message.detector(), false)
            .iter()
            .any(|d| !d.is_filter())
    }

    // ── End of event ───────────────────────────────────────────

    /// REQUIRED delegates that received nothing in `inbox`.
    ///
    /// With `module` set, only that module's delegates are checked.
    pub fn unsatisfied_requirements(
        &self,
        inbox: &EventInbox,
        module: Option<ModuleId>,
    ) -> Vec<MissingInput> {
        self.lock()
            .required()
            .filter(|d| module.is_none_or(|m| d.owning_module() == m))
            .filter(|d| !inbox.is_fulfilled(d.id))
            .map(|d| Registry::missing_input(d))
            .collect()
    }

    /// REQUIRED delegates of `module`, in registration order.
    ///
    /// Callers that check the same module every event take this snapshot
    /// once and test it against each inbox without touching the registry.
    pub fn required_inputs(&self, module: ModuleId) -> Vec<(DelegateId, MissingInput)> {
        self.lock()
            .required()
            .filter(|d| d.owning_module() == module)
            .map(|d| (d.id, Registry::missing_input(d)))
            .collect()
    }

    /// Verify REQUIRED delegates, then clear the inbox.
    ///
    /// The inbox is cleared even when verification fails, so delivered
    /// messages never outlive their event.
    pub fn reset_event_state(&self, inbox: &mut EventInbox) -> Result<(), MessengerError> {
        self.reset_event_state_excluding(inbox, &[])
    }

    /// [`reset_event_state`](Self::reset_event_state), ignoring REQUIRED
    /// delegates owned by the `excluded` modules.
    pub fn reset_event_state_excluding(
        &self,
        inbox: &mut EventInbox,
        excluded: &[ModuleId],
    ) -> Result<(), MessengerError> {
        let missing: Vec<MissingInput> = self
            .lock()
            .required()
            .filter(|d| !excluded.contains(&d.owning_module()))
            .filter(|d| !inbox.is_fulfilled(d.id))
            .map(|d| Registry::missing_input(d))
            .collect();
        let event = inbox.event();
        inbox.clear();
        if missing.is_empty() {
            trace!(event = %event, "event state reset");
            Ok(())
        } else {
            debug!(event = %event, missing = missing.len(), "required input missing");
            Err(MessengerError::UnsatisfiedRequirement { missing })
        }
    }

    // ── Introspection ──────────────────────────────────────────

    /// Number of registered delegates.
    pub fn delegate_count(&self) -> usize {
        self.lock().len()
    }

    /// Delegates owned by `module`, in registration order.
    pub fn delegates_of(&self, module: ModuleId) -> Vec<DelegateSummary> {
        self.lock().delegates_of(module)
    }

    /// Sorted snapshot of the routing table.
    pub fn routes(&self) -> Vec<RouteEntry> {
        self.lock().routes()
    }

    /// Whether the forward and reverse registry indexes agree.
    pub fn is_consistent(&self) -> bool {
        self.lock().is_consistent()
    }

    /// Current dispatch counters.
    pub fn stats(&self) -> MessengerStats {
        MessengerStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            unreceived: self.counters.unreceived.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Messenger {
    fn drop(&mut self) {
        let remaining = self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if remaining > 0 {
            warn!(remaining, "messenger dropped with delegates still registered");
        }
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("delegates", &self.delegate_count())
            .field("stats", &self.stats())
            .finish()
    }
}

// Compile-time assertion: the messenger is shared across worker threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Messenger>();
};

/// Payload type name as reported in errors and logs.
pub(crate) fn payload_name<T: Payload>() -> &'static str {
    type_name::<T>()
}
