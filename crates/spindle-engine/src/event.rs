//! Execution context handed to a module for one event.
//!
//! [`Event`] pairs the shared [`Messenger`] with the inbox of the event
//! being processed and the identity of the module currently running.
//! Producers dispatch through it; consumers read their handles from it.

use std::sync::Arc;

use tracing::warn;

use spindle_core::{
    AnyMessage, DispatchError, EventId, Message, ModuleInfo, Payload, SharedMessage,
};
use spindle_messenger::{EventInbox, Filtered, FilteredAny, Messenger, Multi, Single};

/// Per-module view of the event being processed.
pub struct Event<'a> {
    id: EventId,
    seed: u64,
    messenger: &'a Messenger,
    module: &'a ModuleInfo,
    inbox: &'a mut EventInbox,
    warn_unreceived: bool,
}

impl<'a> Event<'a> {
    /// Construct an event context.
    ///
    /// Called by the pipeline for each module; tests may build one
    /// directly around their own inbox.
    pub fn new(
        messenger: &'a Messenger,
        module: &'a ModuleInfo,
        inbox: &'a mut EventInbox,
        seed: u64,
    ) -> Self {
        Self {
            id: inbox.event(),
            seed,
            messenger,
            module,
            inbox,
            warn_unreceived: false,
        }
    }

    pub(crate) fn warn_unreceived(mut self, enabled: bool) -> Self {
        self.warn_unreceived = enabled;
        self
    }

    /// The event being processed.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Seed derived from the pipeline seed and the event ID.
    ///
    /// Identical for every module within one event and independent of
    /// which worker processes it.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The module currently running.
    pub fn module(&self) -> &ModuleInfo {
        self.module
    }

    /// Read-only view of the event's inbox.
    pub fn inbox(&self) -> &EventInbox {
        self.inbox
    }

    // ── Sending ────────────────────────────────────────────────

    /// Dispatch an unnamed message.
    pub fn dispatch<T: Payload>(&mut self, message: Message<T>) -> Result<usize, DispatchError> {
        self.dispatch_shared(Arc::new(message), "")
    }

    /// Dispatch a message under instance `name`.
    pub fn dispatch_named<T: Payload>(
        &mut self,
        message: Message<T>,
        name: &str,
    ) -> Result<usize, DispatchError> {
        self.dispatch_shared(Arc::new(message), name)
    }

    /// Dispatch an already shared message under instance `name`.
    ///
    /// Returns the number of delegates that took the message.
    pub fn dispatch_shared<T: Payload>(
        &mut self,
        message: SharedMessage<T>,
        name: &str,
    ) -> Result<usize, DispatchError> {
        self.dispatch_any(AnyMessage::new(message), name)
    }

    /// Dispatch a type-erased message under instance `name`.
    pub fn dispatch_any(
        &mut self,
        message: AnyMessage,
        name: &str,
    ) -> Result<usize, DispatchError> {
        let message_type = message.type_name();
        let delivered = self
            .messenger
            .dispatch_any(self.module, message, name, self.inbox)?;
        if delivered == 0 && self.warn_unreceived {
            warn!(
                event = %self.id,
                sender = %self.module,
                message_type,
                instance = name,
                "message dispatched without receiver"
            );
        }
        Ok(delivered)
    }

    /// Whether an unnamed `T` message from this module would be received
    /// by a non-filter delegate.
    pub fn has_receiver<T: Payload>(&self) -> bool {
        self.has_receiver_named::<T>("")
    }

    /// Whether a `T` message sent under `name` from this module would be
    /// received by a non-filter delegate.
    pub fn has_receiver_named<T: Payload>(&self, name: &str) -> bool {
        self.messenger.has_receiver::<T>(name, self.module.detector())
    }

    // ── Receiving ──────────────────────────────────────────────

    /// Message bound to a single-bind handle, if one arrived.
    pub fn single<T: Payload>(&self, handle: &Single<T>) -> Option<SharedMessage<T>> {
        self.inbox.single(handle)
    }

    /// Messages bound to a multi-bind handle, in dispatch order.
    pub fn multi<T: Payload>(&self, handle: &Multi<T>) -> Vec<SharedMessage<T>> {
        self.inbox.multi(handle)
    }

    /// Messages a typed filter accepted, in dispatch order.
    pub fn accepted<T: Payload>(&self, handle: &Filtered<T>) -> Vec<SharedMessage<T>> {
        self.inbox.accepted(handle)
    }

    /// Messages a wildcard filter accepted, in dispatch order.
    pub fn accepted_any(&self, handle: &FilteredAny) -> &[AnyMessage] {
        self.inbox.accepted_any(handle)
    }
}

/// Mix the pipeline seed with an event ID (SplitMix64 finalizer).
pub(crate) fn event_seed(base: u64, event: EventId) -> u64 {
    let mut z = base ^ event.0.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
