//! Per-event slot storage.
//!
//! Every event being processed owns one [`EventInbox`]. Delegates write
//! the messages they take into the inbox slot keyed by their
//! [`DelegateId`]; modules read them back through typed handles. Clearing
//! the inbox at the end of the event drops the last bus-held reference to
//! every delivered message.

use indexmap::IndexMap;
use smallvec::SmallVec;

use spindle_core::{AnyMessage, DelegateId, EventId, Payload, SharedMessage};

use crate::handle::{Filtered, FilteredAny, Multi, Single};

/// Returned by [`SlotSink::write_slot`] when a single slot is already
/// filled and overwriting was not allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotOccupied;

/// Write access to delegate slots, handed to delegate actions.
pub trait SlotSink {
    /// Store `message` as the single value of the slot.
    ///
    /// Fails with [`SlotOccupied`] if the slot already holds a message and
    /// `overwrite` is false; the slot is left untouched in that case.
    fn write_slot(
        &mut self,
        delegate: DelegateId,
        message: AnyMessage,
        overwrite: bool,
    ) -> Result<(), SlotOccupied>;

    /// Append `message` to the slot.
    fn append_slot(&mut self, delegate: DelegateId, message: AnyMessage);
}

/// One entry of the per-event dispatch log.
///
/// The record holds the dispatched message itself, so a message that no
/// delegate took still lives until the inbox is cleared.
#[derive(Clone, Debug)]
pub struct DispatchRecord {
    /// The dispatched message.
    pub message: AnyMessage,
    /// Payload type of the dispatched message.
    pub message_type: &'static str,
    /// Instance name the message was sent under.
    pub name: String,
    /// Display name of the sending module.
    pub sender: String,
    /// Delegates that took the message.
    pub delivered: usize,
    /// Delegates that failed to take it.
    pub failed: usize,
}

type Slot = SmallVec<[AnyMessage; 2]>;

/// Slot arena and dispatch log of one event.
///
/// Slots are created lazily on first delivery, so an inbox only costs
/// memory for subscriptions that actually received something.
#[derive(Debug, Default)]
pub struct EventInbox {
    event: EventId,
    slots: IndexMap<DelegateId, Slot>,
    log: Vec<DispatchRecord>,
}

impl EventInbox {
    /// Create an empty inbox for `event`.
    pub fn new(event: EventId) -> Self {
        Self {
            event,
            slots: IndexMap::new(),
            log: Vec::new(),
        }
    }

    /// Reuse the inbox for another event, keeping allocations.
    pub fn begin(&mut self, event: EventId) {
        self.clear();
        self.event = event;
    }

    /// Drop every delivered message and the dispatch log.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.log.clear();
    }

    /// The event this inbox belongs to.
    pub fn event(&self) -> EventId {
        self.event
    }

    /// Dispatches made during this event, in call order.
    pub fn log(&self) -> &[DispatchRecord] {
        &self.log
    }

    pub(crate) fn record(&mut self, record: DispatchRecord) {
        self.log.push(record);
    }

    /// Raw slot contents for a delegate, empty if it received nothing.
    pub fn received(&self, delegate: DelegateId) -> &[AnyMessage] {
        self.slots
            .get(&delegate)
            .map(|slot| slot.as_slice())
            .unwrap_or_default()
    }

    /// Whether the delegate took at least one message this event.
    pub fn is_fulfilled(&self, delegate: DelegateId) -> bool {
        self.slots.get(&delegate).is_some_and(|slot| !slot.is_empty())
    }

    /// Total messages held across all slots.
    pub fn message_count(&self) -> usize {
        self.slots.values().map(SmallVec::len).sum()
    }

    /// Latest message bound to a single-bind handle.
    pub fn single<T: Payload>(&self, handle: &Single<T>) -> Option<SharedMessage<T>> {
        self.received(handle.id()).last()?.downcast::<T>()
    }

    /// Every message bound to a multi-bind handle, in dispatch order.
    pub fn multi<T: Payload>(&self, handle: &Multi<T>) -> Vec<SharedMessage<T>> {
        self.typed(handle.id())
    }

    /// Messages a typed filter accepted, in dispatch order.
    pub fn accepted<T: Payload>(&self, handle: &Filtered<T>) -> Vec<SharedMessage<T>> {
        self.typed(handle.id())
    }

    /// Messages a wildcard filter accepted, in dispatch order.
    pub fn accepted_any(&self, handle: &FilteredAny) -> &[AnyMessage] {
        self.received(handle.id())
    }

    fn typed<T: Payload>(&self, delegate: DelegateId) -> Vec<SharedMessage<T>> {
        self.received(delegate)
            .iter()
            .filter_map(AnyMessage::downcast::<T>)
            .collect()
    }
}

impl SlotSink for EventInbox {
    fn write_slot(
        &mut self,
        delegate: DelegateId,
        message: AnyMessage,
        overwrite: bool,
    ) -> Result<(), SlotOccupied> {
        let slot = self.slots.entry(delegate).or_default();
        if !slot.is_empty() && !overwrite {
            return Err(SlotOccupied);
        }
        slot.clear();
        slot.push(message);
        Ok(())
    }

    fn append_slot(&mut self, delegate: DelegateId, message: AnyMessage) {
        self.slots.entry(delegate).or_default().push(message);
    }
}
