//! The [`Message`] container and its type-erased forms.
//!
//! A message is an immutable sequence of domain objects, optionally tagged
//! with the detector it belongs to. Messages are always shared through
//! [`SharedMessage`]; the bus hands the same allocation to every receiver
//! and never mutates it.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Marker for types that can travel in a [`Message`].
///
/// Blanket-implemented for every `Send + Sync + 'static` type.
pub trait Payload: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Payload for T {}

/// Shared handle to a dispatched message.
pub type SharedMessage<T> = Arc<Message<T>>;

/// Immutable container of domain objects exchanged between modules.
pub struct Message<T> {
    data: Vec<T>,
    detector: Option<String>,
}

impl<T: Payload> Message<T> {
    /// Create a message not associated with any detector.
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            detector: None,
        }
    }

    /// Create a message belonging to the named detector.
    ///
    /// Modules bound to a different detector will not receive it.
    pub fn for_detector(data: Vec<T>, detector: impl Into<String>) -> Self {
        Self {
            data,
            detector: Some(detector.into()),
        }
    }

    /// The carried objects.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// The detector this message belongs to, if any.
    pub fn detector(&self) -> Option<&str> {
        self.detector.as_deref()
    }

    /// Number of carried objects.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the message carries no objects.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> fmt::Debug for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &type_name::<T>())
            .field("objects", &self.data.len())
            .field("detector", &self.detector)
            .finish()
    }
}

/// Type-independent view of a message, handed to wildcard filters.
pub trait BaseMessage: Send + Sync {
    /// Rust type name of the carried objects.
    fn payload_type_name(&self) -> &'static str;

    /// The detector this message belongs to, if any.
    fn detector(&self) -> Option<&str>;

    /// Number of carried objects.
    fn object_count(&self) -> usize;

    /// Convert the shared handle into an `Any` handle for downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Payload> BaseMessage for Message<T> {
    fn payload_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn detector(&self) -> Option<&str> {
        Message::detector(self)
    }

    fn object_count(&self) -> usize {
        self.data.len()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A dispatched message with its payload type erased.
///
/// Cloning is cheap (one reference-count bump).
/// Recover the typed message with [`downcast`](AnyMessage::downcast).
#[derive(Clone)]
pub struct AnyMessage {
    payload_type: TypeId,
    base: Arc<dyn BaseMessage>,
}

impl AnyMessage {
    /// Erase the payload type of a shared message.
    pub fn new<T: Payload>(message: SharedMessage<T>) -> Self {
        Self {
            payload_type: TypeId::of::<T>(),
            base: message,
        }
    }

    /// `TypeId` of the carried objects (not of the container).
    pub fn payload_type(&self) -> TypeId {
        self.payload_type
    }

    /// Rust type name of the carried objects.
    pub fn type_name(&self) -> &'static str {
        self.base.payload_type_name()
    }

    /// The detector this message belongs to, if any.
    pub fn detector(&self) -> Option<&str> {
        self.base.detector()
    }

    /// Type-independent view of the message.
    pub fn base(&self) -> &dyn BaseMessage {
        &*self.base
    }

    /// Recover the typed message, or `None` if `T` is not the payload type.
    pub fn downcast<T: Payload>(&self) -> Option<SharedMessage<T>> {
        self.base.clone().into_any().downcast::<Message<T>>().ok()
    }

    /// Whether both handles point to the same dispatched message.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.base, &other.base)
    }

    /// Number of live handles to the underlying message.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.base)
    }
}

impl fmt::Debug for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyMessage")
            .field("type", &self.type_name())
            .field("objects", &self.base.object_count())
            .field("detector", &self.detector())
            .finish()
    }
}

impl<T: Payload> From<SharedMessage<T>> for AnyMessage {
    fn from(message: SharedMessage<T>) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Deposit(f64);

    #[derive(Debug, PartialEq)]
    struct Pixel(u32, u32);

    #[test]
    fn message_accessors() {
        let msg = Message::for_detector(vec![Deposit(1.0), Deposit(2.5)], "dut");
        assert_eq!(msg.len(), 2);
        assert!(!msg.is_empty());
        assert_eq!(msg.detector(), Some("dut"));
        assert_eq!(msg.data()[1], Deposit(2.5));
    }

    #[test]
    fn erased_message_downcasts_to_payload_type() {
        let shared = Arc::new(Message::new(vec![Pixel(1, 2)]));
        let erased = AnyMessage::new(shared.clone());
        assert_eq!(erased.payload_type(), TypeId::of::<Pixel>());
        let typed = erased.downcast::<Pixel>().unwrap();
        assert!(Arc::ptr_eq(&typed, &shared));
        assert!(erased.downcast::<Deposit>().is_none());
    }

    #[test]
    fn erased_message_shares_allocation() {
        let erased = AnyMessage::new(Arc::new(Message::new(vec![Deposit(0.5)])));
        let copy = erased.clone();
        assert!(erased.ptr_eq(&copy));
        assert_eq!(erased.holders(), 2);
        drop(copy);
        assert_eq!(erased.holders(), 1);
    }

    #[test]
    fn base_view_reports_payload() {
        let erased = AnyMessage::new(Arc::new(Message::for_detector(
            vec![Pixel(0, 0), Pixel(1, 1), Pixel(2, 2)],
            "telescope0",
        )));
        assert_eq!(erased.base().object_count(), 3);
        assert_eq!(erased.detector(), Some("telescope0"));
        assert!(erased.type_name().ends_with("Pixel"));
    }
}
