//! Typed handles to per-event slots.
//!
//! A handle is what a module keeps after subscribing. It carries only the
//! delegate ID plus the payload type; the slot contents live in the
//! [`EventInbox`](crate::EventInbox) of whichever event is being processed.

use std::fmt;
use std::marker::PhantomData;

use spindle_core::DelegateId;

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<T> {
            id: DelegateId,
            _payload: PhantomData<fn() -> T>,
        }

        impl<T> $name<T> {
            pub(crate) fn new(id: DelegateId) -> Self {
                Self {
                    id,
                    _payload: PhantomData,
                }
            }

            /// The delegate backing this handle.
            pub fn id(&self) -> DelegateId {
                self.id
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> PartialEq for $name<T> {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl<T> Eq for $name<T> {}

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{}<{}>({})",
                    stringify!($name),
                    std::any::type_name::<T>(),
                    self.id
                )
            }
        }
    };
}

typed_handle! {
    /// Handle to a single-bind slot: the latest matching message.
    Single
}

typed_handle! {
    /// Handle to a multi-bind slot: every matching message in order.
    Multi
}

typed_handle! {
    /// Handle to the messages a typed filter accepted.
    Filtered
}

/// Handle to the messages a wildcard filter accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilteredAny {
    id: DelegateId,
}

impl FilteredAny {
    pub(crate) fn new(id: DelegateId) -> Self {
        Self { id }
    }

    /// The delegate backing this handle.
    pub fn id(&self) -> DelegateId {
        self.id
    }
}

// Handles cross threads inside `Arc<dyn Module>` whatever their payload.
const _: fn() = || {
    fn assert_send_sync<T: Send + Sync + Copy>() {}
    assert_send_sync::<Single<std::rc::Rc<u8>>>();
    assert_send_sync::<Multi<std::rc::Rc<u8>>>();
    assert_send_sync::<Filtered<std::rc::Rc<u8>>>();
    assert_send_sync::<FilteredAny>();
};
