//! Delegates: one subscription each, expressed as a closed set of variants.
//!
//! A delegate binds "module M wants messages of type T (optionally named N)"
//! to one of four actions. The action never touches module memory: it
//! writes into a [`SlotSink`], which the event being processed provides.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use spindle_core::{
    AnyMessage, DelegateId, MessageTypeId, MessengerError, ModuleId, ModuleInfo, MsgFlags,
    Payload, SharedMessage,
};

use crate::inbox::{SlotOccupied, SlotSink};

/// Predicate of a wildcard filter: `(message, instance name) -> accept`.
pub(crate) type WildcardPredicate = Box<dyn Fn(&AnyMessage, &str) -> bool + Send + Sync>;

/// Predicate of a typed filter, erased over the payload type.
pub(crate) type TypedPredicate = Box<dyn Fn(&AnyMessage) -> bool + Send + Sync>;

/// What a subscription listens to before name matching.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Subject {
    /// Every message, whatever its payload.
    Any,
    /// Messages whose payload is exactly this type.
    Payload {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl Subject {
    pub(crate) fn of<T: Payload>() -> Self {
        Self::Payload {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Any => "*",
            Self::Payload { type_name, .. } => type_name,
        }
    }
}

/// Registry key for the message-type level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum TypeKey {
    Any,
    Message(MessageTypeId),
}

/// The action a delegate performs on a matching message.
pub(crate) enum DelegateKind {
    WildcardFilter(WildcardPredicate),
    TypedFilter(TypedPredicate),
    SingleBind,
    MultiBind,
}

impl DelegateKind {
    pub(crate) fn typed_filter<T, F>(filter: F) -> Self
    where
        T: Payload,
        F: Fn(&SharedMessage<T>) -> bool + Send + Sync + 'static,
    {
        Self::TypedFilter(Box::new(move |message: &AnyMessage| {
            message
                .downcast::<T>()
                .is_some_and(|typed| filter(&typed))
        }))
    }

    fn tag(&self) -> DelegateKindTag {
        match self {
            Self::WildcardFilter(_) => DelegateKindTag::WildcardFilter,
            Self::TypedFilter(_) => DelegateKindTag::TypedFilter,
            Self::SingleBind => DelegateKindTag::SingleBind,
            Self::MultiBind => DelegateKindTag::MultiBind,
        }
    }
}

/// Public discriminant of a delegate's variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DelegateKindTag {
    /// Predicate over every message type.
    WildcardFilter,
    /// Predicate over one message type.
    TypedFilter,
    /// Latest matching message in a single slot.
    SingleBind,
    /// Every matching message, appended in dispatch order.
    MultiBind,
}

/// One registered subscription.
pub(crate) struct Delegate {
    pub(crate) id: DelegateId,
    pub(crate) module: Arc<ModuleInfo>,
    pub(crate) type_key: TypeKey,
    pub(crate) type_name: &'static str,
    /// `None` when the delegate carries `IGNORE_NAME`.
    pub(crate) name: Option<String>,
    pub(crate) flags: MsgFlags,
    pub(crate) kind: DelegateKind,
}

impl Delegate {
    /// Whether this delegate takes `message`, dispatched under `name`.
    ///
    /// `message_type` is the interned type of the message, `None` if no
    /// delegate ever subscribed to its payload type.
    pub(crate) fn matches(
        &self,
        message: &AnyMessage,
        message_type: Option<MessageTypeId>,
        name: &str,
    ) -> bool {
        let type_ok = match self.type_key {
            TypeKey::Any => true,
            TypeKey::Message(id) => message_type == Some(id),
        };
        let name_ok = self.name.as_deref().is_none_or(|own| own == name);
        type_ok && name_ok && self.module.accepts_detector(message.detector())
    }

    /// Perform the delegate's action.
    ///
    /// Returns `Ok(true)` if the message was stored, `Ok(false)` if a
    /// filter rejected it.
    pub(crate) fn act(
        &self,
        message: &AnyMessage,
        name: &str,
        sink: &mut dyn SlotSink,
    ) -> Result<bool, MessengerError> {
        match &self.kind {
            DelegateKind::WildcardFilter(filter) => {
                let accepted = filter(message, name);
                if accepted {
                    sink.append_slot(self.id, message.clone());
                }
                Ok(accepted)
            }
            DelegateKind::TypedFilter(filter) => {
                let accepted = filter(message);
                if accepted {
                    sink.append_slot(self.id, message.clone());
                }
                Ok(accepted)
            }
            DelegateKind::SingleBind => {
                let overwrite = self.flags.contains(MsgFlags::ALLOW_OVERWRITE);
                sink.write_slot(self.id, message.clone(), overwrite)
                    .map(|()| true)
                    .map_err(|SlotOccupied| MessengerError::DuplicateBinding {
                        module: self.module.to_string(),
                        message_type: message.type_name(),
                        name: name.to_string(),
                    })
            }
            DelegateKind::MultiBind => {
                sink.append_slot(self.id, message.clone());
                Ok(true)
            }
        }
    }

    pub(crate) fn is_required(&self) -> bool {
        self.flags.contains(MsgFlags::REQUIRED)
    }

    /// Filters only observe; they never count as receivers.
    pub(crate) fn is_filter(&self) -> bool {
        matches!(
            self.kind,
            DelegateKind::WildcardFilter(_) | DelegateKind::TypedFilter(_)
        )
    }

    pub(crate) fn owning_module(&self) -> ModuleId {
        self.module.id()
    }

    pub(crate) fn summary(&self) -> DelegateSummary {
        DelegateSummary {
            id: self.id,
            module: self.module.id(),
            kind: self.kind.tag(),
            message_type: self.type_name,
            name: self.name.clone(),
            flags: self.flags,
        }
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field("id", &self.id)
            .field("module", &self.module.to_string())
            .field("kind", &self.kind.tag())
            .field("type", &self.type_name)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Read-only description of a registered delegate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegateSummary {
    /// Registration ID.
    pub id: DelegateId,
    /// Owning module.
    pub module: ModuleId,
    /// Delegate variant.
    pub kind: DelegateKindTag,
    /// Subscribed payload type, `"*"` for wildcard filters.
    pub message_type: &'static str,
    /// Required instance name, `None` with `IGNORE_NAME`.
    pub name: Option<String>,
    /// Behaviour flags.
    pub flags: MsgFlags,
}
