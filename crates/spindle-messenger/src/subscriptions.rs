//! Scoped registration guard owning a module's delegates.

use std::any::TypeId;
use std::sync::Arc;

use tracing::warn;

use spindle_core::{
    AnyMessage, DelegateId, MessengerError, ModuleInfo, MsgFlags, Payload, SharedMessage,
};

use crate::delegate::{DelegateKind, Subject};
use crate::handle::{Filtered, FilteredAny, Multi, Single};
use crate::messenger::{payload_name, Messenger};

/// Registration guard for one module.
///
/// Obtained from [`Messenger::subscriptions`]. Every delegate registered
/// through the guard belongs to its module and is removed from the
/// messenger by [`release`](Self::release), or on drop if the guard was
/// never released explicitly. Subscriptions default to the module's input
/// name; the `*_named` variants listen to another instance name, and
/// [`MsgFlags::IGNORE_NAME`] listens to every name.
pub struct Subscriptions {
    messenger: Arc<Messenger>,
    module: Arc<ModuleInfo>,
    delegates: Vec<DelegateId>,
    outputs: Vec<TypeId>,
    released: bool,
}

impl Subscriptions {
    pub(crate) fn new(messenger: Arc<Messenger>, module: Arc<ModuleInfo>) -> Self {
        Self {
            messenger,
            module,
            delegates: Vec::new(),
            outputs: Vec::new(),
            released: false,
        }
    }

    /// The module owning these subscriptions.
    pub fn module(&self) -> &Arc<ModuleInfo> {
        &self.module
    }

    /// The messenger the subscriptions live in.
    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    /// Delegates registered through this guard and not yet removed.
    pub fn delegate_ids(&self) -> &[DelegateId] {
        &self.delegates
    }

    fn register(
        &mut self,
        subject: Subject,
        name: Option<&str>,
        flags: MsgFlags,
        kind: DelegateKind,
    ) -> DelegateId {
        let id = self
            .messenger
            .register_delegate(subject, &self.module, name, flags, kind);
        self.delegates.push(id);
        id
    }

    // ── Binds ──────────────────────────────────────────────────

    /// Keep the latest `T` message sent under the module's input name.
    pub fn bind_single<T: Payload>(&mut self, flags: MsgFlags) -> Single<T> {
        Single::new(self.register(Subject::of::<T>(), None, flags, DelegateKind::SingleBind))
    }

    /// Keep the latest `T` message sent under `name`.
    pub fn bind_single_named<T: Payload>(&mut self, name: &str, flags: MsgFlags) -> Single<T> {
        let id = self.register(Subject::of::<T>(), Some(name), flags, DelegateKind::SingleBind);
        Single::new(id)
    }

    /// Collect every `T` message sent under the module's input name.
    pub fn bind_multi<T: Payload>(&mut self, flags: MsgFlags) -> Multi<T> {
        Multi::new(self.register(Subject::of::<T>(), None, flags, DelegateKind::MultiBind))
    }

    /// Collect every `T` message sent under `name`.
    pub fn bind_multi_named<T: Payload>(&mut self, name: &str, flags: MsgFlags) -> Multi<T> {
        let id = self.register(Subject::of::<T>(), Some(name), flags, DelegateKind::MultiBind);
        Multi::new(id)
    }

    // ── Filters ────────────────────────────────────────────────

    /// Keep the `T` messages for which `filter` returns true.
    pub fn register_filter<T, F>(&mut self, flags: MsgFlags, filter: F) -> Filtered<T>
    where
        T: Payload,
        F: Fn(&SharedMessage<T>) -> bool + Send + Sync + 'static,
    {
        let kind = DelegateKind::typed_filter::<T, F>(filter);
        Filtered::new(self.register(Subject::of::<T>(), None, flags, kind))
    }

    /// [`register_filter`](Self::register_filter) listening to `name`.
    pub fn register_filter_named<T, F>(
        &mut self,
        name: &str,
        flags: MsgFlags,
        filter: F,
    ) -> Filtered<T>
    where
        T: Payload,
        F: Fn(&SharedMessage<T>) -> bool + Send + Sync + 'static,
    {
        let kind = DelegateKind::typed_filter::<T, F>(filter);
        Filtered::new(self.register(Subject::of::<T>(), Some(name), flags, kind))
    }

    /// Keep messages of any type for which `filter` returns true.
    ///
    /// The filter sees the type-erased message and the instance name it
    /// was dispatched under. Filters do not count as receivers for
    /// [`Messenger::has_receiver`].
    pub fn register_wildcard_filter<F>(&mut self, flags: MsgFlags, filter: F) -> FilteredAny
    where
        F: Fn(&AnyMessage, &str) -> bool + Send + Sync + 'static,
    {
        let kind = DelegateKind::WildcardFilter(Box::new(filter));
        FilteredAny::new(self.register(Subject::Any, None, flags, kind))
    }

    // ── Outputs ────────────────────────────────────────────────

    /// Declare that the module dispatches `T` messages.
    ///
    /// Only consulted by [`Messenger::validate_contracts`].
    pub fn declare_output<T: Payload>(&mut self) {
        let type_id = TypeId::of::<T>();
        self.messenger
            .declare_output(type_id, payload_name::<T>(), self.module.id());
        if !self.outputs.contains(&type_id) {
            self.outputs.push(type_id);
        }
    }

    // ── Removal ────────────────────────────────────────────────

    /// Remove one delegate registered through this guard.
    ///
    /// A delegate this guard does not own is reported as
    /// [`MessengerError::UnregisteredDelegate`], even if another module
    /// registered it.
    pub fn unsubscribe(&mut self, delegate: DelegateId) -> Result<(), MessengerError> {
        let Some(index) = self.delegates.iter().position(|&d| d == delegate) else {
            return Err(MessengerError::UnregisteredDelegate { delegate });
        };
        self.delegates.remove(index);
        self.messenger.remove_delegate(delegate)
    }

    /// Remove every delegate and output declaration of this guard.
    ///
    /// All delegates are attempted; the first failure is returned.
    pub fn release(mut self) -> Result<(), MessengerError> {
        self.release_all().into_iter().next().map_or(Ok(()), Err)
    }

    fn release_all(&mut self) -> Vec<MessengerError> {
        self.released = true;
        for type_id in self.outputs.drain(..) {
            self.messenger.retract_output(type_id, self.module.id());
        }
        // Newest first, mirroring registration.
        let mut errors = Vec::new();
        while let Some(id) = self.delegates.pop() {
            if let Err(err) = self.messenger.remove_delegate(id) {
                errors.push(err);
            }
        }
        errors
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for err in self.release_all() {
            warn!(module = %self.module, error = %err, "failed to release subscription");
        }
    }
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("module", &self.module.to_string())
            .field("delegates", &self.delegates)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::{EventId, Message};

    use crate::EventInbox;

    #[derive(Debug)]
    struct Hit(u32);

    #[test]
    fn drop_removes_every_delegate() {
        let messenger = Arc::new(Messenger::new());
        {
            let mut subs = messenger.subscriptions(ModuleInfo::new("consumer"));
            subs.bind_single::<Hit>(MsgFlags::NONE);
            subs.bind_multi::<Hit>(MsgFlags::IGNORE_NAME);
            subs.register_wildcard_filter(MsgFlags::IGNORE_NAME, |_, _| true);
            assert_eq!(messenger.delegate_count(), 3);
        }
        assert_eq!(messenger.delegate_count(), 0);
        assert!(messenger.routes().is_empty());
        assert!(messenger.is_consistent());
    }

    #[test]
    fn unsubscribe_only_owned_delegates() {
        let messenger = Arc::new(Messenger::new());
        let mut a = messenger.subscriptions(ModuleInfo::new("a"));
        let mut b = messenger.subscriptions(ModuleInfo::new("b"));
        let owned_by_b = b.bind_multi::<Hit>(MsgFlags::NONE).id();

        assert_eq!(
            a.unsubscribe(owned_by_b),
            Err(MessengerError::UnregisteredDelegate {
                delegate: owned_by_b
            })
        );
        assert_eq!(b.unsubscribe(owned_by_b), Ok(()));
        assert!(b.delegate_ids().is_empty());
        assert!(b.release().is_ok());
        assert!(a.release().is_ok());
    }

    #[test]
    fn release_after_external_removal_reports_error() {
        let messenger = Arc::new(Messenger::new());
        let mut subs = messenger.subscriptions(ModuleInfo::new("m"));
        let id = subs.bind_single::<Hit>(MsgFlags::NONE).id();
        messenger.remove_delegate(id).unwrap();
        assert_eq!(
            subs.release(),
            Err(MessengerError::UnregisteredDelegate { delegate: id })
        );
    }

    #[test]
    fn named_bind_overrides_input() {
        let messenger = Arc::new(Messenger::new());
        let mut subs = messenger.subscriptions(ModuleInfo::new("m").with_input("primary"));
        let default = subs.bind_multi::<Hit>(MsgFlags::NONE);
        let named = subs.bind_multi_named::<Hit>("secondary", MsgFlags::NONE);

        let sender = ModuleInfo::new("producer");
        let mut inbox = EventInbox::new(EventId(0));
        messenger
            .dispatch(&sender, Arc::new(Message::new(vec![Hit(1)])), "primary", &mut inbox)
            .unwrap();
        messenger
            .dispatch(&sender, Arc::new(Message::new(vec![Hit(2)])), "secondary", &mut inbox)
            .unwrap();
        assert_eq!(inbox.multi(&default)[0].data()[0].0, 1);
        assert_eq!(inbox.multi(&named)[0].data()[0].0, 2);
        assert_eq!(inbox.multi(&named).len(), 1);
    }

    #[test]
    fn release_retracts_outputs() {
        let messenger = Arc::new(Messenger::new());
        let mut consumer = messenger.subscriptions(ModuleInfo::new("consumer"));
        consumer.bind_multi::<Hit>(MsgFlags::NONE);

        let mut producer = messenger.subscriptions(ModuleInfo::new("producer"));
        producer.declare_output::<Hit>();
        assert!(messenger.validate_contracts().is_ok());

        producer.release().unwrap();
        let violations = messenger.validate_contracts().unwrap_err();
        assert!(matches!(violations[..], [MessengerError::TypeMismatch { .. }]));
    }
}
