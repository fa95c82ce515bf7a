//! Type- and name-indexed delegate registry.
//!
//! The forward map is `type → name → delegates in registration order`.
//! A reverse map from [`DelegateId`] to the delegate's `(type, name)`
//! location lets removal find the entry without scanning. The registry is
//! not synchronized itself; the [`Messenger`](crate::Messenger) keeps it
//! behind a single mutex so both maps always change together.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use spindle_core::{
    DelegateId, MessageTypeId, MessengerError, MissingInput, ModuleId, ModuleInfo, MsgFlags,
};

use crate::delegate::{Delegate, DelegateKind, DelegateSummary, Subject, TypeKey};

/// Delegates listening under one `(type, name)` key, keyed by
/// registration ID so iteration follows registration order.
type DelegateList = BTreeMap<DelegateId, Arc<Delegate>>;

/// Matching delegates captured for one dispatch.
pub(crate) type Candidates = SmallVec<[Arc<Delegate>; 8]>;

// ── Type table ─────────────────────────────────────────────────────

/// Interns payload `TypeId`s into sequential [`MessageTypeId`]s.
#[derive(Default)]
struct TypeTable {
    types: IndexMap<TypeId, &'static str>,
}

impl TypeTable {
    fn intern(&mut self, type_id: TypeId, type_name: &'static str) -> MessageTypeId {
        let (index, _) = self.types.insert_full(type_id, type_name);
        MessageTypeId(index as u32)
    }

    fn get(&self, type_id: TypeId) -> Option<MessageTypeId> {
        self.types
            .get_index_of(&type_id)
            .map(|index| MessageTypeId(index as u32))
    }

    fn name(&self, id: MessageTypeId) -> Option<&'static str> {
        self.types
            .get_index(id.0 as usize)
            .map(|(_, &type_name)| type_name)
    }
}

// ── Forward entries ────────────────────────────────────────────────

/// All delegates of one message type.
#[derive(Default)]
struct TypeEntry {
    /// Delegates requiring a specific instance name.
    named: IndexMap<String, DelegateList>,
    /// Delegates carrying `IGNORE_NAME`.
    any_name: DelegateList,
}

impl TypeEntry {
    fn is_empty(&self) -> bool {
        self.named.is_empty() && self.any_name.is_empty()
    }

    fn list_mut(&mut self, name: Option<&str>) -> Option<&mut DelegateList> {
        match name {
            Some(name) => self.named.get_mut(name),
            None => Some(&mut self.any_name),
        }
    }

    fn len(&self) -> usize {
        self.any_name.len() + self.named.values().map(BTreeMap::len).sum::<usize>()
    }
}

/// Where a delegate lives in the forward map.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Location {
    type_key: TypeKey,
    name: Option<String>,
}

/// One `(type, name)` row of the routing table, for introspection.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RouteEntry {
    /// Payload type, `None` for wildcard filters.
    pub message_type: Option<&'static str>,
    /// Required instance name, `None` for delegates ignoring the name.
    pub name: Option<String>,
    /// Delegates under this key in registration order.
    pub delegates: Vec<DelegateId>,
}

// ── Registry ───────────────────────────────────────────────────────

/// Forward and reverse delegate index plus declared producer types.
#[derive(Default)]
pub(crate) struct Registry {
    types: TypeTable,
    forward: IndexMap<TypeKey, TypeEntry>,
    reverse: BTreeMap<DelegateId, Location>,
    outputs: IndexMap<MessageTypeId, SmallVec<[ModuleId; 2]>>,
    next_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a delegate and return its ID.
    ///
    /// `name` is ignored when `flags` carries `IGNORE_NAME`; otherwise it
    /// defaults to the module's input name.
    pub(crate) fn insert(
        &mut self,
        subject: Subject,
        module: &Arc<ModuleInfo>,
        name: Option<&str>,
        flags: MsgFlags,
        kind: DelegateKind,
    ) -> DelegateId {
        let type_key = match subject {
            Subject::Any => TypeKey::Any,
            Subject::Payload { type_id, type_name } => {
                TypeKey::Message(self.types.intern(type_id, type_name))
            }
        };
        let name = if flags.contains(MsgFlags::IGNORE_NAME) {
            None
        } else {
            Some(name.unwrap_or(module.input()).to_string())
        };

        let id = DelegateId(self.next_id);
        self.next_id += 1;

        let delegate = Arc::new(Delegate {
            id,
            module: Arc::clone(module),
            type_key,
            type_name: subject.type_name(),
            name: name.clone(),
            flags,
            kind,
        });

        let entry = self.forward.entry(type_key).or_default();
        let list = match &name {
            Some(name) => entry.named.entry(name.clone()).or_default(),
            None => &mut entry.any_name,
        };
        list.insert(id, delegate);
        self.reverse.insert(id, Location { type_key, name });
        id
    }

    /// Remove a delegate, pruning map levels left empty.
    pub(crate) fn remove(&mut self, id: DelegateId) -> Result<Arc<Delegate>, MessengerError> {
        let unregistered = MessengerError::UnregisteredDelegate { delegate: id };
        let location = self.reverse.remove(&id).ok_or_else(|| unregistered.clone())?;

        let entry = self.forward.get_mut(&location.type_key);
        let removed = entry
            .and_then(|entry| entry.list_mut(location.name.as_deref()))
            .and_then(|list| list.remove(&id));
        debug_assert!(
            removed.is_some(),
            "delegate {id} in reverse index but missing from forward map"
        );
        let removed = removed.ok_or(unregistered)?;
        self.prune(&location);
        Ok(removed)
    }

    fn prune(&mut self, location: &Location) {
        let Some(entry) = self.forward.get_mut(&location.type_key) else {
            return;
        };
        if let Some(name) = location.name.as_deref() {
            if entry.named.get(name).is_some_and(BTreeMap::is_empty) {
                entry.named.shift_remove(name);
            }
        }
        if entry.is_empty() {
            self.forward.shift_remove(&location.type_key);
        }
    }

    /// Look up a registered delegate by ID.
    pub(crate) fn get(&self, id: DelegateId) -> Option<&Arc<Delegate>> {
        let location = self.reverse.get(&id)?;
        let entry = self.forward.get(&location.type_key)?;
        match location.name.as_deref() {
            Some(name) => entry.named.get(name)?.get(&id),
            None => entry.any_name.get(&id),
        }
    }

    /// Interned ID of a payload type, if any delegate or output uses it.
    pub(crate) fn message_type(&self, type_id: TypeId) -> Option<MessageTypeId> {
        self.types.get(type_id)
    }

    /// Delegates eligible for a message, in registration order.
    ///
    /// The eligible set is the union of `[T][name]`, `[T][*]` and, when
    /// `include_wildcards` is set, `[*][name]` and `[*][*]`. Delegates
    /// of modules bound to another detector are left out.
    pub(crate) fn lookup(
        &self,
        type_id: TypeId,
        name: &str,
        detector: Option<&str>,
        include_wildcards: bool,
    ) -> Candidates {
        let typed = self.types.get(type_id).map(TypeKey::Message);
        let wildcard = include_wildcards.then_some(TypeKey::Any);

        let mut candidates = Candidates::new();
        for key in [typed, wildcard].into_iter().flatten() {
            let Some(entry) = self.forward.get(&key) else {
                continue;
            };
            let named = entry.named.get(name).into_iter().flat_map(BTreeMap::values);
            candidates.extend(
                named
                    .chain(entry.any_name.values())
                    .filter(|d| d.module.accepts_detector(detector))
                    .cloned(),
            );
        }
        candidates.sort_unstable_by_key(|d| d.id);
        candidates
    }

    /// REQUIRED delegates in registration order.
    pub(crate) fn required(&self) -> impl Iterator<Item = &Arc<Delegate>> {
        self.reverse
            .keys()
            .filter_map(|&id| self.get(id))
            .filter(|d| d.is_required())
    }

    pub(crate) fn missing_input(delegate: &Delegate) -> MissingInput {
        MissingInput {
            module: delegate.module.to_string(),
            message_type: delegate.type_name,
            name: delegate.name.clone(),
        }
    }

    /// Record that `module` produces payload type `type_id`.
    pub(crate) fn declare_output(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        module: ModuleId,
    ) {
        let id = self.types.intern(type_id, type_name);
        let producers = self.outputs.entry(id).or_default();
        if !producers.contains(&module) {
            producers.push(module);
        }
    }

    /// Withdraw an output declaration made by `module`.
    pub(crate) fn retract_output(&mut self, type_id: TypeId, module: ModuleId) {
        let Some(id) = self.types.get(type_id) else {
            return;
        };
        if let Some(producers) = self.outputs.get_mut(&id) {
            producers.retain(|m| *m != module);
            if producers.is_empty() {
                self.outputs.shift_remove(&id);
            }
        }
    }

    /// Typed subscriptions whose payload type no module produces.
    pub(crate) fn contract_violations(&self) -> Vec<MessengerError> {
        self.reverse
            .keys()
            .filter_map(|&id| self.get(id))
            .filter_map(|d| match d.type_key {
                TypeKey::Message(t) if !self.outputs.contains_key(&t) => {
                    Some(MessengerError::TypeMismatch {
                        module: d.module.to_string(),
                        message_type: self.types.name(t).unwrap_or(d.type_name),
                    })
                }
                _ => None,
            })
            .collect()
    }

    /// Number of registered delegates.
    pub(crate) fn len(&self) -> usize {
        self.reverse.len()
    }

    /// Summaries of every delegate owned by `module`.
    pub(crate) fn delegates_of(&self, module: ModuleId) -> Vec<DelegateSummary> {
        self.reverse
            .keys()
            .filter_map(|&id| self.get(id))
            .filter(|d| d.owning_module() == module)
            .map(|d| d.summary())
            .collect()
    }

    /// Sorted snapshot of the forward map.
    pub(crate) fn routes(&self) -> Vec<RouteEntry> {
        let mut routes = Vec::new();
        for (key, entry) in &self.forward {
            let message_type = match key {
                TypeKey::Any => None,
                TypeKey::Message(id) => self.types.name(*id),
            };
            for (name, list) in &entry.named {
                routes.push(RouteEntry {
                    message_type,
                    name: Some(name.clone()),
                    delegates: list.keys().copied().collect(),
                });
            }
            if !entry.any_name.is_empty() {
                routes.push(RouteEntry {
                    message_type,
                    name: None,
                    delegates: entry.any_name.keys().copied().collect(),
                });
            }
        }
        routes.sort();
        routes
    }

    /// Check that forward and reverse maps describe the same delegates.
    pub(crate) fn is_consistent(&self) -> bool {
        let forward_count: usize = self.forward.values().map(TypeEntry::len).sum();
        if forward_count != self.reverse.len() {
            return false;
        }
        let no_empty_levels = self.forward.values().all(|entry| {
            !entry.is_empty() && entry.named.values().all(|list| !list.is_empty())
        });
        let every_location_resolves = self.reverse.iter().all(|(&id, location)| {
            self.get(id).is_some_and(|d| {
                d.id == id && d.type_key == location.type_key && d.name == location.name
            })
        });
        no_empty_levels && every_location_resolves
    }
}
