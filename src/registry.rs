//! The resource registry: bindings between accounts and live sessions.
//!
//! A binding associates one resource identifier with an authenticated
//! bare account and the session that bound it. The registry keeps both
//! directions of the mapping behind one lock so concurrent bind,
//! unbind and lookup calls never observe a partially-updated state.

use crate::addr::Entity;
use crate::error::BindError;
use crate::session::{SessionContext, SessionId};
use parking_lot::RwLock;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one bound resource, unique process-wide while bound.
pub type ResourceId = String;

/// Random suffix length appended to generated resource identifiers.
const RESOURCE_SUFFIX_LEN: usize = 6;

#[derive(Default)]
struct RegistryInner {
    /// resource id -> owning session
    by_resource: HashMap<ResourceId, Arc<SessionContext>>,
    /// bare account -> bound resource ids, in binding order
    by_entity: HashMap<Entity, Vec<ResourceId>>,
    /// session -> resource ids it bound, in binding order
    by_session: HashMap<SessionId, Vec<ResourceId>>,
}

/// In-memory bookkeeping of all currently bound resources.
pub struct ResourceRegistry {
    inner: RwLock<RegistryInner>,
    counter: AtomicU64,
}

impl ResourceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            counter: AtomicU64::new(1),
        }
    }

    /// Bind a new resource for the session's authenticated account.
    ///
    /// Each call creates a new, independent binding, even for a session
    /// that is already bound; a second binding makes
    /// [`unique_resource_for_session`](Self::unique_resource_for_session)
    /// return `None` for that session. Fails when the session has no
    /// initiating entity.
    pub fn bind_session(&self, session: &Arc<SessionContext>) -> Result<ResourceId, BindError> {
        let bare = session
            .initiating_entity()
            .ok_or(BindError::NoInitiatingEntity)?
            .bare();
        let resource = self.next_resource_id();
        let mut inner = self.inner.write();
        inner
            .by_resource
            .insert(resource.clone(), Arc::clone(session));
        inner
            .by_entity
            .entry(bare)
            .or_default()
            .push(resource.clone());
        inner
            .by_session
            .entry(session.id())
            .or_default()
            .push(resource.clone());
        Ok(resource)
    }

    /// Process-wide unique identifier: monotonic counter plus a random
    /// suffix so identifiers are not guessable across sessions.
    fn next_resource_id(&self) -> ResourceId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RESOURCE_SUFFIX_LEN)
            .map(char::from)
            .collect();
        format!("res{n}-{suffix}")
    }

    /// Remove one binding. Returns `true` when the owning bare account
    /// has no resources left (its entry is removed as well). Unknown
    /// identifiers are a no-op returning `false`.
    pub fn unbind_resource(&self, resource: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(session) = inner.by_resource.remove(resource) else {
            return false;
        };

        let session_id = session.id();
        let session_empty = inner
            .by_session
            .get_mut(&session_id)
            .map(|list| {
                list.retain(|r| r != resource);
                list.is_empty()
            })
            .unwrap_or(false);
        if session_empty {
            inner.by_session.remove(&session_id);
        }

        let Some(bare) = session.initiating_entity().map(|e| e.bare()) else {
            return false;
        };
        let entity_empty = inner
            .by_entity
            .get_mut(&bare)
            .map(|list| {
                list.retain(|r| r != resource);
                list.is_empty()
            })
            .unwrap_or(false);
        if entity_empty {
            inner.by_entity.remove(&bare);
        }
        entity_empty
    }

    /// Remove every binding owned by the session (connection close).
    pub fn unbind_session(&self, session: &SessionContext) {
        let resources = {
            self.inner
                .read()
                .by_session
                .get(&session.id())
                .cloned()
                .unwrap_or_default()
        };
        for resource in resources {
            self.unbind_resource(&resource);
        }
    }

    /// Bound resources for an address, in binding order.
    ///
    /// For a full address the result is that exact resource if it is
    /// currently bound under the address's bare account, else empty;
    /// `consider_bare` treats a full address as its bare form instead.
    pub fn bound_resources(&self, entity: &Entity, consider_bare: bool) -> Vec<ResourceId> {
        let inner = self.inner.read();
        match entity.resource() {
            Some(resource) if !consider_bare => {
                let bound = inner
                    .by_entity
                    .get(&entity.bare())
                    .is_some_and(|list| list.iter().any(|r| r == resource));
                if bound {
                    vec![resource.to_string()]
                } else {
                    Vec::new()
                }
            }
            _ => inner
                .by_entity
                .get(&entity.bare())
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Sessions with at least one resource bound under the address's
    /// bare account; used for presence and message fan-out.
    pub fn sessions(&self, entity: &Entity) -> Vec<Arc<SessionContext>> {
        let inner = self.inner.read();
        let mut sessions: Vec<Arc<SessionContext>> = Vec::new();
        if let Some(resources) = inner.by_entity.get(&entity.bare()) {
            for resource in resources {
                if let Some(session) = inner.by_resource.get(resource) {
                    if !sessions.iter().any(|s| s.id() == session.id()) {
                        sessions.push(Arc::clone(session));
                    }
                }
            }
        }
        sessions
    }

    /// The session a resource identifier is bound to, if any.
    pub fn session_for_resource(&self, resource: &str) -> Option<Arc<SessionContext>> {
        self.inner.read().by_resource.get(resource).cloned()
    }

    /// All resources the session has bound, in binding order.
    pub fn resources_for_session(&self, session: &SessionContext) -> Vec<ResourceId> {
        self.inner
            .read()
            .by_session
            .get(&session.id())
            .cloned()
            .unwrap_or_default()
    }

    /// The session's single bound resource, or `None` when the session
    /// has zero or more than one binding. Not an error: with multiple
    /// bindings there simply is no unique resource.
    pub fn unique_resource_for_session(&self, session: &SessionContext) -> Option<ResourceId> {
        let inner = self.inner.read();
        match inner.by_session.get(&session.id()) {
            Some(resources) if resources.len() == 1 => resources.first().cloned(),
            _ => None,
        }
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionContext;

    fn session_for(address: Option<&str>) -> Arc<SessionContext> {
        let (session, _holder, _outbound) = SessionContext::new(8);
        if let Some(address) = address {
            session.set_initiating_entity(Entity::parse(address).unwrap());
        }
        session
    }

    #[test]
    fn refuses_session_without_initiating_entity() {
        let registry = ResourceRegistry::new();
        let session = session_for(None);
        assert_eq!(
            registry.bind_session(&session),
            Err(BindError::NoInitiatingEntity)
        );
    }

    #[test]
    fn binds_and_resolves_single_session() {
        let registry = ResourceRegistry::new();
        let session = session_for(Some("me@test"));
        let resource = registry.bind_session(&session).unwrap();

        let resources = registry.resources_for_session(&session);
        assert_eq!(resources, vec![resource.clone()]);
        assert_eq!(
            registry.session_for_resource(&resource).unwrap().id(),
            session.id()
        );
    }

    #[test]
    fn separate_accounts_stay_separate() {
        let registry = ResourceRegistry::new();
        let session1 = session_for(Some("me1@test"));
        let session2 = session_for(Some("me2@test"));
        let resource1 = registry.bind_session(&session1).unwrap();
        let resource2 = registry.bind_session(&session2).unwrap();

        assert_eq!(registry.resources_for_session(&session1), vec![resource1]);
        assert_eq!(registry.resources_for_session(&session2), vec![resource2]);
    }

    #[test]
    fn one_account_many_resources() {
        let registry = ResourceRegistry::new();
        let entity = Entity::parse("me@test").unwrap();
        let session1 = session_for(Some("me@test"));
        let session2 = session_for(Some("me@test"));
        let resource1 = registry.bind_session(&session1).unwrap();
        let resource2 = registry.bind_session(&session2).unwrap();

        let resources = registry.bound_resources(&entity, false);
        assert_eq!(resources.len(), 2);
        assert!(resources.contains(&resource1));
        assert!(resources.contains(&resource2));

        let sessions = registry.sessions(&entity);
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().any(|s| s.id() == session1.id()));
        assert!(sessions.iter().any(|s| s.id() == session2.id()));
    }

    #[test]
    fn tolerates_resource_qualified_initiating_addresses() {
        // binding stores the bare projection; a full address given at
        // authentication time still groups under the bare account
        let registry = ResourceRegistry::new();
        let entity = Entity::parse("me@test").unwrap();
        let session1 = session_for(Some("me@test/xy"));
        let session2 = session_for(Some("me@test/ab"));
        let resource1 = registry.bind_session(&session1).unwrap();
        let resource2 = registry.bind_session(&session2).unwrap();

        let resources = registry.bound_resources(&entity, false);
        assert_eq!(resources.len(), 2);
        assert!(resources.contains(&resource1));
        assert!(resources.contains(&resource2));
    }

    #[test]
    fn generated_resource_ids_differ() {
        let registry = ResourceRegistry::new();
        let session1 = session_for(Some("me@test"));
        let session2 = session_for(Some("me@test"));
        let resource1 = registry.bind_session(&session1).unwrap();
        let resource2 = registry.bind_session(&session2).unwrap();
        assert_ne!(resource1, resource2);
    }

    #[test]
    fn unbind_resource_reports_empty_account() {
        let registry = ResourceRegistry::new();
        let entity = Entity::parse("me@test").unwrap();
        let session = session_for(Some("me@test"));
        let resource = registry.bind_session(&session).unwrap();

        let none_left = registry.unbind_resource(&resource);
        assert!(none_left);
        assert!(registry.session_for_resource(&resource).is_none());
        assert!(registry.bound_resources(&entity, false).is_empty());

        // unknown identifiers are a no-op
        assert!(!registry.unbind_resource("res0-unknown"));
    }

    #[test]
    fn unbind_reports_false_while_sibling_resources_remain() {
        let registry = ResourceRegistry::new();
        let entity = Entity::parse("me@test").unwrap();
        let session_a = session_for(Some("me@test"));
        let session_b = session_for(Some("me@test"));
        let resource_a = registry.bind_session(&session_a).unwrap();
        let resource_b = registry.bind_session(&session_b).unwrap();

        // the account still has b bound, so unbinding a is not "last out"
        assert!(!registry.unbind_resource(&resource_a));
        assert_eq!(registry.bound_resources(&entity, false), vec![resource_b.clone()]);
        assert!(registry.session_for_resource(&resource_a).is_none());

        assert!(registry.unbind_resource(&resource_b));
        assert!(registry.bound_resources(&entity, false).is_empty());
        assert!(registry.sessions(&entity).is_empty());
    }

    #[test]
    fn unbind_session_removes_all_bindings() {
        let registry = ResourceRegistry::new();
        let entity = Entity::parse("me@test").unwrap();
        let session = session_for(Some("me@test"));
        let resource1 = registry.bind_session(&session).unwrap();
        let resource2 = registry.bind_session(&session).unwrap();

        registry.unbind_session(&session);
        assert!(registry.session_for_resource(&resource1).is_none());
        assert!(registry.session_for_resource(&resource2).is_none());
        assert!(registry.bound_resources(&entity, false).is_empty());
        assert!(registry.resources_for_session(&session).is_empty());
    }

    #[test]
    fn unique_resource_requires_exactly_one_binding() {
        let registry = ResourceRegistry::new();
        let session = session_for(Some("me@test"));
        let resource1 = registry.bind_session(&session).unwrap();
        assert_eq!(
            registry.unique_resource_for_session(&session),
            Some(resource1.clone())
        );

        let resource2 = registry.bind_session(&session).unwrap();
        assert_ne!(resource1, resource2);
        assert_eq!(registry.unique_resource_for_session(&session), None);
        // both stay independently resolvable
        let entity = Entity::parse("me@test").unwrap();
        assert_eq!(registry.bound_resources(&entity, false).len(), 2);
    }

    #[test]
    fn full_address_resolves_only_when_bound() {
        let registry = ResourceRegistry::new();
        let session = session_for(Some("me@test"));
        let resource = registry.bind_session(&session).unwrap();

        let bound_full = Entity::parse("me@test")
            .unwrap()
            .with_resource(&resource)
            .unwrap();
        assert_eq!(
            registry.bound_resources(&bound_full, false),
            vec![resource.clone()]
        );

        let unbound_full = Entity::parse("me@test/elsewhere").unwrap();
        assert!(registry.bound_resources(&unbound_full, false).is_empty());

        // consider_bare ignores the resource part
        assert_eq!(
            registry.bound_resources(&unbound_full, true),
            vec![resource]
        );
    }
}
