//! Permission decisions and grant/deny/clear mutations.

use crate::params::{project, TypedPermission};
use crate::roles::NoRoles;
use crate::{
    Action, EntityId, ParameterBag, Permission, PermissionFilter, PermissionKey,
    PermissionRecord, PermissionStore, Result, RoleName, RoleResolver, ScopeFilter,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Authorization engine over a permission store and a role resolver.
///
/// Stateless between calls: every operation is a single read/modify/write
/// against the store.
#[derive(Debug, Clone)]
pub struct Authorization<S, R = NoRoles> {
    store: S,
    roles: R,
}

impl<S: PermissionStore> Authorization<S> {
    /// Create an engine without role resolution; actor-based calls see no roles.
    pub fn new(store: S) -> Self {
        Self {
            store,
            roles: NoRoles,
        }
    }
}

impl<S: PermissionStore, R: RoleResolver> Authorization<S, R> {
    pub fn with_roles(store: S, roles: R) -> Self {
        Self { store, roles }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn role_resolver(&self) -> &R {
        &self.roles
    }

    /// All permission records.
    pub fn query(&self) -> Result<Vec<PermissionRecord>> {
        self.store.query(&PermissionFilter::all())
    }

    pub fn query_filtered(&self, filter: &PermissionFilter) -> Result<Vec<PermissionRecord>> {
        self.store.query(filter)
    }

    pub fn query_by_action(&self, action: &Action) -> Result<Vec<PermissionRecord>> {
        self.store
            .query(&PermissionFilter::all().action(action.clone()))
    }

    /// Records for `action` with their parameters read into `P`.
    ///
    /// When `actor` is given, only records for roles it holds are returned.
    pub fn query_typed<P>(&self, action: &Action, actor: Option<&str>) -> Result<Vec<TypedPermission<P>>>
    where
        P: Serialize + DeserializeOwned + Default,
    {
        let mut filter = PermissionFilter::all().action(action.clone());
        if let Some(actor) = actor {
            filter = filter.roles(self.roles.resolve_roles(actor)?);
        }
        self.store
            .query(&filter)?
            .into_iter()
            .map(TypedPermission::from_record)
            .collect()
    }

    /// Every record for any role the actor holds.
    pub fn user_permissions(&self, actor: &str) -> Result<Vec<PermissionRecord>> {
        let roles = self.roles.resolve_roles(actor)?;
        self.store.query(&PermissionFilter::all().roles(roles))
    }

    /// Effective permission of a set of roles for an action.
    ///
    /// `None` when no record applies, `Grant` when any role is granted,
    /// `Deny` otherwise. Entity scope is matched exactly.
    pub fn resolve<'a>(
        &self,
        action: &Action,
        roles: impl IntoIterator<Item = &'a RoleName>,
        entity: Option<&EntityId>,
    ) -> Result<Permission> {
        let roles: BTreeSet<RoleName> = roles.into_iter().cloned().collect();
        if roles.is_empty() {
            debug!(%action, "no roles to resolve");
            return Ok(Permission::None);
        }

        let filter = PermissionFilter::all()
            .action(action.clone())
            .roles(roles)
            .scope(ScopeFilter::exact(entity));
        let verdict = aggregate(&self.store.query(&filter)?);
        debug!(%action, entity = ?entity.map(EntityId::as_str), %verdict, "resolved permission");
        Ok(verdict)
    }

    /// Resolve the actor's roles, then aggregate as [`Authorization::resolve`].
    pub fn resolve_for_actor(
        &self,
        actor: &str,
        action: &Action,
        entity: Option<&EntityId>,
    ) -> Result<Permission> {
        let roles = self.roles.resolve_roles(actor)?;
        self.resolve(action, &roles, entity)
    }

    /// Whether the actor is granted the action. `None` and `Deny` both refuse.
    pub fn is_permitted(&self, actor: &str, action: &Action, entity: Option<&EntityId>) -> Result<bool> {
        Ok(self.resolve_for_actor(actor, action, entity)?.is_granted())
    }

    pub fn grant(&self, action: &Action, role: &RoleName, entity: Option<&EntityId>) -> Result<PermissionRecord> {
        self.upsert(key(action, role, entity), Permission::Grant, None)
    }

    /// Grant with typed parameters projected into the record's bag.
    pub fn grant_with<P: Serialize>(
        &self,
        action: &Action,
        role: &RoleName,
        entity: Option<&EntityId>,
        params: &P,
    ) -> Result<PermissionRecord> {
        self.grant_with_params(action, role, entity, project(params)?)
    }

    pub fn grant_with_params(
        &self,
        action: &Action,
        role: &RoleName,
        entity: Option<&EntityId>,
        params: ParameterBag,
    ) -> Result<PermissionRecord> {
        self.upsert(key(action, role, entity), Permission::Grant, Some(params))
    }

    pub fn deny(&self, action: &Action, role: &RoleName, entity: Option<&EntityId>) -> Result<PermissionRecord> {
        self.upsert(key(action, role, entity), Permission::Deny, None)
    }

    /// Deny with typed parameters projected into the record's bag.
    pub fn deny_with<P: Serialize>(
        &self,
        action: &Action,
        role: &RoleName,
        entity: Option<&EntityId>,
        params: &P,
    ) -> Result<PermissionRecord> {
        self.deny_with_params(action, role, entity, project(params)?)
    }

    pub fn deny_with_params(
        &self,
        action: &Action,
        role: &RoleName,
        entity: Option<&EntityId>,
        params: ParameterBag,
    ) -> Result<PermissionRecord> {
        self.upsert(key(action, role, entity), Permission::Deny, Some(params))
    }

    /// Delete every record matching `predicate`. Returns how many were removed.
    pub fn clear_permissions<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&PermissionRecord) -> bool,
    {
        self.clear_where(&PermissionFilter::all(), predicate)
    }

    /// Like [`Authorization::clear_permissions`], with a filter the store can push down.
    pub fn clear_matching(&self, filter: &PermissionFilter) -> Result<usize> {
        self.clear_where(filter, |_| true)
    }

    fn clear_where<F>(&self, filter: &PermissionFilter, predicate: F) -> Result<usize>
    where
        F: Fn(&PermissionRecord) -> bool,
    {
        let doomed: Vec<PermissionRecord> = self
            .store
            .query(filter)?
            .into_iter()
            .filter(|r| predicate(r))
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete(&doomed)?;
        info!(removed, "cleared permissions");
        Ok(removed)
    }

    /// Insert or update the single record for `key`.
    ///
    /// An existing record is only written when its verdict or (supplied)
    /// parameters differ from what is requested.
    fn upsert(
        &self,
        key: PermissionKey,
        permission: Permission,
        params: Option<ParameterBag>,
    ) -> Result<PermissionRecord> {
        let filter = PermissionFilter::all()
            .action(key.action.clone())
            .role(key.role.clone())
            .scope(ScopeFilter::exact(key.entity.as_ref()));
        let mut matches = self.store.query(&filter)?;

        let mut record = match matches.len() {
            0 => return self.create(key, permission, params),
            1 => matches.remove(0),
            n => {
                warn!(action = %key.action, role = %key.role, records = n, "uniqueness violated");
                return Err(key.duplicate());
            }
        };

        let params_changed = params.as_ref().is_some_and(|p| *p != record.parameters);
        if record.permission == permission && !params_changed {
            debug!(id = %record.id, %permission, "permission unchanged");
            return Ok(record);
        }

        let previous = record.permission;
        record.permission = permission;
        if let Some(params) = params {
            record.parameters = params;
        }
        self.store.update(&record)?;
        info!(
            id = %record.id,
            action = %record.action,
            role = %record.role,
            from = %previous,
            to = %permission,
            "updated permission"
        );
        Ok(record)
    }

    fn create(
        &self,
        key: PermissionKey,
        permission: Permission,
        params: Option<ParameterBag>,
    ) -> Result<PermissionRecord> {
        let record = PermissionRecord::new(key, permission, params.unwrap_or_default())?;
        match self.store.insert(record) {
            Ok(record) => {
                info!(
                    id = %record.id,
                    action = %record.action,
                    role = %record.role,
                    %permission,
                    "created permission"
                );
                Ok(record)
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!(error = %err, "concurrent insert rejected");
                }
                Err(err)
            }
        }
    }
}

fn key(action: &Action, role: &RoleName, entity: Option<&EntityId>) -> PermissionKey {
    PermissionKey::new(action.clone(), role.clone(), entity.cloned())
}

/// Grant wins if any record grants; any other non-empty set denies.
fn aggregate(records: &[PermissionRecord]) -> Permission {
    if records.is_empty() {
        Permission::None
    } else if records.iter().any(|r| r.permission.is_granted()) {
        Permission::Grant
    } else {
        Permission::Deny
    }
}
