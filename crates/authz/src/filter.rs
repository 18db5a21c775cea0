//! Query filters over permission records.
//!
//! A [`PermissionFilter`] only covers fields a backend can push down into its
//! own query language. Arbitrary predicates are applied afterwards by the engine.

use crate::{Action, EntityId, Permission, PermissionRecord, RoleName};
use std::collections::BTreeSet;

/// Entity scope constraint of a filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScopeFilter {
    /// Match records regardless of entity.
    #[default]
    Any,
    /// Match only records that apply to the action generally.
    Unscoped,
    /// Match only records scoped to this entity.
    Entity(EntityId),
}

impl ScopeFilter {
    /// Exact-match scope for an optional entity.
    pub fn exact(entity: Option<&EntityId>) -> Self {
        match entity {
            Some(id) => ScopeFilter::Entity(id.clone()),
            None => ScopeFilter::Unscoped,
        }
    }

    pub fn matches(&self, entity: Option<&EntityId>) -> bool {
        match self {
            ScopeFilter::Any => true,
            ScopeFilter::Unscoped => entity.is_none(),
            ScopeFilter::Entity(id) => entity == Some(id),
        }
    }
}

/// Conjunction of optional field constraints. The default filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionFilter {
    pub action: Option<Action>,
    /// Role must be a member of this set. An empty set matches nothing.
    pub roles: Option<BTreeSet<RoleName>>,
    pub scope: ScopeFilter,
    pub permission: Option<Permission>,
}

impl PermissionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn role(self, role: RoleName) -> Self {
        self.roles([role])
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = RoleName>) -> Self {
        self.roles = Some(roles.into_iter().collect());
        self
    }

    pub fn scope(mut self, scope: ScopeFilter) -> Self {
        self.scope = scope;
        self
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    /// True when no record can match, so a backend may skip the query.
    pub fn is_empty_match(&self) -> bool {
        matches!(&self.roles, Some(roles) if roles.is_empty())
            || self.permission == Some(Permission::None)
    }

    pub fn matches(&self, record: &PermissionRecord) -> bool {
        if let Some(action) = &self.action {
            if &record.action != action {
                return false;
            }
        }
        if let Some(roles) = &self.roles {
            if !roles.contains(&record.role) {
                return false;
            }
        }
        if let Some(permission) = self.permission {
            if record.permission != permission {
                return false;
            }
        }
        self.scope.matches(record.entity.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParameterBag, PermissionKey};

    fn record(action: &str, role: &str, entity: Option<&str>, permission: Permission) -> PermissionRecord {
        PermissionRecord::new(
            PermissionKey::new(
                Action::new(action).unwrap(),
                RoleName::new(role).unwrap(),
                entity.map(|e| EntityId::new(e).unwrap()),
            ),
            permission,
            ParameterBag::new(),
        )
        .unwrap()
    }

    #[test]
    fn default_filter_matches_everything() {
        let filter = PermissionFilter::all();
        assert!(filter.matches(&record("A", "R", None, Permission::Grant)));
        assert!(filter.matches(&record("B", "S", Some("e1"), Permission::Deny)));
    }

    #[test]
    fn scope_is_exact_match() {
        let e1 = EntityId::new("e1").unwrap();
        let scoped = record("A", "R", Some("e1"), Permission::Grant);
        let general = record("A", "R", None, Permission::Grant);

        let by_entity = PermissionFilter::all().scope(ScopeFilter::exact(Some(&e1)));
        assert!(by_entity.matches(&scoped));
        assert!(!by_entity.matches(&general));

        let unscoped = PermissionFilter::all().scope(ScopeFilter::exact(None));
        assert!(!unscoped.matches(&scoped));
        assert!(unscoped.matches(&general));
    }

    #[test]
    fn role_set_membership() {
        let filter = PermissionFilter::all().roles([
            RoleName::new("R1").unwrap(),
            RoleName::new("R2").unwrap(),
        ]);
        assert!(filter.matches(&record("A", "R2", None, Permission::Deny)));
        assert!(!filter.matches(&record("A", "R3", None, Permission::Deny)));

        let nobody = PermissionFilter::all().roles(Vec::new());
        assert!(nobody.is_empty_match());
        assert!(!nobody.matches(&record("A", "R1", None, Permission::Grant)));
    }
}
