//! Role resolution port.

use crate::{Result, RoleName};
use std::collections::{BTreeMap, BTreeSet};

/// Maps an actor identifier to the roles it holds.
///
/// Called once per actor-aware engine operation. Implementations should be
/// free of side effects from the engine's point of view.
pub trait RoleResolver {
    fn resolve_roles(&self, actor: &str) -> Result<BTreeSet<RoleName>>;
}

impl<F> RoleResolver for F
where
    F: Fn(&str) -> Result<BTreeSet<RoleName>>,
{
    fn resolve_roles(&self, actor: &str) -> Result<BTreeSet<RoleName>> {
        self(actor)
    }
}

/// A resolver for hosts that always pass role sets explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoles;

impl RoleResolver for NoRoles {
    fn resolve_roles(&self, _actor: &str) -> Result<BTreeSet<RoleName>> {
        Ok(BTreeSet::new())
    }
}

/// Fixed actor-to-roles table. Unknown actors hold no roles.
#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    table: BTreeMap<String, BTreeSet<RoleName>>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add roles for an actor, merging with any it already holds.
    pub fn assign<I, S>(mut self, actor: impl Into<String>, roles: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.table.entry(actor.into()).or_default();
        for role in roles {
            entry.insert(RoleName::new(role)?);
        }
        Ok(self)
    }

    /// Build from a plain `actor -> [role]` map, e.g. a config section.
    pub fn from_table<I, R>(table: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, R)>,
        R: IntoIterator<Item = String>,
    {
        table
            .into_iter()
            .try_fold(Self::new(), |roles, (actor, names)| roles.assign(actor, names))
    }

    pub fn actors(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}

impl RoleResolver for StaticRoles {
    fn resolve_roles(&self, actor: &str) -> Result<BTreeSet<RoleName>> {
        Ok(self.table.get(actor).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str) -> RoleName {
        RoleName::new(name).unwrap()
    }

    #[test]
    fn static_roles_merge_assignments() {
        let roles = StaticRoles::new()
            .assign("alice", ["Editor"])
            .unwrap()
            .assign("alice", ["Reviewer"])
            .unwrap();

        let held = roles.resolve_roles("alice").unwrap();
        assert_eq!(held, BTreeSet::from([role("Editor"), role("Reviewer")]));
        assert!(roles.resolve_roles("bob").unwrap().is_empty());
    }

    #[test]
    fn static_roles_reject_empty_role() {
        assert!(StaticRoles::new().assign("alice", [""]).is_err());
    }

    #[test]
    fn from_table() {
        let roles = StaticRoles::from_table([("bob".to_string(), vec!["Author".to_string()])]).unwrap();
        assert_eq!(roles.actors().collect::<Vec<_>>(), vec!["bob"]);
        assert_eq!(roles.resolve_roles("bob").unwrap(), BTreeSet::from([role("Author")]));
    }

    #[test]
    fn closures_resolve_roles() {
        let resolver = |actor: &str| -> Result<BTreeSet<RoleName>> {
            Ok(if actor == "root" { BTreeSet::from([role("Admin")]) } else { BTreeSet::new() })
        };
        assert_eq!(resolver.resolve_roles("root").unwrap().len(), 1);
        assert!(resolver.resolve_roles("guest").unwrap().is_empty());
    }
}
