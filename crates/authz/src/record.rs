//! Permission records and the identifiers they are keyed by.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Untyped parameters attached to a permission record, keyed by field name.
pub type ParameterBag = BTreeMap<String, String>;

/// The resolved outcome of a permission check.
///
/// `None` means no rule applies. It is never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    None,
    Grant,
    Deny,
}

impl Permission {
    pub fn is_granted(self) -> bool {
        matches!(self, Permission::Grant)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::None => "none",
            Permission::Grant => "grant",
            Permission::Deny => "deny",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Permission::None),
            "grant" => Ok(Permission::Grant),
            "deny" => Ok(Permission::Deny),
            other => Err(Error::Invalid(format!("unknown permission '{other}'"))),
        }
    }
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(Error::Invalid(concat!($what, " must not be empty").to_string()));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }
    };
}

name_type!(
    /// A protected operation, e.g. `Publish` or `Content.Publish`.
    ///
    /// Categorized actions are stored as a single `category.name` string.
    Action,
    "action"
);

name_type!(
    /// A role that permissions are granted to or denied from.
    RoleName,
    "role name"
);

name_type!(
    /// Identifier of one target resource instance.
    EntityId,
    "entity id"
);

impl Action {
    /// Separator between category and name in a categorized action.
    pub const SEPARATOR: char = '.';

    /// Build a `category.name` action.
    pub fn categorized(category: &str, name: &str) -> Result<Self> {
        if category.trim().is_empty() || name.trim().is_empty() {
            return Err(Error::Invalid(
                "action category and name must not be empty".to_string(),
            ));
        }
        Self::new(format!("{category}{}{name}", Self::SEPARATOR))
    }

    /// The category part, if this action has one.
    pub fn category(&self) -> Option<&str> {
        self.0.split_once(Self::SEPARATOR).map(|(category, _)| category)
    }

    /// The action name without its category.
    pub fn name(&self) -> &str {
        self.0
            .split_once(Self::SEPARATOR)
            .map_or(self.0.as_str(), |(_, name)| name)
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// The uniqueness key of a permission record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionKey {
    pub action: Action,
    pub entity: Option<EntityId>,
    pub role: RoleName,
}

impl PermissionKey {
    pub fn new(action: Action, role: RoleName, entity: Option<EntityId>) -> Self {
        Self {
            action,
            entity,
            role,
        }
    }

    /// Build the duplicate-key error for this triple.
    pub fn duplicate(&self) -> Error {
        Error::DuplicateKey {
            action: self.action.to_string(),
            role: self.role.to_string(),
            entity: self.entity.as_ref().map(ToString::to_string),
        }
    }
}

/// One grant/deny fact for an action, a role and an optional entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: Uuid,
    pub action: Action,
    pub entity: Option<EntityId>,
    pub role: RoleName,
    pub permission: Permission,
    #[serde(default)]
    pub parameters: ParameterBag,
}

impl PermissionRecord {
    /// Create a new record with a fresh id.
    ///
    /// Fails if `permission` is [`Permission::None`].
    pub fn new(key: PermissionKey, permission: Permission, parameters: ParameterBag) -> Result<Self> {
        if permission == Permission::None {
            return Err(Error::Invalid(
                "a permission record cannot hold a 'none' verdict".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            action: key.action,
            entity: key.entity,
            role: key.role,
            permission,
            parameters,
        })
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.action.clone(), self.role.clone(), self.entity.clone())
    }

    pub fn matches_key(&self, key: &PermissionKey) -> bool {
        self.action == key.action && self.role == key.role && self.entity == key.entity
    }

    /// Whether this record is scoped to the given entity (or unscoped when `None`).
    pub fn is_scoped_to(&self, entity: Option<&EntityId>) -> bool {
        self.entity.as_ref() == entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PermissionKey {
        PermissionKey::new(
            Action::new("Publish").unwrap(),
            RoleName::new("Editor").unwrap(),
            None,
        )
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(Action::new("").is_err());
        assert!(RoleName::new("   ").is_err());
        assert!(EntityId::new("").is_err());
    }

    #[test]
    fn test_categorized_action() {
        let action = Action::categorized("Content", "Publish").unwrap();
        assert_eq!(action.as_str(), "Content.Publish");
        assert_eq!(action.category(), Some("Content"));
        assert_eq!(action.name(), "Publish");

        let plain = Action::new("Publish").unwrap();
        assert_eq!(plain.category(), None);
        assert_eq!(plain.name(), "Publish");
    }

    #[test]
    fn test_record_rejects_none_verdict() {
        assert!(PermissionRecord::new(key(), Permission::None, ParameterBag::new()).is_err());
    }

    #[test]
    fn test_record_matches_own_key() {
        let record = PermissionRecord::new(key(), Permission::Grant, ParameterBag::new()).unwrap();
        assert!(record.matches_key(&key()));
        assert!(record.is_scoped_to(None));
        assert!(!record.is_scoped_to(Some(&EntityId::new("doc-1").unwrap())));
    }

    #[test]
    fn test_permission_serde() {
        let json = serde_json::to_string(&Permission::Grant).unwrap();
        assert_eq!(json, "\"grant\"");
        assert_eq!("deny".parse::<Permission>().unwrap(), Permission::Deny);

        let bad: std::result::Result<Action, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
