//! Role-based authorization decisions.
//!
//! Permissions are stored as records of the form "for this action (optionally
//! on one entity), this role is granted or denied". The [`Authorization`]
//! engine answers whether a set of roles may perform an action and maintains
//! those records through idempotent grant/deny upserts and predicate-based
//! clearing.
//!
//! Storage and role lookup are ports: implement [`PermissionStore`] and
//! [`RoleResolver`] for your backend, or use [`MemoryStore`] and
//! [`StaticRoles`].
//!
//! # Example
//!
//! ```
//! use authz::{Action, Authorization, MemoryStore, Permission, RoleName, StaticRoles};
//!
//! let roles = StaticRoles::new().assign("alice", ["Editor"])?;
//! let auth = Authorization::with_roles(MemoryStore::new(), roles);
//!
//! let publish = Action::new("Publish")?;
//! let editor = RoleName::new("Editor")?;
//!
//! auth.grant(&publish, &editor, None)?;
//! assert!(auth.is_permitted("alice", &publish, None)?);
//!
//! auth.deny(&publish, &editor, None)?;
//! assert_eq!(auth.resolve(&publish, [&editor], None)?, Permission::Deny);
//!
//! auth.clear_permissions(|r| r.action == publish)?;
//! assert_eq!(auth.resolve(&publish, [&editor], None)?, Permission::None);
//! # Ok::<(), authz::Error>(())
//! ```

mod engine;
mod error;
mod filter;
pub mod params;
mod record;
mod roles;
mod store;

pub use engine::Authorization;
pub use error::{Error, Result};
pub use filter::{PermissionFilter, ScopeFilter};
pub use params::TypedPermission;
pub use record::{Action, EntityId, ParameterBag, Permission, PermissionKey, PermissionRecord, RoleName};
pub use roles::{NoRoles, RoleResolver, StaticRoles};
pub use store::{MemoryStore, PermissionStore};
