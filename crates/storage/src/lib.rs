//! SQLite-backed storage for authorization permissions.
//!
//! [`SqliteStore`] implements [`authz::PermissionStore`]: it persists one row
//! per `(action, entity, role)` triple and enforces that uniqueness with a
//! table constraint, so racing inserts fail with a retryable
//! [`authz::Error::DuplicateKey`] instead of creating duplicates.
//!
//! Query filters are pushed down into SQL. Records without an entity are
//! stored with an empty `entity_id` so the constraint covers them too.
//!
//! # Example
//!
//! ```no_run
//! use authz::{Action, Authorization, Permission, RoleName};
//! use storage::SqliteStore;
//!
//! let store = SqliteStore::open("permissions.db")?;
//! let auth = Authorization::new(store);
//!
//! let publish = Action::new("Publish")?;
//! let editor = RoleName::new("Editor")?;
//! auth.grant(&publish, &editor, None)?;
//!
//! assert_eq!(auth.resolve(&publish, [&editor], None)?, Permission::Grant);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod store;

pub use error::{Error, Result};
pub use store::{RecordTimes, SqliteStore};
