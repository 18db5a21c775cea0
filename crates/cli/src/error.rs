//! CLI error types.

use crate::config::ConfigError;
use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// `check` was given neither `--role` nor `--actor`.
    #[error("pass at least one --role or an --actor to check")]
    MissingRoles,

    /// `clear` was given no filter at all.
    #[error("refusing to clear every permission: pass --action, --role or --entity")]
    MissingFilter,

    /// Configuration is invalid or unreadable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred in the authorization engine.
    #[error(transparent)]
    Authz(#[from] authz::Error),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
