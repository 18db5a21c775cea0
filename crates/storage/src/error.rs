use thiserror::Error;

/// Storage errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt permission row {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error(transparent)]
    Authz(#[from] authz::Error),
}

impl From<Error> for authz::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Authz(inner) => inner,
            other => authz::Error::storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
