use atlas_types::models::DraftError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Input rejected before it reached the database.
    #[error(transparent)]
    Validation(#[from] DraftError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Username already exists")]
    DuplicateUsername,

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// Extended result codes we translate into domain errors.
pub(crate) fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}
