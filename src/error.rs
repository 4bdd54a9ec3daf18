use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    /// A row broke a schema constraint (malformed natural key, bad status, ...)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("cannot reach database: {0}")]
    Connection(#[source] rusqlite::Error),

    #[error("database error: {0}")]
    Storage(#[source] rusqlite::Error),

    #[error("database is not initialized, run `syllabus init` first")]
    NotInitialized,

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("unknown seeder '{0}'")]
    UnknownSeeder(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SeedError>;

impl From<rusqlite::Error> for SeedError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(e, _) => Some(e.code),
            _ => None,
        };

        match code {
            Some(ErrorCode::ConstraintViolation) => SeedError::ConstraintViolation(err.to_string()),
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::PermissionDenied,
            ) => SeedError::Connection(err),
            _ => SeedError::Storage(err),
        }
    }
}

impl SeedError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, SeedError::ConstraintViolation(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, SeedError::Connection(_))
    }
}
