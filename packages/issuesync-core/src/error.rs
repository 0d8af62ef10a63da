use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),
    /// A concurrent transaction won a write-write race; re-running the whole
    /// transaction from scratch is safe.
    #[error("transaction conflict: {0}")]
    Conflict(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
    #[error("unsupported schema version {found} (expected 0..={supported})")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}
