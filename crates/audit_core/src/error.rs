//! Error taxonomy shared by the store, import and submission layers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    /// The local database could not be opened or a transaction failed.
    #[error(
        "Storage unavailable: {0}. Check that the data directory is writable and has free space."
    )]
    StorageUnavailable(String),

    /// Non-overwriting insert hit an existing primary key.
    #[error("An audit entry with id {0} already exists")]
    DuplicateIdentity(i64),

    #[error("File {file} has an invalid format: {reason}")]
    InvalidImportFormat { file: String, reason: String },

    /// The submitted audio was already audited. Not a system failure.
    #[error(
        "Duplicate audio: this call was already audited by {auditor} on {timestamp} (entry {existing_id}). The previous report has been opened instead."
    )]
    DuplicateAudio {
        existing_id: i64,
        auditor: String,
        timestamp: String,
    },

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for AuditError {
    fn from(err: rusqlite::Error) -> Self {
        AuditError::StorageUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
