use schemagate_security::ProfileError as ProfileDocumentError;

/// Failure decoding one row of a result set.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot decode column '{column}': {message}")]
pub struct ScanError {
    pub column: String,
    pub message: String,
}

impl ScanError {
    #[must_use]
    pub fn new(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            message: message.into(),
        }
    }
}

/// Failure resolving the active fields of a schema.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("field catalog query failed: {0}")]
    Db(#[from] sea_orm::DbErr),

    #[error("field catalog returned an invalid row: {0}")]
    Scan(#[from] ScanError),
}

/// Failure loading a user's security profile.
#[derive(thiserror::Error, Debug)]
pub enum ProfileError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error(transparent)]
    Malformed(#[from] ProfileDocumentError),

    #[error("profile query failed: {0}")]
    Db(#[from] sea_orm::DbErr),
}

/// Errors surfaced by scoped queries. None of them is retried.
#[derive(thiserror::Error, Debug)]
pub enum SecureQueryError {
    /// Query execution failed.
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// A returned row could not be decoded.
    #[error("row scan failed: {0}")]
    Scan(#[from] ScanError),

    /// The active fields of the schema could not be resolved.
    #[error("metadata lookup failed: {0}")]
    Metadata(#[from] CatalogError),

    /// A schema code, field code or column name is not a plain identifier.
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}
