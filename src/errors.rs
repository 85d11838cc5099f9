use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Clone, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    #[error("TOML: {0}")]
    Toml(#[source] Arc<toml::de::Error>),

    #[error("BSON: {0}")]
    Bson(#[source] Arc<bson::error::Error>),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("empty field name in {0}")]
    EmptyFieldName(&'static str),

    #[error("result argument must be a pointer to a slice")]
    QueryNotSlicePointer,

    #[error("result type is not equal mongodb value type")]
    QueryResultTypeInconsistent,

    #[error("mongo: no documents in result")]
    NoSuchDocuments,

    #[error("must be valid slice to insert")]
    NotValidSliceToInsert,

    #[error("replacement document cannot contain keys beginning with '$'")]
    ReplacementContainUpdateOperators,

    #[error("update document must contain only keys beginning with '$'")]
    UpdateRequiresOperators,

    #[error("field not found: {field}")]
    FieldNotFound { field: String },

    #[error("field {field} has type {found}, expected {expected}")]
    FieldTypeMismatch { field: String, expected: &'static str, found: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("hook failed: {0}")]
    Hook(String),

    #[error("retry transaction")]
    TransactionRetry,

    #[error("transaction not supported")]
    TransactionNotSupported,

    #[error("username not supported")]
    NotSupportedUsername,

    #[error("password not supported")]
    NotSupportedPassword,

    #[error("config error: {0}")]
    Config(String),

    #[error("model not registered: {0}")]
    ModelNotRegistered(String),

    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl DbError {
    /// True for the "zero matches" signal.
    #[must_use]
    pub const fn is_no_documents(&self) -> bool {
        matches!(self, Self::NoSuchDocuments)
    }

    /// True when the driver reported a duplicate key (E11000).
    #[must_use]
    pub fn is_dup(&self) -> bool {
        matches!(self, Self::Driver(msg) if msg.contains("E11000"))
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(Arc::new(e))
    }
}

impl From<toml::de::Error> for DbError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(Arc::new(e))
    }
}

impl From<bson::error::Error> for DbError {
    fn from(e: bson::error::Error) -> Self {
        Self::Bson(Arc::new(e))
    }
}
