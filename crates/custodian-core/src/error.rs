//! Core error types.

use thiserror::Error;

use crate::ddl::DdlError;
use crate::meta::MetaError;

/// Core errors shared by the stores, the resolver and the DDL engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Object type description not found.
    #[error("object '{0}' not found")]
    NotFound(String),

    /// Object type description already exists.
    #[error("object '{0}' already exists")]
    AlreadyExists(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Invalid or inconsistent description.
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Physical schema error.
    #[error(transparent)]
    Ddl(#[from] DdlError),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Serialization(e.to_string())
        }
    }
}
