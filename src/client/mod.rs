//! The document store client facade and its passthrough functions.

mod facade;
mod ops;

pub use facade::CouchbaseClient;
pub use ops::{
    couchbase2json, create_user, export_document, export_key, import_document, import_key,
    json2couchbase, list_users,
};

use crate::driver::DriverError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds surfaced by the facade. The driver or I/O error that
/// caused each one stays attached as its source.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(#[source] DriverError),

    #[error("Not found: {what}")]
    NotFound {
        what: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store error: {0}")]
    Store(#[source] DriverError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not authorized: {0}")]
    Authorization(#[source] DriverError),

    #[error("Validation error: {0}")]
    Validation(#[source] DriverError),
}

impl ClientError {
    /// Translate a driver error using the kind shared by every operation.
    /// Operation-specific translation (for example not-found on a write)
    /// happens at the call site before falling back to this.
    pub(crate) fn from_driver(err: DriverError) -> Self {
        match err {
            DriverError::InvalidConnectionString(_)
            | DriverError::AuthenticationFailure(_)
            | DriverError::Disconnected => ClientError::Connection(err),
            DriverError::DocumentNotFound(ref id) => ClientError::NotFound {
                what: format!("document '{}'", id),
                source: Some(err),
            },
            DriverError::PathNotFound(ref path) => ClientError::NotFound {
                what: format!("path '{}'", path),
                source: Some(err),
            },
            DriverError::PermissionDenied(_) => ClientError::Authorization(err),
            DriverError::InvalidRole(_) => ClientError::Validation(err),
            _ => ClientError::Store(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}
