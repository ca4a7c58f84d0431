//! The document store driver seam.
//!
//! The facade talks to a store only through these traits: a [`Driver`]
//! opens a [`Cluster`], a cluster hands out [`Bucket`] handles and manages
//! users, and a bucket performs document and sub-document calls. Two
//! embedded drivers are provided: [`MemoryDriver`] keeps everything in
//! process and journals every call, [`DirectoryDriver`] persists a
//! cluster as JSON files under a local directory.

mod apply;
mod directory;
mod memory;
mod types;

pub use directory::{DirectoryBucket, DirectoryCluster, DirectoryDriver};
pub use memory::{DriverCall, DriverOp, MemoryBucket, MemoryCluster, MemoryDriver};
pub use types::{
    AuthDomain, ConnectionString, GetResult, LookupInEntry, LookupInResult, LookupInSpec,
    MutateInSpec, MutationResult, ParseError, PasswordAuthenticator, Role, User,
    UserAndMetadata,
};

use crate::subdoc::SubdocError;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Authentication failed for user '{0}'")]
    AuthenticationFailure(String),

    #[error("Connection to the cluster was lost")]
    Disconnected,

    #[error("Bucket '{0}' not found")]
    BucketNotFound(String),

    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    #[error("Path '{0}' not found")]
    PathNotFound(String),

    #[error("Path '{0}' does not match the document structure")]
    PathMismatch(String),

    #[error("Invalid path '{path}': {reason}")]
    PathInvalid { path: String, reason: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SubdocError> for DriverError {
    fn from(err: SubdocError) -> Self {
        match err {
            SubdocError::PathInvalid { path, reason } => DriverError::PathInvalid { path, reason },
            SubdocError::PathNotFound(path) => DriverError::PathNotFound(path),
            SubdocError::PathMismatch(path) => DriverError::PathMismatch(path),
        }
    }
}

impl From<ParseError> for DriverError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Role(role) => DriverError::InvalidRole(role),
            other => DriverError::InvalidConnectionString(other.to_string()),
        }
    }
}

/// Entry point of a store implementation.
#[async_trait]
pub trait Driver: Send + Sync {
    type Cluster: Cluster;

    /// Open and authenticate a cluster connection.
    async fn connect(
        &self,
        connection_string: &ConnectionString,
        authenticator: &PasswordAuthenticator,
    ) -> Result<Self::Cluster, DriverError>;
}

/// An authenticated cluster connection.
#[async_trait]
pub trait Cluster: Send + Sync {
    type Bucket: Bucket;

    /// Resolve a bucket handle by name.
    async fn bucket(&self, name: &str) -> Result<Self::Bucket, DriverError>;

    /// List every user defined in `domain`.
    async fn get_all_users(&self, domain: AuthDomain) -> Result<Vec<UserAndMetadata>, DriverError>;

    /// Create or replace a user in `domain`.
    async fn upsert_user(
        &self,
        domain: AuthDomain,
        user: &User,
        password: &str,
    ) -> Result<(), DriverError>;
}

/// Document and sub-document calls against one bucket.
#[async_trait]
pub trait Bucket: Send + Sync {
    fn name(&self) -> &str;

    /// Create or replace a whole document.
    async fn upsert(&self, id: &str, content: &Value) -> Result<MutationResult, DriverError>;

    /// Fetch a whole document.
    async fn get(&self, id: &str) -> Result<GetResult, DriverError>;

    /// Read individual paths; path-level failures are reported per entry.
    async fn lookup_in(
        &self,
        id: &str,
        specs: &[LookupInSpec],
    ) -> Result<LookupInResult, DriverError>;

    /// Apply sub-document writes atomically.
    async fn mutate_in(
        &self,
        id: &str,
        specs: &[MutateInSpec],
    ) -> Result<MutationResult, DriverError>;
}
