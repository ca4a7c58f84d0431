pub mod client;
pub mod config;
pub mod driver;
pub mod rbac;
pub mod subdoc;
pub mod utils;

// Re-export commonly used types
pub use client::{
    couchbase2json, create_user, export_document, export_key, import_document, import_key,
    json2couchbase, list_users, ClientError, CouchbaseClient,
};
pub use config::{read_config, write_config, ClientConfig, ConfigError};
pub use driver::{
    AuthDomain, Bucket, Cluster, ConnectionString, DirectoryDriver, Driver, DriverCall,
    DriverError, DriverOp, MemoryDriver, PasswordAuthenticator, Role, User, UserAndMetadata,
};
pub use subdoc::{SubdocError, SubdocPath};
