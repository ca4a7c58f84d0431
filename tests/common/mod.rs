#![allow(dead_code)]

use rs_couchbase::driver::MemoryCluster;
use rs_couchbase::{ClientConfig, CouchbaseClient, MemoryDriver, Role, User};
use tempfile::TempDir;

pub const URI: &str = "couchbase://localhost";
pub const BUCKET: &str = "travel";
pub const ADMIN: &str = "Administrator";
pub const ADMIN_PASSWORD: &str = "password";
pub const READER: &str = "reader";
pub const READER_PASSWORD: &str = "reader-pw";

/// Create a temporary directory for testing
pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Memory cluster with one bucket, an admin and a read-only user
pub fn seeded_driver() -> MemoryDriver {
    MemoryDriver::new()
        .with_bucket(BUCKET)
        .with_user(User::new(ADMIN, vec![Role::new("admin")]), ADMIN_PASSWORD)
        .with_user(
            User::new(READER, vec![Role::scoped("data_reader", BUCKET)]),
            READER_PASSWORD,
        )
}

pub fn admin_config() -> ClientConfig {
    ClientConfig::new(URI, ADMIN, ADMIN_PASSWORD)
}

pub async fn admin_client(driver: &MemoryDriver) -> CouchbaseClient<MemoryCluster> {
    CouchbaseClient::connect(driver, URI, ADMIN, ADMIN_PASSWORD)
        .await
        .expect("Admin should connect")
}

pub async fn reader_client(driver: &MemoryDriver) -> CouchbaseClient<MemoryCluster> {
    CouchbaseClient::connect(driver, URI, READER, READER_PASSWORD)
        .await
        .expect("Reader should connect")
}
