//! One-shot passthroughs: each connects a fresh client from `config`,
//! performs a single facade operation and drops the connection.

use super::{ClientError, CouchbaseClient};
use crate::config::ClientConfig;
use crate::driver::{Driver, Role, UserAndMetadata};
use serde_json::Value;
use std::path::Path;

async fn connect<D: Driver>(
    driver: &D,
    config: &ClientConfig,
) -> Result<CouchbaseClient<D::Cluster>, ClientError> {
    CouchbaseClient::<D::Cluster>::connect_with_config(driver, config).await
}

/// Import a JSON file as a document.
pub async fn json2couchbase<D: Driver>(
    driver: &D,
    config: &ClientConfig,
    document_path: &Path,
    bucket: &str,
    document_id: &str,
) -> Result<(), ClientError> {
    connect(driver, config)
        .await?
        .import_json_file(document_path, bucket, document_id)
        .await
}

/// Export a document to a JSON file.
pub async fn couchbase2json<D: Driver>(
    driver: &D,
    config: &ClientConfig,
    bucket: &str,
    document_id: &str,
    document_path: &Path,
) -> Result<(), ClientError> {
    connect(driver, config)
        .await?
        .export_json_file(bucket, document_id, document_path)
        .await
}

pub async fn import_document<D: Driver>(
    driver: &D,
    config: &ClientConfig,
    bucket: &str,
    document_id: &str,
    document: &Value,
) -> Result<(), ClientError> {
    connect(driver, config)
        .await?
        .import_json(document, bucket, document_id)
        .await
}

pub async fn export_document<D: Driver>(
    driver: &D,
    config: &ClientConfig,
    bucket: &str,
    document_id: &str,
) -> Result<Value, ClientError> {
    connect(driver, config)
        .await?
        .export_json(bucket, document_id)
        .await
}

pub async fn import_key<D: Driver>(
    driver: &D,
    config: &ClientConfig,
    bucket: &str,
    document_id: &str,
    key: &str,
    value: &Value,
) -> Result<(), ClientError> {
    connect(driver, config)
        .await?
        .import_key(bucket, document_id, key, value)
        .await
}

pub async fn export_key<D: Driver>(
    driver: &D,
    config: &ClientConfig,
    bucket: &str,
    document_id: &str,
    key: &str,
) -> Result<Value, ClientError> {
    connect(driver, config)
        .await?
        .export_key(bucket, document_id, key)
        .await
}

pub async fn list_users<D: Driver>(
    driver: &D,
    config: &ClientConfig,
) -> Result<Vec<UserAndMetadata>, ClientError> {
    connect(driver, config).await?.list_users().await
}

pub async fn create_user<D: Driver>(
    driver: &D,
    config: &ClientConfig,
    username: &str,
    password: &str,
    roles: &[Role],
) -> Result<(), ClientError> {
    connect(driver, config)
        .await?
        .create_user(username, password, roles)
        .await
}
