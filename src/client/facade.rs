use super::ClientError;
use crate::config::ClientConfig;
use crate::driver::{
    AuthDomain, Bucket, Cluster, ConnectionString, Driver, DriverError, LookupInSpec,
    MutateInSpec, PasswordAuthenticator, Role, User, UserAndMetadata,
};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, trace};

/// Facade over one cluster connection.
///
/// Every document operation opens its bucket by name and performs exactly
/// one driver call; nothing is cached, retried or batched. Once the
/// underlying connection fails every call reports a connection error and
/// a new client has to be constructed.
#[derive(Debug)]
pub struct CouchbaseClient<C: Cluster> {
    cluster: C,
    auth_domain: AuthDomain,
}

impl<C: Cluster> CouchbaseClient<C> {
    /// Connect with explicit credentials, managing users of the local domain.
    pub async fn connect<D>(
        driver: &D,
        uri: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, ClientError>
    where
        D: Driver<Cluster = C>,
    {
        Self::connect_with_config(driver, &ClientConfig::new(uri, username, password)).await
    }

    pub async fn connect_with_config<D>(driver: &D, config: &ClientConfig) -> Result<Self, ClientError>
    where
        D: Driver<Cluster = C>,
    {
        debug!(uri = %config.uri, username = %config.username, "Connecting");
        let connection_string = ConnectionString::parse(&config.uri)
            .map_err(|e| ClientError::Connection(DriverError::from(e)))?;
        let authenticator = PasswordAuthenticator::new(&config.username, &config.password);
        let cluster = driver
            .connect(&connection_string, &authenticator)
            .await
            .map_err(ClientError::Connection)?;
        Ok(Self::from_cluster(cluster, config.auth_domain))
    }

    /// Wrap an already open cluster connection.
    pub fn from_cluster(cluster: C, auth_domain: AuthDomain) -> Self {
        Self {
            cluster,
            auth_domain,
        }
    }

    pub fn auth_domain(&self) -> AuthDomain {
        self.auth_domain
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    async fn open_bucket(&self, bucket: &str) -> Result<C::Bucket, ClientError> {
        debug!(bucket = %bucket, "Opening bucket");
        self.cluster
            .bucket(bucket)
            .await
            .map_err(ClientError::from_driver)
    }

    /// Upsert the JSON value stored in `json_path` as `document_id`.
    pub async fn import_json_file(
        &self,
        json_path: &Path,
        bucket: &str,
        document_id: &str,
    ) -> Result<(), ClientError> {
        info!(
            file = %json_path.display(),
            bucket = %bucket,
            document_id = %document_id,
            "Importing file"
        );
        let raw = fs::read_to_string(json_path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ClientError::NotFound {
                    what: format!("file '{}'", json_path.display()),
                    source: None,
                }
            } else {
                ClientError::Io {
                    path: json_path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        let document: Value =
            serde_json::from_str(&raw.replace('\n', "")).map_err(|e| ClientError::Parse {
                path: json_path.to_path_buf(),
                source: e,
            })?;
        self.import_json(&document, bucket, document_id).await
    }

    /// Write `document_id` to `json_path`. Nothing is written when the
    /// document cannot be read.
    pub async fn export_json_file(
        &self,
        bucket: &str,
        document_id: &str,
        json_path: &Path,
    ) -> Result<(), ClientError> {
        info!(
            document_id = %document_id,
            bucket = %bucket,
            file = %json_path.display(),
            "Exporting document into JSON file"
        );
        let document = self.export_json(bucket, document_id).await?;
        let io_error = |source: std::io::Error| ClientError::Io {
            path: json_path.to_path_buf(),
            source,
        };
        let content = serde_json::to_string(&document).map_err(|e| io_error(e.into()))?;
        fs::write(json_path, content).await.map_err(io_error)
    }

    /// Create or replace `document_id` with `document`.
    pub async fn import_json(
        &self,
        document: &Value,
        bucket: &str,
        document_id: &str,
    ) -> Result<(), ClientError> {
        info!(bucket = %bucket, document_id = %document_id, "Importing json document");
        let handle = self.open_bucket(bucket).await?;
        debug!(document_id = %document_id, "Upserting document");
        handle
            .upsert(document_id, document)
            .await
            .map_err(ClientError::from_driver)?;
        Ok(())
    }

    pub async fn export_json(&self, bucket: &str, document_id: &str) -> Result<Value, ClientError> {
        info!(document_id = %document_id, bucket = %bucket, "Exporting document into JSON object");
        let handle = self.open_bucket(bucket).await?;
        debug!(document_id = %document_id, "Getting document");
        let result = handle
            .get(document_id)
            .await
            .map_err(ClientError::from_driver)?;
        trace!(json = %result.content, "Returning json");
        Ok(result.content)
    }

    /// Read the value at `key` inside `document_id`.
    pub async fn export_key(
        &self,
        bucket: &str,
        document_id: &str,
        key: &str,
    ) -> Result<Value, ClientError> {
        info!(
            key = %key,
            document_id = %document_id,
            bucket = %bucket,
            "Exporting key into JSON object"
        );
        let handle = self.open_bucket(bucket).await?;
        debug!(key = %key, document_id = %document_id, "Getting key");
        let result = handle
            .lookup_in(document_id, &[LookupInSpec::get(key)])
            .await
            .map_err(ClientError::from_driver)?;

        let entry = result.entries.into_iter().next().ok_or_else(|| {
            ClientError::Store(DriverError::Server("lookup returned no results".to_string()))
        })?;
        if let Some(err) = entry.error {
            return Err(match DriverError::from(err) {
                DriverError::PathMismatch(path) => ClientError::NotFound {
                    what: format!("path '{}'", path),
                    source: Some(DriverError::PathMismatch(path)),
                },
                other => ClientError::from_driver(other),
            });
        }
        let value = entry.value.unwrap_or(Value::Null);
        trace!(json = %value, "Returning json");
        Ok(value)
    }

    /// Create or replace the field at `key` inside an existing document.
    /// Missing documents and missing parent paths are store errors.
    pub async fn import_key(
        &self,
        bucket: &str,
        document_id: &str,
        key: &str,
        value: &Value,
    ) -> Result<(), ClientError> {
        info!(
            value = %value,
            key = %key,
            document_id = %document_id,
            bucket = %bucket,
            "Upserting value"
        );
        let handle = self.open_bucket(bucket).await?;
        handle
            .mutate_in(document_id, &[MutateInSpec::upsert(key, value.clone())])
            .await
            .map_err(|err| match err {
                DriverError::DocumentNotFound(_) | DriverError::PathNotFound(_) => {
                    ClientError::Store(err)
                }
                other => ClientError::from_driver(other),
            })?;
        Ok(())
    }

    /// Users of the configured auth domain.
    pub async fn list_users(&self) -> Result<Vec<UserAndMetadata>, ClientError> {
        info!(domain = %self.auth_domain, "Listing users");
        let users = self
            .cluster
            .get_all_users(self.auth_domain)
            .await
            .map_err(ClientError::from_driver)?;
        debug!(
            domain = %self.auth_domain,
            count = users.len(),
            users = ?users.iter().map(|u| u.user.username.as_str()).collect::<Vec<_>>(),
            "Listed users"
        );
        Ok(users)
    }

    /// Create or update a user with exactly `roles`; an empty set is sent
    /// as is.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        roles: &[Role],
    ) -> Result<(), ClientError> {
        let role_names: Vec<String> = roles.iter().map(ToString::to_string).collect();
        info!(
            username = %username,
            roles = ?role_names,
            domain = %self.auth_domain,
            "Creating user"
        );
        let user = User::new(username, roles.to_vec());
        self.cluster
            .upsert_user(self.auth_domain, &user, password)
            .await
            .map_err(ClientError::from_driver)
    }
}
