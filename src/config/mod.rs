use crate::driver::AuthDomain;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Connection settings for a [`CouchbaseClient`](crate::client::CouchbaseClient).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Domain whose users `list_users`/`create_user` operate on
    #[serde(default)]
    pub auth_domain: AuthDomain,
}

impl ClientConfig {
    pub fn new(
        uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
            auth_domain: AuthDomain::default(),
        }
    }

    pub fn with_auth_domain(mut self, auth_domain: AuthDomain) -> Self {
        self.auth_domain = auth_domain;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_domain", &self.auth_domain)
            .finish()
    }
}

/// Read a configuration file; `None` when it does not exist.
pub async fn read_config(config_path: &Path) -> Result<Option<ClientConfig>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(config_path).await?;
    let config: ClientConfig = serde_json::from_str(&content)?;
    Ok(Some(config))
}

/// Write the configuration file
pub async fn write_config(config_path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_missing_config_is_none() {
        let temp = tempfile::tempdir().unwrap();
        let result = read_config(&temp.path().join("absent.json")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_config() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("client.json");
        let config = ClientConfig::new("couchbase://db", "ops", "pw")
            .with_auth_domain(AuthDomain::External);

        write_config(&path, &config).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"authDomain\": \"external\""));

        assert_eq!(read_config(&path).await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn test_auth_domain_defaults_to_local() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("client.json");
        std::fs::write(&path, r#"{"uri": "couchbase://db"}"#).unwrap();

        let config = read_config(&path).await.unwrap().unwrap();
        assert_eq!(config.auth_domain, AuthDomain::Local);
        assert!(config.username.is_empty());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ClientConfig::new("couchbase://db", "ops", "s3cret");
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
