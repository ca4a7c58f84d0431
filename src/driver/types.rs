use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9+.\-]*$").expect("scheme pattern is valid"));

static ROLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[a-z_]+)(?:\[(?P<bucket>[^\[\]]+)\])?$").expect("role pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid connection string '{0}': {1}")]
    ConnectionString(String, String),

    #[error("Invalid role '{0}'")]
    Role(String),

    #[error("Unknown auth domain '{0}'")]
    AuthDomain(String),
}

/// Parsed `scheme://hosts[/path][?params]` connection string.
///
/// For the `file` scheme everything after `file://` (minus any query) is
/// a filesystem path and `hosts` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub scheme: String,
    pub hosts: Vec<String>,
    pub path: Option<String>,
    pub params: BTreeMap<String, String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let invalid = |reason: &str| ParseError::ConnectionString(raw.to_string(), reason.to_string());

        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| invalid("missing '://'"))?;
        if !SCHEME_RE.is_match(scheme) {
            return Err(invalid("malformed scheme"));
        }

        let (target, query) = match rest.split_once('?') {
            Some((target, query)) => (target, Some(query)),
            None => (rest, None),
        };

        let mut params = BTreeMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                if key.is_empty() {
                    return Err(invalid("empty parameter name"));
                }
                params.insert(key.to_string(), value.to_string());
            }
        }

        if scheme == "file" {
            if target.is_empty() {
                return Err(invalid("missing directory path"));
            }
            return Ok(Self {
                scheme: scheme.to_string(),
                hosts: Vec::new(),
                path: Some(target.to_string()),
                params,
            });
        }

        let (host_list, path) = match target.split_once('/') {
            Some((hosts, path)) if !path.is_empty() => (hosts, Some(path.to_string())),
            Some((hosts, _)) => (hosts, None),
            None => (target, None),
        };

        let hosts: Vec<String> = host_list
            .split(',')
            .map(|h| h.trim().to_string())
            .collect();
        if hosts.iter().any(|h| h.is_empty()) {
            return Err(invalid("empty host"));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            hosts,
            path,
            params,
        })
    }
}

impl FromStr for ConnectionString {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if self.scheme == "file" {
            write!(f, "{}", self.path.as_deref().unwrap_or_default())?;
        } else {
            write!(f, "{}", self.hosts.join(","))?;
            if let Some(path) = &self.path {
                write!(f, "/{}", path)?;
            }
        }
        if !self.params.is_empty() {
            let query: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "?{}", query.join("&"))?;
        }
        Ok(())
    }
}

/// Username/password credentials presented when connecting.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordAuthenticator {
    pub username: String,
    pub password: String,
}

impl PasswordAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for PasswordAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordAuthenticator")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where a user account is defined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthDomain {
    /// Users defined in the cluster itself
    #[default]
    Local,
    /// Users authenticated by an external directory (LDAP and friends)
    External,
}

impl fmt::Display for AuthDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthDomain::Local => write!(f, "local"),
            AuthDomain::External => write!(f, "external"),
        }
    }
}

impl FromStr for AuthDomain {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(AuthDomain::Local),
            "external" => Ok(AuthDomain::External),
            _ => Err(ParseError::AuthDomain(s.to_string())),
        }
    }
}

/// An RBAC role, optionally scoped to a bucket (`data_reader[travel]`).
/// A `*` bucket scopes the role to every bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: None,
        }
    }

    pub fn scoped(name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: Some(bucket.into()),
        }
    }

    /// Whether this role's scope covers `bucket`.
    pub fn covers(&self, bucket: &str) -> bool {
        match self.bucket.as_deref() {
            Some("*") => true,
            Some(scope) => scope == bucket,
            None => true,
        }
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = ROLE_RE
            .captures(s.trim())
            .ok_or_else(|| ParseError::Role(s.to_string()))?;
        Ok(Self {
            name: caps["name"].to_string(),
            bucket: caps.name("bucket").map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bucket {
            Some(bucket) => write!(f, "{}[{}]", self.name, bucket),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A user account as submitted to `upsert_user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl User {
    pub fn new(username: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            username: username.into(),
            display_name: None,
            roles,
        }
    }
}

/// A user account as reported by `get_all_users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAndMetadata {
    pub domain: AuthDomain,
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_changed: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetResult {
    pub cas: u64,
    pub content: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationResult {
    pub cas: u64,
}

/// A single sub-document read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupInSpec {
    Get { path: String },
}

impl LookupInSpec {
    pub fn get(path: impl Into<String>) -> Self {
        LookupInSpec::Get { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            LookupInSpec::Get { path } => path,
        }
    }
}

/// A single sub-document write.
#[derive(Debug, Clone, PartialEq)]
pub enum MutateInSpec {
    Upsert {
        path: String,
        value: Value,
        create_path: bool,
    },
}

impl MutateInSpec {
    pub fn upsert(path: impl Into<String>, value: Value) -> Self {
        MutateInSpec::Upsert {
            path: path.into(),
            value,
            create_path: false,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            MutateInSpec::Upsert { path, .. } => path,
        }
    }
}

/// Per-spec outcome of a lookup; a missing path is reported here rather
/// than failing the whole call.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupInEntry {
    pub path: String,
    pub value: Option<Value>,
    pub error: Option<crate::subdoc::SubdocError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupInResult {
    pub cas: u64,
    pub entries: Vec<LookupInEntry>,
}
