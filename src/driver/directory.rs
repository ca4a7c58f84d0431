use super::apply::{apply_mutations, lookup_entries};
use super::{
    AuthDomain, Bucket, Cluster, ConnectionString, Driver, DriverError, GetResult,
    LookupInResult, LookupInSpec, MutateInSpec, MutationResult, PasswordAuthenticator, Role, User,
    UserAndMetadata,
};
use crate::rbac::{can_access, can_manage_users, Access, UserTable};
use crate::utils::{compute_hash, now_iso};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

const USERS_FILE: &str = "users.json";
const BUCKETS_DIR: &str = "buckets";

/// Write locks per store root, shared by every driver in the process
static STORE_LOCKS: OnceLock<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

static BUCKET_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%\-]{1,100}$").expect("bucket pattern is valid"));

/// Users file at the root of a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersFile {
    schema_version: u32,
    updated_at: String,
    users: UserTable,
}

/// One document on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDocument {
    id: String,
    cas: u64,
    updated_at: String,
    content: Value,
}

fn users_path(root: &Path) -> PathBuf {
    root.join(USERS_FILE)
}

fn bucket_path(root: &Path, bucket: &str) -> PathBuf {
    root.join(BUCKETS_DIR).join(bucket)
}

/// Document IDs are opaque and up to 250 bytes, so file names are their
/// SHA-256 digest. The ID itself is kept inside the file.
fn document_path(root: &Path, bucket: &str, id: &str) -> PathBuf {
    bucket_path(root, bucket).join(format!("{}.json", compute_hash(id)))
}

/// Get the write lock for a store root. Keyed by canonical path so every
/// spelling of the same directory shares one lock.
fn store_lock(root: &Path) -> Arc<Mutex<()>> {
    let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut locks = STORE_LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(locks.entry(key).or_default())
}

async fn read_users(root: &Path) -> Result<UsersFile, DriverError> {
    let path = users_path(root);
    if !path.exists() {
        return Ok(UsersFile {
            schema_version: 1,
            updated_at: now_iso(),
            users: UserTable::default(),
        });
    }
    let content = fs::read_to_string(&path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Write JSON atomically using temp file + rename. Caller must hold the
/// store lock.
async fn write_json_unlocked<T: Serialize>(path: &Path, value: &T) -> Result<(), DriverError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    // Unique per writer so concurrent processes never rename each other's file
    let temp_path = path.with_extension(format!(
        "json.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let content = serde_json::to_string_pretty(value)?;
    fs::write(&temp_path, &content).await?;
    fs::rename(&temp_path, path).await?;
    Ok(())
}

async fn read_document(root: &Path, bucket: &str, id: &str) -> Result<Option<StoredDocument>, DriverError> {
    let path = document_path(root, bucket, id);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path).await?;
    let doc: StoredDocument = serde_json::from_str(&content)?;
    if doc.id != id {
        return Err(DriverError::Server(format!(
            "document file {} holds '{}', not '{}'",
            path.display(),
            doc.id,
            id
        )));
    }
    Ok(Some(doc))
}

/// Cluster persisted as JSON files under a directory, addressed with
/// `file://<directory>` connection strings.
///
/// ```text
/// <root>/users.json
/// <root>/buckets/<bucket>/<sha256(document id)>.json
/// ```
///
/// Writes to one root are serialized across every driver in the process.
#[derive(Debug, Clone, Default)]
pub struct DirectoryDriver;

impl DirectoryDriver {
    pub fn new() -> Self {
        Self
    }

    /// Bootstrap a store: create the directory layout, (re)set the admin
    /// account and declare buckets. Existing users and documents are kept.
    pub async fn initialize(
        &self,
        root: &Path,
        admin: &PasswordAuthenticator,
        buckets: &[String],
    ) -> Result<(), DriverError> {
        for bucket in buckets {
            if !BUCKET_NAME_RE.is_match(bucket) {
                return Err(DriverError::Server(format!("invalid bucket name '{}'", bucket)));
            }
        }

        fs::create_dir_all(root).await?;
        let lock = store_lock(root);
        let _guard = lock.lock().await;

        let mut users = read_users(root).await?;
        users.users.upsert(
            AuthDomain::Local,
            &User::new(admin.username.clone(), vec![Role::new("admin")]),
            &admin.password,
        )?;
        users.updated_at = now_iso();
        write_json_unlocked(&users_path(root), &users).await?;

        for bucket in buckets {
            fs::create_dir_all(bucket_path(root, bucket)).await?;
            debug!(root = %root.display(), bucket = %bucket, "Declared bucket");
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for DirectoryDriver {
    type Cluster = DirectoryCluster;

    async fn connect(
        &self,
        connection_string: &ConnectionString,
        authenticator: &PasswordAuthenticator,
    ) -> Result<DirectoryCluster, DriverError> {
        let root = match (connection_string.scheme.as_str(), &connection_string.path) {
            ("file", Some(path)) => PathBuf::from(path),
            _ => {
                return Err(DriverError::InvalidConnectionString(format!(
                    "expected file://<directory>, got '{}'",
                    connection_string
                )))
            }
        };

        if !users_path(&root).exists() {
            return Err(DriverError::InvalidConnectionString(format!(
                "no store initialized at '{}'",
                root.display()
            )));
        }

        read_users(&root).await?.users.authenticate(authenticator)?;

        Ok(DirectoryCluster {
            lock: store_lock(&root),
            root: Arc::new(root),
            username: authenticator.username.clone(),
        })
    }
}

/// Connection handed out by [`DirectoryDriver`].
#[derive(Debug, Clone)]
pub struct DirectoryCluster {
    root: Arc<PathBuf>,
    username: String,
    lock: Arc<Mutex<()>>,
}

impl DirectoryCluster {
    async fn authorize_user_admin(&self) -> Result<(), DriverError> {
        let users = read_users(&self.root).await?;
        if can_manage_users(&users.users.roles_of(&self.username)) {
            Ok(())
        } else {
            Err(DriverError::PermissionDenied(format!(
                "user '{}' cannot manage users",
                self.username
            )))
        }
    }
}

#[async_trait]
impl Cluster for DirectoryCluster {
    type Bucket = DirectoryBucket;

    async fn bucket(&self, name: &str) -> Result<DirectoryBucket, DriverError> {
        if !BUCKET_NAME_RE.is_match(name) || !bucket_path(&self.root, name).is_dir() {
            return Err(DriverError::BucketNotFound(name.to_string()));
        }
        Ok(DirectoryBucket {
            root: Arc::clone(&self.root),
            username: self.username.clone(),
            lock: Arc::clone(&self.lock),
            name: name.to_string(),
        })
    }

    async fn get_all_users(&self, domain: AuthDomain) -> Result<Vec<UserAndMetadata>, DriverError> {
        self.authorize_user_admin().await?;
        Ok(read_users(&self.root).await?.users.list(domain))
    }

    async fn upsert_user(
        &self,
        domain: AuthDomain,
        user: &User,
        password: &str,
    ) -> Result<(), DriverError> {
        self.authorize_user_admin().await?;
        let _guard = self.lock.lock().await;
        let mut users = read_users(&self.root).await?;
        users.users.upsert(domain, user, password)?;
        users.updated_at = now_iso();
        write_json_unlocked(&users_path(&self.root), &users).await
    }
}

/// Bucket handle handed out by [`DirectoryCluster`].
#[derive(Debug, Clone)]
pub struct DirectoryBucket {
    root: Arc<PathBuf>,
    username: String,
    lock: Arc<Mutex<()>>,
    name: String,
}

impl DirectoryBucket {
    async fn authorize(&self, access: Access) -> Result<(), DriverError> {
        let users = read_users(&self.root).await?;
        if can_access(&users.users.roles_of(&self.username), &self.name, access) {
            Ok(())
        } else {
            Err(DriverError::PermissionDenied(format!(
                "user '{}' has no {:?} access to bucket '{}'",
                self.username, access, self.name
            )))
        }
    }

    async fn require_document(&self, id: &str) -> Result<StoredDocument, DriverError> {
        read_document(&self.root, &self.name, id)
            .await?
            .ok_or_else(|| DriverError::DocumentNotFound(id.to_string()))
    }

    async fn write_document(&self, id: &str, cas: u64, content: Value) -> Result<MutationResult, DriverError> {
        let doc = StoredDocument {
            id: id.to_string(),
            cas,
            updated_at: now_iso(),
            content,
        };
        write_json_unlocked(&document_path(&self.root, &self.name, id), &doc).await?;
        Ok(MutationResult { cas })
    }
}

#[async_trait]
impl Bucket for DirectoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, id: &str, content: &Value) -> Result<MutationResult, DriverError> {
        self.authorize(Access::Write).await?;
        let _guard = self.lock.lock().await;
        let cas = read_document(&self.root, &self.name, id)
            .await?
            .map_or(1, |existing| existing.cas + 1);
        self.write_document(id, cas, content.clone()).await
    }

    async fn get(&self, id: &str) -> Result<GetResult, DriverError> {
        self.authorize(Access::Read).await?;
        let doc = self.require_document(id).await?;
        Ok(GetResult {
            cas: doc.cas,
            content: doc.content,
        })
    }

    async fn lookup_in(
        &self,
        id: &str,
        specs: &[LookupInSpec],
    ) -> Result<LookupInResult, DriverError> {
        self.authorize(Access::Read).await?;
        let doc = self.require_document(id).await?;
        Ok(LookupInResult {
            cas: doc.cas,
            entries: lookup_entries(&doc.content, specs),
        })
    }

    async fn mutate_in(
        &self,
        id: &str,
        specs: &[MutateInSpec],
    ) -> Result<MutationResult, DriverError> {
        self.authorize(Access::Write).await?;
        let _guard = self.lock.lock().await;
        let doc = self.require_document(id).await?;
        let updated = apply_mutations(&doc.content, specs)?;
        self.write_document(id, doc.cas + 1, updated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_path_has_fixed_length_name() {
        let short = document_path(Path::new("/data"), "travel", "user::1/a");
        assert_eq!(
            short,
            PathBuf::from("/data/buckets/travel").join(format!("{}.json", compute_hash("user::1/a")))
        );

        let long_id = "k".repeat(250);
        let long = document_path(Path::new("/data"), "travel", &long_id);
        let file_name = long.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(file_name.len(), 64 + ".json".len());
    }

    #[test]
    fn test_store_lock_is_shared_per_root() {
        let temp = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let a = store_lock(temp.path());
        let b = store_lock(&temp.path().join("."));
        let c = store_lock(other.path());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_read_document_rejects_foreign_id() {
        let temp = tempfile::tempdir().unwrap();
        let path = document_path(temp.path(), "travel", "mine");
        let doc = StoredDocument {
            id: "someone-else".to_string(),
            cas: 1,
            updated_at: now_iso(),
            content: json!({}),
        };
        write_json_unlocked(&path, &doc).await.unwrap();

        assert!(matches!(
            read_document(temp.path(), "travel", "mine").await,
            Err(DriverError::Server(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_requires_initialized_store() {
        let temp = tempfile::tempdir().unwrap();
        let cs = ConnectionString::parse(&format!("file://{}", temp.path().display())).unwrap();
        let result = DirectoryDriver::new()
            .connect(&cs, &PasswordAuthenticator::new("admin", "pw"))
            .await;
        assert!(matches!(result, Err(DriverError::InvalidConnectionString(_))));
    }

    #[tokio::test]
    async fn test_initialize_rejects_bad_bucket_name() {
        let temp = tempfile::tempdir().unwrap();
        let result = DirectoryDriver::new()
            .initialize(
                temp.path(),
                &PasswordAuthenticator::new("admin", "pw"),
                &["../escape".to_string()],
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cas_increments_on_each_write() {
        let temp = tempfile::tempdir().unwrap();
        let driver = DirectoryDriver::new();
        let admin = PasswordAuthenticator::new("admin", "pw");
        driver
            .initialize(temp.path(), &admin, &["travel".to_string()])
            .await
            .unwrap();

        let cs = ConnectionString::parse(&format!("file://{}", temp.path().display())).unwrap();
        let bucket = driver
            .connect(&cs, &admin)
            .await
            .unwrap()
            .bucket("travel")
            .await
            .unwrap();

        assert_eq!(bucket.upsert("a", &json!({"x": 1})).await.unwrap().cas, 1);
        assert_eq!(bucket.upsert("a", &json!({"x": 2})).await.unwrap().cas, 2);
        let mutated = bucket
            .mutate_in("a", &[MutateInSpec::upsert("y", json!(true))])
            .await
            .unwrap();
        assert_eq!(mutated.cas, 3);
        assert_eq!(
            bucket.get("a").await.unwrap().content,
            json!({"x": 2, "y": true})
        );
    }
}
