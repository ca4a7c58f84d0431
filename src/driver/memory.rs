use super::apply::{apply_mutations, lookup_entries};
use super::{
    AuthDomain, Bucket, Cluster, ConnectionString, Driver, DriverError, GetResult,
    LookupInResult, LookupInSpec, MutateInSpec, MutationResult, PasswordAuthenticator, User,
    UserAndMetadata,
};
use crate::rbac::{can_access, can_manage_users, Access, UserRecord, UserTable};
use crate::utils::{hash_password, now_iso};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Schemes accepted by the in-process cluster.
const SCHEMES: &[&str] = &["couchbase", "couchbases"];

/// Kind of driver call, used to filter the journal and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Connect,
    OpenBucket,
    Upsert,
    Get,
    LookupIn,
    MutateIn,
    GetAllUsers,
    UpsertUser,
}

/// One journaled driver call with the arguments it carried.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Connect {
        connection_string: String,
        username: String,
    },
    OpenBucket {
        bucket: String,
    },
    Upsert {
        bucket: String,
        id: String,
        content: Value,
    },
    Get {
        bucket: String,
        id: String,
    },
    LookupIn {
        bucket: String,
        id: String,
        specs: Vec<LookupInSpec>,
    },
    MutateIn {
        bucket: String,
        id: String,
        specs: Vec<MutateInSpec>,
    },
    GetAllUsers {
        domain: AuthDomain,
    },
    UpsertUser {
        domain: AuthDomain,
        user: User,
    },
}

impl DriverCall {
    pub fn op(&self) -> DriverOp {
        match self {
            DriverCall::Connect { .. } => DriverOp::Connect,
            DriverCall::OpenBucket { .. } => DriverOp::OpenBucket,
            DriverCall::Upsert { .. } => DriverOp::Upsert,
            DriverCall::Get { .. } => DriverOp::Get,
            DriverCall::LookupIn { .. } => DriverOp::LookupIn,
            DriverCall::MutateIn { .. } => DriverOp::MutateIn,
            DriverCall::GetAllUsers { .. } => DriverOp::GetAllUsers,
            DriverCall::UpsertUser { .. } => DriverOp::UpsertUser,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    cas: u64,
    content: Value,
}

#[derive(Debug, Default)]
struct State {
    buckets: HashMap<String, HashMap<String, StoredDocument>>,
    users: UserTable,
    journal: Vec<DriverCall>,
    failures: HashMap<DriverOp, String>,
    /// Bumped by `disconnect`; clusters from an older generation are dead
    generation: u64,
    cas: u64,
}

impl State {
    /// Record a call and fail it if the connection is gone or a failure
    /// was injected for its kind.
    fn begin(&mut self, generation: u64, call: DriverCall) -> Result<(), DriverError> {
        if generation != self.generation {
            return Err(DriverError::Disconnected);
        }
        let op = call.op();
        self.journal.push(call);
        match self.failures.remove(&op) {
            Some(message) => Err(DriverError::Server(message)),
            None => Ok(()),
        }
    }

    fn next_cas(&mut self) -> u64 {
        self.cas += 1;
        self.cas
    }

    fn authorize(&self, username: &str, bucket: &str, access: Access) -> Result<(), DriverError> {
        if can_access(&self.users.roles_of(username), bucket, access) {
            Ok(())
        } else {
            Err(DriverError::PermissionDenied(format!(
                "user '{}' has no {:?} access to bucket '{}'",
                username, access, bucket
            )))
        }
    }

    fn authorize_user_admin(&self, username: &str) -> Result<(), DriverError> {
        if can_manage_users(&self.users.roles_of(username)) {
            Ok(())
        } else {
            Err(DriverError::PermissionDenied(format!(
                "user '{}' cannot manage users",
                username
            )))
        }
    }

    fn documents(&mut self, bucket: &str) -> Result<&mut HashMap<String, StoredDocument>, DriverError> {
        self.buckets
            .get_mut(bucket)
            .ok_or_else(|| DriverError::BucketNotFound(bucket.to_string()))
    }
}

/// In-process cluster. Clones share the same state, so a test can keep a
/// handle to inspect the call journal while the facade owns a connection.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a bucket.
    pub fn with_bucket(self, name: &str) -> Self {
        self.create_bucket(name);
        self
    }

    /// Seed a local user. Seeding bypasses role validation.
    pub fn with_user(self, user: User, password: &str) -> Self {
        lock(&self.state).users.local.insert(
            user.username.clone(),
            UserRecord {
                display_name: user.display_name.clone(),
                roles: user.roles.clone(),
                password_hash: Some(hash_password(&user.username, password)),
                password_changed: Some(now_iso()),
            },
        );
        self
    }

    pub fn create_bucket(&self, name: &str) {
        lock(&self.state)
            .buckets
            .entry(name.to_string())
            .or_default();
    }

    /// Store a document without journaling the write.
    pub fn insert_document(&self, bucket: &str, id: &str, content: Value) {
        let mut state = lock(&self.state);
        let cas = state.next_cas();
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(id.to_string(), StoredDocument { cas, content });
    }

    /// Read a document without journaling the read.
    pub fn document(&self, bucket: &str, id: &str) -> Option<Value> {
        lock(&self.state)
            .buckets
            .get(bucket)
            .and_then(|docs| docs.get(id))
            .map(|doc| doc.content.clone())
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.state).journal.clone()
    }

    pub fn calls_of(&self, op: DriverOp) -> Vec<DriverCall> {
        lock(&self.state)
            .journal
            .iter()
            .filter(|call| call.op() == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).journal.clear();
    }

    /// Make the next call of kind `op` fail with a server error.
    pub fn fail_next(&self, op: DriverOp, message: &str) {
        lock(&self.state).failures.insert(op, message.to_string());
    }

    /// Drop every open connection. New connections still succeed.
    pub fn disconnect(&self) {
        lock(&self.state).generation += 1;
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Cluster = MemoryCluster;

    async fn connect(
        &self,
        connection_string: &ConnectionString,
        authenticator: &PasswordAuthenticator,
    ) -> Result<MemoryCluster, DriverError> {
        let mut state = lock(&self.state);
        let generation = state.generation;
        state.begin(
            generation,
            DriverCall::Connect {
                connection_string: connection_string.to_string(),
                username: authenticator.username.clone(),
            },
        )?;

        if !SCHEMES.contains(&connection_string.scheme.as_str()) {
            return Err(DriverError::InvalidConnectionString(format!(
                "unsupported scheme '{}'",
                connection_string.scheme
            )));
        }
        state.users.authenticate(authenticator)?;

        Ok(MemoryCluster {
            state: Arc::clone(&self.state),
            username: authenticator.username.clone(),
            generation,
        })
    }
}

/// Connection handed out by [`MemoryDriver`].
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    state: Arc<Mutex<State>>,
    username: String,
    generation: u64,
}

#[async_trait]
impl Cluster for MemoryCluster {
    type Bucket = MemoryBucket;

    async fn bucket(&self, name: &str) -> Result<MemoryBucket, DriverError> {
        let mut state = lock(&self.state);
        state.begin(
            self.generation,
            DriverCall::OpenBucket {
                bucket: name.to_string(),
            },
        )?;
        if !state.buckets.contains_key(name) {
            return Err(DriverError::BucketNotFound(name.to_string()));
        }
        Ok(MemoryBucket {
            state: Arc::clone(&self.state),
            username: self.username.clone(),
            generation: self.generation,
            name: name.to_string(),
        })
    }

    async fn get_all_users(&self, domain: AuthDomain) -> Result<Vec<UserAndMetadata>, DriverError> {
        let mut state = lock(&self.state);
        state.begin(self.generation, DriverCall::GetAllUsers { domain })?;
        state.authorize_user_admin(&self.username)?;
        Ok(state.users.list(domain))
    }

    async fn upsert_user(
        &self,
        domain: AuthDomain,
        user: &User,
        password: &str,
    ) -> Result<(), DriverError> {
        let mut state = lock(&self.state);
        state.begin(
            self.generation,
            DriverCall::UpsertUser {
                domain,
                user: user.clone(),
            },
        )?;
        state.authorize_user_admin(&self.username)?;
        state.users.upsert(domain, user, password)
    }
}

/// Bucket handle handed out by [`MemoryCluster`].
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    state: Arc<Mutex<State>>,
    username: String,
    generation: u64,
    name: String,
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, id: &str, content: &Value) -> Result<MutationResult, DriverError> {
        let mut state = lock(&self.state);
        state.begin(
            self.generation,
            DriverCall::Upsert {
                bucket: self.name.clone(),
                id: id.to_string(),
                content: content.clone(),
            },
        )?;
        state.authorize(&self.username, &self.name, Access::Write)?;
        let cas = state.next_cas();
        state.documents(&self.name)?.insert(
            id.to_string(),
            StoredDocument {
                cas,
                content: content.clone(),
            },
        );
        Ok(MutationResult { cas })
    }

    async fn get(&self, id: &str) -> Result<GetResult, DriverError> {
        let mut state = lock(&self.state);
        state.begin(
            self.generation,
            DriverCall::Get {
                bucket: self.name.clone(),
                id: id.to_string(),
            },
        )?;
        state.authorize(&self.username, &self.name, Access::Read)?;
        let doc = state
            .documents(&self.name)?
            .get(id)
            .ok_or_else(|| DriverError::DocumentNotFound(id.to_string()))?;
        Ok(GetResult {
            cas: doc.cas,
            content: doc.content.clone(),
        })
    }

    async fn lookup_in(
        &self,
        id: &str,
        specs: &[LookupInSpec],
    ) -> Result<LookupInResult, DriverError> {
        let mut state = lock(&self.state);
        state.begin(
            self.generation,
            DriverCall::LookupIn {
                bucket: self.name.clone(),
                id: id.to_string(),
                specs: specs.to_vec(),
            },
        )?;
        state.authorize(&self.username, &self.name, Access::Read)?;
        let doc = state
            .documents(&self.name)?
            .get(id)
            .ok_or_else(|| DriverError::DocumentNotFound(id.to_string()))?;
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
        let mut state = lock(&self.state);
        state.begin(
            self.generation,
            DriverCall::MutateIn {
                bucket: self.name.clone(),
                id: id.to_string(),
                specs: specs.to_vec(),
            },
        )?;
        state.authorize(&self.username, &self.name, Access::Write)?;
        let cas = state.next_cas();
        let doc = state
            .documents(&self.name)?
            .get_mut(id)
            .ok_or_else(|| DriverError::DocumentNotFound(id.to_string()))?;
        doc.content = apply_mutations(&doc.content, specs)?;
        doc.cas = cas;
        Ok(MutationResult { cas })
    }
}
