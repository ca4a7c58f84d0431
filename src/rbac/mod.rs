//! Role catalog, authorization checks and the user table shared by the
//! embedded drivers.

use crate::driver::{AuthDomain, DriverError, PasswordAuthenticator, Role, User, UserAndMetadata};
use crate::utils::{hash_password, now_iso, verify_password};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Roles granted cluster-wide; they take no bucket scope.
pub const CLUSTER_ROLES: &[&str] = &["admin", "cluster_admin", "security_admin", "ro_admin"];

/// Roles that must name a bucket (or `*`).
pub const BUCKET_ROLES: &[&str] = &[
    "bucket_admin",
    "bucket_full_access",
    "data_reader",
    "data_writer",
    "views_admin",
    "query_select",
];

/// Kind of bucket access being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Reject role names outside the catalog and roles with the wrong scoping.
pub fn validate_roles(roles: &[Role]) -> Result<(), DriverError> {
    for role in roles {
        let name = role.name.as_str();
        let valid = if CLUSTER_ROLES.contains(&name) {
            role.bucket.is_none()
        } else if BUCKET_ROLES.contains(&name) {
            role.bucket.is_some()
        } else {
            false
        };
        if !valid {
            return Err(DriverError::InvalidRole(role.to_string()));
        }
    }
    Ok(())
}

pub fn can_manage_users(roles: &[Role]) -> bool {
    roles
        .iter()
        .any(|r| r.name == "admin" || r.name == "security_admin")
}

pub fn can_access(roles: &[Role], bucket: &str, access: Access) -> bool {
    roles.iter().any(|role| match role.name.as_str() {
        "admin" => true,
        "bucket_full_access" | "data_writer" => role.covers(bucket),
        "data_reader" => access == Access::Read && role.covers(bucket),
        _ => false,
    })
}

/// Stored form of one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Salted SHA-256; external accounts have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_changed: Option<String>,
}

/// Users of both auth domains, keyed by username.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTable {
    #[serde(default)]
    pub local: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub external: BTreeMap<String, UserRecord>,
}

impl UserTable {
    fn domain(&self, domain: AuthDomain) -> &BTreeMap<String, UserRecord> {
        match domain {
            AuthDomain::Local => &self.local,
            AuthDomain::External => &self.external,
        }
    }

    fn domain_mut(&mut self, domain: AuthDomain) -> &mut BTreeMap<String, UserRecord> {
        match domain {
            AuthDomain::Local => &mut self.local,
            AuthDomain::External => &mut self.external,
        }
    }

    /// Check credentials against the local domain.
    pub fn authenticate(&self, auth: &PasswordAuthenticator) -> Result<&UserRecord, DriverError> {
        self.local
            .get(&auth.username)
            .filter(|record| {
                record
                    .password_hash
                    .as_deref()
                    .is_some_and(|hash| verify_password(&auth.username, &auth.password, hash))
            })
            .ok_or_else(|| DriverError::AuthenticationFailure(auth.username.clone()))
    }

    /// Roles currently held by a local user; empty if the user was removed.
    pub fn roles_of(&self, username: &str) -> Vec<Role> {
        self.local
            .get(username)
            .map(|record| record.roles.clone())
            .unwrap_or_default()
    }

    pub fn list(&self, domain: AuthDomain) -> Vec<UserAndMetadata> {
        self.domain(domain)
            .iter()
            .map(|(username, record)| UserAndMetadata {
                domain,
                user: User {
                    username: username.clone(),
                    display_name: record.display_name.clone(),
                    roles: record.roles.clone(),
                },
                password_changed: record.password_changed.clone(),
            })
            .collect()
    }

    /// Create or replace a user. Roles are validated before anything is
    /// written; the role set is stored exactly as given.
    pub fn upsert(&mut self, domain: AuthDomain, user: &User, password: &str) -> Result<(), DriverError> {
        validate_roles(&user.roles)?;
        let (password_hash, password_changed) = match domain {
            AuthDomain::Local => (Some(hash_password(&user.username, password)), Some(now_iso())),
            AuthDomain::External => (None, None),
        };
        self.domain_mut(domain).insert(
            user.username.clone(),
            UserRecord {
                display_name: user.display_name.clone(),
                roles: user.roles.clone(),
                password_hash,
                password_changed,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_roles_accepts_catalog() {
        let roles = vec![
            Role::new("admin"),
            Role::scoped("data_reader", "travel"),
            Role::scoped("data_writer", "*"),
        ];
        assert!(validate_roles(&roles).is_ok());
        assert!(validate_roles(&[]).is_ok());
    }

    #[test]
    fn test_validate_roles_rejects_unknown_and_misscoped() {
        assert!(matches!(
            validate_roles(&[Role::new("superuser")]),
            Err(DriverError::InvalidRole(r)) if r == "superuser"
        ));
        assert!(validate_roles(&[Role::new("data_reader")]).is_err());
        assert!(validate_roles(&[Role::scoped("admin", "travel")]).is_err());
    }

    #[test]
    fn test_bucket_access() {
        let reader = vec![Role::scoped("data_reader", "travel")];
        assert!(can_access(&reader, "travel", Access::Read));
        assert!(!can_access(&reader, "travel", Access::Write));
        assert!(!can_access(&reader, "beer", Access::Read));

        let admin = vec![Role::new("admin")];
        assert!(can_access(&admin, "anything", Access::Write));
        assert!(can_manage_users(&admin));
        assert!(!can_manage_users(&reader));
        assert!(can_manage_users(&[Role::new("security_admin")]));
    }

    #[test]
    fn test_user_table_authenticate_and_list() {
        let mut table = UserTable::default();
        table
            .upsert(AuthDomain::Local, &User::new("ops", vec![Role::new("admin")]), "pw")
            .unwrap();
        table
            .upsert(AuthDomain::External, &User::new("ldap-user", vec![]), "ignored")
            .unwrap();

        assert!(table.authenticate(&PasswordAuthenticator::new("ops", "pw")).is_ok());
        assert!(table.authenticate(&PasswordAuthenticator::new("ops", "nope")).is_err());
        assert!(table
            .authenticate(&PasswordAuthenticator::new("ldap-user", "ignored"))
            .is_err());

        let local = table.list(AuthDomain::Local);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].user.username, "ops");
        assert!(local[0].password_changed.is_some());

        let external = table.list(AuthDomain::External);
        assert_eq!(external.len(), 1);
        assert!(external[0].password_changed.is_none());
    }

    #[test]
    fn test_user_table_rejects_invalid_role_without_writing() {
        let mut table = UserTable::default();
        let result = table.upsert(AuthDomain::Local, &User::new("x", vec![Role::new("root")]), "pw");
        assert!(result.is_err());
        assert!(table.local.is_empty());
    }
}
