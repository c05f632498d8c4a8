//! Credential Store
//! Mission: Persist users, roles, permissions and their bindings in SQLite

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use bcrypt::{hash, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::identity::Identity;
use crate::auth::models::{Permission, Role, User};

/// Which unique column a duplicate insert collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Username,
    Email,
}

/// Typed storage failures callers need to distinguish from plain I/O faults.
#[derive(Debug)]
pub enum StoreError {
    /// Unique-constraint violation on the named field. This is how the
    /// loser of two concurrent identical registrations surfaces.
    Duplicate(DuplicateField),
    /// Role/permission deletion refused while bindings still reference it.
    InUse,
    NotFound,
    Database(rusqlite::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Duplicate(DuplicateField::Username) => {
                write!(f, "Username already exists")
            }
            StoreError::Duplicate(DuplicateField::Email) => write!(f, "Email already exists"),
            StoreError::InUse => write!(f, "Record is still referenced by existing bindings"),
            StoreError::NotFound => write!(f, "No such record"),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, Some(msg)) = &err {
            if e.code == ErrorCode::ConstraintViolation {
                if msg.contains("users.username") {
                    return StoreError::Duplicate(DuplicateField::Username);
                }
                if msg.contains("users.email") {
                    return StoreError::Duplicate(DuplicateField::Email);
                }
            }
        }
        StoreError::Database(err)
    }
}

/// Input for user creation; the password arrives already hashed.
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
}

/// User/role/permission storage with a SQLite backend.
///
/// Username and email uniqueness is enforced by UNIQUE constraints, so
/// concurrent duplicate inserts are arbitrated by the database rather than
/// by application-level check-then-act.
pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Open (or create) the store, initialize the schema, and seed the
    /// default roles, permissions, and users. Seeding is idempotent.
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        store.seed_defaults()?;
        Ok(store)
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        // Concurrent writers queue on the file lock instead of failing.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                first_name TEXT,
                middle_name TEXT,
                last_name TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                description TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS permissions (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                description TEXT NOT NULL,
                resource TEXT NOT NULL,
                action TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS user_roles (
                user_id TEXT NOT NULL,
                role_id TEXT NOT NULL,
                PRIMARY KEY (user_id, role_id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (role_id) REFERENCES roles(id)
            );
            CREATE TABLE IF NOT EXISTS role_permissions (
                role_id TEXT NOT NULL,
                permission_id TEXT NOT NULL,
                PRIMARY KEY (role_id, permission_id),
                FOREIGN KEY (role_id) REFERENCES roles(id),
                FOREIGN KEY (permission_id) REFERENCES permissions(id)
            );",
        )
        .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Seed the default permission/role/user graph. Every step is
    /// create-if-absent, so rerunning on an existing database is a no-op.
    fn seed_defaults(&self) -> Result<()> {
        info!("Initializing default roles and permissions...");

        for (name, description, resource, action) in [
            ("USER_READ", "Read user data", "USER", "READ"),
            ("USER_WRITE", "Write user data", "USER", "WRITE"),
            ("USER_DELETE", "Delete user data", "USER", "DELETE"),
            ("ADMIN_READ", "Read admin data", "ADMIN", "READ"),
            ("ADMIN_WRITE", "Write admin data", "ADMIN", "WRITE"),
            ("ADMIN_DELETE", "Delete admin data", "ADMIN", "DELETE"),
            ("SYSTEM_READ", "Read system data", "SYSTEM", "READ"),
            ("SYSTEM_WRITE", "Write system data", "SYSTEM", "WRITE"),
            ("SYSTEM_DELETE", "Delete system data", "SYSTEM", "DELETE"),
        ] {
            self.find_or_create_permission(name, description, resource, action)?;
        }

        self.find_or_create_role(
            "USER",
            "Default user role with basic permissions",
            &["USER_READ"],
        )?;
        self.find_or_create_role(
            "MODERATOR",
            "Moderator role with limited admin permissions",
            &["USER_READ", "USER_WRITE", "ADMIN_READ"],
        )?;
        self.find_or_create_role(
            "ADMIN",
            "Administrator role with full permissions",
            &[
                "USER_READ",
                "USER_WRITE",
                "USER_DELETE",
                "ADMIN_READ",
                "ADMIN_WRITE",
                "ADMIN_DELETE",
                "SYSTEM_READ",
                "SYSTEM_WRITE",
                "SYSTEM_DELETE",
            ],
        )?;

        self.find_or_create_user("admin", "admin@example.com", "admin123", &["ADMIN"])?;
        self.find_or_create_user("user", "user@example.com", "user123", &["USER"])?;

        info!("Data initialization completed");
        Ok(())
    }

    /// Get user by username
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                "SELECT id, username, email, password_hash, first_name, middle_name, last_name,
                        enabled, created_at
                 FROM users WHERE username = ?1",
                params![username],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get user by email
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                "SELECT id, username, email, password_hash, first_name, middle_name, last_name,
                        enabled, created_at
                 FROM users WHERE email = ?1",
                params![email],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn exists_by_username(&self, username: &str) -> Result<bool> {
        let conn = self.open()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn exists_by_email(&self, email: &str) -> Result<bool> {
        let conn = self.open()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Create a user with no roles. The UNIQUE constraints decide the winner
    /// when two identical registrations race; the loser gets
    /// `StoreError::Duplicate` with the offending field.
    pub fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            first_name: new_user.first_name,
            middle_name: new_user.middle_name,
            last_name: new_user.last_name,
            enabled: true,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, first_name, middle_name,
                                last_name, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.password_hash,
                user.first_name,
                user.middle_name,
                user.last_name,
                user.enabled,
                user.created_at,
            ],
        )?;

        info!("Created user: {}", user.username);
        Ok(user)
    }

    pub fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let conn = self.open()?;
        let role = conn
            .query_row(
                "SELECT id, name, description FROM roles WHERE name = ?1",
                params![name],
                map_role,
            )
            .optional()?;
        Ok(role)
    }

    pub fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        let conn = self.open()?;
        let permission = conn
            .query_row(
                "SELECT id, name, description, resource, action FROM permissions WHERE name = ?1",
                params![name],
                map_permission,
            )
            .optional()?;
        Ok(permission)
    }

    /// Idempotent provisioning: create the permission unless it exists.
    pub fn find_or_create_permission(
        &self,
        name: &str,
        description: &str,
        resource: &str,
        action: &str,
    ) -> Result<Permission> {
        if let Some(existing) = self.find_permission_by_name(name)? {
            return Ok(existing);
        }

        let permission = Permission {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
        };

        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO permissions (id, name, description, resource, action)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                permission.id.to_string(),
                permission.name,
                permission.description,
                permission.resource,
                permission.action,
            ],
        )?;

        // Another seeder may have won the INSERT OR IGNORE race.
        self.find_permission_by_name(name)?
            .context("Permission vanished during provisioning")
    }

    /// Idempotent provisioning: create the role unless it exists, then make
    /// sure it carries at least the named permissions.
    pub fn find_or_create_role(
        &self,
        name: &str,
        description: &str,
        permission_names: &[&str],
    ) -> Result<Role> {
        if self.find_role_by_name(name)?.is_none() {
            let conn = self.open()?;
            conn.execute(
                "INSERT OR IGNORE INTO roles (id, name, description) VALUES (?1, ?2, ?3)",
                params![Uuid::new_v4().to_string(), name, description],
            )?;
        }

        let role = self
            .find_role_by_name(name)?
            .context("Role vanished during provisioning")?;

        let conn = self.open()?;
        for permission_name in permission_names {
            let granted = conn.execute(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
                 SELECT ?1, p.id FROM permissions p WHERE p.name = ?2",
                params![role.id.to_string(), permission_name],
            )?;
            if granted == 0 && self.find_permission_by_name(permission_name)?.is_none() {
                anyhow::bail!("Unknown permission in provisioning: {}", permission_name);
            }
        }

        Ok(role)
    }

    /// Idempotent provisioning: create the user (hashing the given plaintext
    /// password) unless the username is taken, then attach the named roles.
    pub fn find_or_create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role_names: &[&str],
    ) -> Result<User> {
        if self.find_user_by_username(username)?.is_none() {
            let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;
            match self.create_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                first_name: None,
                middle_name: None,
                last_name: None,
            }) {
                Ok(_) => info!("Default user created: {}", username),
                // Lost a race against another seeder; the row exists now.
                Err(StoreError::Duplicate(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        for role_name in role_names {
            self.assign_role(username, role_name)?;
        }

        self.find_user_by_username(username)?
            .context("User vanished during provisioning")
    }

    /// Add a role to a user's role set. Already-assigned is a no-op.
    pub fn assign_role(&self, username: &str, role_name: &str) -> Result<()> {
        let user = self
            .find_user_by_username(username)?
            .with_context(|| format!("No such user: {}", username))?;
        let role = self
            .find_role_by_name(role_name)?
            .with_context(|| format!("No such role: {}", role_name))?;

        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
            params![user.id.to_string(), role.id.to_string()],
        )?;
        Ok(())
    }

    /// Soft-disable (or re-enable) a user. Disabled users fail login and
    /// identity resolution even while holding a structurally valid token.
    pub fn set_user_enabled(&self, username: &str, enabled: bool) -> Result<()> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE users SET enabled = ?1 WHERE username = ?2",
            params![enabled, username],
        )?;
        if updated == 0 {
            anyhow::bail!("No such user: {}", username);
        }
        if !enabled {
            warn!("User disabled: {}", username);
        }
        Ok(())
    }

    /// Load the full authority closure for a token subject in one logical
    /// operation: the user row plus the flattened union of role names and
    /// permission names reachable through the user's role set.
    ///
    /// Absent or disabled users resolve to `None`.
    pub fn load_identity(&self, subject: &str) -> Result<Option<Identity>> {
        let conn = self.open()?;

        let user: Option<(String, bool)> = conn
            .query_row(
                "SELECT id, enabled FROM users WHERE username = ?1",
                params![subject],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (user_id, enabled) = match user {
            Some(row) => row,
            None => return Ok(None),
        };
        if !enabled {
            return Ok(None);
        }

        let mut roles = BTreeSet::new();
        let mut stmt = conn.prepare(
            "SELECT r.name FROM roles r
             JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = ?1",
        )?;
        for name in stmt.query_map(params![user_id], |row| row.get::<_, String>(0))? {
            roles.insert(name?);
        }

        let mut permissions = BTreeSet::new();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT p.name FROM permissions p
             JOIN role_permissions rp ON rp.permission_id = p.id
             JOIN user_roles ur ON ur.role_id = rp.role_id
             WHERE ur.user_id = ?1",
        )?;
        for name in stmt.query_map(params![user_id], |row| row.get::<_, String>(0))? {
            permissions.insert(name?);
        }

        Ok(Some(Identity {
            username: subject.to_string(),
            roles,
            permissions,
        }))
    }

    /// List all users (admin only)
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, email, password_hash, first_name, middle_name, last_name,
                    enabled, created_at
             FROM users ORDER BY username",
        )?;
        let users = stmt
            .query_map([], map_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Delete a role. Refused with `StoreError::InUse` while any user still
    /// holds it; an unheld role takes its own permission bindings with it.
    pub fn delete_role(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let role_id: Option<String> = tx
            .query_row(
                "SELECT id FROM roles WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let role_id = role_id.ok_or(StoreError::NotFound)?;

        let holders: i64 = tx.query_row(
            "SELECT COUNT(*) FROM user_roles WHERE role_id = ?1",
            params![role_id],
            |row| row.get(0),
        )?;
        if holders > 0 {
            return Err(StoreError::InUse);
        }

        tx.execute(
            "DELETE FROM role_permissions WHERE role_id = ?1",
            params![role_id],
        )?;
        tx.execute("DELETE FROM roles WHERE id = ?1", params![role_id])?;
        tx.commit()?;

        info!("Deleted role: {}", name);
        Ok(())
    }

    /// Delete a permission. Refused with `StoreError::InUse` while any role
    /// still grants it.
    pub fn delete_permission(&self, name: &str) -> Result<(), StoreError> {
        let conn = self.open()?;

        let permission_id: Option<String> = conn
            .query_row(
                "SELECT id FROM permissions WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let permission_id = permission_id.ok_or(StoreError::NotFound)?;

        let grants: i64 = conn.query_row(
            "SELECT COUNT(*) FROM role_permissions WHERE permission_id = ?1",
            params![permission_id],
            |row| row.get(0),
        )?;
        if grants > 0 {
            return Err(StoreError::InUse);
        }

        conn.execute(
            "DELETE FROM permissions WHERE id = ?1",
            params![permission_id],
        )?;

        info!("Deleted permission: {}", name);
        Ok(())
    }
}

fn parse_uuid(value: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(row.get(0)?)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        middle_name: row.get(5)?,
        last_name: row.get(6)?,
        enabled: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_role(row: &rusqlite::Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: parse_uuid(row.get(0)?)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn map_permission(row: &rusqlite::Row<'_>) -> rusqlite::Result<Permission> {
    Ok(Permission {
        id: parse_uuid(row.get(0)?)?,
        name: row.get(1)?,
        description: row.get(2)?,
        resource: row.get(3)?,
        action: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (UserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = UserStore::new(db_path).unwrap();
        (store, temp_file)
    }

    #[test]
    fn test_defaults_seeded() {
        let (store, _temp) = create_test_store();

        let admin = store.find_user_by_username("admin").unwrap().unwrap();
        assert_eq!(admin.email, "admin@example.com");
        assert!(admin.enabled);
        assert!(bcrypt::verify("admin123", &admin.password_hash).unwrap());

        let user = store.find_user_by_username("user").unwrap().unwrap();
        assert!(bcrypt::verify("user123", &user.password_hash).unwrap());

        for role in ["USER", "MODERATOR", "ADMIN"] {
            assert!(store.find_role_by_name(role).unwrap().is_some());
        }
        let perm = store.find_permission_by_name("SYSTEM_DELETE").unwrap();
        assert_eq!(perm.unwrap().resource, "SYSTEM");
    }

    #[test]
    fn test_seeding_is_idempotent() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();

        let first = UserStore::new(db_path).unwrap();
        let before = first.list_users().unwrap().len();

        // Reopening runs the seed routine again.
        let second = UserStore::new(db_path).unwrap();
        assert_eq!(second.list_users().unwrap().len(), before);

        let identity = second.load_identity("admin").unwrap().unwrap();
        assert_eq!(identity.permissions.len(), 9);
    }

    #[test]
    fn test_create_and_find_user() {
        let (store, _temp) = create_test_store();

        let created = store
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: Some("Alice".to_string()),
                middle_name: None,
                last_name: None,
            })
            .unwrap();
        assert!(created.enabled);

        assert!(store.exists_by_username("alice").unwrap());
        assert!(store.exists_by_email("alice@example.com").unwrap());
        assert!(!store.exists_by_username("bob").unwrap());

        let by_email = store.find_user_by_email("alice@example.com").unwrap();
        assert_eq!(by_email.unwrap().username, "alice");

        // Self-registration grants no roles.
        let identity = store.load_identity("alice").unwrap().unwrap();
        assert!(identity.roles.is_empty());
        assert!(identity.permissions.is_empty());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let (store, _temp) = create_test_store();

        let result = store.create_user(NewUser {
            username: "admin".to_string(),
            email: "other@example.com".to_string(),
            password_hash: "hash".to_string(),
            first_name: None,
            middle_name: None,
            last_name: None,
        });

        match result {
            Err(StoreError::Duplicate(DuplicateField::Username)) => {}
            other => panic!("Expected duplicate username, got {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (store, _temp) = create_test_store();

        let result = store.create_user(NewUser {
            username: "admin2".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: "hash".to_string(),
            first_name: None,
            middle_name: None,
            last_name: None,
        });

        match result {
            Err(StoreError::Duplicate(DuplicateField::Email)) => {}
            other => panic!("Expected duplicate email, got {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn test_concurrent_duplicate_registration() {
        let (store, _temp) = create_test_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.create_user(NewUser {
                        username: "racer".to_string(),
                        email: "racer@example.com".to_string(),
                        password_hash: "hash".to_string(),
                        first_name: None,
                        middle_name: None,
                        last_name: None,
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::Duplicate(_))))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(duplicates, 1);

        // Exactly one row persisted.
        let rows = store
            .list_users()
            .unwrap()
            .into_iter()
            .filter(|u| u.username == "racer")
            .count();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_identity_closure_for_admin() {
        let (store, _temp) = create_test_store();

        let identity = store.load_identity("admin").unwrap().unwrap();
        assert!(identity.roles.contains("ADMIN"));
        assert_eq!(identity.permissions.len(), 9);
        assert!(identity.permissions.contains("SYSTEM_DELETE"));
    }

    #[test]
    fn test_identity_closure_collapses_duplicates() {
        let (store, _temp) = create_test_store();

        // USER and MODERATOR both grant USER_READ; the union must not
        // double-count it.
        store.assign_role("user", "MODERATOR").unwrap();
        let identity = store.load_identity("user").unwrap().unwrap();

        assert_eq!(identity.roles.len(), 2);
        assert_eq!(
            identity.permissions,
            ["USER_READ", "USER_WRITE", "ADMIN_READ"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<String>>()
        );
    }

    #[test]
    fn test_unknown_subject_resolves_to_none() {
        let (store, _temp) = create_test_store();
        assert!(store.load_identity("ghost").unwrap().is_none());
    }

    #[test]
    fn test_disabled_user_resolves_to_none() {
        let (store, _temp) = create_test_store();

        assert!(store.load_identity("user").unwrap().is_some());

        store.set_user_enabled("user", false).unwrap();
        assert!(store.load_identity("user").unwrap().is_none());

        store.set_user_enabled("user", true).unwrap();
        assert!(store.load_identity("user").unwrap().is_some());
    }

    #[test]
    fn test_assign_role_is_idempotent() {
        let (store, _temp) = create_test_store();

        store.assign_role("user", "USER").unwrap();
        let identity = store.load_identity("user").unwrap().unwrap();
        assert_eq!(identity.roles.len(), 1);
    }

    #[test]
    fn test_delete_role_refused_while_held() {
        let (store, _temp) = create_test_store();

        match store.delete_role("ADMIN") {
            Err(StoreError::InUse) => {}
            other => panic!("Expected InUse, got {:?}", other),
        }
        assert!(store.find_role_by_name("ADMIN").unwrap().is_some());
    }

    #[test]
    fn test_delete_unheld_role() {
        let (store, _temp) = create_test_store();

        store
            .find_or_create_role("AUDITOR", "Read-only audit role", &["USER_READ"])
            .unwrap();
        store.delete_role("AUDITOR").unwrap();
        assert!(store.find_role_by_name("AUDITOR").unwrap().is_none());

        // The permission it granted is untouched.
        assert!(store.find_permission_by_name("USER_READ").unwrap().is_some());
    }

    #[test]
    fn test_delete_permission_refused_while_granted() {
        let (store, _temp) = create_test_store();

        match store.delete_permission("USER_READ") {
            Err(StoreError::InUse) => {}
            other => panic!("Expected InUse, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_ungranted_permission() {
        let (store, _temp) = create_test_store();

        store
            .find_or_create_permission("AUDIT_READ", "Read audit logs", "AUDIT", "READ")
            .unwrap();
        store.delete_permission("AUDIT_READ").unwrap();
        assert!(store.find_permission_by_name("AUDIT_READ").unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_role() {
        let (store, _temp) = create_test_store();
        assert!(matches!(
            store.delete_role("NO_SUCH_ROLE"),
            Err(StoreError::NotFound)
        ));
    }
}
