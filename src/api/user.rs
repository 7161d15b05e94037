use super::UserAuthoring;
use super::namespace::create_namespaces;
use crate::error::AclError;
use crate::operation::{Operation, Policy};
use crate::permission::PathPermission;
use crate::store::{ExceptionSweep, Role, Store, User};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A user to create. The password must already be hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub fullname: String,
    pub email: Option<String>,
    pub role: Role,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        fullname: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            fullname: fullname.into(),
            email: None,
            role: Role::User,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// Fields to change on an existing user. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub username: String,
    pub password_hash: Option<String>,
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

impl UserUpdate {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDeletion {
    pub deleted: Vec<(Uuid, String)>,
    /// Permission rows that listed one of the deleted users.
    pub swept: ExceptionSweep,
}

pub struct UserApi {
    store: Arc<dyn Store>,
}

impl UserApi {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn existing(&self, usernames: &BTreeSet<String>) -> Result<HashMap<String, User>, AclError> {
        let wanted: Vec<String> = usernames.iter().cloned().collect();
        let users: HashMap<String, User> = self
            .store
            .users_by_usernames(&wanted)?
            .into_iter()
            .map(|user| (user.username.clone(), user))
            .collect();
        let unknown: Vec<String> = usernames
            .iter()
            .filter(|username| !users.contains_key(*username))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(AclError::UnknownUser { usernames: unknown });
        }
        Ok(users)
    }

    /// Creates `<username>/private`, listable only by its owner.
    fn create_private_namespace(&self, user: &User) -> Result<(), AclError> {
        let path = format!("{}/private", user.username);
        let created = create_namespaces(self.store.as_ref(), user, &[path.clone()])?;
        let Some(namespace) = created.into_iter().find(|namespace| namespace.path == path) else {
            return Ok(());
        };
        let Some(mut permission) = self.store.namespace_permission_by_id(namespace.id)? else {
            return Ok(());
        };
        permission.set(Operation::ListNamespace, Policy::Closed, [user.id])?;
        self.store
            .update_namespace_permission(namespace.id, permission)
    }
}

impl UserAuthoring for UserApi {
    /// Creates users along with their root namespace and, optionally, their
    /// private namespace.
    fn create(
        &self,
        values: &[NewUser],
        create_private_namespace: bool,
    ) -> Result<Vec<(Uuid, String)>, AclError> {
        if values.is_empty() {
            return Err(AclError::Feature(
                "Information about at least one user must be provided.".into(),
            ));
        }
        let usernames: Vec<String> = values.iter().map(|value| value.username.clone()).collect();
        let mut seen = BTreeSet::new();
        let mut duplicates: BTreeSet<String> = usernames
            .iter()
            .filter(|username| !seen.insert(username.as_str()))
            .cloned()
            .collect();
        duplicates.extend(
            self.store
                .users_by_usernames(&usernames)?
                .into_iter()
                .map(|user| user.username),
        );
        if !duplicates.is_empty() {
            return Err(AclError::DuplicateUser {
                usernames: duplicates.into_iter().collect(),
            });
        }

        let mut created = Vec::with_capacity(values.len());
        for value in values {
            let user = self.store.insert_user(
                &value.username,
                &value.password_hash,
                &value.fullname,
                value.email.as_deref(),
                value.role,
            )?;
            create_namespaces(self.store.as_ref(), &user, &[user.username.clone()])?;
            if create_private_namespace {
                self.create_private_namespace(&user)?;
            }
            created.push((user.object_id, user.username));
        }
        self.store.commit()?;
        info!(count = created.len(), "users created");
        Ok(created)
    }

    fn get_user(&self, username: &str) -> Result<Option<User>, AclError> {
        Ok(self
            .store
            .users_by_usernames(&[username.to_string()])?
            .into_iter()
            .next())
    }

    fn set(&self, values: &[UserUpdate]) -> Result<Vec<(Uuid, String)>, AclError> {
        if values.is_empty() {
            return Err(AclError::Feature(
                "Information about at least one user must be provided.".into(),
            ));
        }
        let usernames: BTreeSet<String> =
            values.iter().map(|value| value.username.clone()).collect();
        let mut users = self.existing(&usernames)?;

        let mut updated = Vec::with_capacity(values.len());
        for value in values {
            let Some(user) = users.get_mut(&value.username) else {
                continue;
            };
            if let Some(password_hash) = &value.password_hash {
                user.password_hash = password_hash.clone();
            }
            if let Some(fullname) = &value.fullname {
                user.fullname = fullname.clone();
            }
            if let Some(email) = &value.email {
                user.email = Some(email.clone());
            }
            if let Some(role) = value.role {
                user.role = role;
            }
            self.store.update_user(user)?;
            updated.push((user.object_id, user.username.clone()));
        }
        self.store.commit()?;
        debug!(count = updated.len(), "users updated");
        Ok(updated)
    }

    /// Deletes users and strips their ids from every exceptions list.
    fn delete(&self, usernames: &[String]) -> Result<UserDeletion, AclError> {
        if usernames.is_empty() {
            return Err(AclError::Feature(
                "At least one username must be provided.".into(),
            ));
        }
        let wanted: BTreeSet<String> = usernames.iter().cloned().collect();
        let users = self.existing(&wanted)?;
        let mut deleted: Vec<(Uuid, String)> = users
            .values()
            .map(|user| (user.object_id, user.username.clone()))
            .collect();
        deleted.sort_by(|a, b| a.1.cmp(&b.1));
        let ids: Vec<i64> = users.values().map(|user| user.id).collect();

        let swept = self.store.delete_users(&ids)?;
        self.store.commit()?;
        info!(
            count = deleted.len(),
            namespaces = swept.namespace_paths.len(),
            tags = swept.tag_paths.len(),
            "users deleted"
        );
        Ok(UserDeletion { deleted, swept })
    }
}
