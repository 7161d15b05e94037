use super::{CacheBackend, CacheClient, PermissionCache};
use crate::api::{NewUser, UserAuthoring, UserDeletion, UserUpdate};
use crate::error::AclError;
use crate::permission::ActorId;
use crate::store::{Role, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct CachedUser {
    id: ActorId,
    #[serde(rename = "objectID")]
    object_id: Uuid,
    username: String,
    #[serde(rename = "passwordHash")]
    password_hash: String,
    fullname: String,
    email: Option<String>,
    role: u8,
}

impl From<&User> for CachedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            object_id: user.object_id,
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            fullname: user.fullname.clone(),
            email: user.email.clone(),
            role: user.role.id(),
        }
    }
}

impl TryFrom<CachedUser> for User {
    type Error = AclError;

    fn try_from(cached: CachedUser) -> Result<Self, Self::Error> {
        let role = Role::from_id(cached.role)
            .ok_or_else(|| AclError::Decode(format!("unknown role id {}", cached.role)))?;
        Ok(User {
            id: cached.id,
            object_id: cached.object_id,
            username: cached.username,
            password_hash: cached.password_hash,
            fullname: cached.fullname,
            email: cached.email,
            role,
        })
    }
}

fn decode(raw: &str) -> Result<User, AclError> {
    let cached: CachedUser =
        serde_json::from_str(raw).map_err(|err| AclError::Decode(err.to_string()))?;
    User::try_from(cached)
}

/// User snapshots keyed `user:<username>`.
#[derive(Clone)]
pub struct UserCache {
    client: CacheClient,
}

impl UserCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            client: CacheClient::new(backend, "user:", ttl),
        }
    }

    pub fn get(&self, username: &str) -> Option<User> {
        let mut found = self.client.lookup(&[username.to_string()], |raw| {
            decode(raw)
                .inspect_err(|err| warn!(error = %err, "discarding cached user"))
                .ok()
        });
        found.results.remove(username)
    }

    pub fn save(&self, user: &User) {
        match serde_json::to_string(&CachedUser::from(user)) {
            Ok(value) => self.client.set_values(vec![(user.username.clone(), value)]),
            Err(err) => warn!(username = %user.username, error = %err, "skipping user cache save"),
        }
    }

    pub fn clear(&self, username: &str) {
        self.client.delete_values(&[username.to_string()]);
    }
}

/// Cache first, then `users`; a user read from the store is saved.
pub fn caching_get_user(
    cache: &UserCache,
    users: &dyn UserAuthoring,
    username: &str,
) -> Result<Option<User>, AclError> {
    if let Some(user) = cache.get(username) {
        return Ok(Some(user));
    }
    let user = users.get_user(username)?;
    if let Some(user) = &user {
        cache.save(user);
    }
    Ok(user)
}

/// User authoring that drops cached users, and the cached permissions a
/// deletion rewrote, once the store write has committed.
pub struct CachingUserApi {
    inner: Box<dyn UserAuthoring>,
    users: UserCache,
    permissions: PermissionCache,
}

impl CachingUserApi {
    pub fn new(
        inner: Box<dyn UserAuthoring>,
        users: UserCache,
        permissions: PermissionCache,
    ) -> Self {
        Self {
            inner,
            users,
            permissions,
        }
    }
}

impl UserAuthoring for CachingUserApi {
    fn create(
        &self,
        values: &[NewUser],
        create_private_namespace: bool,
    ) -> Result<Vec<(Uuid, String)>, AclError> {
        self.inner.create(values, create_private_namespace)
    }

    fn get_user(&self, username: &str) -> Result<Option<User>, AclError> {
        caching_get_user(&self.users, self.inner.as_ref(), username)
    }

    fn set(&self, values: &[UserUpdate]) -> Result<Vec<(Uuid, String)>, AclError> {
        let updated = self.inner.set(values)?;
        for value in values {
            self.users.clear(&value.username);
        }
        Ok(updated)
    }

    fn delete(&self, usernames: &[String]) -> Result<UserDeletion, AclError> {
        let deletion = self.inner.delete(usernames)?;
        for username in usernames {
            self.users.clear(username);
        }
        self.permissions
            .clear_namespace_permissions(&deletion.swept.namespace_paths);
        self.permissions
            .clear_tag_permissions(&deletion.swept.tag_paths);
        Ok(deletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;

    fn user() -> User {
        User {
            id: 7,
            object_id: Uuid::nil(),
            username: "u".into(),
            password_hash: "secret-hash".into(),
            fullname: "U Ser".into(),
            email: None,
            role: Role::UserManager,
        }
    }

    #[test]
    fn wire_format_uses_camel_case_and_role_ids() {
        let value = serde_json::to_value(CachedUser::from(&user())).expect("json");
        assert_eq!(
            value,
            serde_json::json!({
                "id": 7,
                "objectID": "00000000-0000-0000-0000-000000000000",
                "username": "u",
                "passwordHash": "secret-hash",
                "fullname": "U Ser",
                "email": null,
                "role": 4,
            })
        );
    }

    #[test]
    fn save_get_clear() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = UserCache::new(backend.clone(), Duration::from_secs(60));
        assert_eq!(cache.get("u"), None);
        cache.save(&user());
        assert_eq!(backend.keys(), vec!["user:u".to_string()]);
        assert_eq!(cache.get("u"), Some(user()));
        cache.clear("u");
        assert_eq!(cache.get("u"), None);
    }

    #[test]
    fn unknown_roles_are_treated_as_misses() {
        let raw = r#"{"id":1,"objectID":"00000000-0000-0000-0000-000000000000","username":"u","passwordHash":"h","fullname":"f","email":null,"role":9}"#;
        assert!(matches!(decode(raw), Err(AclError::Decode(_))));
    }
}
