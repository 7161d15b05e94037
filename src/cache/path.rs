use super::PermissionCache;
use crate::api::{NamespaceAuthoring, TagAuthoring};
use crate::error::AclError;
use crate::store::User;
use uuid::Uuid;

fn deleted_paths(deleted: &[(Uuid, String)]) -> Vec<String> {
    deleted.iter().map(|(_, path)| path.clone()).collect()
}

/// Namespace authoring that drops cached permissions of deleted namespaces.
pub struct CachingNamespaceApi {
    inner: Box<dyn NamespaceAuthoring>,
    permissions: PermissionCache,
}

impl CachingNamespaceApi {
    pub fn new(inner: Box<dyn NamespaceAuthoring>, permissions: PermissionCache) -> Self {
        Self { inner, permissions }
    }
}

impl NamespaceAuthoring for CachingNamespaceApi {
    fn create(&self, creator: &User, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError> {
        self.inner.create(creator, paths)
    }

    fn delete(&self, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError> {
        let deleted = self.inner.delete(paths)?;
        self.permissions.clear_paths(&deleted_paths(&deleted));
        Ok(deleted)
    }
}

/// Tag authoring that drops cached permissions of deleted tags.
pub struct CachingTagApi {
    inner: Box<dyn TagAuthoring>,
    permissions: PermissionCache,
}

impl CachingTagApi {
    pub fn new(inner: Box<dyn TagAuthoring>, permissions: PermissionCache) -> Self {
        Self { inner, permissions }
    }
}

impl TagAuthoring for CachingTagApi {
    fn create(&self, creator: &User, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError> {
        self.inner.create(creator, paths)
    }

    fn delete(&self, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError> {
        let deleted = self.inner.delete(paths)?;
        self.permissions.clear_paths(&deleted_paths(&deleted));
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{NamespaceApi, TagApi};
    use crate::cache::MemoryBackend;
    use crate::permission::{NamespacePermission, TagPermission};
    use crate::store::{MemoryStore, Role, Store};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn deleting_paths_clears_their_permissions() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user("u", "h", "U", None, Role::User)
            .expect("user");
        let backend = Arc::new(MemoryBackend::new());
        let cache = PermissionCache::new(backend.clone(), Duration::from_secs(60));
        let namespaces =
            CachingNamespaceApi::new(Box::new(NamespaceApi::new(store.clone())), cache.clone());
        let tags = CachingTagApi::new(Box::new(TagApi::new(store.clone())), cache.clone());

        tags.create(&user, &["u/books/rating".into()]).expect("tag");
        cache.save_namespace_permissions(&HashMap::from([(
            "u/books".to_string(),
            NamespacePermission::new(user.id),
        )]));
        cache.save_tag_permissions(&HashMap::from([(
            "u/books/rating".to_string(),
            TagPermission::new(user.id),
        )]));

        tags.delete(&["u/books/rating".into()]).expect("delete tag");
        assert_eq!(backend.keys(), vec!["permission:namespace:u/books".to_string()]);

        namespaces.delete(&["u/books".into()]).expect("delete namespace");
        assert!(backend.keys().is_empty());
    }

    #[test]
    fn failed_deletes_leave_the_cache_alone() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user("u", "h", "U", None, Role::User)
            .expect("user");
        let backend = Arc::new(MemoryBackend::new());
        let cache = PermissionCache::new(backend.clone(), Duration::from_secs(60));
        let namespaces =
            CachingNamespaceApi::new(Box::new(NamespaceApi::new(store.clone())), cache.clone());
        namespaces
            .create(&user, &["u/books".into()])
            .expect("create");

        let calls = backend.calls();
        assert!(matches!(
            namespaces.delete(&["u".into()]),
            Err(AclError::NotEmpty { .. })
        ));
        assert_eq!(backend.calls(), calls);
    }
}
