use super::{
    CacheBackend, CachingNamespaceApi, CachingObjectApi, CachingPermissionApi,
    CachingPermissionChecker, CachingTagApi, CachingUserApi, ObjectCache, PermissionCache,
    UserCache,
};
use crate::api::{
    ApiFactory, NamespaceApi, NamespaceAuthoring, ObjectApi, ObjectResolving, PermissionApi,
    PermissionAuthoring, PermissionCheckerApi, PermissionChecking, SearchIndex, TagApi,
    TagAuthoring, UserApi, UserAuthoring,
};
use crate::config::AclConfig;
use crate::error::AclError;
use crate::store::Store;
use std::sync::Arc;

/// Factory for the cache-wrapped API family. All APIs it builds share one
/// backend handle.
#[derive(Clone)]
pub struct CachingApiFactory {
    store: Arc<dyn Store>,
    backend: Arc<dyn CacheBackend>,
    config: AclConfig,
    index: Option<Arc<dyn SearchIndex>>,
}

impl CachingApiFactory {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn CacheBackend>,
        config: AclConfig,
    ) -> Result<Self, AclError> {
        config.validate()?;
        Ok(Self {
            store,
            backend,
            config,
            index: None,
        })
    }

    pub fn with_search_index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn permission_cache(&self) -> PermissionCache {
        PermissionCache::new(self.backend.clone(), self.config.cache_ttl())
    }

    pub fn user_cache(&self) -> UserCache {
        UserCache::new(self.backend.clone(), self.config.cache_ttl())
    }

    pub fn object_cache(&self) -> ObjectCache {
        ObjectCache::new(self.backend.clone(), self.config.cache_ttl())
    }
}

impl ApiFactory for CachingApiFactory {
    fn permissions(&self) -> Box<dyn PermissionAuthoring> {
        let inner = PermissionApi::new(self.store.clone(), self.config.clone());
        Box::new(CachingPermissionApi::new(
            Box::new(inner),
            self.permission_cache(),
        ))
    }

    fn permission_checkers(&self) -> Box<dyn PermissionChecking> {
        Box::new(CachingPermissionChecker::new(
            PermissionCheckerApi::new(self.store.clone()),
            self.permission_cache(),
        ))
    }

    fn namespaces(&self) -> Box<dyn NamespaceAuthoring> {
        Box::new(CachingNamespaceApi::new(
            Box::new(NamespaceApi::new(self.store.clone())),
            self.permission_cache(),
        ))
    }

    fn tags(&self) -> Box<dyn TagAuthoring> {
        Box::new(CachingTagApi::new(
            Box::new(TagApi::new(self.store.clone())),
            self.permission_cache(),
        ))
    }

    fn users(&self) -> Box<dyn UserAuthoring> {
        Box::new(CachingUserApi::new(
            Box::new(UserApi::new(self.store.clone())),
            self.user_cache(),
            self.permission_cache(),
        ))
    }

    fn objects(&self) -> Box<dyn ObjectResolving> {
        let mut inner = ObjectApi::new(self.store.clone());
        if let Some(index) = &self.index {
            inner = inner.with_search_index(index.clone());
        }
        Box::new(CachingObjectApi::new(inner, self.object_cache()))
    }
}
