//! Store-backed model APIs and the capability traits shared with their
//! cache-wrapped counterparts in [`crate::cache`].
//!
//! Callers pick a variant once, at composition time, through an
//! [`ApiFactory`]: [`StoreApiFactory`] talks to the store directly while
//! [`crate::cache::CachingApiFactory`] layers the fail-open cache on top.

pub mod namespace;
pub mod object;
pub mod permission;
pub mod tag;
pub mod user;

pub use namespace::NamespaceApi;
pub use object::{ObjectApi, Query, QueryValue, SearchError, SearchIndex, SearchOutcome};
pub use permission::{PermissionApi, PermissionCheckerApi};
pub use tag::TagApi;
pub use user::{NewUser, UserApi, UserDeletion, UserUpdate};

use crate::config::AclConfig;
use crate::error::AclError;
use crate::operation::{Operation, Policy};
use crate::permission::{NamespacePermission, TagPermission};
use crate::store::{Store, User};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// One `(path, operation, policy, exception usernames)` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionUpdate {
    pub path: String,
    pub operation: Operation,
    pub policy: Policy,
    pub exceptions: Vec<String>,
}

impl PermissionUpdate {
    pub fn new<I, S>(path: impl Into<String>, operation: Operation, policy: Policy, exceptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            operation,
            policy,
            exceptions: exceptions.into_iter().map(Into::into).collect(),
        }
    }
}

/// `(path, operation) -> (policy, exception usernames)`.
pub type PermissionValues = HashMap<(String, Operation), (Policy, Vec<String>)>;

/// Authoring side of path permissions.
pub trait PermissionAuthoring: Send + Sync {
    fn set(&self, values: &[PermissionUpdate]) -> Result<(), AclError>;

    fn get(&self, values: &[(String, Operation)]) -> Result<PermissionValues, AclError>;
}

/// Lookup side used by the authorization layer before calling `allow`.
pub trait PermissionChecking: Send + Sync {
    fn namespace_permissions(
        &self,
        paths: &[String],
    ) -> Result<HashMap<String, NamespacePermission>, AclError>;

    fn tag_permissions(&self, paths: &[String]) -> Result<HashMap<String, TagPermission>, AclError>;

    fn unknown_paths(&self, values: &[(String, Operation)]) -> Result<BTreeSet<String>, AclError>;

    fn unknown_parent_paths(
        &self,
        unknown_paths: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, String>, AclError>;
}

pub trait NamespaceAuthoring: Send + Sync {
    fn create(&self, creator: &User, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError>;

    fn delete(&self, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError>;
}

pub trait TagAuthoring: Send + Sync {
    fn create(&self, creator: &User, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError>;

    fn delete(&self, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError>;
}

pub trait UserAuthoring: Send + Sync {
    fn create(
        &self,
        values: &[NewUser],
        create_private_namespace: bool,
    ) -> Result<Vec<(Uuid, String)>, AclError>;

    fn get_user(&self, username: &str) -> Result<Option<User>, AclError>;

    fn set(&self, values: &[UserUpdate]) -> Result<Vec<(Uuid, String)>, AclError>;

    fn delete(&self, usernames: &[String]) -> Result<UserDeletion, AclError>;
}

pub trait ObjectResolving: Send + Sync {
    fn create(&self, about: Option<&str>) -> Result<Uuid, AclError>;

    /// About value -> object id for the values that exist.
    fn get(&self, values: &[String]) -> Result<HashMap<String, Uuid>, AclError>;

    fn search(
        &self,
        queries: &[Query],
        implicit_create: bool,
    ) -> Result<HashMap<Query, SearchOutcome>, AclError>;
}

/// Builds one consistent family of APIs.
pub trait ApiFactory: Send + Sync {
    fn permissions(&self) -> Box<dyn PermissionAuthoring>;

    fn permission_checkers(&self) -> Box<dyn PermissionChecking>;

    fn namespaces(&self) -> Box<dyn NamespaceAuthoring>;

    fn tags(&self) -> Box<dyn TagAuthoring>;

    fn users(&self) -> Box<dyn UserAuthoring>;

    fn objects(&self) -> Box<dyn ObjectResolving>;
}

/// Factory for APIs that read and write the store without caching.
#[derive(Clone)]
pub struct StoreApiFactory {
    store: Arc<dyn Store>,
    config: AclConfig,
    index: Option<Arc<dyn SearchIndex>>,
}

impl StoreApiFactory {
    pub fn new(store: Arc<dyn Store>, config: AclConfig) -> Result<Self, AclError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            index: None,
        })
    }

    pub fn with_search_index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.index = Some(index);
        self
    }
}

impl ApiFactory for StoreApiFactory {
    fn permissions(&self) -> Box<dyn PermissionAuthoring> {
        Box::new(PermissionApi::new(self.store.clone(), self.config.clone()))
    }

    fn permission_checkers(&self) -> Box<dyn PermissionChecking> {
        Box::new(PermissionCheckerApi::new(self.store.clone()))
    }

    fn namespaces(&self) -> Box<dyn NamespaceAuthoring> {
        Box::new(NamespaceApi::new(self.store.clone()))
    }

    fn tags(&self) -> Box<dyn TagAuthoring> {
        Box::new(TagApi::new(self.store.clone()))
    }

    fn users(&self) -> Box<dyn UserAuthoring> {
        Box::new(UserApi::new(self.store.clone()))
    }

    fn objects(&self) -> Box<dyn ObjectResolving> {
        let api = ObjectApi::new(self.store.clone());
        match &self.index {
            Some(index) => Box::new(api.with_search_index(index.clone())),
            None => Box::new(api),
        }
    }
}
