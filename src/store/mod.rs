//! Row-level interface to the authoritative store.
//!
//! The permission core only needs lookups by path, id and username, row
//! inserts/updates/deletes and a transaction boundary. Implementations are
//! synchronous and shared across threads; [`MemoryStore`] is the in-process
//! implementation used by tests and embedded deployments.

mod memory;

pub use memory::MemoryStore;

use crate::error::AclError;
use crate::permission::{ActorId, NamespacePermission, TagPermission};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub id: i64,
    pub object_id: Uuid,
    pub path: String,
    pub parent_id: Option<i64>,
    pub creator_id: ActorId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub object_id: Uuid,
    pub path: String,
    pub namespace_id: i64,
    pub creator_id: ActorId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Anonymous,
    Superuser,
    User,
    UserManager,
}

impl Role {
    pub fn id(self) -> u8 {
        match self {
            Role::Anonymous => 1,
            Role::Superuser => 2,
            Role::User => 3,
            Role::UserManager => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Anonymous),
            2 => Some(Role::Superuser),
            3 => Some(Role::User),
            4 => Some(Role::UserManager),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: ActorId,
    pub object_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub fullname: String,
    pub email: Option<String>,
    pub role: Role,
}

impl User {
    pub fn is_anonymous(&self) -> bool {
        self.role == Role::Anonymous
    }

    pub fn is_superuser(&self) -> bool {
        self.role == Role::Superuser
    }
}

/// Permission rows whose exceptions lists changed because actors were
/// removed from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionSweep {
    pub namespace_paths: Vec<String>,
    pub tag_paths: Vec<String>,
}

pub trait Store: Send + Sync {
    fn namespaces_by_paths(&self, paths: &[String]) -> Result<Vec<Namespace>, AclError>;

    fn namespaces_by_ids(&self, ids: &[i64]) -> Result<Vec<Namespace>, AclError>;

    fn tags_by_paths(&self, paths: &[String]) -> Result<Vec<Tag>, AclError>;

    fn users_by_usernames(&self, usernames: &[String]) -> Result<Vec<User>, AclError>;

    fn users_by_ids(&self, ids: &[ActorId]) -> Result<Vec<User>, AclError>;

    /// Namespaces at `paths` joined with their permission rows. Paths with
    /// no namespace are skipped.
    fn namespace_permissions(
        &self,
        paths: &[String],
    ) -> Result<Vec<(Namespace, NamespacePermission)>, AclError>;

    /// Tags at `paths` joined with their permission rows. Paths with no tag
    /// are skipped.
    fn tag_permissions(&self, paths: &[String]) -> Result<Vec<(Tag, TagPermission)>, AclError>;

    fn namespace_permission_by_id(
        &self,
        namespace_id: i64,
    ) -> Result<Option<NamespacePermission>, AclError>;

    fn tag_permission_by_id(&self, tag_id: i64) -> Result<Option<TagPermission>, AclError>;

    fn insert_namespace(
        &self,
        path: &str,
        parent_id: Option<i64>,
        creator_id: ActorId,
    ) -> Result<Namespace, AclError>;

    fn insert_tag(&self, path: &str, namespace_id: i64, creator_id: ActorId)
    -> Result<Tag, AclError>;

    fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        fullname: &str,
        email: Option<&str>,
        role: Role,
    ) -> Result<User, AclError>;

    fn update_user(&self, user: &User) -> Result<(), AclError>;

    /// Deletes the users and removes their ids from every exceptions list.
    fn delete_users(&self, ids: &[ActorId]) -> Result<ExceptionSweep, AclError>;

    /// Deletes namespaces and their permission rows.
    fn delete_namespaces(&self, ids: &[i64]) -> Result<(), AclError>;

    /// Deletes tags and their permission rows.
    fn delete_tags(&self, ids: &[i64]) -> Result<(), AclError>;

    /// Child namespace and tag paths directly under `namespace_id`.
    fn children_of(&self, namespace_id: i64) -> Result<Vec<String>, AclError>;

    fn insert_namespace_permission(
        &self,
        namespace_id: i64,
        permission: NamespacePermission,
    ) -> Result<(), AclError>;

    fn insert_tag_permission(&self, tag_id: i64, permission: TagPermission)
    -> Result<(), AclError>;

    fn update_namespace_permission(
        &self,
        namespace_id: i64,
        permission: NamespacePermission,
    ) -> Result<(), AclError>;

    fn update_tag_permission(&self, tag_id: i64, permission: TagPermission)
    -> Result<(), AclError>;

    /// `(about value, object id)` pairs for the about values that exist.
    fn about_values(&self, values: &[String]) -> Result<Vec<(String, Uuid)>, AclError>;

    fn insert_about_value(&self, object_id: Uuid, value: &str) -> Result<(), AclError>;

    /// Ends the current unit of work. Cache invalidation for anything written
    /// in it must happen after this returns.
    fn commit(&self) -> Result<(), AclError>;
}
