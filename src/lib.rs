pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod operation;
pub mod path;
pub mod permission;
pub mod store;

pub use api::{
    ApiFactory, NamespaceAuthoring, ObjectResolving, PermissionAuthoring, PermissionChecking,
    PermissionUpdate, PermissionValues, StoreApiFactory, TagAuthoring, UserAuthoring,
};
pub use cache::{CacheBackend, CachingApiFactory, MemoryBackend, RedisBackend};
pub use config::AclConfig;
pub use error::{AclError, AclErrorCode, CacheError};
pub use operation::{Operation, Policy};
pub use permission::{ActorId, ExceptionList, NamespacePermission, PathPermission, TagPermission};
pub use store::{MemoryStore, Store};
