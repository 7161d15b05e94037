use super::{CacheBackend, CacheClient, CacheResult};
use crate::api::{
    PermissionAuthoring, PermissionChecking, PermissionCheckerApi, PermissionUpdate,
    PermissionValues,
};
use crate::error::AclError;
use crate::operation::{Operation, Policy};
use crate::permission::{ActorId, NamespacePermission, PathPermission, TagPermission};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const NAMESPACE_PREFIX: &str = "namespace:";
const TAG_PREFIX: &str = "tag:";

/// `{"<operation id>": [policy as bool, [actor id, ...]], ...}`
type EncodedPermission = BTreeMap<String, (bool, Vec<ActorId>)>;

fn encode<P: PathPermission>(permission: &P) -> Result<String, AclError> {
    let mut encoded = EncodedPermission::new();
    for operation in P::operations() {
        let (policy, exceptions) = permission.get(*operation)?;
        encoded.insert(
            operation.id().to_string(),
            (policy.as_bool(), exceptions.as_slice().to_vec()),
        );
    }
    serde_json::to_string(&encoded).map_err(|err| AclError::Encode(err.to_string()))
}

/// Rebuilds a permission over `base`. Every operation of the kind must be
/// present.
fn decode<P: PathPermission>(raw: &str, mut base: P) -> Result<P, AclError> {
    let encoded: EncodedPermission =
        serde_json::from_str(raw).map_err(|err| AclError::Decode(err.to_string()))?;
    for operation in P::operations() {
        let Some((policy, exceptions)) = encoded.get(&operation.id().to_string()) else {
            return Err(AclError::Decode(format!("missing operation {operation}")));
        };
        base.set(*operation, Policy::from_bool(*policy), exceptions.clone())?;
    }
    Ok(base)
}

/// Namespace and tag permissions keyed `permission:namespace:<path>` and
/// `permission:tag:<path>`.
#[derive(Clone)]
pub struct PermissionCache {
    client: CacheClient,
}

impl PermissionCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            client: CacheClient::new(backend, "permission:", ttl),
        }
    }

    fn identifiers(prefix: &str, paths: &[String]) -> Vec<String> {
        paths.iter().map(|path| format!("{prefix}{path}")).collect()
    }

    fn lookup<P: PathPermission>(
        &self,
        prefix: &str,
        paths: &[String],
        base: impl Fn() -> P,
    ) -> CacheResult<P> {
        let identifiers = Self::identifiers(prefix, paths);
        let found = self.client.lookup(&identifiers, |raw| {
            decode(raw, base())
                .inspect_err(|err| warn!(error = %err, "discarding cached permission"))
                .ok()
        });
        let strip = |identifier: String| match identifier.strip_prefix(prefix) {
            Some(path) => path.to_string(),
            None => identifier,
        };
        CacheResult {
            results: found
                .results
                .into_iter()
                .map(|(identifier, permission)| (strip(identifier), permission))
                .collect(),
            uncached_values: found.uncached_values.into_iter().map(strip).collect(),
        }
    }

    fn save<P: PathPermission>(&self, prefix: &str, permissions: &HashMap<String, P>) {
        let mut values = Vec::with_capacity(permissions.len());
        for (path, permission) in permissions {
            match encode(permission) {
                Ok(value) => values.push((format!("{prefix}{path}"), value)),
                Err(err) => warn!(path = %path, error = %err, "skipping permission cache save"),
            }
        }
        self.client.set_values(values);
    }

    pub fn namespace_permissions(&self, paths: &[String]) -> CacheResult<NamespacePermission> {
        self.lookup(NAMESPACE_PREFIX, paths, || NamespacePermission::new(0))
    }

    pub fn tag_permissions(&self, paths: &[String]) -> CacheResult<TagPermission> {
        self.lookup(TAG_PREFIX, paths, || TagPermission::new(0))
    }

    pub fn save_namespace_permissions(&self, permissions: &HashMap<String, NamespacePermission>) {
        self.save(NAMESPACE_PREFIX, permissions);
    }

    pub fn save_tag_permissions(&self, permissions: &HashMap<String, TagPermission>) {
        self.save(TAG_PREFIX, permissions);
    }

    pub fn clear_namespace_permissions(&self, paths: &[String]) {
        self.client
            .delete_values(&Self::identifiers(NAMESPACE_PREFIX, paths));
    }

    pub fn clear_tag_permissions(&self, paths: &[String]) {
        self.client.delete_values(&Self::identifiers(TAG_PREFIX, paths));
    }

    /// Clears both kinds of entry for every path.
    pub fn clear_paths(&self, paths: &[String]) {
        self.clear_namespace_permissions(paths);
        self.clear_tag_permissions(paths);
    }
}

/// Permission authoring that invalidates cached permissions after every
/// committed write.
pub struct CachingPermissionApi {
    inner: Box<dyn PermissionAuthoring>,
    cache: PermissionCache,
}

impl CachingPermissionApi {
    pub fn new(inner: Box<dyn PermissionAuthoring>, cache: PermissionCache) -> Self {
        Self { inner, cache }
    }
}

impl PermissionAuthoring for CachingPermissionApi {
    fn set(&self, values: &[PermissionUpdate]) -> Result<(), AclError> {
        self.inner.set(values)?;
        let paths: Vec<String> = values
            .iter()
            .map(|value| value.path.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        // The path's kind is not needed: both keys go.
        self.cache.clear_paths(&paths);
        Ok(())
    }

    fn get(&self, values: &[(String, Operation)]) -> Result<PermissionValues, AclError> {
        self.inner.get(values)
    }
}

/// Read-through permission lookups: cache first, store for the rest, then
/// save what the store returned.
pub struct CachingPermissionChecker {
    inner: PermissionCheckerApi,
    cache: PermissionCache,
}

impl CachingPermissionChecker {
    pub fn new(inner: PermissionCheckerApi, cache: PermissionCache) -> Self {
        Self { inner, cache }
    }
}

impl PermissionChecking for CachingPermissionChecker {
    fn namespace_permissions(
        &self,
        paths: &[String],
    ) -> Result<HashMap<String, NamespacePermission>, AclError> {
        let mut cached = self.cache.namespace_permissions(paths);
        if !cached.uncached_values.is_empty() {
            let fetched = self.inner.namespace_permissions(&cached.uncached_values)?;
            self.cache.save_namespace_permissions(&fetched);
            cached.results.extend(fetched);
        }
        Ok(cached.results)
    }

    fn tag_permissions(&self, paths: &[String]) -> Result<HashMap<String, TagPermission>, AclError> {
        let mut cached = self.cache.tag_permissions(paths);
        if !cached.uncached_values.is_empty() {
            let fetched = self.inner.tag_permissions(&cached.uncached_values)?;
            self.cache.save_tag_permissions(&fetched);
            cached.results.extend(fetched);
        }
        Ok(cached.results)
    }

    fn unknown_paths(&self, values: &[(String, Operation)]) -> Result<BTreeSet<String>, AclError> {
        self.inner.unknown_paths(values)
    }

    fn unknown_parent_paths(
        &self,
        unknown_paths: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, String>, AclError> {
        self.inner.unknown_parent_paths(unknown_paths)
    }
}
