//! Fail-open cache-aside layer over a shared key/value backend.
//!
//! Every backend failure is absorbed by [`CacheClient`], logged once and
//! turned into a miss (reads) or a no-op (writes and deletes). The store
//! always remains the authority; wrappers here delete cache entries only
//! after the store write they cover has committed.

mod backend;
mod factory;
mod object;
mod path;
mod permission;
mod user;

pub use backend::{CacheBackend, MemoryBackend, RedisBackend};
pub use factory::CachingApiFactory;
pub use object::{CachingObjectApi, ObjectCache};
pub use path::{CachingNamespaceApi, CachingTagApi};
pub use permission::{CachingPermissionApi, CachingPermissionChecker, PermissionCache};
pub use user::{CachingUserApi, UserCache, caching_get_user};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Outcome of a cache lookup: the entries found plus the identifiers that
/// must be fetched from the store, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResult<T> {
    pub results: HashMap<String, T>,
    pub uncached_values: Vec<String>,
}

impl<T> CacheResult<T> {
    pub fn empty() -> Self {
        Self {
            results: HashMap::new(),
            uncached_values: Vec::new(),
        }
    }
}

/// Prefixes identifiers, applies the expiry and absorbs backend errors.
#[derive(Clone)]
pub struct CacheClient {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    ttl: Duration,
}

impl CacheClient {
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            ttl,
        }
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}{identifier}", self.prefix)
    }

    /// Raw values for `identifiers` in input order; every entry is `None`
    /// when the backend fails.
    pub fn get_values(&self, identifiers: &[String]) -> Vec<Option<String>> {
        if identifiers.is_empty() {
            return Vec::new();
        }
        let keys: Vec<String> = identifiers.iter().map(|id| self.key(id)).collect();
        match self.backend.get_many(&keys) {
            Ok(values) if values.len() == keys.len() => values,
            Ok(values) => {
                error!(
                    prefix = %self.prefix,
                    expected = keys.len(),
                    got = values.len(),
                    "cache backend returned a short reply"
                );
                vec![None; identifiers.len()]
            }
            Err(err) => {
                error!(prefix = %self.prefix, error = %err, "cache get failed");
                vec![None; identifiers.len()]
            }
        }
    }

    pub fn set_values(&self, values: Vec<(String, String)>) {
        if values.is_empty() {
            return;
        }
        let values: Vec<(String, String)> = values
            .into_iter()
            .map(|(identifier, value)| (self.key(&identifier), value))
            .collect();
        if let Err(err) = self.backend.set_many_ex(&values, self.ttl) {
            error!(prefix = %self.prefix, error = %err, "cache set failed");
        }
    }

    pub fn delete_values(&self, identifiers: &[String]) {
        if identifiers.is_empty() {
            return;
        }
        let keys: Vec<String> = identifiers.iter().map(|id| self.key(id)).collect();
        if let Err(err) = self.backend.delete_many(&keys) {
            error!(prefix = %self.prefix, error = %err, "cache delete failed");
        }
    }

    /// Looks `identifiers` up and decodes every hit with `decode`. Entries
    /// that fail to decode count as uncached.
    pub(crate) fn lookup<T>(
        &self,
        identifiers: &[String],
        decode: impl Fn(&str) -> Option<T>,
    ) -> CacheResult<T> {
        if identifiers.is_empty() {
            return CacheResult::empty();
        }
        let values = self.get_values(identifiers);
        let mut result = CacheResult::empty();
        for (identifier, value) in identifiers.iter().zip(values) {
            match value.as_deref().and_then(|raw| decode(raw)) {
                Some(decoded) => {
                    result.results.insert(identifier.clone(), decoded);
                }
                None => result.uncached_values.push(identifier.clone()),
            }
        }
        result
    }
}
