use super::{CacheBackend, CacheClient, CacheResult};
use crate::api::object::resolve_queries;
use crate::api::{ObjectApi, ObjectResolving, Query, SearchOutcome};
use crate::error::AclError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// About value -> object id, keyed `about:<value>`, stored as the id
/// string.
#[derive(Clone)]
pub struct ObjectCache {
    client: CacheClient,
}

impl ObjectCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            client: CacheClient::new(backend, "about:", ttl),
        }
    }

    pub fn get(&self, values: &[String]) -> CacheResult<Uuid> {
        self.client.lookup(values, |raw| Uuid::parse_str(raw).ok())
    }

    pub fn save(&self, objects: &HashMap<String, Uuid>) {
        self.client.set_values(
            objects
                .iter()
                .map(|(about, object_id)| (about.clone(), object_id.to_string()))
                .collect(),
        );
    }
}

/// Object resolution reading about values through [`ObjectCache`].
///
/// Searches run the same resolution as [`ObjectApi`] but answer
/// `fluiddb/about = "..."` queries through this cache.
pub struct CachingObjectApi {
    inner: ObjectApi,
    cache: ObjectCache,
}

impl CachingObjectApi {
    pub fn new(inner: ObjectApi, cache: ObjectCache) -> Self {
        Self { inner, cache }
    }
}

impl ObjectResolving for CachingObjectApi {
    fn create(&self, about: Option<&str>) -> Result<Uuid, AclError> {
        let object_id = self.inner.create(about)?;
        // An about value never moves to another object.
        if let Some(about) = about.filter(|about| !about.is_empty()) {
            self.cache
                .save(&HashMap::from([(about.to_string(), object_id)]));
        }
        Ok(object_id)
    }

    fn get(&self, values: &[String]) -> Result<HashMap<String, Uuid>, AclError> {
        let mut cached = self.cache.get(values);
        if !cached.uncached_values.is_empty() {
            let fetched = self.inner.get(&cached.uncached_values)?;
            self.cache.save(&fetched);
            cached.results.extend(fetched);
        }
        Ok(cached.results)
    }

    fn search(
        &self,
        queries: &[Query],
        implicit_create: bool,
    ) -> Result<HashMap<Query, SearchOutcome>, AclError> {
        resolve_queries(self, self.inner.search_index(), queries, implicit_create)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::QueryValue;
    use crate::cache::MemoryBackend;
    use crate::store::{MemoryStore, Store};
    use std::collections::BTreeSet;

    fn setup() -> (Arc<MemoryStore>, Arc<MemoryBackend>, CachingObjectApi) {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(MemoryBackend::new());
        let api = CachingObjectApi::new(
            ObjectApi::new(store.clone()),
            ObjectCache::new(backend.clone(), Duration::from_secs(60)),
        );
        (store, backend, api)
    }

    #[test]
    fn get_fills_the_cache_from_the_store() {
        let (store, backend, api) = setup();
        let id = Uuid::new_v4();
        store.insert_about_value(id, "paris").expect("about");

        let found = api.get(&["paris".into(), "rome".into()]).expect("get");
        assert_eq!(found, HashMap::from([("paris".to_string(), id)]));
        assert_eq!(backend.keys(), vec!["about:paris".to_string()]);
        assert_eq!(
            backend.get_many(&["about:paris".into()]).expect("raw"),
            vec![Some(id.to_string())]
        );
    }

    #[test]
    fn about_queries_are_answered_from_the_cache() {
        let (_, backend, api) = setup();
        let stale = Uuid::new_v4();
        api.cache
            .save(&HashMap::from([("paris".to_string(), stale)]));

        let query = Query::AboutEquals(QueryValue::Text("paris".into()));
        let results = api.search(&[query.clone()], false).expect("search");
        assert_eq!(results[&query], Ok(BTreeSet::from([stale])));
        assert_eq!(backend.keys(), vec!["about:paris".to_string()]);
    }

    #[test]
    fn implicit_creation_is_cached() {
        let (_, backend, api) = setup();
        let query = Query::AboutEquals(QueryValue::Text("rome".into()));
        let results = api.search(&[query.clone()], true).expect("search");
        let created = api.inner.get(&["rome".into()]).expect("store")["rome"];
        assert_eq!(results[&query], Ok(BTreeSet::from([created])));
        assert_eq!(backend.keys(), vec!["about:rome".to_string()]);
    }
}
