use super::ObjectResolving;
use crate::error::AclError;
use crate::path::OBJECT_ID_TAG;
use crate::store::Store;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Literal on the right-hand side of an equality query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Null,
}

/// A parsed object query, reduced to the shapes resolved without the
/// search index plus an opaque expression for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// `fluiddb/about = <value>`
    AboutEquals(QueryValue),
    /// `fluiddb/id = "<uuid>"`
    IdEquals(String),
    /// `has <path>`
    Has(String),
    Expression(String),
}

/// Per-query failure. Reported alongside the other results instead of
/// failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("Invalid about value type.")]
    InvalidAboutValue,
    #[error("Invalid UUID.")]
    InvalidUuid,
    #[error("{0}")]
    Unsupported(String),
    #[error("search index error: {0}")]
    Index(String),
    #[error("no search index configured")]
    NoIndex,
}

pub type SearchOutcome = Result<BTreeSet<Uuid>, SearchError>;

/// Full-text/tag-value index consulted for queries that cannot be answered
/// from about values or object ids alone.
pub trait SearchIndex: Send + Sync {
    fn search(&self, query: &Query) -> SearchOutcome;
}

/// Resolves `queries`, answering about-value lookups through `resolver` so
/// a caching resolver can serve them from its cache.
pub(crate) fn resolve_queries(
    resolver: &dyn ObjectResolving,
    index: Option<&dyn SearchIndex>,
    queries: &[Query],
    implicit_create: bool,
) -> Result<HashMap<Query, SearchOutcome>, AclError> {
    if queries.is_empty() {
        return Err(AclError::Feature("Queries must be provided.".into()));
    }

    let mut results = HashMap::with_capacity(queries.len());
    let mut about_values = BTreeSet::new();
    for query in queries {
        match query {
            Query::AboutEquals(QueryValue::Text(value)) => {
                about_values.insert(value.clone());
            }
            Query::AboutEquals(_) => {
                results.insert(query.clone(), Err(SearchError::InvalidAboutValue));
            }
            Query::IdEquals(value) => {
                let outcome = Uuid::parse_str(value)
                    .map(|id| BTreeSet::from([id]))
                    .map_err(|_| SearchError::InvalidUuid);
                results.insert(query.clone(), outcome);
            }
            Query::Has(path) if path == OBJECT_ID_TAG => {
                results.insert(
                    query.clone(),
                    Err(SearchError::Unsupported(format!(
                        "{OBJECT_ID_TAG} is not supported in queries."
                    ))),
                );
            }
            Query::Has(_) | Query::Expression(_) => {
                let outcome = match index {
                    Some(index) => index.search(query),
                    None => Err(SearchError::NoIndex),
                };
                results.insert(query.clone(), outcome);
            }
        }
    }

    if !about_values.is_empty() {
        let values: Vec<String> = about_values.iter().cloned().collect();
        let mut objects = resolver.get(&values)?;
        if implicit_create {
            for value in &values {
                if !objects.contains_key(value) {
                    let object_id = resolver.create(Some(value))?;
                    objects.insert(value.clone(), object_id);
                }
            }
        }
        for value in values {
            let found: BTreeSet<Uuid> = objects.get(&value).copied().into_iter().collect();
            results.insert(Query::AboutEquals(QueryValue::Text(value)), Ok(found));
        }
    }
    Ok(results)
}

pub struct ObjectApi {
    store: Arc<dyn Store>,
    index: Option<Arc<dyn SearchIndex>>,
}

impl ObjectApi {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, index: None }
    }

    pub fn with_search_index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub(crate) fn search_index(&self) -> Option<&dyn SearchIndex> {
        self.index.as_deref()
    }
}

impl ObjectResolving for ObjectApi {
    /// Returns the object already carrying `about`, creating one when none
    /// does. Without an about value a fresh id is returned and nothing is
    /// stored.
    fn create(&self, about: Option<&str>) -> Result<Uuid, AclError> {
        let Some(about) = about.filter(|about| !about.is_empty()) else {
            return Ok(Uuid::new_v4());
        };
        if let Some((_, object_id)) = self
            .store
            .about_values(&[about.to_string()])?
            .into_iter()
            .next()
        {
            return Ok(object_id);
        }
        let object_id = Uuid::new_v4();
        self.store.insert_about_value(object_id, about)?;
        self.store.commit()?;
        debug!(%object_id, "object created");
        Ok(object_id)
    }

    fn get(&self, values: &[String]) -> Result<HashMap<String, Uuid>, AclError> {
        if values.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self.store.about_values(values)?.into_iter().collect())
    }

    fn search(
        &self,
        queries: &[Query],
        implicit_create: bool,
    ) -> Result<HashMap<Query, SearchOutcome>, AclError> {
        resolve_queries(self, self.search_index(), queries, implicit_create)
    }
}
