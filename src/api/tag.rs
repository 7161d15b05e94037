use super::TagAuthoring;
use super::namespace::{check_paths, create_namespaces};
use crate::error::AclError;
use crate::path::{parent_path, parent_paths};
use crate::permission::create_tag_permission;
use crate::store::{Store, User};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct TagApi {
    store: Arc<dyn Store>,
}

impl TagApi {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl TagAuthoring for TagApi {
    /// Creates tags, creating any missing parent namespaces first. Each tag
    /// inherits its permission from its parent namespace.
    fn create(&self, creator: &User, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError> {
        if paths.is_empty() {
            return Err(AclError::Feature(
                "Can't create an empty list of tags.".into(),
            ));
        }
        check_paths(paths)?;
        if let Some(path) = paths.iter().find(|path| parent_path(path).is_none()) {
            return Err(AclError::MalformedPath(path.clone()));
        }
        let mut seen = BTreeSet::new();
        let mut duplicates: BTreeSet<String> = paths
            .iter()
            .filter(|path| !seen.insert(path.as_str()))
            .cloned()
            .collect();
        duplicates.extend(self.store.tags_by_paths(paths)?.into_iter().map(|tag| tag.path));
        if !duplicates.is_empty() {
            return Err(AclError::DuplicatePath {
                paths: duplicates.into_iter().collect(),
            });
        }

        let parents: Vec<String> = parent_paths(paths.iter().map(String::as_str))
            .into_iter()
            .collect();
        create_namespaces(self.store.as_ref(), creator, &parents)?;
        let namespace_ids: HashMap<String, i64> = self
            .store
            .namespaces_by_paths(&parents)?
            .into_iter()
            .map(|namespace| (namespace.path, namespace.id))
            .collect();

        let mut created = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(namespace_id) = parent_path(path).and_then(|p| namespace_ids.get(p)) else {
                return Err(AclError::UnknownPath {
                    paths: vec![path.clone()],
                });
            };
            let tag = self.store.insert_tag(path, *namespace_id, creator.id)?;
            create_tag_permission(self.store.as_ref(), &tag)?;
            created.push((tag.object_id, tag.path));
        }
        self.store.commit()?;
        debug!(count = created.len(), creator = %creator.username, "tags created");
        Ok(created)
    }

    /// Deletes the tags at `paths` along with their permissions. Paths
    /// without a tag are ignored.
    fn delete(&self, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let tags = self.store.tags_by_paths(paths)?;
        let ids: Vec<i64> = tags.iter().map(|tag| tag.id).collect();
        self.store.delete_tags(&ids)?;
        self.store.commit()?;
        Ok(tags.into_iter().map(|tag| (tag.object_id, tag.path)).collect())
    }
}
