use super::NamespaceAuthoring;
use crate::error::AclError;
use crate::path::{is_valid_path, parent_path, parent_paths, path_hierarchy};
use crate::permission::{NamespacePermission, create_namespace_permission};
use crate::store::{Namespace, Store, User};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct NamespaceApi {
    store: Arc<dyn Store>,
}

impl NamespaceApi {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

pub(crate) fn check_paths(paths: &[String]) -> Result<(), AclError> {
    if let Some(path) = paths.iter().find(|path| !is_valid_path(path)) {
        return Err(AclError::MalformedPath(path.clone()));
    }
    Ok(())
}

/// Creates `paths` and any missing ancestors, each new namespace copying
/// its parent's permission. Does not commit.
pub(crate) fn create_namespaces(
    store: &dyn Store,
    creator: &User,
    paths: &[String],
) -> Result<Vec<Namespace>, AclError> {
    let hierarchy: Vec<String> = path_hierarchy(paths.iter().map(String::as_str))
        .into_iter()
        .collect();
    let mut existing: HashMap<String, Namespace> = store
        .namespaces_by_paths(&hierarchy)?
        .into_iter()
        .map(|namespace| (namespace.path.clone(), namespace))
        .collect();

    let parents: Vec<String> = parent_paths(hierarchy.iter().map(String::as_str))
        .into_iter()
        .collect();
    let mut templates: HashMap<String, NamespacePermission> = store
        .namespace_permissions(&parents)?
        .into_iter()
        .map(|(namespace, permission)| (namespace.path, permission))
        .collect();

    // Sorted order puts every parent before its children.
    let mut created = Vec::new();
    for path in &hierarchy {
        if existing.contains_key(path) {
            continue;
        }
        let parent = parent_path(path);
        let parent_id = parent
            .and_then(|parent| existing.get(parent))
            .map(|namespace| namespace.id);
        let namespace = store.insert_namespace(path, parent_id, creator.id)?;
        let template = parent.and_then(|parent| templates.get(parent));
        let permission = create_namespace_permission(store, &namespace, template)?;
        templates.insert(path.clone(), permission);
        existing.insert(path.clone(), namespace.clone());
        created.push(namespace);
    }
    Ok(created)
}

impl NamespaceAuthoring for NamespaceApi {
    fn create(&self, creator: &User, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        check_paths(paths)?;
        let duplicates: Vec<String> = self
            .store
            .namespaces_by_paths(paths)?
            .into_iter()
            .map(|namespace| namespace.path)
            .collect();
        if !duplicates.is_empty() {
            return Err(AclError::DuplicatePath { paths: duplicates });
        }

        let created = create_namespaces(self.store.as_ref(), creator, paths)?;
        self.store.commit()?;
        debug!(count = created.len(), creator = %creator.username, "namespaces created");
        Ok(created
            .into_iter()
            .map(|namespace| (namespace.object_id, namespace.path))
            .collect())
    }

    /// Deletes the namespaces at `paths` along with their permissions.
    /// Paths without a namespace are ignored.
    fn delete(&self, paths: &[String]) -> Result<Vec<(Uuid, String)>, AclError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let namespaces = self.store.namespaces_by_paths(paths)?;
        let mut not_empty = BTreeSet::new();
        for namespace in &namespaces {
            if !self.store.children_of(namespace.id)?.is_empty() {
                not_empty.insert(namespace.path.clone());
            }
        }
        if !not_empty.is_empty() {
            return Err(AclError::NotEmpty {
                paths: not_empty.into_iter().collect(),
            });
        }

        let ids: Vec<i64> = namespaces.iter().map(|namespace| namespace.id).collect();
        self.store.delete_namespaces(&ids)?;
        self.store.commit()?;
        Ok(namespaces
            .into_iter()
            .map(|namespace| (namespace.object_id, namespace.path))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Operation, Policy};
    use crate::permission::PathPermission;
    use crate::store::{MemoryStore, Role};

    fn setup() -> (Arc<MemoryStore>, User, NamespaceApi) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user("alice", "h", "Alice", None, Role::User)
            .expect("user");
        let api = NamespaceApi::new(store.clone());
        (store, user, api)
    }

    #[test]
    fn create_makes_missing_ancestors() {
        let (store, user, api) = setup();
        let created = api
            .create(&user, &["alice/books/fiction".into()])
            .expect("create");
        let paths: Vec<&str> = created.iter().map(|(_, path)| path.as_str()).collect();
        assert_eq!(paths, vec!["alice", "alice/books", "alice/books/fiction"]);

        let rows = store
            .namespaces_by_paths(&["alice/books/fiction".into(), "alice/books".into()])
            .expect("rows");
        let parent = rows.iter().find(|n| n.path == "alice/books").expect("parent");
        let child = rows
            .iter()
            .find(|n| n.path == "alice/books/fiction")
            .expect("child");
        assert_eq!(child.parent_id, Some(parent.id));
    }

    #[test]
    fn children_copy_the_parent_permission() {
        let (store, user, api) = setup();
        api.create(&user, &["alice".into()]).expect("root");
        let (root, mut permission) = store
            .namespace_permissions(&["alice".into()])
            .expect("lookup")
            .remove(0);
        permission
            .set(Operation::ListNamespace, Policy::Closed, [user.id])
            .expect("set");
        store
            .update_namespace_permission(root.id, permission.clone())
            .expect("update");

        api.create(&user, &["alice/secret".into()]).expect("child");
        let (_, child) = store
            .namespace_permissions(&["alice/secret".into()])
            .expect("lookup")
            .remove(0);
        assert_eq!(child, permission);
    }

    #[test]
    fn create_rejects_bad_and_duplicate_paths() {
        let (_, user, api) = setup();
        let err = api.create(&user, &["alice//x".into()]).expect_err("bad");
        assert!(matches!(err, AclError::MalformedPath(_)));

        api.create(&user, &["alice".into()]).expect("create");
        let err = api.create(&user, &["alice".into()]).expect_err("dup");
        assert_eq!(
            err,
            AclError::DuplicatePath {
                paths: vec!["alice".into()]
            }
        );
    }

    #[test]
    fn delete_refuses_namespaces_with_children() {
        let (store, user, api) = setup();
        api.create(&user, &["alice/books".into()]).expect("create");
        let err = api.delete(&["alice".into()]).expect_err("not empty");
        assert_eq!(
            err,
            AclError::NotEmpty {
                paths: vec!["alice".into()]
            }
        );

        let deleted = api
            .delete(&["alice/books".into(), "alice/unknown".into()])
            .expect("delete");
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].1, "alice/books");
        assert!(
            store
                .namespace_permissions(&["alice/books".into()])
                .expect("lookup")
                .is_empty()
        );
    }
}
