use super::{ExceptionSweep, Namespace, Role, Store, Tag, User};
use crate::error::{AclError, ResourceType};
use crate::permission::{ActorId, NamespacePermission, PathPermission, TagPermission};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    next_namespace_id: i64,
    next_tag_id: i64,
    next_user_id: i64,
    namespaces: BTreeMap<i64, Namespace>,
    namespace_ids: HashMap<String, i64>,
    tags: BTreeMap<i64, Tag>,
    tag_ids: HashMap<String, i64>,
    users: BTreeMap<ActorId, User>,
    user_ids: HashMap<String, ActorId>,
    namespace_permissions: HashMap<i64, NamespacePermission>,
    tag_permissions: HashMap<i64, TagPermission>,
    about_values: HashMap<String, Uuid>,
}

/// [`Store`] kept entirely in memory.
///
/// Writes are visible as soon as they return; [`Store::commit`] only counts
/// transaction boundaries so callers can assert on them.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

fn not_found(resource_type: ResourceType, id: i64) -> AclError {
    AclError::NotFound {
        resource_type,
        resource_id: id.to_string(),
    }
}

impl Store for MemoryStore {
    fn namespaces_by_paths(&self, paths: &[String]) -> Result<Vec<Namespace>, AclError> {
        let state = self.state.read();
        Ok(paths
            .iter()
            .filter_map(|path| state.namespace_ids.get(path))
            .filter_map(|id| state.namespaces.get(id).cloned())
            .collect())
    }

    fn namespaces_by_ids(&self, ids: &[i64]) -> Result<Vec<Namespace>, AclError> {
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.namespaces.get(id).cloned())
            .collect())
    }

    fn tags_by_paths(&self, paths: &[String]) -> Result<Vec<Tag>, AclError> {
        let state = self.state.read();
        Ok(paths
            .iter()
            .filter_map(|path| state.tag_ids.get(path))
            .filter_map(|id| state.tags.get(id).cloned())
            .collect())
    }

    fn users_by_usernames(&self, usernames: &[String]) -> Result<Vec<User>, AclError> {
        let state = self.state.read();
        Ok(usernames
            .iter()
            .filter_map(|username| state.user_ids.get(username))
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    fn users_by_ids(&self, ids: &[ActorId]) -> Result<Vec<User>, AclError> {
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    fn namespace_permissions(
        &self,
        paths: &[String],
    ) -> Result<Vec<(Namespace, NamespacePermission)>, AclError> {
        let state = self.state.read();
        Ok(paths
            .iter()
            .filter_map(|path| state.namespace_ids.get(path))
            .filter_map(|id| {
                let namespace = state.namespaces.get(id)?;
                let permission = state.namespace_permissions.get(id)?;
                Some((namespace.clone(), permission.clone()))
            })
            .collect())
    }

    fn tag_permissions(&self, paths: &[String]) -> Result<Vec<(Tag, TagPermission)>, AclError> {
        let state = self.state.read();
        Ok(paths
            .iter()
            .filter_map(|path| state.tag_ids.get(path))
            .filter_map(|id| {
                let tag = state.tags.get(id)?;
                let permission = state.tag_permissions.get(id)?;
                Some((tag.clone(), permission.clone()))
            })
            .collect())
    }

    fn namespace_permission_by_id(
        &self,
        namespace_id: i64,
    ) -> Result<Option<NamespacePermission>, AclError> {
        Ok(self
            .state
            .read()
            .namespace_permissions
            .get(&namespace_id)
            .cloned())
    }

    fn tag_permission_by_id(&self, tag_id: i64) -> Result<Option<TagPermission>, AclError> {
        Ok(self.state.read().tag_permissions.get(&tag_id).cloned())
    }

    fn insert_namespace(
        &self,
        path: &str,
        parent_id: Option<i64>,
        creator_id: ActorId,
    ) -> Result<Namespace, AclError> {
        let mut state = self.state.write();
        if state.namespace_ids.contains_key(path) {
            return Err(AclError::DuplicatePath {
                paths: vec![path.to_string()],
            });
        }
        state.next_namespace_id += 1;
        let namespace = Namespace {
            id: state.next_namespace_id,
            object_id: Uuid::new_v4(),
            path: path.to_string(),
            parent_id,
            creator_id,
        };
        state.namespace_ids.insert(path.to_string(), namespace.id);
        state.namespaces.insert(namespace.id, namespace.clone());
        Ok(namespace)
    }

    fn insert_tag(
        &self,
        path: &str,
        namespace_id: i64,
        creator_id: ActorId,
    ) -> Result<Tag, AclError> {
        let mut state = self.state.write();
        if state.tag_ids.contains_key(path) {
            return Err(AclError::DuplicatePath {
                paths: vec![path.to_string()],
            });
        }
        if !state.namespaces.contains_key(&namespace_id) {
            return Err(not_found(ResourceType::Namespace, namespace_id));
        }
        state.next_tag_id += 1;
        let tag = Tag {
            id: state.next_tag_id,
            object_id: Uuid::new_v4(),
            path: path.to_string(),
            namespace_id,
            creator_id,
        };
        state.tag_ids.insert(path.to_string(), tag.id);
        state.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        fullname: &str,
        email: Option<&str>,
        role: Role,
    ) -> Result<User, AclError> {
        let mut state = self.state.write();
        if state.user_ids.contains_key(username) {
            return Err(AclError::DuplicateUser {
                usernames: vec![username.to_string()],
            });
        }
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            object_id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            fullname: fullname.to_string(),
            email: email.map(str::to_string),
            role,
        };
        state.user_ids.insert(username.to_string(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn update_user(&self, user: &User) -> Result<(), AclError> {
        let mut state = self.state.write();
        let Some(existing) = state.users.get_mut(&user.id) else {
            return Err(not_found(ResourceType::User, user.id));
        };
        let old_username = std::mem::replace(existing, user.clone()).username;
        if old_username != user.username {
            state.user_ids.remove(&old_username);
            state.user_ids.insert(user.username.clone(), user.id);
        }
        Ok(())
    }

    fn delete_users(&self, ids: &[ActorId]) -> Result<ExceptionSweep, AclError> {
        let mut state = self.state.write();
        let MemoryState {
            namespaces,
            tags,
            users,
            user_ids,
            namespace_permissions,
            tag_permissions,
            ..
        } = &mut *state;

        for id in ids {
            if let Some(user) = users.remove(id) {
                user_ids.remove(&user.username);
            }
        }

        let mut sweep = ExceptionSweep::default();
        for (namespace_id, permission) in namespace_permissions.iter_mut() {
            let mut changed = false;
            for id in ids {
                changed |= permission.remove_actor(*id);
            }
            if let Some(namespace) = namespaces.get(namespace_id).filter(|_| changed) {
                sweep.namespace_paths.push(namespace.path.clone());
            }
        }
        for (tag_id, permission) in tag_permissions.iter_mut() {
            let mut changed = false;
            for id in ids {
                changed |= permission.remove_actor(*id);
            }
            if let Some(tag) = tags.get(tag_id).filter(|_| changed) {
                sweep.tag_paths.push(tag.path.clone());
            }
        }
        sweep.namespace_paths.sort();
        sweep.tag_paths.sort();
        Ok(sweep)
    }

    fn delete_namespaces(&self, ids: &[i64]) -> Result<(), AclError> {
        let mut state = self.state.write();
        for id in ids {
            if let Some(namespace) = state.namespaces.remove(id) {
                state.namespace_ids.remove(&namespace.path);
            }
            state.namespace_permissions.remove(id);
        }
        Ok(())
    }

    fn delete_tags(&self, ids: &[i64]) -> Result<(), AclError> {
        let mut state = self.state.write();
        for id in ids {
            if let Some(tag) = state.tags.remove(id) {
                state.tag_ids.remove(&tag.path);
            }
            state.tag_permissions.remove(id);
        }
        Ok(())
    }

    fn children_of(&self, namespace_id: i64) -> Result<Vec<String>, AclError> {
        let state = self.state.read();
        let namespaces = state
            .namespaces
            .values()
            .filter(|namespace| namespace.parent_id == Some(namespace_id))
            .map(|namespace| namespace.path.clone());
        let tags = state
            .tags
            .values()
            .filter(|tag| tag.namespace_id == namespace_id)
            .map(|tag| tag.path.clone());
        Ok(namespaces.chain(tags).collect())
    }

    fn insert_namespace_permission(
        &self,
        namespace_id: i64,
        permission: NamespacePermission,
    ) -> Result<(), AclError> {
        let mut state = self.state.write();
        if !state.namespaces.contains_key(&namespace_id) {
            return Err(not_found(ResourceType::Namespace, namespace_id));
        }
        state.namespace_permissions.insert(namespace_id, permission);
        Ok(())
    }

    fn insert_tag_permission(
        &self,
        tag_id: i64,
        permission: TagPermission,
    ) -> Result<(), AclError> {
        let mut state = self.state.write();
        if !state.tags.contains_key(&tag_id) {
            return Err(not_found(ResourceType::Tag, tag_id));
        }
        state.tag_permissions.insert(tag_id, permission);
        Ok(())
    }

    fn update_namespace_permission(
        &self,
        namespace_id: i64,
        permission: NamespacePermission,
    ) -> Result<(), AclError> {
        let mut state = self.state.write();
        let Some(existing) = state.namespace_permissions.get_mut(&namespace_id) else {
            return Err(not_found(ResourceType::Namespace, namespace_id));
        };
        *existing = permission;
        Ok(())
    }

    fn update_tag_permission(
        &self,
        tag_id: i64,
        permission: TagPermission,
    ) -> Result<(), AclError> {
        let mut state = self.state.write();
        let Some(existing) = state.tag_permissions.get_mut(&tag_id) else {
            return Err(not_found(ResourceType::Tag, tag_id));
        };
        *existing = permission;
        Ok(())
    }

    fn about_values(&self, values: &[String]) -> Result<Vec<(String, Uuid)>, AclError> {
        let state = self.state.read();
        Ok(values
            .iter()
            .filter_map(|value| {
                state
                    .about_values
                    .get(value)
                    .map(|object_id| (value.clone(), *object_id))
            })
            .collect())
    }

    fn insert_about_value(&self, object_id: Uuid, value: &str) -> Result<(), AclError> {
        let mut state = self.state.write();
        state.about_values.entry(value.to_string()).or_insert(object_id);
        Ok(())
    }

    fn commit(&self) -> Result<(), AclError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Operation, Policy};

    #[test]
    fn duplicate_rows_are_rejected() {
        let store = MemoryStore::new();
        store
            .insert_user("alice", "h", "Alice", None, Role::User)
            .expect("alice");
        let err = store
            .insert_user("alice", "h", "Alice", None, Role::User)
            .expect_err("duplicate");
        assert!(matches!(err, AclError::DuplicateUser { .. }));

        store.insert_namespace("alice", None, 1).expect("namespace");
        let err = store
            .insert_namespace("alice", None, 1)
            .expect_err("duplicate");
        assert!(matches!(err, AclError::DuplicatePath { .. }));
    }

    #[test]
    fn lookups_skip_unknown_paths() {
        let store = MemoryStore::new();
        let ns = store.insert_namespace("alice", None, 1).expect("namespace");
        store
            .insert_namespace_permission(ns.id, NamespacePermission::new(1))
            .expect("permission");
        let rows = store
            .namespace_permissions(&["alice".into(), "bob".into()])
            .expect("lookup");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.path, "alice");
        assert!(store.tags_by_paths(&["alice".into()]).expect("tags").is_empty());
    }

    #[test]
    fn deleting_users_sweeps_exception_lists() {
        let store = MemoryStore::new();
        let alice = store
            .insert_user("alice", "h", "Alice", None, Role::User)
            .expect("alice");
        let bob = store
            .insert_user("bob", "h", "Bob", None, Role::User)
            .expect("bob");
        let ns = store
            .insert_namespace("alice", None, alice.id)
            .expect("namespace");
        let mut permission = NamespacePermission::new(alice.id);
        permission
            .set(Operation::ListNamespace, Policy::Open, [bob.id])
            .expect("set");
        store
            .insert_namespace_permission(ns.id, permission)
            .expect("permission");

        let sweep = store.delete_users(&[bob.id]).expect("delete");
        assert_eq!(sweep.namespace_paths, vec!["alice".to_string()]);
        assert!(sweep.tag_paths.is_empty());
        let permission = store
            .namespace_permission_by_id(ns.id)
            .expect("lookup")
            .expect("row");
        assert!(permission.list.exceptions.is_empty());
        assert!(
            store
                .users_by_usernames(&["bob".into()])
                .expect("users")
                .is_empty()
        );
    }
}
