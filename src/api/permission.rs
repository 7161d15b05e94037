use super::{PermissionAuthoring, PermissionChecking, PermissionUpdate, PermissionValues};
use crate::config::AclConfig;
use crate::error::AclError;
use crate::operation::{Operation, Policy};
use crate::path::{OBJECT_ID_TAG, parent_path, path_hierarchy};
use crate::permission::{
    ActorId, ExceptionList, NamespacePermission, PathPermission, TagPermission,
};
use crate::store::{Role, Store};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Permission authoring against the store.
pub struct PermissionApi {
    store: Arc<dyn Store>,
    config: AclConfig,
}

impl PermissionApi {
    pub fn new(store: Arc<dyn Store>, config: AclConfig) -> Self {
        Self { store, config }
    }

    /// Resolves every exception username. Fails listing all unknown names
    /// across the batch.
    fn user_details(
        &self,
        usernames: &BTreeSet<String>,
    ) -> Result<HashMap<String, (ActorId, Role)>, AclError> {
        if usernames.is_empty() {
            return Ok(HashMap::new());
        }
        let wanted: Vec<String> = usernames.iter().cloned().collect();
        let details: HashMap<String, (ActorId, Role)> = self
            .store
            .users_by_usernames(&wanted)?
            .into_iter()
            .map(|user| (user.username, (user.id, user.role)))
            .collect();
        let unknown: Vec<String> = usernames
            .iter()
            .filter(|username| !details.contains_key(*username))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(AclError::UnknownUser { usernames: unknown });
        }
        Ok(details)
    }

    fn validate_exceptions(
        &self,
        values: &[PermissionUpdate],
        details: &HashMap<String, (ActorId, Role)>,
    ) -> Result<(), AclError> {
        for value in values {
            for username in &value.exceptions {
                let Some((_, role)) = details.get(username) else {
                    continue;
                };
                match role {
                    Role::Superuser => {
                        return Err(AclError::UserNotAllowedInException(
                            "Can't put a superuser in an exceptions list.".into(),
                        ));
                    }
                    Role::Anonymous
                        if !self.config.anonymous_operations.contains(&value.operation) =>
                    {
                        return Err(AclError::UserNotAllowedInException(format!(
                            "Can't put an anonymous user in an exceptions list for operation {}.",
                            value.operation
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn resolve_ids(
        exceptions: &[String],
        details: &HashMap<String, (ActorId, Role)>,
    ) -> ExceptionList {
        exceptions
            .iter()
            .filter_map(|username| details.get(username).map(|(id, _)| *id))
            .collect()
    }

    fn usernames_by_id(
        &self,
        ids: BTreeSet<ActorId>,
    ) -> Result<HashMap<ActorId, String>, AclError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<ActorId> = ids.into_iter().collect();
        Ok(self
            .store
            .users_by_ids(&ids)?
            .into_iter()
            .map(|user| (user.id, user.username))
            .collect())
    }
}

fn unknown_path_error(paths: impl IntoIterator<Item = String>) -> AclError {
    let mut paths: Vec<String> = paths.into_iter().collect();
    paths.sort();
    paths.dedup();
    AclError::UnknownPath { paths }
}

impl PermissionAuthoring for PermissionApi {
    fn set(&self, values: &[PermissionUpdate]) -> Result<(), AclError> {
        if values.is_empty() {
            return Ok(());
        }

        let usernames: BTreeSet<String> = values
            .iter()
            .flat_map(|value| value.exceptions.iter().cloned())
            .collect();
        let details = self.user_details(&usernames)?;
        self.validate_exceptions(values, &details)?;

        let mut namespace_values: BTreeMap<&str, Vec<&PermissionUpdate>> = BTreeMap::new();
        let mut tag_values: BTreeMap<&str, Vec<&PermissionUpdate>> = BTreeMap::new();
        for value in values {
            if value.operation.is_namespace_operation() {
                namespace_values.entry(&value.path).or_default().push(value);
            } else if value.operation.is_tag_operation() {
                tag_values.entry(&value.path).or_default().push(value);
            } else {
                return Err(AclError::Feature(format!(
                    "Can't set operation {}.",
                    value.operation
                )));
            }
        }

        let namespace_paths: Vec<String> = namespace_values.keys().map(|p| p.to_string()).collect();
        let namespace_rows = if namespace_paths.is_empty() {
            Vec::new()
        } else {
            self.store.namespace_permissions(&namespace_paths)?
        };
        let tag_paths: Vec<String> = tag_values.keys().map(|p| p.to_string()).collect();
        let tag_rows = if tag_paths.is_empty() {
            Vec::new()
        } else {
            self.store.tag_permissions(&tag_paths)?
        };

        let found: BTreeSet<&str> = namespace_rows
            .iter()
            .map(|(namespace, _)| namespace.path.as_str())
            .collect();
        let mut missing: Vec<String> = namespace_paths
            .iter()
            .filter(|path| !found.contains(path.as_str()))
            .cloned()
            .collect();
        let found: BTreeSet<&str> = tag_rows.iter().map(|(tag, _)| tag.path.as_str()).collect();
        missing.extend(
            tag_paths
                .iter()
                .filter(|path| !found.contains(path.as_str()))
                .cloned(),
        );
        if !missing.is_empty() {
            return Err(unknown_path_error(missing));
        }

        // Apply every change in memory first so an invalid entry leaves the
        // store untouched.
        let mut namespace_updates = Vec::with_capacity(namespace_rows.len());
        for (namespace, mut permission) in namespace_rows {
            for value in &namespace_values[namespace.path.as_str()] {
                let exceptions = Self::resolve_ids(&value.exceptions, &details);
                permission.set(value.operation, value.policy, exceptions)?;
            }
            namespace_updates.push((namespace.id, permission));
        }
        let mut tag_updates = Vec::with_capacity(tag_rows.len());
        for (tag, mut permission) in tag_rows {
            for value in &tag_values[tag.path.as_str()] {
                let exceptions = Self::resolve_ids(&value.exceptions, &details);
                permission.set(value.operation, value.policy, exceptions)?;
            }
            tag_updates.push((tag.id, permission));
        }

        for (namespace_id, permission) in namespace_updates {
            self.store
                .update_namespace_permission(namespace_id, permission)?;
        }
        for (tag_id, permission) in tag_updates {
            self.store.update_tag_permission(tag_id, permission)?;
        }
        self.store.commit()?;
        debug!(entries = values.len(), "permissions updated");
        Ok(())
    }

    fn get(&self, values: &[(String, Operation)]) -> Result<PermissionValues, AclError> {
        if values.is_empty() {
            return Err(AclError::Feature(
                "Can't get an empty list of permissions.".into(),
            ));
        }

        let mut namespace_paths = BTreeSet::new();
        let mut tag_paths = BTreeSet::new();
        for (path, operation) in values {
            if operation.is_namespace_operation() {
                namespace_paths.insert(path.clone());
            } else {
                tag_paths.insert(path.clone());
            }
        }

        let namespace_index: HashMap<String, NamespacePermission> = if namespace_paths.is_empty() {
            HashMap::new()
        } else {
            let paths: Vec<String> = namespace_paths.into_iter().collect();
            self.store
                .namespace_permissions(&paths)?
                .into_iter()
                .map(|(namespace, permission)| (namespace.path, permission))
                .collect()
        };
        let tag_index: HashMap<String, TagPermission> = if tag_paths.is_empty() {
            HashMap::new()
        } else {
            let paths: Vec<String> = tag_paths.into_iter().collect();
            self.store
                .tag_permissions(&paths)?
                .into_iter()
                .map(|(tag, permission)| (tag.path, permission))
                .collect()
        };

        let mut by_id: HashMap<(String, Operation), (Policy, ExceptionList)> = HashMap::new();
        let mut missing = Vec::new();
        for (path, operation) in values {
            let entry = if operation.is_namespace_operation() {
                namespace_index
                    .get(path)
                    .map(|permission| permission.get(*operation))
            } else {
                tag_index.get(path).map(|permission| permission.get(*operation))
            };
            match entry {
                Some(result) => {
                    let (policy, exceptions) = result?;
                    by_id.insert((path.clone(), *operation), (policy, exceptions.clone()));
                }
                None => missing.push(path.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(unknown_path_error(missing));
        }

        let ids: BTreeSet<ActorId> = by_id
            .values()
            .flat_map(|(_, exceptions)| exceptions.iter())
            .collect();
        let usernames = self.usernames_by_id(ids)?;
        Ok(by_id
            .into_iter()
            .map(|(key, (policy, exceptions))| {
                let names = exceptions
                    .iter()
                    .filter_map(|id| usernames.get(&id).cloned())
                    .collect();
                (key, (policy, names))
            })
            .collect())
    }
}

/// Path-to-permission resolution against the store.
pub struct PermissionCheckerApi {
    store: Arc<dyn Store>,
}

impl PermissionCheckerApi {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl PermissionChecking for PermissionCheckerApi {
    fn namespace_permissions(
        &self,
        paths: &[String],
    ) -> Result<HashMap<String, NamespacePermission>, AclError> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .store
            .namespace_permissions(paths)?
            .into_iter()
            .map(|(namespace, permission)| (namespace.path, permission))
            .collect())
    }

    fn tag_permissions(&self, paths: &[String]) -> Result<HashMap<String, TagPermission>, AclError> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .store
            .tag_permissions(paths)?
            .into_iter()
            .map(|(tag, permission)| (tag.path, permission))
            .collect())
    }

    fn unknown_paths(&self, values: &[(String, Operation)]) -> Result<BTreeSet<String>, AclError> {
        let mut tag_paths = BTreeSet::new();
        let mut namespace_paths = BTreeSet::new();
        for (path, operation) in values {
            if path.is_empty() {
                return Err(AclError::Feature("A path must be provided.".into()));
            } else if operation.is_tag_operation() {
                tag_paths.insert(path.clone());
            } else if operation.is_namespace_operation() {
                namespace_paths.insert(path.clone());
            } else {
                return Err(AclError::Feature(format!(
                    "Invalid operation {operation} for the path {path:?}"
                )));
            }
        }
        tag_paths.remove(OBJECT_ID_TAG);
        namespace_paths.remove(OBJECT_ID_TAG);

        let mut unknown = BTreeSet::new();
        if !tag_paths.is_empty() {
            let paths: Vec<String> = tag_paths.iter().cloned().collect();
            let existing: BTreeSet<String> = self
                .store
                .tags_by_paths(&paths)?
                .into_iter()
                .map(|tag| tag.path)
                .collect();
            unknown.extend(tag_paths.difference(&existing).cloned());
        }
        if !namespace_paths.is_empty() {
            let paths: Vec<String> = namespace_paths.iter().cloned().collect();
            let existing: BTreeSet<String> = self
                .store
                .namespaces_by_paths(&paths)?
                .into_iter()
                .map(|namespace| namespace.path)
                .collect();
            unknown.extend(namespace_paths.difference(&existing).cloned());
        }
        Ok(unknown)
    }

    fn unknown_parent_paths(
        &self,
        unknown_paths: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, String>, AclError> {
        if unknown_paths.is_empty() {
            return Ok(BTreeMap::new());
        }
        let hierarchy: Vec<String> = path_hierarchy(unknown_paths.iter().map(String::as_str))
            .into_iter()
            .collect();
        let existing: BTreeSet<String> = self
            .store
            .namespaces_by_paths(&hierarchy)?
            .into_iter()
            .map(|namespace| namespace.path)
            .collect();

        let mut closest = BTreeMap::new();
        for path in unknown_paths {
            let mut parent = parent_path(path);
            while let Some(candidate) = parent {
                if existing.contains(candidate) {
                    closest.insert(path.clone(), candidate.to_string());
                    break;
                }
                parent = parent_path(candidate);
            }
        }
        Ok(closest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{NamespaceApi, NamespaceAuthoring, TagApi, TagAuthoring};
    use crate::store::{MemoryStore, User};

    struct Fixture {
        store: Arc<MemoryStore>,
        alice: User,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let alice = store
                .insert_user("alice", "h", "Alice", None, Role::User)
                .expect("alice");
            NamespaceApi::new(store.clone())
                .create(&alice, &["alice".into()])
                .expect("namespace");
            TagApi::new(store.clone())
                .create(&alice, &["alice/rating".into()])
                .expect("tag");
            Self { store, alice }
        }

        fn permissions(&self) -> PermissionApi {
            PermissionApi::new(self.store.clone(), AclConfig::default())
        }

        fn checker(&self) -> PermissionCheckerApi {
            PermissionCheckerApi::new(self.store.clone())
        }

        fn add_user(&self, username: &str, role: Role) -> User {
            self.store
                .insert_user(username, "h", username, None, role)
                .expect("user")
        }
    }

    #[test]
    fn get_returns_default_namespace_permission_by_name() {
        let fx = Fixture::new();
        let result = fx
            .permissions()
            .get(&[("alice".into(), Operation::CreateNamespace)])
            .expect("get");
        assert_eq!(
            result[&("alice".to_string(), Operation::CreateNamespace)],
            (Policy::Closed, vec!["alice".to_string()])
        );
    }

    #[test]
    fn get_rejects_empty_input() {
        let fx = Fixture::new();
        let err = fx.permissions().get(&[]).expect_err("empty");
        assert!(matches!(err, AclError::Feature(_)));
    }

    #[test]
    fn set_then_get_round_trips_names() {
        let fx = Fixture::new();
        fx.add_user("bob", Role::User);
        fx.add_user("carol", Role::User);
        let api = fx.permissions();
        api.set(&[PermissionUpdate::new(
            "alice/rating",
            Operation::WriteTagValue,
            Policy::Closed,
            ["carol", "bob"],
        )])
        .expect("set");
        let result = api
            .get(&[("alice/rating".into(), Operation::WriteTagValue)])
            .expect("get");
        assert_eq!(
            result[&("alice/rating".to_string(), Operation::WriteTagValue)],
            (
                Policy::Closed,
                vec!["carol".to_string(), "bob".to_string()]
            )
        );
    }

    #[test]
    fn set_reports_every_unknown_user() {
        let fx = Fixture::new();
        let err = fx
            .permissions()
            .set(&[
                PermissionUpdate::new("alice", Operation::ListNamespace, Policy::Open, ["zed"]),
                PermissionUpdate::new(
                    "alice/rating",
                    Operation::ReadTagValue,
                    Policy::Open,
                    ["alice", "yan"],
                ),
            ])
            .expect_err("unknown users");
        match err {
            AclError::UnknownUser { usernames } => {
                assert_eq!(usernames, vec!["yan".to_string(), "zed".to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn superusers_are_never_listed() {
        let fx = Fixture::new();
        fx.add_user("root", Role::Superuser);
        let err = fx
            .permissions()
            .set(&[PermissionUpdate::new(
                "alice",
                Operation::ListNamespace,
                Policy::Closed,
                ["root"],
            )])
            .expect_err("superuser");
        assert!(matches!(err, AclError::UserNotAllowedInException(_)));
    }

    #[test]
    fn anonymous_only_listed_for_permitted_operations() {
        let fx = Fixture::new();
        fx.add_user("anon", Role::Anonymous);
        let api = fx.permissions();
        api.set(&[PermissionUpdate::new(
            "alice/rating",
            Operation::ReadTagValue,
            Policy::Open,
            ["anon"],
        )])
        .expect("read value is allowed");
        let err = api
            .set(&[PermissionUpdate::new(
                "alice/rating",
                Operation::WriteTagValue,
                Policy::Closed,
                ["anon"],
            )])
            .expect_err("write value is not");
        assert!(matches!(err, AclError::UserNotAllowedInException(_)));
    }

    #[test]
    fn set_rejects_account_operations_and_unknown_paths() {
        let fx = Fixture::new();
        let api = fx.permissions();
        let err = api
            .set(&[PermissionUpdate::new(
                "alice",
                Operation::CreateUser,
                Policy::Open,
                Vec::<String>::new(),
            )])
            .expect_err("account op");
        assert!(matches!(err, AclError::Feature(_)));

        let commits = fx.store.commit_count();
        let err = api
            .set(&[PermissionUpdate::new(
                "alice/missing",
                Operation::UpdateTag,
                Policy::Open,
                Vec::<String>::new(),
            )])
            .expect_err("unknown path");
        assert!(matches!(err, AclError::UnknownPath { .. }));
        assert_eq!(fx.store.commit_count(), commits);
    }

    #[test]
    fn checker_drops_paths_of_the_wrong_kind() {
        let fx = Fixture::new();
        let checker = fx.checker();
        let namespaces = checker
            .namespace_permissions(&["alice".into(), "alice/rating".into(), "nobody".into()])
            .expect("namespaces");
        assert_eq!(namespaces.len(), 1);
        assert!(
            namespaces["alice"]
                .allow(Operation::CreateNamespace, fx.alice.id)
                .expect("allow")
        );

        let tags = checker
            .tag_permissions(&["alice".into(), "alice/rating".into()])
            .expect("tags");
        assert_eq!(tags.keys().collect::<Vec<_>>(), vec!["alice/rating"]);
    }

    #[test]
    fn unknown_paths_by_operation_kind() {
        let fx = Fixture::new();
        let unknown = fx
            .checker()
            .unknown_paths(&[
                ("alice".into(), Operation::ListNamespace),
                ("alice".into(), Operation::ReadTagValue),
                ("alice/rating".into(), Operation::UpdateTag),
                ("alice/nope".into(), Operation::CreateNamespace),
                (OBJECT_ID_TAG.into(), Operation::ReadTagValue),
            ])
            .expect("unknown");
        let expected: BTreeSet<String> = ["alice", "alice/nope"].into_iter().map(String::from).collect();
        assert_eq!(unknown, expected);

        let unknown = fx
            .checker()
            .unknown_paths(&[(OBJECT_ID_TAG.into(), Operation::ReadTagValue)])
            .expect("object id tag");
        assert!(unknown.is_empty());
    }

    #[test]
    fn unknown_paths_rejects_invalid_input() {
        let fx = Fixture::new();
        let err = fx
            .checker()
            .unknown_paths(&[("alice".into(), Operation::CreateUser)])
            .expect_err("account op");
        assert!(matches!(err, AclError::Feature(_)));
        let err = fx
            .checker()
            .unknown_paths(&[(String::new(), Operation::ListNamespace)])
            .expect_err("empty path");
        assert!(matches!(err, AclError::Feature(_)));
    }

    #[test]
    fn unknown_parent_paths_find_nearest_namespace() {
        let fx = Fixture::new();
        let paths: BTreeSet<String> = ["alice/missing/path", "nobody/else", "alice/x"]
            .into_iter()
            .map(String::from)
            .collect();
        let parents = fx.checker().unknown_parent_paths(&paths).expect("parents");
        assert_eq!(parents.len(), 2);
        assert_eq!(parents["alice/missing/path"], "alice");
        assert_eq!(parents["alice/x"], "alice");
        assert!(
            fx.checker()
                .unknown_parent_paths(&BTreeSet::new())
                .expect("empty")
                .is_empty()
        );
    }
}
