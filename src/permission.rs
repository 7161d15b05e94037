use crate::error::{AclError, PermissionKind};
use crate::operation::{NAMESPACE_OPERATIONS, Operation, Policy, TAG_OPERATIONS};
use crate::store::{Namespace, Store, Tag};
use serde::{Deserialize, Serialize};

/// Identifier of a user row.
pub type ActorId = i64;

/// Ordered, duplicate-free list of actors whose decision is inverted.
///
/// Membership is what `allow` looks at; order is kept so that what was set
/// is exactly what is read back and serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<ActorId>", into = "Vec<ActorId>")]
pub struct ExceptionList(Vec<ActorId>);

impl ExceptionList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, actor_id: ActorId) -> bool {
        self.0.contains(&actor_id)
    }

    /// Appends `actor_id` unless it is already listed.
    pub fn insert(&mut self, actor_id: ActorId) -> bool {
        if self.contains(actor_id) {
            return false;
        }
        self.0.push(actor_id);
        true
    }

    pub fn remove(&mut self, actor_id: ActorId) -> bool {
        let before = self.0.len();
        self.0.retain(|id| *id != actor_id);
        self.0.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[ActorId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ActorId> for ExceptionList {
    fn from_iter<I: IntoIterator<Item = ActorId>>(iter: I) -> Self {
        let mut list = ExceptionList::new();
        for actor_id in iter {
            list.insert(actor_id);
        }
        list
    }
}

impl From<Vec<ActorId>> for ExceptionList {
    fn from(ids: Vec<ActorId>) -> Self {
        ids.into_iter().collect()
    }
}

impl<const N: usize> From<[ActorId; N]> for ExceptionList {
    fn from(ids: [ActorId; N]) -> Self {
        ids.into_iter().collect()
    }
}

impl From<ExceptionList> for Vec<ActorId> {
    fn from(list: ExceptionList) -> Self {
        list.0
    }
}

/// Policy and exceptions for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionEntry {
    pub policy: Policy,
    pub exceptions: ExceptionList,
}

impl PermissionEntry {
    pub fn new(policy: Policy, exceptions: impl Into<ExceptionList>) -> Self {
        Self {
            policy,
            exceptions: exceptions.into(),
        }
    }

    pub fn allows(&self, actor_id: ActorId) -> bool {
        match self.policy {
            Policy::Closed => self.exceptions.contains(actor_id),
            Policy::Open => !self.exceptions.contains(actor_id),
        }
    }

    fn owner_only(owner_id: ActorId) -> Self {
        Self::new(Policy::Closed, [owner_id])
    }

    fn open() -> Self {
        Self::new(Policy::Open, ExceptionList::new())
    }
}

/// Shared behaviour of namespace and tag permissions.
///
/// Every accessor rejects operations outside [`PathPermission::operations`]
/// with [`AclError::InvalidOperation`].
pub trait PathPermission: Clone {
    const KIND: PermissionKind;

    fn operations() -> &'static [Operation];

    fn entry(&self, operation: Operation) -> Option<&PermissionEntry>;

    fn entry_mut(&mut self, operation: Operation) -> Option<&mut PermissionEntry>;

    fn get(&self, operation: Operation) -> Result<(Policy, &ExceptionList), AclError> {
        self.entry(operation)
            .map(|entry| (entry.policy, &entry.exceptions))
            .ok_or(AclError::InvalidOperation {
                operation,
                kind: Self::KIND,
            })
    }

    fn set<E: Into<ExceptionList>>(
        &mut self,
        operation: Operation,
        policy: Policy,
        exceptions: E,
    ) -> Result<(), AclError> {
        let entry = self
            .entry_mut(operation)
            .ok_or(AclError::InvalidOperation {
                operation,
                kind: Self::KIND,
            })?;
        *entry = PermissionEntry::new(policy, exceptions);
        Ok(())
    }

    fn allow(&self, operation: Operation, actor_id: ActorId) -> Result<bool, AclError> {
        self.entry(operation)
            .map(|entry| entry.allows(actor_id))
            .ok_or(AclError::InvalidOperation {
                operation,
                kind: Self::KIND,
            })
    }

    /// Drops `actor_id` from every exceptions list, returning whether
    /// anything changed.
    fn remove_actor(&mut self, actor_id: ActorId) -> bool {
        let mut changed = false;
        for operation in Self::operations() {
            if let Some(entry) = self.entry_mut(*operation) {
                changed |= entry.exceptions.remove(actor_id);
            }
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePermission {
    pub create: PermissionEntry,
    pub update: PermissionEntry,
    pub delete: PermissionEntry,
    pub list: PermissionEntry,
    pub control: PermissionEntry,
}

impl NamespacePermission {
    /// System default: everything closed to all but `owner_id`, listing open
    /// to everyone.
    pub fn new(owner_id: ActorId) -> Self {
        Self {
            create: PermissionEntry::owner_only(owner_id),
            update: PermissionEntry::owner_only(owner_id),
            delete: PermissionEntry::owner_only(owner_id),
            list: PermissionEntry::open(),
            control: PermissionEntry::owner_only(owner_id),
        }
    }
}

impl PathPermission for NamespacePermission {
    const KIND: PermissionKind = PermissionKind::Namespace;

    fn operations() -> &'static [Operation] {
        &NAMESPACE_OPERATIONS
    }

    fn entry(&self, operation: Operation) -> Option<&PermissionEntry> {
        match operation {
            Operation::CreateNamespace => Some(&self.create),
            Operation::UpdateNamespace => Some(&self.update),
            Operation::DeleteNamespace => Some(&self.delete),
            Operation::ListNamespace => Some(&self.list),
            Operation::ControlNamespace => Some(&self.control),
            _ => None,
        }
    }

    fn entry_mut(&mut self, operation: Operation) -> Option<&mut PermissionEntry> {
        match operation {
            Operation::CreateNamespace => Some(&mut self.create),
            Operation::UpdateNamespace => Some(&mut self.update),
            Operation::DeleteNamespace => Some(&mut self.delete),
            Operation::ListNamespace => Some(&mut self.list),
            Operation::ControlNamespace => Some(&mut self.control),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPermission {
    pub update: PermissionEntry,
    pub delete: PermissionEntry,
    pub control: PermissionEntry,
    pub write_value: PermissionEntry,
    pub read_value: PermissionEntry,
    pub delete_value: PermissionEntry,
    pub control_value: PermissionEntry,
}

impl TagPermission {
    /// System default: everything closed to all but `owner_id`, reading
    /// values open to everyone.
    pub fn new(owner_id: ActorId) -> Self {
        Self {
            update: PermissionEntry::owner_only(owner_id),
            delete: PermissionEntry::owner_only(owner_id),
            control: PermissionEntry::owner_only(owner_id),
            write_value: PermissionEntry::owner_only(owner_id),
            read_value: PermissionEntry::open(),
            delete_value: PermissionEntry::owner_only(owner_id),
            control_value: PermissionEntry::owner_only(owner_id),
        }
    }

    /// Builds a tag permission from its parent namespace's permission using
    /// [`TAG_PERMISSION_INHERITANCE`].
    pub fn inherit_from(parent: &NamespacePermission) -> Result<Self, AclError> {
        let mut permission = TagPermission::new(0);
        for (tag_operation, namespace_operation) in TAG_PERMISSION_INHERITANCE {
            let (policy, exceptions) = parent.get(namespace_operation)?;
            permission.set(tag_operation, policy, exceptions.clone())?;
        }
        Ok(permission)
    }
}

impl PathPermission for TagPermission {
    const KIND: PermissionKind = PermissionKind::Tag;

    fn operations() -> &'static [Operation] {
        &TAG_OPERATIONS
    }

    fn entry(&self, operation: Operation) -> Option<&PermissionEntry> {
        match operation {
            Operation::UpdateTag => Some(&self.update),
            Operation::DeleteTag => Some(&self.delete),
            Operation::ControlTag => Some(&self.control),
            Operation::WriteTagValue => Some(&self.write_value),
            Operation::ReadTagValue => Some(&self.read_value),
            Operation::DeleteTagValue => Some(&self.delete_value),
            Operation::ControlTagValue => Some(&self.control_value),
            _ => None,
        }
    }

    fn entry_mut(&mut self, operation: Operation) -> Option<&mut PermissionEntry> {
        match operation {
            Operation::UpdateTag => Some(&mut self.update),
            Operation::DeleteTag => Some(&mut self.delete),
            Operation::ControlTag => Some(&mut self.control),
            Operation::WriteTagValue => Some(&mut self.write_value),
            Operation::ReadTagValue => Some(&mut self.read_value),
            Operation::DeleteTagValue => Some(&mut self.delete_value),
            Operation::ControlTagValue => Some(&mut self.control_value),
            _ => None,
        }
    }
}

/// Tag operation -> namespace operation it copies policy and exceptions from
/// when a tag is created.
pub const TAG_PERMISSION_INHERITANCE: [(Operation, Operation); 7] = [
    (Operation::UpdateTag, Operation::UpdateNamespace),
    (Operation::DeleteTag, Operation::DeleteNamespace),
    (Operation::ControlTag, Operation::ControlNamespace),
    (Operation::WriteTagValue, Operation::UpdateNamespace),
    (Operation::ReadTagValue, Operation::ListNamespace),
    (Operation::DeleteTagValue, Operation::DeleteNamespace),
    (Operation::ControlTagValue, Operation::ControlNamespace),
];

/// Creates and stores the permission for a freshly created namespace.
///
/// With a `template` all five entries are copied from it; otherwise the
/// namespace creator gets the system default.
pub fn create_namespace_permission(
    store: &dyn Store,
    namespace: &Namespace,
    template: Option<&NamespacePermission>,
) -> Result<NamespacePermission, AclError> {
    let permission = match template {
        Some(template) => template.clone(),
        None => NamespacePermission::new(namespace.creator_id),
    };
    store.insert_namespace_permission(namespace.id, permission.clone())?;
    Ok(permission)
}

/// Creates and stores the permission for a freshly created tag, inheriting
/// from the parent namespace's current permission.
///
/// A parent without a permission row falls back to the system default for
/// the parent's creator.
pub fn create_tag_permission(store: &dyn Store, tag: &Tag) -> Result<TagPermission, AclError> {
    let permission = match store.namespace_permission_by_id(tag.namespace_id)? {
        Some(parent) => TagPermission::inherit_from(&parent)?,
        None => {
            let owner_id = store
                .namespaces_by_ids(&[tag.namespace_id])?
                .first()
                .map(|namespace| namespace.creator_id)
                .unwrap_or(tag.creator_id);
            TagPermission::new(owner_id)
        }
    };
    store.insert_tag_permission(tag.id, permission.clone())?;
    Ok(permission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Role, Store};

    #[test]
    fn allow_follows_policy_and_exceptions() {
        let closed = PermissionEntry::new(Policy::Closed, [1, 2]);
        assert!(closed.allows(1));
        assert!(!closed.allows(3));

        let open = PermissionEntry::new(Policy::Open, [1, 2]);
        assert!(!open.allows(2));
        assert!(open.allows(3));
    }

    #[test]
    fn namespace_defaults_close_everything_but_list() {
        let permission = NamespacePermission::new(7);
        for op in NAMESPACE_OPERATIONS {
            let (policy, exceptions) = permission.get(op).expect("namespace op");
            if op == Operation::ListNamespace {
                assert_eq!(policy, Policy::Open);
                assert!(exceptions.is_empty());
            } else {
                assert_eq!(policy, Policy::Closed);
                assert_eq!(exceptions.as_slice(), &[7]);
            }
        }
    }

    #[test]
    fn tag_defaults_close_everything_but_read_value() {
        let permission = TagPermission::new(7);
        assert!(permission.allow(Operation::ReadTagValue, 99).expect("read"));
        assert!(!permission.allow(Operation::WriteTagValue, 99).expect("write"));
        assert!(permission.allow(Operation::ControlTagValue, 7).expect("control"));
    }

    #[test]
    fn operations_outside_the_set_are_rejected() {
        let mut namespace = NamespacePermission::new(1);
        let err = namespace.get(Operation::ReadTagValue).expect_err("tag op");
        assert!(matches!(
            err,
            AclError::InvalidOperation {
                operation: Operation::ReadTagValue,
                kind: PermissionKind::Namespace,
            }
        ));
        assert!(
            namespace
                .set(Operation::CreateUser, Policy::Open, ExceptionList::new())
                .is_err()
        );
        assert!(namespace.allow(Operation::CreateObject, 1).is_err());

        let tag = TagPermission::new(1);
        assert!(tag.allow(Operation::ListNamespace, 1).is_err());
    }

    #[test]
    fn set_then_get_returns_what_was_set() {
        let mut permission = TagPermission::new(1);
        permission
            .set(Operation::WriteTagValue, Policy::Open, [5, 3, 9])
            .expect("set");
        let (policy, exceptions) = permission.get(Operation::WriteTagValue).expect("get");
        assert_eq!(policy, Policy::Open);
        assert_eq!(exceptions.as_slice(), &[5, 3, 9]);
    }

    #[test]
    fn exception_lists_drop_duplicates_and_keep_order() {
        let list = ExceptionList::from(vec![3, 1, 3, 2, 1]);
        assert_eq!(list.as_slice(), &[3, 1, 2]);
    }

    #[test]
    fn tag_inherits_from_parent_namespace() {
        let mut parent = NamespacePermission::new(1);
        parent
            .set(Operation::CreateNamespace, Policy::Open, ExceptionList::new())
            .expect("create");
        parent
            .set(Operation::UpdateNamespace, Policy::Open, ExceptionList::new())
            .expect("update");
        parent
            .set(Operation::DeleteNamespace, Policy::Open, ExceptionList::new())
            .expect("delete");
        parent
            .set(Operation::ListNamespace, Policy::Closed, [42])
            .expect("list");
        parent
            .set(Operation::ControlNamespace, Policy::Open, ExceptionList::new())
            .expect("control");

        let tag = TagPermission::inherit_from(&parent).expect("inherit");
        for op in [
            Operation::UpdateTag,
            Operation::DeleteTag,
            Operation::ControlTag,
            Operation::WriteTagValue,
            Operation::DeleteTagValue,
            Operation::ControlTagValue,
        ] {
            let (policy, exceptions) = tag.get(op).expect("tag op");
            assert_eq!(policy, Policy::Open, "{op}");
            assert!(exceptions.is_empty(), "{op}");
        }
        let (policy, exceptions) = tag.get(Operation::ReadTagValue).expect("read");
        assert_eq!(policy, Policy::Closed);
        assert_eq!(exceptions.as_slice(), &[42]);
    }

    #[test]
    fn inheritance_maps_update_and_delete_separately() {
        let mut parent = NamespacePermission::new(1);
        parent
            .set(Operation::UpdateNamespace, Policy::Closed, [2])
            .expect("update");
        parent
            .set(Operation::DeleteNamespace, Policy::Closed, [3])
            .expect("delete");
        parent
            .set(Operation::CreateNamespace, Policy::Closed, [4])
            .expect("create");

        let tag = TagPermission::inherit_from(&parent).expect("inherit");
        let exceptions = |op| tag.get(op).expect("tag op").1.as_slice().to_vec();
        assert_eq!(exceptions(Operation::UpdateTag), vec![2]);
        assert_eq!(exceptions(Operation::WriteTagValue), vec![2]);
        assert_eq!(exceptions(Operation::DeleteTag), vec![3]);
        assert_eq!(exceptions(Operation::DeleteTagValue), vec![3]);
        assert_eq!(exceptions(Operation::ControlTag), vec![1]);
    }

    #[test]
    fn create_functions_persist_rows() {
        let store = MemoryStore::new();
        let user = store
            .insert_user("alice", "hash", "Alice", None, Role::User)
            .expect("user");
        let namespace = store
            .insert_namespace("alice", None, user.id)
            .expect("namespace");
        let permission =
            create_namespace_permission(&store, &namespace, None).expect("namespace permission");
        assert_eq!(permission, NamespacePermission::new(user.id));

        let tag = store
            .insert_tag("alice/rating", namespace.id, user.id)
            .expect("tag");
        let tag_permission = create_tag_permission(&store, &tag).expect("tag permission");
        assert_eq!(
            store.tag_permission_by_id(tag.id).expect("lookup"),
            Some(tag_permission)
        );
    }
}
