use crate::error::AclError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An action checked against a path permission, or against the caller's
/// role for the account and object operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    /// Create namespaces or tags in a namespace.
    CreateNamespace,
    UpdateNamespace,
    /// Delete a namespace, which must be empty.
    DeleteNamespace,
    /// See the contained namespace and tag names.
    ListNamespace,
    /// Change permissions for a namespace.
    ControlNamespace,
    UpdateTag,
    /// Delete a tag and remove it from every object.
    DeleteTag,
    ControlTag,
    WriteTagValue,
    ReadTagValue,
    DeleteTagValue,
    ControlTagValue,
    CreateUser,
    DeleteUser,
    UpdateUser,
    CreateObject,
}

pub const NAMESPACE_OPERATIONS: [Operation; 5] = [
    Operation::CreateNamespace,
    Operation::UpdateNamespace,
    Operation::DeleteNamespace,
    Operation::ListNamespace,
    Operation::ControlNamespace,
];

pub const TAG_OPERATIONS: [Operation; 7] = [
    Operation::UpdateTag,
    Operation::DeleteTag,
    Operation::ControlTag,
    Operation::WriteTagValue,
    Operation::ReadTagValue,
    Operation::DeleteTagValue,
    Operation::ControlTagValue,
];

pub const PATH_OPERATIONS: [Operation; 12] = [
    Operation::CreateNamespace,
    Operation::UpdateNamespace,
    Operation::DeleteNamespace,
    Operation::ListNamespace,
    Operation::ControlNamespace,
    Operation::UpdateTag,
    Operation::DeleteTag,
    Operation::ControlTag,
    Operation::WriteTagValue,
    Operation::ReadTagValue,
    Operation::DeleteTagValue,
    Operation::ControlTagValue,
];

pub const USER_OPERATIONS: [Operation; 3] = [
    Operation::CreateUser,
    Operation::DeleteUser,
    Operation::UpdateUser,
];

pub const CONTROL_OPERATIONS: [Operation; 3] = [
    Operation::ControlNamespace,
    Operation::ControlTag,
    Operation::ControlTagValue,
];

/// Operations an anonymous actor may be listed for in an exceptions list.
pub const ALLOWED_ANONYMOUS_OPERATIONS: [Operation; 2] =
    [Operation::ListNamespace, Operation::ReadTagValue];

const ALL_OPERATIONS: [Operation; 16] = [
    Operation::CreateNamespace,
    Operation::UpdateNamespace,
    Operation::DeleteNamespace,
    Operation::ListNamespace,
    Operation::ControlNamespace,
    Operation::UpdateTag,
    Operation::DeleteTag,
    Operation::ControlTag,
    Operation::WriteTagValue,
    Operation::ReadTagValue,
    Operation::DeleteTagValue,
    Operation::ControlTagValue,
    Operation::CreateUser,
    Operation::DeleteUser,
    Operation::UpdateUser,
    Operation::CreateObject,
];

impl Operation {
    /// Stable numeric id, used as the key in cached permission documents.
    pub fn id(self) -> u8 {
        match self {
            Operation::CreateNamespace => 1,
            Operation::UpdateNamespace => 2,
            Operation::DeleteNamespace => 3,
            Operation::ListNamespace => 4,
            Operation::ControlNamespace => 5,
            Operation::UpdateTag => 6,
            Operation::DeleteTag => 7,
            Operation::ControlTag => 8,
            Operation::WriteTagValue => 9,
            Operation::ReadTagValue => 10,
            Operation::DeleteTagValue => 11,
            Operation::ControlTagValue => 12,
            Operation::CreateUser => 13,
            Operation::DeleteUser => 14,
            Operation::UpdateUser => 15,
            Operation::CreateObject => 17,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        ALL_OPERATIONS.into_iter().find(|op| op.id() == id)
    }

    pub fn all() -> &'static [Operation] {
        &ALL_OPERATIONS
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::CreateNamespace => "CREATE_NAMESPACE",
            Operation::UpdateNamespace => "UPDATE_NAMESPACE",
            Operation::DeleteNamespace => "DELETE_NAMESPACE",
            Operation::ListNamespace => "LIST_NAMESPACE",
            Operation::ControlNamespace => "CONTROL_NAMESPACE",
            Operation::UpdateTag => "UPDATE_TAG",
            Operation::DeleteTag => "DELETE_TAG",
            Operation::ControlTag => "CONTROL_TAG",
            Operation::WriteTagValue => "WRITE_TAG_VALUE",
            Operation::ReadTagValue => "READ_TAG_VALUE",
            Operation::DeleteTagValue => "DELETE_TAG_VALUE",
            Operation::ControlTagValue => "CONTROL_TAG_VALUE",
            Operation::CreateUser => "CREATE_USER",
            Operation::DeleteUser => "DELETE_USER",
            Operation::UpdateUser => "UPDATE_USER",
            Operation::CreateObject => "CREATE_OBJECT",
        }
    }

    pub fn is_namespace_operation(self) -> bool {
        NAMESPACE_OPERATIONS.contains(&self)
    }

    pub fn is_tag_operation(self) -> bool {
        TAG_OPERATIONS.contains(&self)
    }

    pub fn is_path_operation(self) -> bool {
        self.is_namespace_operation() || self.is_tag_operation()
    }

    pub fn is_control_operation(self) -> bool {
        CONTROL_OPERATIONS.contains(&self)
    }

    /// Resolves the `(category, action)` pair used by front ends.
    ///
    /// `tag-values/create` is accepted as an older spelling of
    /// `tag-values/write`. Account and object operations have no
    /// permission record and are not addressable this way.
    pub fn from_category_action(category: &str, action: &str) -> Option<Self> {
        let operation = match (category, action) {
            ("namespaces", "create") => Operation::CreateNamespace,
            ("namespaces", "update") => Operation::UpdateNamespace,
            ("namespaces", "delete") => Operation::DeleteNamespace,
            ("namespaces", "list") => Operation::ListNamespace,
            ("namespaces", "control") => Operation::ControlNamespace,
            ("tags", "update") => Operation::UpdateTag,
            ("tags", "delete") => Operation::DeleteTag,
            ("tags", "control") => Operation::ControlTag,
            ("tag-values", "create") | ("tag-values", "write") => Operation::WriteTagValue,
            ("tag-values", "read") => Operation::ReadTagValue,
            ("tag-values", "delete") => Operation::DeleteTagValue,
            ("tag-values", "control") => Operation::ControlTagValue,
            _ => return None,
        };
        Some(operation)
    }

    pub fn category_and_action(self) -> (&'static str, &'static str) {
        match self {
            Operation::CreateNamespace => ("namespaces", "create"),
            Operation::UpdateNamespace => ("namespaces", "update"),
            Operation::DeleteNamespace => ("namespaces", "delete"),
            Operation::ListNamespace => ("namespaces", "list"),
            Operation::ControlNamespace => ("namespaces", "control"),
            Operation::UpdateTag => ("tags", "update"),
            Operation::DeleteTag => ("tags", "delete"),
            Operation::ControlTag => ("tags", "control"),
            Operation::WriteTagValue => ("tag-values", "write"),
            Operation::ReadTagValue => ("tag-values", "read"),
            Operation::DeleteTagValue => ("tag-values", "delete"),
            Operation::ControlTagValue => ("tag-values", "control"),
            Operation::CreateUser => ("users", "create"),
            Operation::DeleteUser => ("users", "delete"),
            Operation::UpdateUser => ("users", "update"),
            Operation::CreateObject => ("objects", "create"),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default decision for an operation on a path. Actors in the exceptions
/// list get the opposite decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Policy {
    Open,
    Closed,
}

impl Policy {
    /// `Open` is `true`. The cached permission format depends on this.
    pub fn as_bool(self) -> bool {
        matches!(self, Policy::Open)
    }

    pub fn from_bool(open: bool) -> Self {
        if open { Policy::Open } else { Policy::Closed }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Policy::Open => "open",
            Policy::Closed => "closed",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Policy::Open),
            "closed" => Ok(Policy::Closed),
            other => Err(AclError::Feature(format!("invalid policy {other:?}"))),
        }
    }
}
