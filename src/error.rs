use crate::operation::Operation;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Namespace,
    Tag,
    User,
    Object,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Namespace => write!(f, "namespace"),
            ResourceType::Tag => write!(f, "tag"),
            ResourceType::User => write!(f, "user"),
            ResourceType::Object => write!(f, "object"),
        }
    }
}

/// Which permission record an operation was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKind {
    Namespace,
    Tag,
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionKind::Namespace => write!(f, "namespace"),
            PermissionKind::Tag => write!(f, "tag"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclErrorCode {
    InvalidOperation,
    FeatureError,
    UnknownUser,
    UserNotAllowedInException,
    UnknownPath,
    DuplicatePath,
    DuplicateUser,
    MalformedPath,
    NotEmpty,
    NotFound,
    InvalidConfig,
    Store,
    Encode,
    Decode,
}

impl AclErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            AclErrorCode::InvalidOperation => "invalid_operation",
            AclErrorCode::FeatureError => "feature_error",
            AclErrorCode::UnknownUser => "unknown_user",
            AclErrorCode::UserNotAllowedInException => "user_not_allowed_in_exception",
            AclErrorCode::UnknownPath => "unknown_path",
            AclErrorCode::DuplicatePath => "duplicate_path",
            AclErrorCode::DuplicateUser => "duplicate_user",
            AclErrorCode::MalformedPath => "malformed_path",
            AclErrorCode::NotEmpty => "not_empty",
            AclErrorCode::NotFound => "not_found",
            AclErrorCode::InvalidConfig => "invalid_config",
            AclErrorCode::Store => "store",
            AclErrorCode::Encode => "encode",
            AclErrorCode::Decode => "decode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    #[error("{operation} is an invalid operation for a {kind} permission")]
    InvalidOperation {
        operation: Operation,
        kind: PermissionKind,
    },
    #[error("{0}")]
    Feature(String),
    #[error("unknown usernames: {}", .usernames.join(","))]
    UnknownUser { usernames: Vec<String> },
    #[error("{0}")]
    UserNotAllowedInException(String),
    #[error("unknown paths: {}", .paths.join(","))]
    UnknownPath { paths: Vec<String> },
    #[error("paths already exist: {}", .paths.join(","))]
    DuplicatePath { paths: Vec<String> },
    #[error("users already exist: {}", .usernames.join(","))]
    DuplicateUser { usernames: Vec<String> },
    #[error("malformed path: {0:?}")]
    MalformedPath(String),
    #[error("namespaces still have children: {}", .paths.join(","))]
    NotEmpty { paths: Vec<String> },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("store error: {0}")]
    Store(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl AclError {
    pub fn code(&self) -> AclErrorCode {
        match self {
            AclError::InvalidOperation { .. } => AclErrorCode::InvalidOperation,
            AclError::Feature(_) => AclErrorCode::FeatureError,
            AclError::UnknownUser { .. } => AclErrorCode::UnknownUser,
            AclError::UserNotAllowedInException(_) => AclErrorCode::UserNotAllowedInException,
            AclError::UnknownPath { .. } => AclErrorCode::UnknownPath,
            AclError::DuplicatePath { .. } => AclErrorCode::DuplicatePath,
            AclError::DuplicateUser { .. } => AclErrorCode::DuplicateUser,
            AclError::MalformedPath(_) => AclErrorCode::MalformedPath,
            AclError::NotEmpty { .. } => AclErrorCode::NotEmpty,
            AclError::NotFound { .. } => AclErrorCode::NotFound,
            AclError::InvalidConfig { .. } => AclErrorCode::InvalidConfig,
            AclError::Store(_) => AclErrorCode::Store,
            AclError::Encode(_) => AclErrorCode::Encode,
            AclError::Decode(_) => AclErrorCode::Decode,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

/// Failure talking to the cache backend. Absorbed by
/// [`crate::cache::CacheClient`] and never returned to callers above it.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache config rejected: {0}")]
    InvalidConfig(#[from] AclError),
}

#[cfg(test)]
mod tests {
    use super::{AclError, AclErrorCode, PermissionKind};
    use crate::operation::Operation;

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(AclErrorCode::UnknownUser.as_str(), "unknown_user");
        assert_eq!(
            AclErrorCode::UserNotAllowedInException.as_str(),
            "user_not_allowed_in_exception"
        );
        assert_eq!(AclErrorCode::FeatureError.as_str(), "feature_error");
    }

    #[test]
    fn error_messages_list_every_offender() {
        let err = AclError::UnknownUser {
            usernames: vec!["alice".into(), "bob".into()],
        };
        assert_eq!(err.to_string(), "unknown usernames: alice,bob");
        assert_eq!(err.code_str(), "unknown_user");

        let err = AclError::InvalidOperation {
            operation: Operation::CreateNamespace,
            kind: PermissionKind::Tag,
        };
        assert_eq!(
            err.to_string(),
            "CREATE_NAMESPACE is an invalid operation for a tag permission"
        );
    }
}
