use crate::error::AclError;
use crate::operation::{ALLOWED_ANONYMOUS_OPERATIONS, Operation};
use std::collections::BTreeSet;
use std::time::Duration;

/// Runtime configuration for the permission core and its cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclConfig {
    pub cache_host: String,
    pub cache_port: u16,
    pub cache_db: u32,
    /// Expiry applied to every cache entry on each save.
    pub cache_expire_timeout_secs: u64,
    /// Upper bound on opening a cache connection, so an unreachable cache
    /// degrades to a bounded miss.
    pub cache_connect_timeout_ms: u64,
    /// Operations for which the anonymous actor may appear in an exceptions
    /// list.
    pub anonymous_operations: BTreeSet<Operation>,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            cache_host: "127.0.0.1".to_string(),
            cache_port: 6379,
            cache_db: 0,
            cache_expire_timeout_secs: 3600,
            cache_connect_timeout_ms: 250,
            anonymous_operations: ALLOWED_ANONYMOUS_OPERATIONS.into_iter().collect(),
        }
    }
}

impl AclConfig {
    /// Short expiry so stale entries age out quickly while iterating.
    pub fn development() -> Self {
        Self {
            cache_expire_timeout_secs: 60,
            ..Self::default()
        }
    }

    pub fn with_cache_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.cache_host = host.into();
        self.cache_port = port;
        self
    }

    pub fn with_cache_db(mut self, db: u32) -> Self {
        self.cache_db = db;
        self
    }

    pub fn with_expire_timeout_secs(mut self, secs: u64) -> Self {
        self.cache_expire_timeout_secs = secs;
        self
    }

    pub fn with_connect_timeout_ms(mut self, millis: u64) -> Self {
        self.cache_connect_timeout_ms = millis;
        self
    }

    pub fn with_anonymous_operations<I>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = Operation>,
    {
        self.anonymous_operations = operations.into_iter().collect();
        self
    }

    pub fn cache_url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.cache_host, self.cache_port, self.cache_db
        )
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_expire_timeout_secs)
    }

    pub fn cache_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), AclError> {
        if self.cache_host.is_empty() {
            return Err(AclError::InvalidConfig {
                message: "cache_host must not be empty".into(),
            });
        }
        if self.cache_expire_timeout_secs == 0 {
            return Err(AclError::InvalidConfig {
                message: "cache_expire_timeout_secs must be > 0".into(),
            });
        }
        if self.cache_connect_timeout_ms == 0 {
            return Err(AclError::InvalidConfig {
                message: "cache_connect_timeout_ms must be > 0".into(),
            });
        }
        if let Some(op) = self
            .anonymous_operations
            .iter()
            .find(|op| !op.is_path_operation())
        {
            return Err(AclError::InvalidConfig {
                message: format!("anonymous_operations contains non-path operation {op}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AclConfig::default();
        config.validate().expect("valid");
        assert_eq!(config.cache_url(), "redis://127.0.0.1:6379/0");
        assert!(config.anonymous_operations.contains(&Operation::ReadTagValue));
        assert!(!config.anonymous_operations.contains(&Operation::WriteTagValue));
    }

    #[test]
    fn rejects_zero_ttl_and_account_operations() {
        let err = AclConfig::default()
            .with_expire_timeout_secs(0)
            .validate()
            .expect_err("zero ttl");
        assert_eq!(err.code_str(), "invalid_config");

        let err = AclConfig::default()
            .with_anonymous_operations([Operation::CreateUser])
            .validate()
            .expect_err("account op");
        assert!(err.to_string().contains("CREATE_USER"));

        let err = AclConfig::default()
            .with_connect_timeout_ms(0)
            .validate()
            .expect_err("zero connect timeout");
        assert!(err.to_string().contains("cache_connect_timeout_ms"));
    }

    #[test]
    fn builders_compose() {
        let config = AclConfig::development()
            .with_cache_address("cache.internal", 6380)
            .with_cache_db(2);
        assert_eq!(config.cache_url(), "redis://cache.internal:6380/2");
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.cache_connect_timeout(), Duration::from_millis(250));
    }
}
